use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarkError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Transcription error: {0}")]
    Transcription(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl HarkError {
    /// Returns `true` when the error is likely transient (HTTP 429/5xx,
    /// network timeouts, a busy database). Nothing in the core retries; this
    /// only lets callers decide how to report the failure.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Llm(msg) | Self::Transcription(msg) | Self::Storage(msg) => {
                is_transient_message(msg)
            }
            _ => false,
        }
    }
}

fn is_transient_message(msg: &str) -> bool {
    let msg_lower = msg.to_lowercase();
    for code in ["429", "500", "502", "503", "504"] {
        if msg_lower.contains(code) {
            return true;
        }
    }
    let patterns = [
        "timeout",
        "timed out",
        "connection refused",
        "connection reset",
        "database is locked",
        "temporarily unavailable",
    ];
    patterns.iter().any(|p| msg_lower.contains(p))
}

pub type Result<T> = std::result::Result<T, HarkError>;

/// Failure while dispatching a single tool call.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The model asked for a tool that was never offered to it.
    #[error("unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("arguments for {tool} are not a valid JSON object: {reason}")]
    MalformedArguments { tool: String, reason: String },

    #[error("{tool} is missing required argument '{argument}'")]
    MissingArgument { tool: String, argument: String },

    #[error("invalid argument '{argument}' for {tool}: {reason}")]
    InvalidArgument {
        tool: String,
        argument: String,
        reason: String,
    },

    #[error("timer store failed: {0}")]
    Store(#[from] HarkError),
}

impl ToolError {
    /// Validation failures are the caller's to branch on: the arguments were
    /// wrong, but the conversation itself is still well-formed.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::MalformedArguments { .. }
                | Self::MissingArgument { .. }
                | Self::InvalidArgument { .. }
        )
    }
}

/// Terminal failure of a `process_command` conversation.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("model output truncated by the token limit")]
    Truncated,

    #[error("model output omitted by a content filter")]
    ContentFiltered,

    #[error("model used the deprecated function_call style instead of tool calls")]
    DeprecatedFunctionCall,

    #[error("unrecognized finish reason: {0}")]
    UnrecognizedFinishReason(String),

    #[error("model stopped without producing a reply")]
    EmptyReply,

    #[error("no final reply after {max} model rounds")]
    RoundsExhausted { max: u32 },

    #[error("tool dispatch failed: {0}")]
    Tool(#[from] ToolError),

    #[error("model call failed: {0}")]
    Model(HarkError),

    #[error("invalid command input: {0}")]
    Input(HarkError),
}

impl CommandError {
    /// Contract violations: the model did something outside the declared
    /// protocol. These are never expected in correct operation.
    pub fn is_protocol_violation(&self) -> bool {
        match self {
            Self::DeprecatedFunctionCall
            | Self::UnrecognizedFinishReason(_)
            | Self::RoundsExhausted { .. } => true,
            Self::Tool(err) => matches!(err, ToolError::UnknownTool { .. }),
            _ => false,
        }
    }

    /// The model ended the round on its own terms (limit, filter, empty stop).
    pub fn is_model_terminal(&self) -> bool {
        matches!(
            self,
            Self::Truncated | Self::ContentFiltered | Self::EmptyReply
        )
    }
}

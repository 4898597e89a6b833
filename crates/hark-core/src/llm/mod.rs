mod wire;

use std::future::Future;
use std::time::Instant;

use crate::config::LlmConfig;
use crate::error::{HarkError, Result};
use crate::tools::ToolDefinition;

/// One entry in a conversation sent to the chat model.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatMessage {
    System {
        content: String,
    },
    User {
        content: UserContent,
    },
    Assistant {
        content: Option<String>,
        tool_calls: Vec<ToolCall>,
    },
    /// Result of one tool call, correlated by the call's id.
    Tool {
        tool_call_id: String,
        content: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum UserContent {
    Text(String),
    /// Raw audio attached as an input part; `format` is the encoding tag
    /// (`wav`, `mp3`).
    Audio { data: Vec<u8>, format: String },
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: UserContent::Text(content.into()),
        }
    }

    pub fn user_audio(data: Vec<u8>, format: impl Into<String>) -> Self {
        Self::User {
            content: UserContent::Audio {
                data,
                format: format.into(),
            },
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Tool {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
        }
    }

    pub fn role(&self) -> &'static str {
        match self {
            Self::System { .. } => "system",
            Self::User { .. } => "user",
            Self::Assistant { .. } => "assistant",
            Self::Tool { .. } => "tool",
        }
    }
}

/// A model-issued function invocation. `arguments` is the raw JSON text
/// exactly as the model produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// Why the model stopped generating in a given round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    ToolCalls,
    Length,
    ContentFilter,
    /// Legacy single-function call style.
    FunctionCall,
    Other(String),
}

impl FinishReason {
    pub fn from_wire(reason: &str) -> Self {
        match reason {
            "stop" => Self::Stop,
            "tool_calls" => Self::ToolCalls,
            "length" => Self::Length,
            "content_filter" => Self::ContentFilter,
            "function_call" => Self::FunctionCall,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Stop => "stop",
            Self::ToolCalls => "tool_calls",
            Self::Length => "length",
            Self::ContentFilter => "content_filter",
            Self::FunctionCall => "function_call",
            Self::Other(s) => s,
        }
    }
}

impl std::fmt::Display for FinishReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One round's answer from the model.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub finish_reason: FinishReason,
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

impl Completion {
    /// A plain text answer.
    pub fn stop(content: impl Into<String>) -> Self {
        Self {
            finish_reason: FinishReason::Stop,
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            finish_reason: FinishReason::ToolCalls,
            content: None,
            tool_calls: calls,
        }
    }

    pub fn with_finish_reason(finish_reason: FinishReason) -> Self {
        Self {
            finish_reason,
            content: None,
            tool_calls: Vec::new(),
        }
    }

    /// The assistant entry to append to the conversation for this round.
    pub fn to_message(&self) -> ChatMessage {
        ChatMessage::Assistant {
            content: self.content.clone(),
            tool_calls: self.tool_calls.clone(),
        }
    }
}

/// A chat model that can be offered function tools.
pub trait ChatModel: Send + Sync {
    /// Submit the whole conversation plus the full tool set, returning the
    /// model's answer for this round.
    fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> impl Future<Output = Result<Completion>> + Send;

    /// Model identifier, for logs and health output.
    fn model_name(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LlmProvider {
    OpenAI,
    Groq,
    Ollama,
    OpenAICompatible,
}

impl LlmProvider {
    fn default_base_url(self) -> Option<&'static str> {
        match self {
            Self::OpenAI => Some("https://api.openai.com"),
            Self::Groq => Some("https://api.groq.com/openai"),
            Self::Ollama => Some("http://localhost:11434"),
            Self::OpenAICompatible => None,
        }
    }

    fn default_env_var(self) -> Option<&'static str> {
        match self {
            Self::OpenAI => Some("OPENAI_API_KEY"),
            Self::Groq => Some("GROQ_API_KEY"),
            Self::Ollama | Self::OpenAICompatible => None,
        }
    }
}

/// Chat-completions client for OpenAI and API-compatible providers
/// (Groq, Ollama, self-hosted gateways).
pub struct LlmService {
    provider: LlmProvider,
    config: LlmConfig,
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for LlmService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmService")
            .field("provider", &self.provider)
            .field("model", &self.config.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl LlmService {
    /// Create a chat client from configuration. Fails when the provider is
    /// unknown or a required API key cannot be found.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let provider = match config.provider.as_str() {
            "openai" => LlmProvider::OpenAI,
            "groq" => LlmProvider::Groq,
            "ollama" => LlmProvider::Ollama,
            "openai-compatible" => LlmProvider::OpenAICompatible,
            other => {
                return Err(HarkError::Config(format!(
                    "unknown LLM provider: '{other}' (expected 'openai', 'groq', 'ollama', or 'openai-compatible')"
                )));
            }
        };

        let base_url = config
            .base_url
            .as_deref()
            .or(provider.default_base_url())
            .ok_or_else(|| {
                HarkError::Config(format!(
                    "{} LLM provider requires llm.base_url",
                    config.provider
                ))
            })?
            .trim_end_matches('/')
            .to_string();

        let api_key = match provider.default_env_var() {
            Some(default_env_var) => Some(resolve_api_key(
                &config.provider,
                config.api_key.as_deref(),
                config.env_var.as_deref(),
                default_env_var,
            )?),
            None => optional_api_key(config.api_key.as_deref(), config.env_var.as_deref()),
        };

        Ok(Self {
            provider,
            config: config.clone(),
            base_url,
            api_key,
            client: reqwest::Client::new(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST {base_url}/v1/chat/completions
    async fn post_completion(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<Completion> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = wire::request_body(
            &self.config.model,
            self.config.max_tokens,
            self.config.temperature,
            messages,
            tools,
        );

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let resp = request.send().await.map_err(|e| {
            tracing::warn!(target: "hark::llm", provider = %self.config.provider, "request failed: {e}");
            HarkError::Http(e)
        })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(HarkError::Llm(format!(
                "{} error {status}: {text}",
                self.config.provider
            )));
        }

        let json: serde_json::Value = resp.json().await.map_err(|e| {
            HarkError::Llm(format!("{} response parse error: {e}", self.config.provider))
        })?;

        wire::parse_completion(json)
    }
}

impl ChatModel for LlmService {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<Completion> {
        let started = Instant::now();
        let completion = self.post_completion(messages, tools).await?;
        tracing::debug!(
            target: "hark::llm",
            model = %self.config.model,
            finish_reason = %completion.finish_reason,
            tool_calls = completion.tool_calls.len(),
            latency_ms = started.elapsed().as_millis() as u64,
            "completion received"
        );
        Ok(completion)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

/// Resolve an API key from config, a custom env var, or a default env var.
pub(crate) fn resolve_api_key(
    provider: &str,
    api_key: Option<&str>,
    env_var: Option<&str>,
    default_env_var: &str,
) -> Result<String> {
    if let Some(key) = api_key.filter(|k| !k.is_empty()) {
        return Ok(key.to_string());
    }

    let env_var_name = env_var.unwrap_or(default_env_var);

    std::env::var(env_var_name).map_err(|_| {
        HarkError::Config(format!(
            "{provider} provider requires an API key (set api_key or {env_var_name})"
        ))
    })
}

/// Keys for providers that may or may not need one.
pub(crate) fn optional_api_key(api_key: Option<&str>, env_var: Option<&str>) -> Option<String> {
    api_key
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .or_else(|| env_var.and_then(|name| std::env::var(name).ok()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_ollama_needs_no_key() {
        let config = LlmConfig {
            provider: "ollama".into(),
            model: "llama3.2".into(),
            ..Default::default()
        };
        let service = LlmService::from_config(&config).unwrap();
        assert_eq!(service.base_url(), "http://localhost:11434");
        assert_eq!(service.model_name(), "llama3.2");
    }

    #[test]
    fn test_from_config_unknown_provider() {
        let config = LlmConfig {
            provider: "banana".into(),
            ..Default::default()
        };
        let result = LlmService::from_config(&config);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("unknown LLM provider"));
    }

    #[test]
    fn test_from_config_openai_with_key() {
        let config = LlmConfig {
            provider: "openai".into(),
            api_key: Some("sk-test".into()),
            base_url: Some("https://proxy.example.com/".into()),
            ..Default::default()
        };
        let service = LlmService::from_config(&config).unwrap();
        assert_eq!(service.base_url(), "https://proxy.example.com");
    }

    #[test]
    fn test_from_config_groq_with_missing_env_var_errors() {
        let config = LlmConfig {
            provider: "groq".into(),
            api_key: None,
            env_var: Some("HARK_TEST_UNSET_GROQ_KEY".into()),
            ..Default::default()
        };
        let err = LlmService::from_config(&config).unwrap_err();
        assert!(err.to_string().contains("HARK_TEST_UNSET_GROQ_KEY"));
    }

    #[test]
    fn test_from_config_compatible_requires_base_url() {
        let config = LlmConfig {
            provider: "openai-compatible".into(),
            ..Default::default()
        };
        let err = LlmService::from_config(&config).unwrap_err();
        assert!(err.to_string().contains("base_url"));

        let config = LlmConfig {
            provider: "openai-compatible".into(),
            base_url: Some("http://gpu-box:8000".into()),
            ..Default::default()
        };
        assert!(LlmService::from_config(&config).is_ok());
    }

    #[test]
    fn test_resolve_api_key_prefers_config() {
        let key = resolve_api_key("openai", Some("config-key"), None, "OPENAI_API_KEY").unwrap();
        assert_eq!(key, "config-key");
    }

    #[test]
    fn test_resolve_api_key_custom_env_var() {
        std::env::set_var("HARK_TEST_LLM_KEY", "env-llm-key");
        let key = resolve_api_key("openai", Some(""), Some("HARK_TEST_LLM_KEY"), "OPENAI_API_KEY")
            .unwrap();
        assert_eq!(key, "env-llm-key");
        std::env::remove_var("HARK_TEST_LLM_KEY");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transient() {
        let config = LlmConfig {
            provider: "openai-compatible".into(),
            base_url: Some("http://127.0.0.1:9".into()),
            ..Default::default()
        };
        let service = LlmService::from_config(&config).unwrap();
        let err = service
            .complete(&[ChatMessage::user("set a timer")], &[])
            .await
            .unwrap_err();
        assert!(matches!(err, HarkError::Http(_)), "{err}");
        assert!(err.is_transient());
    }

    #[test]
    fn test_finish_reason_wire_names() {
        for name in ["stop", "tool_calls", "length", "content_filter", "function_call"] {
            assert_eq!(FinishReason::from_wire(name).as_str(), name);
        }
        assert_eq!(
            FinishReason::from_wire("paused"),
            FinishReason::Other("paused".into())
        );
    }

    #[test]
    fn test_completion_to_message_keeps_tool_calls() {
        let completion = Completion::tool_calls(vec![ToolCall {
            id: "call_1".into(),
            name: "ListTimers".into(),
            arguments: "{}".into(),
        }]);
        match completion.to_message() {
            ChatMessage::Assistant {
                content,
                tool_calls,
            } => {
                assert!(content.is_none());
                assert_eq!(tool_calls.len(), 1);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
}

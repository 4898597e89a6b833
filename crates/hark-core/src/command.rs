use std::time::Instant;

use tracing::Instrument;
use uuid::Uuid;

use crate::config::AssistantConfig;
use crate::conversation::{ConversationOutcome, Orchestrator};
use crate::error::{CommandError, HarkError};
use crate::llm::{ChatMessage, ChatModel};
use crate::speech::INPUT_AUDIO_FORMATS;
use crate::storage::TimerStore;
use crate::tools::ToolRegistry;

pub const SYSTEM_PROMPT: &str = "\
You are a helpful assistant for managing timers.
You can respond to user requests to set timers and use the provided tool to create timers.
If the user asks you to set a timer, you should call the tool with the appropriate arguments.
Always use the tool to manage timers instead of trying to keep track of them yourself.
Respond with simple plain confirmation message, ready to be TTS'd, no need for markdown or formatting.";

/// Entry point for processing one spoken or typed command.
///
/// Owns the model client, the timer store, the tool table and the
/// assistant settings. Every call builds a fresh conversation, so one
/// service can serve concurrent requests.
pub struct CommandService<M, S> {
    model: M,
    store: S,
    registry: ToolRegistry,
    settings: AssistantConfig,
}

impl<M: ChatModel, S: TimerStore> CommandService<M, S> {
    pub fn new(model: M, store: S, settings: AssistantConfig) -> Self {
        Self {
            model,
            store,
            registry: ToolRegistry::timers(),
            settings,
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn system_prompt(&self) -> &str {
        self.settings
            .system_prompt
            .as_deref()
            .unwrap_or(SYSTEM_PROMPT)
    }

    /// Process a text command and return the model's final reply.
    pub async fn process_command(&self, text: &str) -> Result<String, CommandError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(CommandError::Input(HarkError::InvalidInput(
                "command text is empty".into(),
            )));
        }
        let seed = vec![ChatMessage::system(self.system_prompt()), ChatMessage::user(text)];
        self.run(seed, "text").await.map(|outcome| outcome.reply)
    }

    /// Process a recorded command by handing the audio to the model
    /// directly. `format` is the encoding tag, `wav` or `mp3`.
    pub async fn process_audio_command(
        &self,
        audio: Vec<u8>,
        format: &str,
    ) -> Result<String, CommandError> {
        if audio.is_empty() {
            return Err(CommandError::Input(HarkError::InvalidInput(
                "audio payload is empty".into(),
            )));
        }
        if !INPUT_AUDIO_FORMATS.contains(&format) {
            return Err(CommandError::Input(HarkError::InvalidInput(format!(
                "unsupported audio format '{format}'"
            ))));
        }
        let seed = vec![
            ChatMessage::system(self.system_prompt()),
            ChatMessage::user_audio(audio, format),
        ];
        self.run(seed, "audio").await.map(|outcome| outcome.reply)
    }

    async fn run(
        &self,
        seed: Vec<ChatMessage>,
        input: &'static str,
    ) -> Result<ConversationOutcome, CommandError> {
        let conversation_id = Uuid::now_v7();
        let span = tracing::info_span!(
            target: "hark::llm",
            "command",
            %conversation_id,
            input,
            model = self.model.model_name()
        );

        async {
            let started = Instant::now();
            let result = Orchestrator::new(&self.model, &self.registry, &self.store)
                .max_rounds(self.settings.max_rounds)
                .invalid_arguments(self.settings.invalid_arguments)
                .run(seed)
                .await;
            let latency_ms = started.elapsed().as_millis() as u64;

            match &result {
                Ok(outcome) => tracing::info!(
                    target: "hark::llm",
                    rounds = outcome.rounds,
                    tool_calls = outcome.tool_calls,
                    latency_ms,
                    "command processed"
                ),
                Err(err) => tracing::warn!(
                    target: "hark::llm",
                    error = %err,
                    protocol_violation = err.is_protocol_violation(),
                    latency_ms,
                    "command failed"
                ),
            }
            result
        }
        .instrument(span)
        .await
    }
}

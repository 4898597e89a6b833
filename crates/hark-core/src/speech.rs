use std::future::Future;
use std::time::Instant;

use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use crate::config::TranscriptionConfig;
use crate::error::{HarkError, Result};
use crate::llm::{optional_api_key, resolve_api_key};

/// Speech-to-text collaborator.
pub trait Transcriber: Send + Sync {
    /// Transcribe a recorded clip. `file_name` carries the container
    /// extension the service uses to detect the format.
    fn transcribe(
        &self,
        audio: Vec<u8>,
        file_name: &str,
    ) -> impl Future<Output = Result<String>> + Send;
}

/// Client for Whisper-style `/v1/audio/transcriptions` endpoints
/// (OpenAI, Groq, self-hosted servers).
pub struct WhisperService {
    config: TranscriptionConfig,
    url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for WhisperService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhisperService")
            .field("provider", &self.config.provider)
            .field("model", &self.config.model)
            .field("url", &self.url)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

impl WhisperService {
    pub fn from_config(config: &TranscriptionConfig) -> Result<Self> {
        let (default_base, default_env_var) = match config.provider.as_str() {
            "openai" => (Some("https://api.openai.com"), Some("OPENAI_API_KEY")),
            "groq" => (Some("https://api.groq.com/openai"), Some("GROQ_API_KEY")),
            "openai-compatible" => (None, None),
            other => {
                return Err(HarkError::Config(format!(
                    "unknown transcription provider: '{other}' (expected 'openai', 'groq', or 'openai-compatible')"
                )));
            }
        };

        let base_url = config
            .base_url
            .as_deref()
            .or(default_base)
            .ok_or_else(|| {
                HarkError::Config(format!(
                    "{} transcription provider requires transcription.base_url",
                    config.provider
                ))
            })?;

        let api_key = match default_env_var {
            Some(env_var) => Some(resolve_api_key(
                &config.provider,
                config.api_key.as_deref(),
                config.env_var.as_deref(),
                env_var,
            )?),
            None => optional_api_key(config.api_key.as_deref(), config.env_var.as_deref()),
        };

        Ok(Self {
            config: config.clone(),
            url: format!("{}/v1/audio/transcriptions", base_url.trim_end_matches('/')),
            api_key,
            client: reqwest::Client::new(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Transcriber for WhisperService {
    async fn transcribe(&self, audio: Vec<u8>, file_name: &str) -> Result<String> {
        if audio.is_empty() {
            return Err(HarkError::InvalidInput("audio payload is empty".into()));
        }

        let started = Instant::now();
        let size = audio.len();
        let file = Part::bytes(audio)
            .file_name(file_name.to_string())
            .mime_str(audio_mime_type(file_name))
            .map_err(|e| HarkError::Transcription(format!("invalid audio part: {e}")))?;

        let form = Form::new()
            .part("file", file)
            .text("model", self.config.model.clone())
            .text("language", self.config.language.clone())
            .text("response_format", "json");

        let mut request = self.client.post(&self.url).multipart(form);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let resp = request.send().await.map_err(|e| {
            tracing::warn!(target: "hark::stt", provider = %self.config.provider, "request failed: {e}");
            HarkError::Http(e)
        })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(HarkError::Transcription(format!(
                "{} error {status}: {text}",
                self.config.provider
            )));
        }

        let body: TranscriptionResponse = resp.json().await.map_err(|e| {
            HarkError::Transcription(format!("{} response parse error: {e}", self.config.provider))
        })?;

        let transcript = body.text.trim().to_string();
        tracing::info!(
            target: "hark::stt",
            bytes = size,
            latency_ms = started.elapsed().as_millis() as u64,
            transcript = %transcript,
            "transcription complete"
        );
        Ok(transcript)
    }
}

/// Encodings a chat model accepts as `input_audio`.
pub const INPUT_AUDIO_FORMATS: [&str; 2] = ["wav", "mp3"];

fn extension(file_name: &str) -> Option<String> {
    std::path::Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

/// MIME type for an uploaded clip, from its extension. Unknown extensions
/// are sent as WAV, the format the capture node records.
pub fn audio_mime_type(file_name: &str) -> &'static str {
    match extension(file_name).as_deref() {
        Some("mp3") => "audio/mpeg",
        Some("m4a" | "mp4") => "audio/mp4",
        Some("ogg") => "audio/ogg",
        Some("webm") => "audio/webm",
        Some("flac") => "audio/flac",
        _ => "audio/wav",
    }
}

/// `input_audio` format tag for a clip sent straight to the chat model.
/// A name without extension is taken as `wav`; anything other than WAV or
/// MP3 is rejected.
pub fn audio_format(file_name: &str) -> Result<&'static str> {
    match extension(file_name).as_deref() {
        None | Some("wav") => Ok("wav"),
        Some("mp3") => Ok("mp3"),
        Some(other) => Err(HarkError::InvalidInput(format!(
            "unsupported audio format '{other}' for direct model input (expected {})",
            INPUT_AUDIO_FORMATS.join(" or ")
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_groq_url() {
        let config = TranscriptionConfig {
            provider: "groq".into(),
            api_key: Some("gsk-test".into()),
            ..Default::default()
        };
        let service = WhisperService::from_config(&config).unwrap();
        assert_eq!(
            service.url(),
            "https://api.groq.com/openai/v1/audio/transcriptions"
        );
    }

    #[test]
    fn test_from_config_unknown_provider() {
        let config = TranscriptionConfig {
            provider: "ollama".into(),
            ..Default::default()
        };
        let err = WhisperService::from_config(&config).unwrap_err();
        assert!(err.to_string().contains("unknown transcription provider"));
    }

    #[test]
    fn test_from_config_compatible_without_key() {
        let config = TranscriptionConfig {
            provider: "openai-compatible".into(),
            base_url: Some("http://localhost:8000/".into()),
            ..Default::default()
        };
        let service = WhisperService::from_config(&config).unwrap();
        assert_eq!(service.url(), "http://localhost:8000/v1/audio/transcriptions");
        assert!(service.api_key.is_none());
    }

    #[test]
    fn test_audio_format_from_extension() {
        assert_eq!(audio_format("command.wav").unwrap(), "wav");
        assert_eq!(audio_format("COMMAND.MP3").unwrap(), "mp3");
        assert_eq!(audio_format("noext").unwrap(), "wav");
        assert_eq!(audio_mime_type("clip.webm"), "audio/webm");
        assert_eq!(audio_mime_type("clip.bin"), "audio/wav");
    }

    #[test]
    fn test_audio_format_rejects_what_models_cannot_take() {
        for name in ["clip.m4a", "clip.ogg", "clip.webm", "clip.flac", "clip.mp4"] {
            let err = audio_format(name).unwrap_err();
            assert!(matches!(err, HarkError::InvalidInput(_)), "{name}: {err}");
        }
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transient() {
        let config = TranscriptionConfig {
            provider: "openai-compatible".into(),
            base_url: Some("http://127.0.0.1:9".into()),
            ..Default::default()
        };
        let service = WhisperService::from_config(&config).unwrap();
        let err = service.transcribe(b"RIFF".to_vec(), "command.wav").await.unwrap_err();
        assert!(matches!(err, HarkError::Http(_)), "{err}");
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_empty_audio_is_rejected_before_any_request() {
        let config = TranscriptionConfig {
            provider: "openai-compatible".into(),
            base_url: Some("http://127.0.0.1:9".into()),
            ..Default::default()
        };
        let service = WhisperService::from_config(&config).unwrap();
        let err = service.transcribe(Vec::new(), "empty.wav").await.unwrap_err();
        assert!(matches!(err, HarkError::InvalidInput(_)));
    }
}

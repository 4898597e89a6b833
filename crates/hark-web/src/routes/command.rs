use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Multipart, State};
use axum::routing::post;
use axum::Router;
use hark_core::config::InputMode;
use hark_core::llm::ChatModel;
use hark_core::speech::{audio_format, Transcriber};
use hark_core::storage::TimerStore;

use crate::error::ApiError;
use crate::AppState;

pub fn routes<M, S, T>() -> Router<Arc<AppState<M, S, T>>>
where
    M: ChatModel + 'static,
    S: TimerStore + 'static,
    T: Transcriber + 'static,
{
    Router::new().route("/command", post(process_command::<M, S, T>))
}

struct Upload {
    file_name: String,
    data: Vec<u8>,
}

/// Pull the `file` field out of the form. Other fields are ignored.
async fn read_upload(multipart: &mut Multipart) -> Result<Upload, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("invalid multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("command.wav").to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("failed to read uploaded file: {e}")))?;
        return Ok(Upload {
            file_name,
            data: data.to_vec(),
        });
    }
    Err(ApiError::bad_request("missing 'file' field"))
}

/// POST /command: multipart form with a recorded `file`. Replies with the
/// assistant's final answer as plain text.
async fn process_command<M, S, T>(
    State(state): State<Arc<AppState<M, S, T>>>,
    mut multipart: Multipart,
) -> Result<String, ApiError>
where
    M: ChatModel + 'static,
    S: TimerStore + 'static,
    T: Transcriber + 'static,
{
    let upload = read_upload(&mut multipart).await?;
    tracing::info!(
        target: "hark::http",
        file = %upload.file_name,
        bytes = upload.data.len(),
        "received file"
    );
    if upload.data.is_empty() {
        return Err(ApiError::bad_request("uploaded file is empty"));
    }

    let started = Instant::now();
    let reply = match state.input_mode {
        InputMode::Transcribe => {
            let transcriber = state
                .transcriber
                .as_ref()
                .ok_or_else(|| ApiError::unavailable("speech-to-text is not configured"))?;
            let transcript = transcriber
                .transcribe(upload.data, &upload.file_name)
                .await?;
            tracing::info!(
                target: "hark::stt",
                transcript = %transcript,
                latency_ms = started.elapsed().as_millis() as u64,
                "speech processed"
            );
            if transcript.trim().is_empty() {
                return Err(ApiError::unprocessable("no speech recognized in the recording"));
            }

            let started = Instant::now();
            let reply = state.commands.process_command(&transcript).await?;
            tracing::info!(
                target: "hark::llm",
                latency_ms = started.elapsed().as_millis() as u64,
                "llm processing time"
            );
            reply
        }
        InputMode::Audio => {
            let format = audio_format(&upload.file_name)?;
            let reply = state
                .commands
                .process_audio_command(upload.data, format)
                .await?;
            tracing::info!(
                target: "hark::llm",
                latency_ms = started.elapsed().as_millis() as u64,
                "llm processing time"
            );
            reply
        }
    };

    Ok(reply)
}

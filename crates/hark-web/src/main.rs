mod error;
mod routes;

use std::sync::Arc;

use anyhow::Result;
use hark_core::config::{HarkConfig, InputMode};
use hark_core::llm::LlmService;
use hark_core::speech::WhisperService;
use hark_core::storage::{create_backend, SqliteStorage};
use hark_core::CommandService;

/// Shared request state. Generic over the model, store and transcriber so
/// route tests can run against in-process fakes.
pub struct AppState<M, S, T> {
    pub commands: CommandService<M, S>,
    /// `None` when speech-to-text is not configured; only the `audio`
    /// input mode can work without it.
    pub transcriber: Option<T>,
    pub input_mode: InputMode,
}

pub type ServerState = AppState<LlmService, SqliteStorage, WhisperService>;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("hark=info,tower_http=info"));
    // HARK_LOG_FORMAT=json for log shippers
    if std::env::var("HARK_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt()
            .json()
            .with_current_span(true)
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let cwd = std::env::current_dir().ok();
    let config = HarkConfig::load(cwd.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("failed to load config, using defaults: {e}");
        HarkConfig::default_config()
    });

    let storage = create_backend(&config)?;
    tracing::info!("timer store at {}", storage.path().display());

    let llm = LlmService::from_config(&config.llm)?;

    let transcriber = match config.assistant.input_mode {
        InputMode::Transcribe => Some(WhisperService::from_config(&config.transcription)?),
        InputMode::Audio => WhisperService::from_config(&config.transcription)
            .inspect_err(|e| tracing::warn!("speech-to-text disabled: {e}"))
            .ok(),
    };

    let state: Arc<ServerState> = Arc::new(AppState {
        commands: CommandService::new(llm, storage, config.assistant.clone()),
        transcriber,
        input_mode: config.assistant.input_mode,
    });

    let app = routes::app(state, config.web.max_upload_bytes);

    let addr = format!("{}:{}", config.web.host, config.web.port);
    tracing::info!("hark-web listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

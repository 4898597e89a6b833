pub mod command;

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use hark_core::config::InputMode;
use hark_core::llm::ChatModel;
use hark_core::speech::Transcriber;
use hark_core::storage::TimerStore;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::AppState;

pub fn router<M, S, T>() -> Router<Arc<AppState<M, S, T>>>
where
    M: ChatModel + 'static,
    S: TimerStore + 'static,
    T: Transcriber + 'static,
{
    Router::new()
        .route("/health", get(health::<M, S, T>))
        .merge(command::routes::<M, S, T>())
        .fallback(not_found)
}

/// The full service: routes, state, upload limits and request tracing.
pub fn app<M, S, T>(state: Arc<AppState<M, S, T>>, max_upload_bytes: usize) -> Router
where
    M: ChatModel + 'static,
    S: TimerStore + 'static,
    T: Transcriber + 'static,
{
    router::<M, S, T>()
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn health<M, S, T>(
    State(state): State<Arc<AppState<M, S, T>>>,
) -> (StatusCode, Json<serde_json::Value>)
where
    M: ChatModel + 'static,
    S: TimerStore + 'static,
    T: Transcriber + 'static,
{
    let timers = state.commands.store().count().await;
    let db_ok = timers.is_ok();

    let status = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(serde_json::json!({
            "status": if db_ok { "ok" } else { "degraded" },
            "store": if db_ok { "connected" } else { "unavailable" },
            "timers": timers.ok(),
            "model": state.commands.model().model_name(),
            "input_mode": match state.input_mode {
                InputMode::Transcribe => "transcribe",
                InputMode::Audio => "audio",
            },
            "speech_to_text": state.transcriber.is_some(),
        })),
    )
}

async fn not_found() -> ApiError {
    ApiError::not_found("no such route")
}

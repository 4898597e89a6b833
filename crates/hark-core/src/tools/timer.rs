use schemars::JsonSchema;
use serde::Deserialize;

use crate::error::{HarkError, ToolError};
use crate::model::{normalize_label, validate_duration, ActiveTimer};
use crate::storage::TimerStore;

// -- Tool parameter types --

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AddTimerParams {
    #[schemars(description = "Timer length in whole seconds, greater than zero")]
    pub seconds: i64,

    #[schemars(description = "Short name for the timer, e.g. 'pasta' (optional)")]
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct ListTimersParams {}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CancelTimerParams {
    #[schemars(description = "ID of the timer to cancel, as shown by ListTimers")]
    #[serde(rename = "timerId")]
    pub timer_id: i64,
}

fn invalid(tool: &str, argument: &str, err: HarkError) -> ToolError {
    let reason = match err {
        HarkError::InvalidInput(msg) => msg,
        other => other.to_string(),
    };
    ToolError::InvalidArgument {
        tool: tool.to_string(),
        argument: argument.to_string(),
        reason,
    }
}

pub(super) async fn add_timer<S: TimerStore>(
    params: AddTimerParams,
    store: &S,
) -> Result<String, ToolError> {
    let seconds = validate_duration(params.seconds).map_err(|e| invalid("AddTimer", "seconds", e))?;
    let label = normalize_label(params.label.as_deref()).map_err(|e| invalid("AddTimer", "label", e))?;

    let timer = store.create(seconds, label).await?;

    let unit = if timer.duration_seconds == 1 { "second" } else { "seconds" };
    Ok(match &timer.label {
        Some(label) => format!(
            "Timer '{label}' set for {} {unit} (ID {}).",
            timer.duration_seconds, timer.id
        ),
        None => format!(
            "Timer set for {} {unit} (ID {}).",
            timer.duration_seconds, timer.id
        ),
    })
}

pub(super) async fn list_timers<S: TimerStore>(store: &S) -> Result<String, ToolError> {
    let active = store.list_active().await?;
    Ok(format_active_timers(&active))
}

pub(super) async fn cancel_timer<S: TimerStore>(
    params: CancelTimerParams,
    store: &S,
) -> Result<String, ToolError> {
    let id = params.timer_id;
    if store.delete(id).await? {
        Ok(format!("Timer with ID {id} cancelled."))
    } else {
        Ok(format!("No timer found with ID {id}."))
    }
}

/// Plain-text listing fed back to the model.
pub fn format_active_timers(timers: &[ActiveTimer]) -> String {
    if timers.is_empty() {
        return "No active timers.".to_string();
    }
    let mut out = String::from("Active timers:");
    for timer in timers {
        out.push_str(&format!("\n- ID {}: {} remaining", timer.id, timer.remaining_display()));
        if let Some(label) = &timer.label {
            out.push_str(&format!(" ({label})"));
        }
    }
    out
}

//! Fixed table of timer tools offered to the chat model, and dispatch of
//! model-issued calls against a [`TimerStore`].

mod timer;

pub use timer::{format_active_timers, AddTimerParams, CancelTimerParams, ListTimersParams};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ToolError;
use crate::storage::TimerStore;

/// A tool as presented to the model: name, description, and JSON schema of
/// its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDefinition {
    /// Names listed under the schema's `required` key.
    pub fn required_arguments(&self) -> impl Iterator<Item = &str> {
        self.parameters
            .get("required")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerTool {
    AddTimer,
    ListTimers,
    CancelTimer,
}

impl TimerTool {
    pub const ALL: [TimerTool; 3] = [Self::AddTimer, Self::ListTimers, Self::CancelTimer];

    pub fn name(self) -> &'static str {
        match self {
            Self::AddTimer => "AddTimer",
            Self::ListTimers => "ListTimers",
            Self::CancelTimer => "CancelTimer",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::AddTimer => "Sets a timer for the given number of seconds, with an optional label.",
            Self::ListTimers => "Lists all timers that are still running, with their IDs and remaining time.",
            Self::CancelTimer => "Cancels the timer with the given ID.",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    pub fn definition(self) -> ToolDefinition {
        let parameters = match self {
            Self::AddTimer => parameter_schema::<AddTimerParams>(),
            Self::ListTimers => parameter_schema::<ListTimersParams>(),
            Self::CancelTimer => parameter_schema::<CancelTimerParams>(),
        };
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters,
        }
    }

    async fn execute<S: TimerStore>(
        self,
        args: Map<String, Value>,
        store: &S,
    ) -> Result<String, ToolError> {
        match self {
            Self::AddTimer => timer::add_timer(parse_params(self, args)?, store).await,
            Self::ListTimers => {
                let _: ListTimersParams = parse_params(self, args)?;
                timer::list_timers(store).await
            }
            Self::CancelTimer => timer::cancel_timer(parse_params(self, args)?, store).await,
        }
    }
}

/// JSON schema for a parameter type, stripped of the metadata keys the
/// chat-completions `parameters` field does not want.
fn parameter_schema<T: JsonSchema>() -> Value {
    let mut value = schemars::schema_for!(T).to_value();
    if let Some(obj) = value.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
        obj.entry("properties")
            .or_insert_with(|| Value::Object(Map::new()));
    }
    value
}

fn parse_params<T: for<'de> Deserialize<'de>>(
    tool: TimerTool,
    args: Map<String, Value>,
) -> Result<T, ToolError> {
    serde_json::from_value(Value::Object(args)).map_err(|e| ToolError::MalformedArguments {
        tool: tool.name().to_string(),
        reason: e.to_string(),
    })
}

/// The registered tools. Built once, never mutated.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: Vec<TimerTool>,
    definitions: Vec<ToolDefinition>,
}

impl ToolRegistry {
    pub fn timers() -> Self {
        let tools = TimerTool::ALL.to_vec();
        let definitions = tools.iter().map(|t| t.definition()).collect();
        Self { tools, definitions }
    }

    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    fn resolve(&self, name: &str) -> Result<(TimerTool, &ToolDefinition), ToolError> {
        TimerTool::from_name(name)
            .and_then(|tool| {
                let index = self.tools.iter().position(|t| *t == tool)?;
                Some((tool, &self.definitions[index]))
            })
            .ok_or_else(|| ToolError::UnknownTool {
                name: name.to_string(),
            })
    }

    /// Run one model-issued tool call. The returned text is placed verbatim
    /// into the conversation as that call's result.
    ///
    /// Lookup, argument parsing and required-argument checks all happen
    /// before the store is touched.
    pub async fn dispatch<S: TimerStore>(
        &self,
        name: &str,
        raw_arguments: &str,
        store: &S,
    ) -> Result<String, ToolError> {
        let (tool, definition) = self.resolve(name)?;
        let args = parse_arguments(tool, raw_arguments)?;

        for required in definition.required_arguments() {
            if args.get(required).map_or(true, Value::is_null) {
                return Err(ToolError::MissingArgument {
                    tool: tool.name().to_string(),
                    argument: required.to_string(),
                });
            }
        }

        tracing::info!(target: "hark::tool", tool = name, arguments = raw_arguments, "executing tool");
        let result = tool.execute(args, store).await?;
        tracing::info!(target: "hark::tool", tool = name, result = %result, "tool result");
        Ok(result)
    }
}

/// Argument payloads must be JSON objects. A blank payload counts as `{}`,
/// which is what some providers send for argument-less tools.
fn parse_arguments(tool: TimerTool, raw: &str) -> Result<Map<String, Value>, ToolError> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    let malformed = |reason: String| ToolError::MalformedArguments {
        tool: tool.name().to_string(),
        reason,
    };
    match serde_json::from_str::<Value>(raw).map_err(|e| malformed(e.to_string()))? {
        Value::Object(map) => Ok(map),
        other => Err(malformed(format!("expected an object, got {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStorage;

    fn registry() -> ToolRegistry {
        ToolRegistry::timers()
    }

    #[test]
    fn registry_exposes_three_tools_in_order() {
        let registry = registry();
        let names: Vec<&str> = registry
            .definitions()
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(names, vec!["AddTimer", "ListTimers", "CancelTimer"]);
    }

    #[test]
    fn schemas_list_required_arguments() {
        let registry = registry();
        let defs = registry.definitions();

        let add: Vec<&str> = defs[0].required_arguments().collect();
        assert_eq!(add, vec!["seconds"]);
        assert!(defs[0].parameters["properties"]["label"].is_object());

        assert_eq!(defs[1].required_arguments().count(), 0);
        assert_eq!(defs[1].parameters["type"], "object");
        assert!(defs[1].parameters["properties"].is_object());

        let cancel: Vec<&str> = defs[2].required_arguments().collect();
        assert_eq!(cancel, vec!["timerId"]);
    }

    #[test]
    fn schemas_drop_metadata_keys() {
        for def in registry().definitions() {
            assert!(def.parameters.get("$schema").is_none(), "{}", def.name);
            assert!(def.parameters.get("title").is_none(), "{}", def.name);
        }
    }

    #[test]
    fn from_name_is_exact() {
        assert_eq!(TimerTool::from_name("AddTimer"), Some(TimerTool::AddTimer));
        assert_eq!(TimerTool::from_name("addtimer"), None);
    }

    #[tokio::test]
    async fn unknown_tool_is_rejected() {
        let store = SqliteStorage::open_in_memory().unwrap();
        let err = registry()
            .dispatch("LaunchRocket", "{}", &store)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool { ref name } if name == "LaunchRocket"));
    }

    #[tokio::test]
    async fn missing_seconds_does_not_touch_the_store() {
        let store = SqliteStorage::open_in_memory().unwrap();
        let err = registry()
            .dispatch("AddTimer", r#"{"label":"tea"}"#, &store)
            .await
            .unwrap_err();
        assert!(
            matches!(err, ToolError::MissingArgument { ref argument, .. } if argument == "seconds")
        );
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn null_required_argument_counts_as_missing() {
        let store = SqliteStorage::open_in_memory().unwrap();
        let err = registry()
            .dispatch("CancelTimer", r#"{"timerId":null}"#, &store)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::MissingArgument { .. }));
    }

    #[tokio::test]
    async fn malformed_payloads_are_rejected() {
        let store = SqliteStorage::open_in_memory().unwrap();
        let registry = registry();

        for raw in ["{not json", "[30]", "30"] {
            let err = registry.dispatch("AddTimer", raw, &store).await.unwrap_err();
            assert!(
                matches!(err, ToolError::MalformedArguments { .. }),
                "{raw}: {err}"
            );
        }

        let err = registry
            .dispatch("AddTimer", r#"{"seconds":"thirty"}"#, &store)
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn blank_payload_is_an_empty_object() {
        let store = SqliteStorage::open_in_memory().unwrap();
        let text = registry().dispatch("ListTimers", "", &store).await.unwrap();
        assert_eq!(text, "No active timers.");
    }

    #[tokio::test]
    async fn non_positive_seconds_are_invalid() {
        let store = SqliteStorage::open_in_memory().unwrap();
        let registry = registry();
        for raw in [r#"{"seconds":0}"#, r#"{"seconds":-5}"#, r#"{"seconds":99999999999}"#] {
            let err = registry.dispatch("AddTimer", raw, &store).await.unwrap_err();
            assert!(
                matches!(err, ToolError::InvalidArgument { ref argument, .. } if argument == "seconds"),
                "{raw}: {err}"
            );
        }
        assert_eq!(store.count().await.unwrap(), 0);
    }
}

//! OpenAI chat-completions request and response shapes.

use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{ChatMessage, Completion, FinishReason, ToolCall, UserContent};
use crate::error::{HarkError, Result};
use crate::tools::ToolDefinition;

pub(super) fn request_body(
    model: &str,
    max_tokens: usize,
    temperature: Option<f32>,
    messages: &[ChatMessage],
    tools: &[ToolDefinition],
) -> Value {
    let mut body = json!({
        "model": model,
        "messages": messages.iter().map(message_to_wire).collect::<Vec<_>>(),
        "max_tokens": max_tokens,
    });

    if !tools.is_empty() {
        body["tools"] = tools.iter().map(tool_to_wire).collect();
    }
    if let Some(t) = temperature {
        body["temperature"] = json!(t);
    }
    body
}

fn message_to_wire(message: &ChatMessage) -> Value {
    match message {
        ChatMessage::System { content } => json!({"role": "system", "content": content}),
        ChatMessage::User {
            content: UserContent::Text(text),
        } => json!({"role": "user", "content": text}),
        ChatMessage::User {
            content: UserContent::Audio { data, format },
        } => json!({
            "role": "user",
            "content": [{
                "type": "input_audio",
                "input_audio": {
                    "data": base64::engine::general_purpose::STANDARD.encode(data),
                    "format": format,
                },
            }],
        }),
        ChatMessage::Assistant {
            content,
            tool_calls,
        } => {
            let mut msg = json!({"role": "assistant", "content": content});
            if !tool_calls.is_empty() {
                msg["tool_calls"] = tool_calls
                    .iter()
                    .map(|call| {
                        json!({
                            "id": call.id,
                            "type": "function",
                            "function": {"name": call.name, "arguments": call.arguments},
                        })
                    })
                    .collect();
            }
            msg
        }
        ChatMessage::Tool {
            tool_call_id,
            content,
        } => json!({"role": "tool", "tool_call_id": tool_call_id, "content": content}),
    }
}

fn tool_to_wire(tool: &ToolDefinition) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        },
    })
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    finish_reason: Option<String>,
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

pub(super) fn parse_completion(json: Value) -> Result<Completion> {
    let response: ChatResponse = serde_json::from_value(json)?;
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| HarkError::Llm("chat completion response has no choices".into()))?;

    let finish_reason = choice
        .finish_reason
        .as_deref()
        .map(FinishReason::from_wire)
        .unwrap_or_else(|| FinishReason::Other("null".into()));

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| ToolCall {
            id: call.id,
            name: call.function.name,
            arguments: call.function.arguments,
        })
        .collect();

    Ok(Completion {
        finish_reason,
        content: choice.message.content,
        tool_calls,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolRegistry;

    #[test]
    fn test_parse_tool_call_response() {
        let json = json!({
            "id": "chatcmpl-1",
            "choices": [{
                "index": 0,
                "finish_reason": "tool_calls",
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_abc",
                        "type": "function",
                        "function": {"name": "AddTimer", "arguments": "{\"seconds\":30}"}
                    }]
                }
            }]
        });
        let completion = parse_completion(json).unwrap();
        assert_eq!(completion.finish_reason, FinishReason::ToolCalls);
        assert!(completion.content.is_none());
        assert_eq!(
            completion.tool_calls,
            vec![ToolCall {
                id: "call_abc".into(),
                name: "AddTimer".into(),
                arguments: "{\"seconds\":30}".into(),
            }]
        );
    }

    #[test]
    fn test_parse_stop_response() {
        let json = json!({
            "choices": [{
                "finish_reason": "stop",
                "message": {"role": "assistant", "content": "Timer set for thirty seconds."}
            }]
        });
        let completion = parse_completion(json).unwrap();
        assert_eq!(completion.finish_reason, FinishReason::Stop);
        assert_eq!(
            completion.content.as_deref(),
            Some("Timer set for thirty seconds.")
        );
        assert!(completion.tool_calls.is_empty());
    }

    #[test]
    fn test_parse_missing_finish_reason_is_unrecognized() {
        let json = json!({"choices": [{"message": {"content": "hi"}}]});
        let completion = parse_completion(json).unwrap();
        assert_eq!(completion.finish_reason, FinishReason::Other("null".into()));
    }

    #[test]
    fn test_parse_empty_choices_errors() {
        let err = parse_completion(json!({"choices": []})).unwrap_err();
        assert!(err.to_string().contains("no choices"));
    }

    #[test]
    fn test_request_body_shapes() {
        let registry = ToolRegistry::timers();
        let messages = vec![
            ChatMessage::system("be brief"),
            ChatMessage::user("set a timer"),
            ChatMessage::Assistant {
                content: None,
                tool_calls: vec![ToolCall {
                    id: "call_1".into(),
                    name: "AddTimer".into(),
                    arguments: "{\"seconds\":5}".into(),
                }],
            },
            ChatMessage::tool_result("call_1", "Timer set for 5 seconds (ID 1)."),
        ];

        let body = request_body("gpt-4o-mini", 256, Some(0.2), &messages, registry.definitions());

        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["max_tokens"], 256);
        assert!(body["temperature"].is_number());
        assert_eq!(body["tools"].as_array().unwrap().len(), 3);
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "AddTimer");

        let wire = body["messages"].as_array().unwrap();
        assert_eq!(wire[0]["role"], "system");
        assert_eq!(wire[1]["content"], "set a timer");
        assert!(wire[2]["content"].is_null());
        assert_eq!(wire[2]["tool_calls"][0]["function"]["arguments"], "{\"seconds\":5}");
        assert_eq!(wire[3]["role"], "tool");
        assert_eq!(wire[3]["tool_call_id"], "call_1");
    }

    #[test]
    fn test_request_body_omits_optional_fields() {
        let body = request_body("m", 64, None, &[ChatMessage::user("hi")], &[]);
        assert!(body.get("tools").is_none());
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn test_audio_part_is_base64() {
        let wire = message_to_wire(&ChatMessage::user_audio(b"RIFF".to_vec(), "wav"));
        let part = &wire["content"][0];
        assert_eq!(part["type"], "input_audio");
        assert_eq!(part["input_audio"]["data"], "UklGRg==");
        assert_eq!(part["input_audio"]["format"], "wav");
    }
}

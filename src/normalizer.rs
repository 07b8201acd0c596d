//! Request normalization
//!
//! Converts loosely-typed chat payloads (a bare string, a single message
//! object, or an array of messages in several shapes) into a canonical
//! [`NormalizedRequest`]. Normalization is total: shapes that are not
//! recognized degrade to [`Role::Unknown`] / [`NormalizedMessagePart::Unknown`]
//! instead of failing.

use serde::Serialize;
use serde_json::{Map, Value};

/// Message author role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    Developer,
    User,
    Assistant,
    Tool,
    Unknown,
}

impl Role {
    fn parse(value: Option<&Value>) -> Self {
        match value.and_then(Value::as_str) {
            Some("system") => Self::System,
            Some("developer") => Self::Developer,
            Some("user") => Self::User,
            Some("assistant") => Self::Assistant,
            Some("tool") => Self::Tool,
            _ => Self::Unknown,
        }
    }
}

/// One piece of message content
///
/// Each variant carries exactly the payload shape of its tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NormalizedMessagePart {
    Text {
        text: String,
    },
    Image {
        image_url: String,
    },
    ToolCall {
        tool_name: Option<String>,
        tool_call_id: Option<String>,
        payload: Value,
    },
    ToolResult {
        tool_call_id: Option<String>,
        payload: Value,
    },
    Json {
        payload: Value,
    },
    Unknown {
        payload: Value,
    },
}

impl NormalizedMessagePart {
    fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    fn unknown(payload: Value) -> Self {
        Self::Unknown { payload }
    }
}

/// A message with a resolved role and parsed parts
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedMessage {
    pub role: Role,
    pub parts: Vec<NormalizedMessagePart>,
}

/// Canonical request representation consumed by dimension inference
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedRequest {
    pub messages: Vec<NormalizedMessage>,
    pub plain_text: String,
    pub has_image: bool,
    pub has_tool_call: bool,
    pub has_tool_result: bool,
}

/// Normalize an arbitrary request payload
///
/// An array is treated as a list of messages; any other value is a single
/// message. The result always holds at least one message.
pub fn normalize_request(input: &Value) -> NormalizedRequest {
    let messages: Vec<NormalizedMessage> = match input {
        Value::Array(items) if !items.is_empty() => items.iter().map(normalize_message).collect(),
        Value::Array(_) => vec![NormalizedMessage {
            role: Role::Unknown,
            parts: vec![NormalizedMessagePart::unknown(input.clone())],
        }],
        other => vec![normalize_message(other)],
    };

    let plain_text = collect_plain_text(&messages);

    let mut has_image = false;
    let mut has_tool_call = false;
    let mut has_tool_result = false;
    for part in messages.iter().flat_map(|m| &m.parts) {
        match part {
            NormalizedMessagePart::Image { .. } => has_image = true,
            NormalizedMessagePart::ToolCall { .. } => has_tool_call = true,
            NormalizedMessagePart::ToolResult { .. } => has_tool_result = true,
            _ => {}
        }
    }

    NormalizedRequest {
        messages,
        plain_text,
        has_image,
        has_tool_call,
        has_tool_result,
    }
}

/// Turn raw command-line text into a request payload
///
/// Text starting with `{` or `[` is parsed as JSON when possible; everything
/// else (including JSON that fails to parse) becomes one user message.
pub fn parse_command_input(args: &str) -> Value {
    let raw = args.trim();
    if raw.starts_with('{') || raw.starts_with('[') {
        match serde_json::from_str(raw) {
            Ok(value) => return value,
            Err(e) => {
                tracing::debug!(error = %e, "Input looked like JSON but failed to parse, using as plain text");
            }
        }
    }
    serde_json::json!([{ "role": "user", "content": raw }])
}

fn normalize_message(message: &Value) -> NormalizedMessage {
    let record = match message {
        Value::String(text) => {
            return NormalizedMessage {
                role: Role::User,
                parts: vec![NormalizedMessagePart::text(text.as_str())],
            };
        }
        Value::Object(record) => record,
        other => {
            return NormalizedMessage {
                role: Role::Unknown,
                parts: vec![NormalizedMessagePart::unknown(other.clone())],
            };
        }
    };

    let role = Role::parse(record.get("role"));

    let mut parts = match record.get("content") {
        Some(Value::String(text)) => vec![NormalizedMessagePart::text(text.as_str())],
        Some(Value::Array(items)) => items.iter().map(parse_part).collect(),
        Some(content @ Value::Object(_)) => vec![parse_part(content)],
        _ => Vec::new(),
    };

    let tool_calls = record.get("tool_calls").and_then(Value::as_array);
    if tool_calls.is_some() || role == Role::Tool {
        let tool_parts: Vec<NormalizedMessagePart> = tool_calls
            .map(|calls| calls.iter().map(parse_tool_call_entry).collect())
            .unwrap_or_default();

        if tool_parts.is_empty() {
            parts.push(synthetic_tool_part(role, record));
        } else {
            parts.extend(tool_parts);
        }
    }

    if parts.is_empty() {
        parts.push(NormalizedMessagePart::unknown(message.clone()));
    }

    NormalizedMessage { role, parts }
}

fn synthetic_tool_part(role: Role, record: &Map<String, Value>) -> NormalizedMessagePart {
    let payload = Value::Object(record.clone());
    if role == Role::Tool {
        NormalizedMessagePart::ToolResult {
            tool_call_id: first_string(record, &["tool_call_id"]),
            payload,
        }
    } else {
        NormalizedMessagePart::ToolCall {
            tool_name: None,
            tool_call_id: None,
            payload,
        }
    }
}

/// Entries of a `tool_calls` array are tool calls even when they use the
/// `{"type": "function", "function": {...}}` envelope.
fn parse_tool_call_entry(entry: &Value) -> NormalizedMessagePart {
    match (parse_part(entry), entry) {
        (NormalizedMessagePart::Unknown { .. }, Value::Object(record)) => {
            NormalizedMessagePart::ToolCall {
                tool_name: tool_name(record),
                tool_call_id: first_string(record, &["id", "tool_call_id"]),
                payload: entry.clone(),
            }
        }
        (part, _) => part,
    }
}

fn parse_part(part: &Value) -> NormalizedMessagePart {
    let record = match part {
        Value::String(text) => return NormalizedMessagePart::text(text.as_str()),
        Value::Object(record) => record,
        other => return NormalizedMessagePart::unknown(other.clone()),
    };

    let kind = record
        .get("type")
        .map(safe_string)
        .unwrap_or_default()
        .to_lowercase();

    match kind.as_str() {
        "text" => NormalizedMessagePart::text(record.get("text").map(safe_string).unwrap_or_default()),
        "image" | "image_url" => NormalizedMessagePart::Image {
            image_url: image_url(record).unwrap_or_default(),
        },
        "tool_call" => NormalizedMessagePart::ToolCall {
            tool_name: tool_name(record),
            tool_call_id: first_string(record, &["id", "tool_call_id"]),
            payload: part.clone(),
        },
        "tool_result" => NormalizedMessagePart::ToolResult {
            tool_call_id: first_string(record, &["tool_call_id", "id"]),
            payload: part.clone(),
        },
        "json" => NormalizedMessagePart::Json {
            payload: part.clone(),
        },
        _ => {
            if record.get("tool_calls").is_some_and(is_truthy) {
                return NormalizedMessagePart::ToolCall {
                    tool_name: Some("unknown".to_string()),
                    tool_call_id: None,
                    payload: part.clone(),
                };
            }
            match record.get("content") {
                Some(content) if is_truthy(content) && !content.is_string() => {
                    NormalizedMessagePart::Json {
                        payload: content.clone(),
                    }
                }
                _ => NormalizedMessagePart::unknown(part.clone()),
            }
        }
    }
}

fn image_url(record: &Map<String, Value>) -> Option<String> {
    first_string(record, &["imageUrl", "url"]).or_else(|| match record.get("image_url") {
        Some(Value::Object(inner)) => first_string(inner, &["url"]),
        Some(other) => Some(safe_string(other)).filter(|s| !s.is_empty()),
        None => None,
    })
}

fn tool_name(record: &Map<String, Value>) -> Option<String> {
    first_string(record, &["name"]).or_else(|| match record.get("function") {
        Some(Value::Object(function)) => first_string(function, &["name"]),
        _ => None,
    })
}

/// First non-empty scalar among `keys`, rendered as a string
fn first_string(record: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| record.get(*key))
        .map(safe_string)
        .find(|s| !s.is_empty())
}

fn safe_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn collect_plain_text(messages: &[NormalizedMessage]) -> String {
    let mut chunks: Vec<String> = Vec::new();
    for part in messages.iter().flat_map(|m| &m.parts) {
        match part {
            NormalizedMessagePart::Text { text } if !text.is_empty() => chunks.push(text.clone()),
            NormalizedMessagePart::ToolCall {
                tool_name: Some(name),
                ..
            } => chunks.push(format!("tool:{name}")),
            _ => {}
        }
    }
    chunks.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_string_becomes_user_text() {
        let req = normalize_request(&json!("hello there"));
        assert_eq!(req.messages.len(), 1);
        assert_eq!(req.messages[0].role, Role::User);
        assert_eq!(
            req.messages[0].parts,
            vec![NormalizedMessagePart::text("hello there")]
        );
        assert_eq!(req.plain_text, "hello there");
    }

    #[test]
    fn test_message_array_with_string_content() {
        let req = normalize_request(&json!([
            {"role": "system", "content": "be terse"},
            {"role": "user", "content": "explain traits"}
        ]));
        assert_eq!(req.messages.len(), 2);
        assert_eq!(req.messages[0].role, Role::System);
        assert_eq!(req.plain_text, "be terse\nexplain traits");
    }

    #[test]
    fn test_content_array_parses_each_part() {
        let req = normalize_request(&json!({
            "role": "user",
            "content": [
                {"type": "text", "text": "what is this"},
                {"type": "image_url", "image_url": {"url": "https://x/y.png"}}
            ]
        }));
        assert!(req.has_image);
        assert_eq!(
            req.messages[0].parts[1],
            NormalizedMessagePart::Image {
                image_url: "https://x/y.png".to_string()
            }
        );
        assert_eq!(req.plain_text, "what is this");
    }

    #[test]
    fn test_type_field_is_case_insensitive() {
        let req = normalize_request(&json!({
            "role": "user",
            "content": [{"type": "IMAGE", "url": "a.png"}]
        }));
        assert!(req.has_image);
    }

    #[test]
    fn test_single_object_content_is_one_part() {
        let req = normalize_request(&json!({
            "role": "assistant",
            "content": {"type": "json", "data": 1}
        }));
        assert!(matches!(
            req.messages[0].parts[0],
            NormalizedMessagePart::Json { .. }
        ));
    }

    #[test]
    fn test_tool_calls_array_adds_tool_call_parts() {
        let req = normalize_request(&json!([{
            "role": "assistant",
            "content": "",
            "tool_calls": [
                {"id": "c1", "type": "function", "function": {"name": "search", "arguments": "{}"}}
            ]
        }]));
        assert!(req.has_tool_call);
        assert_eq!(req.plain_text, "tool:search");
        match &req.messages[0].parts[1] {
            NormalizedMessagePart::ToolCall {
                tool_name,
                tool_call_id,
                ..
            } => {
                assert_eq!(tool_name.as_deref(), Some("search"));
                assert_eq!(tool_call_id.as_deref(), Some("c1"));
            }
            other => panic!("expected tool call, got {other:?}"),
        }
    }

    #[test]
    fn test_tool_role_without_tool_calls_gets_synthetic_result() {
        let req = normalize_request(&json!({
            "role": "tool",
            "tool_call_id": "c1",
            "content": "42"
        }));
        assert!(req.has_tool_result);
        assert!(!req.has_tool_call);
        assert_eq!(req.messages[0].parts.len(), 2);
        assert_eq!(req.plain_text, "42");
    }

    #[test]
    fn test_empty_tool_calls_array_gets_synthetic_call() {
        let req = normalize_request(&json!({"role": "assistant", "tool_calls": []}));
        assert!(req.has_tool_call);
        assert!(matches!(
            req.messages[0].parts[0],
            NormalizedMessagePart::ToolCall {
                tool_name: None,
                ..
            }
        ));
        // Unnamed synthetic tool calls contribute no text
        assert_eq!(req.plain_text, "");
    }

    #[test]
    fn test_structural_tool_calls_cue_yields_unknown_tool_name() {
        let req = normalize_request(&json!({
            "role": "assistant",
            "content": [{"tool_calls": [{"x": 1}]}]
        }));
        assert_eq!(req.plain_text, "tool:unknown");
    }

    #[test]
    fn test_non_string_content_cue_yields_json_part() {
        let req = normalize_request(&json!({
            "role": "user",
            "content": [{"content": {"k": "v"}}]
        }));
        assert_eq!(
            req.messages[0].parts[0],
            NormalizedMessagePart::Json {
                payload: json!({"k": "v"})
            }
        );
    }

    #[test]
    fn test_unrecognized_shapes_degrade_to_unknown() {
        let req = normalize_request(&json!([42, null, {"role": "robot"}]));
        assert_eq!(req.messages.len(), 3);
        for message in &req.messages {
            assert_eq!(message.role, Role::Unknown);
            assert!(matches!(
                message.parts[0],
                NormalizedMessagePart::Unknown { .. }
            ));
        }
        assert_eq!(req.plain_text, "");
    }

    #[test]
    fn test_empty_array_still_yields_a_message() {
        let req = normalize_request(&json!([]));
        assert_eq!(req.messages.len(), 1);
        assert_eq!(req.messages[0].role, Role::Unknown);
    }

    #[test]
    fn test_numeric_text_is_stringified() {
        let req = normalize_request(&json!({
            "role": "user",
            "content": [{"type": "text", "text": 7}]
        }));
        assert_eq!(req.plain_text, "7");
    }

    #[test]
    fn test_plain_text_is_trimmed() {
        let req = normalize_request(&json!("  padded prompt \n"));
        assert_eq!(req.plain_text, "padded prompt");
    }

    #[test]
    fn test_parse_command_input_plain_text() {
        assert_eq!(
            parse_command_input("  summarize this  "),
            json!([{"role": "user", "content": "summarize this"}])
        );
    }

    #[test]
    fn test_parse_command_input_empty() {
        assert_eq!(
            parse_command_input(""),
            json!([{"role": "user", "content": ""}])
        );
    }

    #[test]
    fn test_parse_command_input_json_envelope() {
        let value = parse_command_input(r#"[{"role":"user","content":"hi"}]"#);
        assert_eq!(value, json!([{"role": "user", "content": "hi"}]));
    }

    #[test]
    fn test_parse_command_input_broken_json_falls_back() {
        let value = parse_command_input("{not json");
        assert_eq!(value, json!([{"role": "user", "content": "{not json"}]));
    }
}

//! Plain-text transcript rendering for the terminal.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::domain::{Message, Role, ToolCall};
use crate::thread::{ThreadPreferences, DO_NOT_RENDER_ID_PREFIX};

/// Collapsed tool results show at most this many characters
const RESULT_MAX_CHARS: usize = 500;
/// or this many lines
const RESULT_MAX_LINES: usize = 4;
/// Collapsed JSON array results show this many items
const RESULT_MAX_ITEMS: usize = 5;

fn is_complex(value: &Value) -> bool {
    value.is_array() || value.is_object()
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        v if is_complex(v) => serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string()),
        v => v.to_string(),
    }
}

fn indent(text: &str, prefix: &str) -> String {
    text.lines()
        .map(|line| format!("{}{}", prefix, line))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_tool_calls(tool_calls: &[ToolCall]) -> String {
    tool_calls
        .iter()
        .map(|call| {
            let mut out = match &call.id {
                Some(id) => format!("[tool call] {} ({})", call.name, id),
                None => format!("[tool call] {}", call.name),
            };
            if call.args.is_empty() {
                out.push_str("\n  {}");
            }
            for (key, value) in &call.args {
                let text = value_text(value);
                if text.contains('\n') {
                    out.push_str(&format!("\n  {}:\n{}", key, indent(&text, "    ")));
                } else {
                    out.push_str(&format!("\n  {}: {}", key, text));
                }
            }
            out
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Collapsed body of a tool result message.
///
/// JSON results are listed as key/value rows (array results by index);
/// anything else is shown as text cut at 500 characters or 4 lines.
pub fn format_tool_result(message: &Message) -> String {
    let content = message.content_string();

    match serde_json::from_str::<Value>(&content) {
        Ok(Value::Array(items)) => {
            let shown = items.len().min(RESULT_MAX_ITEMS);
            let mut rows: Vec<String> = items[..shown]
                .iter()
                .enumerate()
                .map(|(i, v)| format!("{}: {}", i, value_text(v)))
                .collect();
            if shown < items.len() {
                rows.push(format!("... ({} more)", items.len() - shown));
            }
            rows.join("\n")
        }
        Ok(Value::Object(map)) => map
            .iter()
            .map(|(k, v)| format!("{}: {}", k, value_text(v)))
            .collect::<Vec<_>>()
            .join("\n"),
        Ok(other) => truncate_text(&value_text(&other)),
        Err(_) => truncate_text(&content),
    }
}

fn truncate_text(text: &str) -> String {
    if text.chars().count() > RESULT_MAX_CHARS {
        let head: String = text.chars().take(RESULT_MAX_CHARS).collect();
        return format!("{}...", head);
    }
    let lines: Vec<&str> = text.split('\n').collect();
    if lines.len() > RESULT_MAX_LINES {
        return format!("{}\n...", lines[..RESULT_MAX_LINES].join("\n"));
    }
    text.to_string()
}

/// Fetched page content attached as a structured human message
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UrlContent {
    pub url: String,
    #[serde(default)]
    pub content: String,
}

/// Structured `{"type": "url_content", ...}` payload of a message, if any.
/// Content that fails to parse is plain text.
pub fn url_content(message: &Message) -> Option<UrlContent> {
    let text = message.content_string();
    if !text.starts_with('{') || !text.contains("\"type\":\"url_content\"") {
        return None;
    }

    let value: Value = match serde_json::from_str(&text) {
        Ok(value) => value,
        Err(e) => {
            debug!("Message looked like url_content but is not JSON: {}", e);
            return None;
        }
    };
    if value.get("type").and_then(Value::as_str) != Some("url_content") {
        return None;
    }
    serde_json::from_value(value).ok()
}

/// Text for one message, or `None` when it should not be shown.
pub fn render_message(message: &Message, preferences: &ThreadPreferences) -> Option<String> {
    if message.has_id_prefix(DO_NOT_RENDER_ID_PREFIX) {
        return None;
    }

    match message.role {
        Role::Human => Some(match url_content(message) {
            Some(url) => format!("You: URL ({})\n{}", url.url, indent(&url.content, "  ")),
            None => format!("You: {}", message.content_string()),
        }),
        Role::Ai => {
            let content = message.content_string();
            let show_calls = !preferences.hide_tool_calls && !message.tool_calls.is_empty();
            if content.is_empty() && !show_calls {
                return None;
            }

            let mut out = format!("Assistant: {}", content);
            if show_calls {
                if !content.is_empty() {
                    out.push('\n');
                }
                out.push_str(&indent(&format_tool_calls(&message.tool_calls), "  "));
            }
            Some(out)
        }
        Role::Tool if preferences.hide_tool_calls => None,
        Role::Tool => {
            let header = match (&message.name, &message.tool_call_id) {
                (Some(name), Some(id)) => format!("Tool Result: {} ({})", name, id),
                (Some(name), None) => format!("Tool Result: {}", name),
                (None, Some(id)) => format!("Tool Result ({})", id),
                (None, None) => "Tool Result".to_string(),
            };
            Some(format!(
                "{}\n{}",
                header,
                indent(&format_tool_result(message), "  ")
            ))
        }
        Role::System => Some(format!("System: {}", message.content_string())),
    }
}

pub fn render_transcript(messages: &[Message], preferences: &ThreadPreferences) -> String {
    messages
        .iter()
        .filter_map(|m| render_message(m, preferences))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn prefs(hide_tool_calls: bool) -> ThreadPreferences {
        ThreadPreferences {
            hide_tool_calls,
            chat_history_open: false,
        }
    }

    #[test]
    fn test_tool_call_args() {
        let mut args = Map::new();
        args.insert("query".into(), json!("rust"));
        args.insert("filters".into(), json!({"lang": "en"}));
        let text = format_tool_calls(&[ToolCall::new("search", args, "call-1")]);
        assert!(text.starts_with("[tool call] search (call-1)"));
        assert!(text.contains("\n  query: rust"));
        assert!(text.contains("\n  filters:\n    {\n      \"lang\": \"en\"\n    }"));

        let empty = format_tool_calls(&[ToolCall::new("ping", Map::new(), "c")]);
        assert_eq!(empty, "[tool call] ping (c)\n  {}");
    }

    #[test]
    fn test_tool_result_truncation() {
        let long = Message::tool("c", None, "x".repeat(600));
        let collapsed = format_tool_result(&long);
        assert_eq!(collapsed.chars().count(), 503);
        assert!(collapsed.ends_with("..."));

        let lines = Message::tool("c", None, "1\n2\n3\n4\n5\n6");
        assert_eq!(format_tool_result(&lines), "1\n2\n3\n4\n...");
    }

    #[test]
    fn test_tool_result_json() {
        let object = Message::tool("c", None, r#"{"a": 1, "b": [1, 2]}"#);
        let text = format_tool_result(&object);
        assert!(text.starts_with("a: 1\nb: [\n"));

        let array = Message::tool("c", None, "[1,2,3,4,5,6,7]");
        assert_eq!(
            format_tool_result(&array),
            "0: 1\n1: 2\n2: 3\n3: 4\n4: 5\n... (2 more)"
        );
    }

    #[test]
    fn test_url_content_detection() {
        let message = Message::human(r#"{"type":"url_content","url":"http://a.b","content":"page"}"#);
        assert_eq!(
            url_content(&message),
            Some(UrlContent {
                url: "http://a.b".into(),
                content: "page".into()
            })
        );

        // Broken JSON falls back to plain text
        let broken = Message::human(r#"{"type":"url_content", oops"#);
        assert!(url_content(&broken).is_none());
        assert_eq!(
            render_message(&broken, &prefs(false)).unwrap(),
            r#"You: {"type":"url_content", oops"#
        );
    }

    #[test]
    fn test_hidden_messages() {
        let placeholder = Message::tool("c", None, "").with_id("do-not-render-1");
        assert!(render_message(&placeholder, &prefs(false)).is_none());

        let result = Message::tool("c", Some("search".into()), "found");
        assert_eq!(
            render_message(&result, &prefs(false)).unwrap(),
            "Tool Result: search (c)\n  found"
        );
        assert!(render_message(&result, &prefs(true)).is_none());

        let call_only = Message::ai_with_tool_calls("", vec![ToolCall::new("s", Map::new(), "c")]);
        assert!(render_message(&call_only, &prefs(true)).is_none());
        assert!(render_message(&call_only, &prefs(false)).is_some());
    }

    #[test]
    fn test_transcript() {
        let messages = vec![Message::human("Hello"), Message::ai("Hi there")];
        assert_eq!(
            render_transcript(&messages, &prefs(false)),
            "You: Hello\n\nAssistant: Hi there"
        );
    }
}

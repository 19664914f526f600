//! Conversation messages in the agent server's wire format.
//!
//! Messages serialize the way the agent server expects them
//! (`{"type": "human", "content": "...", "id": "..."}`), so the same types
//! are used for request payloads, streamed state and local projections.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Treat an explicit JSON `null` the same as a missing field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Message author role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Human,
    Ai,
    Tool,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Human => "human",
            Role::Ai => "ai",
            Role::Tool => "tool",
            Role::System => "system",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Message content: plain text or a provider-defined list of parts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<Value>),
}

impl Default for MessageContent {
    fn default() -> Self {
        MessageContent::Text(String::new())
    }
}

impl MessageContent {
    /// Flatten the content into display text.
    ///
    /// Structured content contributes only its `text` parts, joined by a space.
    pub fn as_text(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter(|part| part.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join(" "),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            MessageContent::Text(text) => text.is_empty(),
            MessageContent::Parts(parts) => parts.is_empty(),
        }
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        MessageContent::Text(text)
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        MessageContent::Text(text.to_string())
    }
}

/// A tool invocation requested by the assistant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub args: Map<String, Value>,
    /// Correlation id shared with the matching tool result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, args: Map<String, Value>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args,
            id: Some(id.into()),
        }
    }

    /// Correlation id, empty when the server omitted it.
    pub fn correlation_id(&self) -> &str {
        self.id.as_deref().unwrap_or("")
    }
}

/// A single conversation message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub role: Role,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: MessageContent,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    fn with_role(role: Role, content: MessageContent) -> Self {
        Self {
            id: Some(Uuid::new_v4().to_string()),
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn human(content: impl Into<MessageContent>) -> Self {
        Self::with_role(Role::Human, content.into())
    }

    pub fn ai(content: impl Into<MessageContent>) -> Self {
        Self::with_role(Role::Ai, content.into())
    }

    pub fn ai_with_tool_calls(content: impl Into<MessageContent>, tool_calls: Vec<ToolCall>) -> Self {
        let mut message = Self::with_role(Role::Ai, content.into());
        message.tool_calls = tool_calls;
        message
    }

    pub fn tool(
        tool_call_id: impl Into<String>,
        name: Option<String>,
        content: impl Into<MessageContent>,
    ) -> Self {
        let mut message = Self::with_role(Role::Tool, content.into());
        message.tool_call_id = Some(tool_call_id.into());
        message.name = name;
        message
    }

    /// Replace the generated id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn is_human(&self) -> bool {
        self.role == Role::Human
    }

    pub fn is_ai(&self) -> bool {
        self.role == Role::Ai
    }

    pub fn is_tool(&self) -> bool {
        self.role == Role::Tool
    }

    pub fn content_string(&self) -> String {
        self.content.as_text()
    }

    pub fn has_id_prefix(&self, prefix: &str) -> bool {
        self.id().is_some_and(|id| id.starts_with(prefix))
    }
}

/// Thread state as streamed by the server: `{ "messages": [...] }`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadValues {
    #[serde(default, deserialize_with = "null_as_default")]
    pub messages: Vec<Message>,
}

impl ThreadValues {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    /// Copy of this state with `extra` appended in order.
    pub fn with_appended(&self, extra: &[Message]) -> Self {
        let mut messages = self.messages.clone();
        messages.extend_from_slice(extra);
        Self { messages }
    }

    /// Apply incoming messages the way the server's message reducer does:
    /// a message whose id already exists replaces it in place, anything else
    /// is appended.
    pub fn merged(&self, incoming: &[Message]) -> Self {
        let mut messages = self.messages.clone();
        for message in incoming {
            let existing = message
                .id()
                .and_then(|id| messages.iter().position(|m| m.id() == Some(id)));
            match existing {
                Some(pos) => messages[pos] = message.clone(),
                None => messages.push(message.clone()),
            }
        }
        Self { messages }
    }

    pub fn contains(&self, message_id: &str) -> bool {
        self.messages.iter().any(|m| m.id() == Some(message_id))
    }

    pub fn position(&self, message_id: &str) -> Option<usize> {
        self.messages.iter().position(|m| m.id() == Some(message_id))
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_wire_format() {
        let message = Message::human("Hello").with_id("m1");
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value, json!({"id": "m1", "type": "human", "content": "Hello"}));
    }

    #[test]
    fn test_parse_ai_message_with_tool_calls() {
        let raw = json!({
            "id": "ai-1",
            "type": "ai",
            "content": "",
            "tool_calls": [{"name": "search", "args": {"q": "rust"}, "id": "call-1"}],
            "response_metadata": {}
        });
        let message: Message = serde_json::from_value(raw).unwrap();
        assert!(message.is_ai());
        assert_eq!(message.tool_calls.len(), 1);
        assert_eq!(message.tool_calls[0].correlation_id(), "call-1");
        assert_eq!(message.tool_calls[0].args["q"], "rust");
    }

    #[test]
    fn test_null_fields_default() {
        let raw = json!({"type": "ai", "content": null, "tool_calls": null});
        let message: Message = serde_json::from_value(raw).unwrap();
        assert!(message.content.is_empty());
        assert!(message.tool_calls.is_empty());
        assert!(message.id.is_none());
    }

    #[test]
    fn test_structured_content_text() {
        let content = MessageContent::Parts(vec![
            json!({"type": "text", "text": "first"}),
            json!({"type": "image_url", "image_url": "http://x"}),
            json!({"type": "text", "text": "second"}),
        ]);
        assert_eq!(content.as_text(), "first second");
    }

    #[test]
    fn test_merged_replaces_by_id() {
        let values = ThreadValues::new(vec![
            Message::human("a").with_id("1"),
            Message::ai("b").with_id("2"),
        ]);
        let merged = values.merged(&[
            Message::ai("b2").with_id("2"),
            Message::human("c").with_id("3"),
        ]);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged.messages[1].content_string(), "b2");
        assert_eq!(merged.messages[2].id(), Some("3"));
    }
}

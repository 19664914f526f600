//! Tool-call/tool-result pairing.
//!
//! The agent server rejects a new human turn while an earlier tool call is
//! still unanswered. Before every submission the unanswered calls get an
//! empty placeholder result. Placeholders carry [`DO_NOT_RENDER_ID_PREFIX`]
//! so the transcript can hide them.

use std::collections::HashSet;
use uuid::Uuid;

use crate::domain::Message;

/// Id prefix of synthesized messages that should not be displayed.
pub const DO_NOT_RENDER_ID_PREFIX: &str = "do-not-render-";

fn placeholder_result(tool_call_id: &str, name: &str) -> Message {
    Message::tool(tool_call_id, Some(name.to_string()), "")
        .with_id(format!("{}{}", DO_NOT_RENDER_ID_PREFIX, Uuid::new_v4()))
}

/// Correlation ids that already have a tool result.
fn answered_ids(messages: &[Message]) -> HashSet<&str> {
    messages
        .iter()
        .filter(|m| m.is_tool())
        .filter_map(|m| m.tool_call_id.as_deref())
        .collect()
}

/// Placeholder results for every unanswered tool call, in call order.
///
/// A correlation id that appears more than once gets at most one result.
pub fn missing_tool_results(messages: &[Message]) -> Vec<Message> {
    let mut answered = answered_ids(messages);
    let mut results = Vec::new();

    for call in messages.iter().filter(|m| m.is_ai()).flat_map(|m| &m.tool_calls) {
        if answered.insert(call.correlation_id()) {
            results.push(placeholder_result(call.correlation_id(), &call.name));
        }
    }

    results
}

/// The sequence with a result following every tool call.
///
/// Placeholders for an AI message are inserted after the tool results that
/// already follow it, so each result stays next to its originating call.
/// Running this on its own output changes nothing.
pub fn ensure_tool_calls_have_responses(messages: &[Message]) -> Vec<Message> {
    let mut answered = answered_ids(messages);
    let mut repaired = Vec::with_capacity(messages.len());
    let mut i = 0;

    while i < messages.len() {
        let message = &messages[i];
        repaired.push(message.clone());
        i += 1;

        if !message.is_ai() || message.tool_calls.is_empty() {
            continue;
        }

        while i < messages.len() && messages[i].is_tool() {
            repaired.push(messages[i].clone());
            i += 1;
        }

        for call in &message.tool_calls {
            if answered.insert(call.correlation_id()) {
                repaired.push(placeholder_result(call.correlation_id(), &call.name));
            }
        }
    }

    repaired
}

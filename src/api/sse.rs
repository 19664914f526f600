use serde_json::Value;
use tracing::debug;

use super::types::{RunEvent, RunMetadata};
use crate::domain::ThreadValues;

/// Incremental parser for the agent server's SSE run stream.
///
/// Bytes are buffered undecoded; only complete frames are decoded, so a
/// multibyte character split across network chunks survives intact.
#[derive(Debug, Default)]
pub struct SseStreamParser {
    buffer: Vec<u8>,
}

fn frame_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

fn normalize_newlines(buffer: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(buffer.len());
    let mut bytes = buffer.iter().peekable();
    while let Some(&b) = bytes.next() {
        if b == b'\r' && bytes.peek() == Some(&&b'\n') {
            continue;
        }
        out.push(b);
    }
    out
}

impl SseStreamParser {
    /// Feed arbitrary bytes into the parser and drain complete events.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<RunEvent> {
        self.buffer.extend_from_slice(bytes);
        if self.buffer.windows(2).any(|w| w == b"\r\n") {
            self.buffer = normalize_newlines(&self.buffer);
        }
        let mut events = Vec::new();

        while let Some(split) = frame_end(&self.buffer) {
            let frame: Vec<u8> = self.buffer.drain(..split + 2).collect();
            let frame = String::from_utf8_lossy(&frame[..split]);

            if let Some(event) = parse_frame(&frame) {
                events.push(event);
            }
        }

        events
    }

    /// Parse a complete SSE payload string in one shot.
    pub fn parse_frames(input: &str) -> Vec<RunEvent> {
        let mut parser = Self::default();
        parser.feed(input.as_bytes())
    }

    pub fn is_empty_buffer(&self) -> bool {
        self.buffer.iter().all(u8::is_ascii_whitespace)
    }
}

fn parse_frame(frame: &str) -> Option<RunEvent> {
    let mut name = "message";
    let mut data_lines = Vec::new();

    for line in frame.lines() {
        if let Some(value) = line.strip_prefix("event:") {
            name = value.trim();
        } else if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.trim());
        }
    }
    let payload = data_lines.join("\n");

    match name {
        "end" => Some(RunEvent::End),
        "metadata" => serde_json::from_str::<RunMetadata>(&payload)
            .ok()
            .map(|m| RunEvent::Metadata { run_id: m.run_id }),
        "values" => match serde_json::from_str::<ThreadValues>(&payload) {
            Ok(values) => Some(RunEvent::Values(values)),
            Err(e) => {
                debug!("Skipping unparseable values event: {}", e);
                None
            }
        },
        "error" => Some(RunEvent::Error(error_message(&payload))),
        _ => None,
    }
}

/// Message of an `error` event: `{"error": ..., "message": ...}` or raw text.
fn error_message(payload: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(payload) else {
        return payload.to_string();
    };

    let field = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);
    match (field("error"), field("message")) {
        (Some(error), Some(message)) => format!("{}: {}", error, message),
        (None, Some(message)) | (Some(message), None) => message,
        (None, None) => value
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| payload.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_run_stream_incrementally() {
        let mut parser = SseStreamParser::default();
        let mut events = Vec::new();

        events.extend(parser.feed(b"event: metadata\ndata: {\"run_id\":\"r1\"}\n\n"));
        events.extend(parser.feed(b"event: values\ndata: {\"messages\":[{\"type\":\"human\","));
        assert_eq!(events.len(), 1);
        events.extend(parser.feed(b"\"content\":\"hi\",\"id\":\"m1\"}]}\n\n"));
        events.extend(parser.feed(b"event: end\ndata: null\n\n"));

        assert_eq!(events.len(), 3);
        assert_eq!(
            events[0],
            RunEvent::Metadata {
                run_id: "r1".to_string()
            }
        );
        match &events[1] {
            RunEvent::Values(values) => {
                assert_eq!(values.len(), 1);
                assert_eq!(values.messages[0].content_string(), "hi");
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(events[2], RunEvent::End);
        assert!(parser.is_empty_buffer());
    }

    #[test]
    fn multibyte_character_split_across_chunks() {
        let frame = "event: values\ndata: {\"messages\":[{\"type\":\"human\",\
                     \"content\":\"URL (http://example.com) 내용:\\nTitle: 예시\",\"id\":\"m1\"}]}\n\n";
        let bytes = frame.as_bytes();
        // One byte into the first Hangul syllable
        let split = frame.find('내').unwrap() + 1;

        let mut parser = SseStreamParser::default();
        assert!(parser.feed(&bytes[..split]).is_empty());
        let events = parser.feed(&bytes[split..]);

        match events.as_slice() {
            [RunEvent::Values(values)] => assert_eq!(
                values.messages[0].content_string(),
                "URL (http://example.com) 내용:\nTitle: 예시"
            ),
            other => panic!("unexpected events: {:?}", other),
        }
        assert!(parser.is_empty_buffer());
    }

    #[test]
    fn crlf_split_across_chunks() {
        let mut parser = SseStreamParser::default();
        assert!(parser.feed(b"event: end\r\ndata: null\r\n\r").is_empty());
        assert_eq!(parser.feed(b"\n"), vec![RunEvent::End]);
    }

    #[test]
    fn parse_error_events() {
        let events = SseStreamParser::parse_frames(
            "event: error\r\ndata: {\"error\":\"ValueError\",\"message\":\"bad input\"}\r\n\r\n\
             event: error\ndata: plain failure\n\n",
        );
        assert_eq!(
            events,
            vec![
                RunEvent::Error("ValueError: bad input".to_string()),
                RunEvent::Error("plain failure".to_string()),
            ]
        );
    }

    #[test]
    fn unknown_and_malformed_events_are_skipped() {
        let events = SseStreamParser::parse_frames(
            ": heartbeat\n\nevent: updates\ndata: {}\n\nevent: values\ndata: not json\n\n",
        );
        assert!(events.is_empty());
    }
}

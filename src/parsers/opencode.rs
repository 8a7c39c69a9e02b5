//! Parser for the OpenCode `message.part.updated` NDJSON protocol.
//!
//! OpenCode emits a single envelope type; the useful discriminator is
//! nested at `part.type`. Unlike the other families, OpenCode tool parts
//! carry no id of their own, so the parser mints one from a per-runtime
//! counter seeded with the child's pid — avoiding the shared global static
//! the design notes warn against.

use serde_json::Value;

use crate::types::{AgentEvent, ParsedLine};

/// Stateful parser: one instance per runtime invocation.
#[derive(Debug)]
pub struct OpenCodeParser {
    pid_prefix: u32,
    counter: u64,
}

impl OpenCodeParser {
    #[must_use]
    pub fn new(pid: u32) -> Self {
        Self { pid_prefix: pid, counter: 0 }
    }

    fn next_tool_id(&mut self) -> String {
        self.counter += 1;
        format!("oc-{}-{}", self.pid_prefix, self.counter)
    }

    /// Parse one line of OpenCode NDJSON.
    pub fn parse_line(&mut self, line: &str) -> Vec<ParsedLine> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }
        let Ok(envelope) = serde_json::from_str::<Value>(trimmed) else {
            return Vec::new();
        };
        if envelope.get("type").and_then(Value::as_str) != Some("message.part.updated") {
            return vec![ParsedLine::empty()];
        }

        let Some(part) = envelope.get("part") else {
            return vec![ParsedLine::empty()];
        };

        match part.get("type").and_then(Value::as_str).unwrap_or("") {
            "text" => vec![ParsedLine::event(AgentEvent::Text {
                text: part.get("text").and_then(Value::as_str).unwrap_or_default().to_string(),
            })],
            "thinking" | "reasoning" => vec![ParsedLine::empty()],
            "tool" => vec![self.parse_tool_part(part)],
            _ => vec![ParsedLine::empty()],
        }
    }

    fn parse_tool_part(&mut self, part: &Value) -> ParsedLine {
        let tool_name = part.get("tool").and_then(Value::as_str).unwrap_or("unknown").to_string();
        match part.get("state").and_then(Value::as_str).unwrap_or("") {
            "running" => ParsedLine::event(AgentEvent::ToolUse {
                tool_id: self.next_tool_id(),
                tool_name,
                input: part
                    .get("input")
                    .map(|v| match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .unwrap_or_default(),
            }),
            "complete" | "failed" => ParsedLine::event(AgentEvent::ToolResult {
                tool_id: self.next_tool_id(),
                output: part.get("output").and_then(Value::as_str).unwrap_or_default().to_string(),
                is_error: part.get("state").and_then(Value::as_str) == Some("failed"),
            }),
            _ => ParsedLine::empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_and_malformed_yield_nothing() {
        let mut p = OpenCodeParser::new(1);
        assert!(p.parse_line("").is_empty());
        assert!(p.parse_line("nope").is_empty());
    }

    #[test]
    fn text_part_becomes_text_event() {
        let mut p = OpenCodeParser::new(1);
        let line = r#"{"type":"message.part.updated","part":{"type":"text","text":"hi"}}"#;
        let lines = p.parse_line(line);
        assert_eq!(lines[0].event, Some(AgentEvent::Text { text: "hi".into() }));
    }

    #[test]
    fn reasoning_parts_are_dropped() {
        let mut p = OpenCodeParser::new(1);
        let line = r#"{"type":"message.part.updated","part":{"type":"reasoning","text":"thinking"}}"#;
        let lines = p.parse_line(line);
        assert!(lines[0].event.is_none());
    }

    #[test]
    fn running_tool_emits_tool_use_with_minted_id() {
        let mut p = OpenCodeParser::new(42);
        let line = r#"{"type":"message.part.updated","part":{"type":"tool","tool":"grep","state":"running","input":"x"}}"#;
        let lines = p.parse_line(line);
        match &lines[0].event {
            Some(AgentEvent::ToolUse { tool_id, tool_name, .. }) => {
                assert_eq!(tool_id, "oc-42-1");
                assert_eq!(tool_name, "grep");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn failed_tool_emits_tool_result_with_is_error() {
        let mut p = OpenCodeParser::new(1);
        let line = r#"{"type":"message.part.updated","part":{"type":"tool","tool":"grep","state":"failed","output":"bad"}}"#;
        let lines = p.parse_line(line);
        match &lines[0].event {
            Some(AgentEvent::ToolResult { output, is_error, .. }) => {
                assert_eq!(output, "bad");
                assert!(*is_error);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn tool_ids_are_monotonic_per_instance() {
        let mut p = OpenCodeParser::new(7);
        let line = r#"{"type":"message.part.updated","part":{"type":"tool","tool":"a","state":"running"}}"#;
        let first = p.parse_line(line);
        let second = p.parse_line(line);
        let id_of = |lines: &[ParsedLine]| match &lines[0].event {
            Some(AgentEvent::ToolUse { tool_id, .. }) => tool_id.clone(),
            _ => panic!("expected tool_use"),
        };
        assert_ne!(id_of(&first), id_of(&second));
    }
}

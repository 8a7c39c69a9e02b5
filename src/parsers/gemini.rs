//! Parser for the Gemini CLI `--output-format stream-json` protocol.
//!
//! Envelopes are discriminated by `type`: `init`, `message`, `tool_use`,
//! `tool_result`, `result`. Gemini does not assign its own tool-call ids,
//! so the parser mints a fresh UUID per `tool_use` envelope.

use serde_json::Value;

use crate::types::{AgentEvent, AgentUsage, ParsedLine, ResultMeta};

/// Parse one line of Gemini NDJSON.
#[must_use]
pub fn parse_line(line: &str) -> Vec<ParsedLine> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    let Ok(envelope) = serde_json::from_str::<Value>(trimmed) else {
        return Vec::new();
    };

    match envelope.get("type").and_then(Value::as_str).unwrap_or("") {
        "init" => vec![ParsedLine {
            event: None,
            session_id: envelope.get("sessionId").and_then(Value::as_str).map(str::to_string),
            usage: None,
            result_meta: None,
        }],
        "message" => vec![ParsedLine::event(AgentEvent::Text {
            text: envelope.get("content").and_then(Value::as_str).unwrap_or_default().to_string(),
        })],
        "tool_use" => vec![parse_tool_use(&envelope)],
        "tool_result" => vec![ParsedLine::empty()],
        "result" => vec![parse_result(&envelope)],
        _ => vec![ParsedLine::empty()],
    }
}

fn parse_tool_use(envelope: &Value) -> ParsedLine {
    let tool_name = envelope.get("tool").and_then(Value::as_str).unwrap_or("unknown").to_string();
    let input = match envelope.get("args") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    };
    ParsedLine::event(AgentEvent::ToolUse {
        tool_id: uuid::Uuid::new_v4().to_string(),
        tool_name,
        input,
    })
}

fn parse_result(envelope: &Value) -> ParsedLine {
    let usage = envelope
        .pointer("/stats/models")
        .and_then(Value::as_object)
        .and_then(|models| models.values().next())
        .and_then(|model| model.get("tokens"))
        .map(|tokens| AgentUsage {
            input_tokens: tokens.get("prompt").and_then(Value::as_u64),
            output_tokens: tokens.get("candidates").and_then(Value::as_u64),
            cache_read_tokens: tokens.get("cached").and_then(Value::as_u64),
            cache_write_tokens: None,
            cost_usd: None,
            web_search_requests: None,
        });

    let num_turns = envelope
        .pointer("/stats/tools/totalCalls")
        .and_then(Value::as_u64)
        .map(|n| n as u32);

    let result_meta = num_turns.map(|num_turns| ResultMeta {
        num_turns: Some(num_turns),
        ..ResultMeta::default()
    });

    ParsedLine { event: None, session_id: None, usage, result_meta }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_and_malformed_yield_nothing() {
        assert!(parse_line("").is_empty());
        assert!(parse_line("{broken").is_empty());
    }

    #[test]
    fn init_carries_session_id() {
        let lines = parse_line(r#"{"type":"init","sessionId":"g-1"}"#);
        assert_eq!(lines[0].session_id.as_deref(), Some("g-1"));
    }

    #[test]
    fn message_becomes_text() {
        let lines = parse_line(r#"{"type":"message","content":"hello"}"#);
        assert_eq!(lines[0].event, Some(AgentEvent::Text { text: "hello".into() }));
    }

    #[test]
    fn tool_use_mints_fresh_uuid_and_defaults_tool_name() {
        let lines = parse_line(r#"{"type":"tool_use","args":{"a":1}}"#);
        match &lines[0].event {
            Some(AgentEvent::ToolUse { tool_id, tool_name, input }) => {
                assert!(uuid::Uuid::parse_str(tool_id).is_ok());
                assert_eq!(tool_name, "unknown");
                assert!(input.contains('a'));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn tool_result_is_passed_through_with_no_event() {
        let lines = parse_line(r#"{"type":"tool_result","output":"x"}"#);
        assert!(lines[0].event.is_none());
    }

    #[test]
    fn result_maps_token_stats_and_tool_calls() {
        let line = r#"{"type":"result","stats":{"models":{"gemini-2.5-pro":{"tokens":{"prompt":7,"candidates":2,"cached":1}}},"tools":{"totalCalls":4}}}"#;
        let lines = parse_line(line);
        let usage = lines[0].usage.as_ref().unwrap();
        assert_eq!(usage.input_tokens, Some(7));
        assert_eq!(usage.output_tokens, Some(2));
        assert_eq!(usage.cache_read_tokens, Some(1));
        assert_eq!(lines[0].result_meta.as_ref().unwrap().num_turns, Some(4));
    }
}

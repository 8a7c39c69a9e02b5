//! Parser for the Codex `exec --json` NDJSON protocol.
//!
//! Envelopes are discriminated by `type`: `thread.started`, `item.started`,
//! `item.completed`, `turn.completed`, `error`. Codex never populates
//! `result_meta` — its only terminal accounting is per-turn `usage`.

use serde_json::Value;

use crate::types::{AgentEvent, AgentUsage, ErrorCategory, ParsedLine};

/// Parse one line of Codex NDJSON.
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
        "thread.started" => vec![ParsedLine {
            event: None,
            session_id: envelope.get("thread_id").and_then(Value::as_str).map(str::to_string),
            usage: None,
            result_meta: None,
        }],
        "item.started" => vec![parse_item_started(&envelope)],
        "item.completed" => vec![parse_item_completed(&envelope)],
        "turn.completed" => vec![parse_turn_completed(&envelope)],
        "error" => vec![ParsedLine::event(AgentEvent::Error {
            message: envelope.get("message").and_then(Value::as_str).unwrap_or_default().to_string(),
            category: ErrorCategory::Fatal,
        })],
        _ => vec![ParsedLine::empty()],
    }
}

fn item_command_input(item: &Value) -> String {
    match item.get("command") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn parse_item_started(envelope: &Value) -> ParsedLine {
    let item = envelope.get("item").cloned().unwrap_or(Value::Null);
    if item.get("item_type").and_then(Value::as_str) != Some("command_execution") {
        return ParsedLine::empty();
    }
    ParsedLine::event(AgentEvent::ToolUse {
        tool_id: item.get("id").and_then(Value::as_str).unwrap_or_default().to_string(),
        tool_name: "command_execution".to_string(),
        input: item_command_input(&item),
    })
}

fn parse_item_completed(envelope: &Value) -> ParsedLine {
    let item = envelope.get("item").cloned().unwrap_or(Value::Null);
    match item.get("item_type").and_then(Value::as_str) {
        Some("agent_message") => {
            let text = item.get("text").and_then(Value::as_str).unwrap_or_default().to_string();
            ParsedLine::event(AgentEvent::Text { text })
        }
        Some("command_execution") => {
            let is_error = item.get("status").and_then(Value::as_str) == Some("failed");
            let output = item
                .get("aggregated_output")
                .or_else(|| item.get("output"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            ParsedLine::event(AgentEvent::ToolResult {
                tool_id: item.get("id").and_then(Value::as_str).unwrap_or_default().to_string(),
                output,
                is_error,
            })
        }
        _ => ParsedLine::empty(),
    }
}

fn parse_turn_completed(envelope: &Value) -> ParsedLine {
    let Some(usage) = envelope.get("usage") else {
        return ParsedLine::empty();
    };
    ParsedLine {
        event: None,
        session_id: None,
        usage: Some(AgentUsage {
            input_tokens: usage.get("input_tokens").and_then(Value::as_u64),
            output_tokens: usage.get("output_tokens").and_then(Value::as_u64),
            cache_read_tokens: usage.get("cached_input_tokens").and_then(Value::as_u64),
            cache_write_tokens: None,
            cost_usd: None,
            web_search_requests: None,
        }),
        result_meta: None,
    }
}

//! Parser for the Claude-family NDJSON protocol (`stream-json`).
//!
//! Each line is a complete envelope (not an incremental delta): `system`
//! carries session metadata, `assistant` carries one or more content
//! blocks, `result` carries the final usage/cost/turn accounting.

use serde_json::Value;

use crate::types::{AgentEvent, AgentUsage, ParsedLine, ResultMeta};

/// Parse one line of Claude-family NDJSON.
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
        "system" => parse_system(&envelope),
        "assistant" => parse_assistant(&envelope),
        "result" => vec![parse_result(&envelope)],
        "tool_progress" => vec![parse_tool_progress(&envelope)],
        "tool_use_summary" => vec![parse_tool_use_summary(&envelope)],
        _ => vec![ParsedLine::empty()],
    }
}

fn session_id_of(envelope: &Value) -> Option<String> {
    envelope
        .get("session_id")
        .or_else(|| envelope.pointer("/message/session_id"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn parse_system(envelope: &Value) -> Vec<ParsedLine> {
    let session_id = session_id_of(envelope);
    let event = match envelope.get("subtype").and_then(Value::as_str).unwrap_or("") {
        "status" => envelope
            .get("status")
            .and_then(Value::as_str)
            .map(|status| AgentEvent::Status { status: status.to_string() }),
        "task_started" => Some(AgentEvent::TaskStarted {
            task_id: str_field(envelope, "taskId"),
            description: str_field(envelope, "description"),
            task_type: str_field(envelope, "taskType"),
        }),
        "task_notification" => Some(AgentEvent::TaskNotification {
            task_id: str_field(envelope, "taskId"),
            status: str_field(envelope, "status"),
            summary: str_field(envelope, "summary"),
        }),
        _ => None,
    };
    vec![ParsedLine { event, session_id, usage: None, result_meta: None }]
}

fn parse_assistant(envelope: &Value) -> Vec<ParsedLine> {
    let session_id = session_id_of(envelope);
    let blocks = envelope
        .pointer("/message/content")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    if blocks.is_empty() {
        return vec![ParsedLine { event: None, session_id, usage: None, result_meta: None }];
    }

    blocks
        .iter()
        .filter_map(|block| {
            let event = match block.get("type").and_then(Value::as_str).unwrap_or("") {
                "text" => block
                    .get("text")
                    .and_then(Value::as_str)
                    .map(|text| AgentEvent::Text { text: text.to_string() }),
                "tool_use" => {
                    let tool_id = str_field(block, "id");
                    let tool_name = block
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown")
                        .to_string();
                    let input = block
                        .get("input")
                        .map(|v| match v {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        })
                        .unwrap_or_default();
                    Some(AgentEvent::ToolUse { tool_id, tool_name, input })
                }
                _ => None,
            }?;
            Some(ParsedLine { event: Some(event), session_id: session_id.clone(), usage: None, result_meta: None })
        })
        .collect()
}

fn parse_result(envelope: &Value) -> ParsedLine {
    let session_id = session_id_of(envelope);
    let usage = envelope.get("usage").and_then(extract_usage);
    let result_meta = Some(ResultMeta {
        total_cost_usd: envelope.get("total_cost_usd").and_then(Value::as_f64),
        api_duration_ms: envelope.get("duration_api_ms").and_then(Value::as_u64),
        num_turns: envelope
            .get("num_turns")
            .and_then(Value::as_u64)
            .map(|n| n as u32),
        stop_reason: envelope
            .get("stop_reason")
            .and_then(Value::as_str)
            .map(str::to_string),
        error_subtype: envelope
            .get("error_subtype")
            .and_then(Value::as_str)
            .map(str::to_string),
        permission_denials: envelope
            .get("permission_denials")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
    });
    ParsedLine { event: None, session_id, usage, result_meta }
}

fn parse_tool_progress(envelope: &Value) -> ParsedLine {
    let event = AgentEvent::ToolProgress {
        tool_id: str_field(envelope, "toolId"),
        tool_name: str_field(envelope, "toolName"),
        elapsed_seconds: envelope.get("elapsedSeconds").and_then(Value::as_f64).unwrap_or(0.0),
    };
    ParsedLine::event(event)
}

fn parse_tool_use_summary(envelope: &Value) -> ParsedLine {
    let tool_ids = envelope
        .get("toolIds")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();
    let event = AgentEvent::ToolSummary { summary: str_field(envelope, "summary"), tool_ids };
    ParsedLine::event(event)
}

/// Usage prefers per-model camelCase fields (`usage.models.<model>.{inputTokens,...}`)
/// and falls back to Anthropic API-style snake_case totals.
fn extract_usage(usage: &Value) -> Option<AgentUsage> {
    if let Some(models) = usage.get("models").and_then(Value::as_object) {
        if let Some(model_usage) = models.values().next() {
            return Some(AgentUsage {
                input_tokens: model_usage.get("inputTokens").and_then(Value::as_u64),
                output_tokens: model_usage.get("outputTokens").and_then(Value::as_u64),
                cache_read_tokens: model_usage.get("cacheReadTokens").and_then(Value::as_u64),
                cache_write_tokens: model_usage.get("cacheWriteTokens").and_then(Value::as_u64),
                cost_usd: model_usage.get("costUsd").and_then(Value::as_f64),
                web_search_requests: model_usage.get("webSearchRequests").and_then(Value::as_u64),
            });
        }
    }

    let has_any = usage.get("input_tokens").is_some() || usage.get("output_tokens").is_some();
    if !has_any {
        return None;
    }
    Some(AgentUsage {
        input_tokens: usage.get("input_tokens").and_then(Value::as_u64),
        output_tokens: usage.get("output_tokens").and_then(Value::as_u64),
        cache_read_tokens: usage.get("cache_read_input_tokens").and_then(Value::as_u64),
        cache_write_tokens: usage.get("cache_creation_input_tokens").and_then(Value::as_u64),
        cost_usd: usage.get("cost_usd").and_then(Value::as_f64),
        web_search_requests: usage
            .pointer("/server_tool_use/web_search_requests")
            .and_then(Value::as_u64),
    })
}

fn str_field(v: &Value, field: &str) -> String {
    v.get(field).and_then(Value::as_str).unwrap_or_default().to_string()
}

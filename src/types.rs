//! Core domain types shared by every component: the event stream emitted by
//! a runtime, the usage/result records a run accumulates, and the session
//! and auth records persisted across calls.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Return the current time as epoch milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ---------------------------------------------------------------------------
// AgentEvent
// ---------------------------------------------------------------------------

/// A typed event produced while a CLI runtime is running, normalized from
/// that family's NDJSON protocol by the matching parser.
///
/// Realized as a tagged union (explicit `type` discriminator) so callers
/// pattern-match instead of probing untyped fields, per the source's
/// untyped-property-dispatch design note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// A fragment (or the whole) of assistant text.
    Text { text: String },
    /// The agent invoked a tool.
    ToolUse {
        #[serde(rename = "toolId")]
        tool_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        input: String,
    },
    /// A tool call finished.
    ToolResult {
        #[serde(rename = "toolId")]
        tool_id: String,
        output: String,
        #[serde(rename = "isError")]
        is_error: bool,
    },
    /// A long-running tool call is still executing.
    ToolProgress {
        #[serde(rename = "toolId")]
        tool_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        #[serde(rename = "elapsedSeconds")]
        elapsed_seconds: f64,
    },
    /// Several tool calls have been summarized into one line.
    ToolSummary {
        summary: String,
        #[serde(rename = "toolIds")]
        tool_ids: Vec<String>,
    },
    /// A free-form status update.
    Status { status: String },
    /// A sub-task began.
    TaskStarted {
        #[serde(rename = "taskId")]
        task_id: String,
        description: String,
        #[serde(rename = "taskType")]
        task_type: String,
    },
    /// A sub-task reported a notification.
    TaskNotification {
        #[serde(rename = "taskId")]
        task_id: String,
        status: String,
        summary: String,
    },
    /// An error occurred. At most one of these precedes `done`.
    Error { message: String, category: ErrorCategory },
    /// Terminal event. Exactly one per run, and always the last event.
    Done { result: AgentRunResult },
}

/// Classification of an error, either reported by a runtime exit-code
/// policy or derived from free text by the error classifier (component A).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Transient server/network issue worth retrying.
    Retryable,
    /// The model's context window was exceeded.
    ContextOverflow,
    /// Authentication, configuration, or programmer error.
    Fatal,
    /// The total timeout or no-output watchdog fired.
    Timeout,
    /// The caller cancelled the run.
    Aborted,
}

// ---------------------------------------------------------------------------
// AgentUsage / AgentRunResult
// ---------------------------------------------------------------------------

/// Token and cost accounting for one run. Any field may be absent because
/// not every CLI family reports every figure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentUsage {
    #[serde(rename = "inputTokens", default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    #[serde(rename = "outputTokens", default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
    #[serde(rename = "cacheReadTokens", default, skip_serializing_if = "Option::is_none")]
    pub cache_read_tokens: Option<u64>,
    #[serde(rename = "cacheWriteTokens", default, skip_serializing_if = "Option::is_none")]
    pub cache_write_tokens: Option<u64>,
    #[serde(rename = "costUsd", default, skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
    #[serde(
        rename = "webSearchRequests",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub web_search_requests: Option<u64>,
}

/// The terminal result of a run, carried by the `done` event and returned
/// to the channel bridge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentRunResult {
    /// Assistant text accumulated over the run: the exact concatenation,
    /// in stream order, of every preceding `text` event's `text` field.
    pub text: String,
    #[serde(rename = "sessionId", default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Wall time from spawn to the terminal event, in milliseconds.
    #[serde(rename = "durationMs")]
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<AgentUsage>,
    pub aborted: bool,
    #[serde(rename = "totalCostUsd", default, skip_serializing_if = "Option::is_none")]
    pub total_cost_usd: Option<f64>,
    #[serde(rename = "apiDurationMs", default, skip_serializing_if = "Option::is_none")]
    pub api_duration_ms: Option<u64>,
    #[serde(rename = "numTurns", default, skip_serializing_if = "Option::is_none")]
    pub num_turns: Option<u32>,
    #[serde(rename = "stopReason", default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    #[serde(rename = "errorSubtype", default, skip_serializing_if = "Option::is_none")]
    pub error_subtype: Option<String>,
    #[serde(rename = "permissionDenials", default, skip_serializing_if = "Vec::is_empty")]
    pub permission_denials: Vec<serde_json::Value>,
}

/// The subset of `AgentRunResult` fields that a parser can learn from a
/// `result`-shaped envelope, before the run's text and duration are known.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultMeta {
    pub total_cost_usd: Option<f64>,
    pub api_duration_ms: Option<u64>,
    pub num_turns: Option<u32>,
    pub stop_reason: Option<String>,
    pub error_subtype: Option<String>,
    pub permission_denials: Vec<serde_json::Value>,
}

/// One normalized record produced by parsing a single NDJSON line.
///
/// A line may produce zero, one, or several of these (one envelope can
/// carry multiple content parts); `event` is the only field consumers
/// stream onward, the rest are side-channel updates the runtime folds into
/// its running state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedLine {
    pub event: Option<AgentEvent>,
    pub session_id: Option<String>,
    pub usage: Option<AgentUsage>,
    pub result_meta: Option<ResultMeta>,
}

impl ParsedLine {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn event(event: AgentEvent) -> Self {
        Self {
            event: Some(event),
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// AgentRuntimeParams / ResolvedProviderAuth
// ---------------------------------------------------------------------------

/// Input to a runtime's `execute`.
#[derive(Debug, Clone)]
pub struct AgentRuntimeParams {
    pub prompt: String,
    /// If present, resume this session instead of starting fresh.
    pub session_id: Option<String>,
    /// Child working directory.
    pub workspace_dir: String,
    pub model: Option<String>,
    pub max_turns: Option<u32>,
    /// 0 or absent disables the total timeout.
    pub timeout_ms: Option<u64>,
    pub auth: ResolvedProviderAuth,
    pub abort_signal: Option<crate::runtime::base::AbortSignal>,
}

/// How credentials were resolved for this run, and what to tell the child.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedProviderAuth {
    pub mode: AuthMode,
    #[serde(rename = "apiKey", default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(rename = "profileId", default, skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<String>,
    /// Free-form diagnostic, e.g. which profile or AWS env chain was used.
    pub source: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMode {
    ApiKey,
    Token,
    Oauth,
    AwsSdk,
}

// ---------------------------------------------------------------------------
// Session map
// ---------------------------------------------------------------------------

/// Conversation identity: two messages collide iff all three match.
/// Absent thread is never equal to any concrete thread.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionMapKey {
    pub channel_id: String,
    pub user_id: String,
    pub thread_id: Option<String>,
}

/// Placeholder used when serializing an absent thread id. Treated as
/// opaque by every consumer; never special-cased beyond this constant.
pub const NO_THREAD_SENTINEL: &str = "_";

impl SessionMapKey {
    #[must_use]
    pub fn new(channel_id: impl Into<String>, user_id: impl Into<String>, thread_id: Option<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            user_id: user_id.into(),
            thread_id,
        }
    }

    /// Serialize as `channelId:userId:threadId`, using the sentinel for an
    /// absent thread.
    #[must_use]
    pub fn to_key_string(&self) -> String {
        format!(
            "{}:{}:{}",
            self.channel_id,
            self.user_id,
            self.thread_id.as_deref().unwrap_or(NO_THREAD_SENTINEL)
        )
    }
}

/// A stored session record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEntry {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "updatedAt")]
    pub updated_at: i64,
}

// ---------------------------------------------------------------------------
// Auth profile store
// ---------------------------------------------------------------------------

/// A credential record, discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Credential {
    ApiKey { provider: String, key: String },
    Token {
        provider: String,
        token: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expires: Option<i64>,
    },
}

impl Credential {
    #[must_use]
    pub fn provider(&self) -> &str {
        match self {
            Self::ApiKey { provider, .. } | Self::Token { provider, .. } => provider,
        }
    }
}

/// Per-profile rotation bookkeeping, updated only by the surrounding reply
/// loop (never by the resolver itself).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    #[serde(rename = "lastUsed", default, skip_serializing_if = "Option::is_none")]
    pub last_used: Option<i64>,
    #[serde(rename = "cooldownUntil", default, skip_serializing_if = "Option::is_none")]
    pub cooldown_until: Option<i64>,
    #[serde(rename = "disabledUntil", default, skip_serializing_if = "Option::is_none")]
    pub disabled_until: Option<i64>,
    #[serde(rename = "disabledReason", default, skip_serializing_if = "Option::is_none")]
    pub disabled_reason: Option<String>,
    #[serde(rename = "errorCount", default)]
    pub error_count: u32,
    #[serde(rename = "failureCounts", default)]
    pub failure_counts: HashMap<String, u32>,
    #[serde(rename = "lastFailureAt", default, skip_serializing_if = "Option::is_none")]
    pub last_failure_at: Option<i64>,
}

/// On-disk shape of the credential catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthProfileStore {
    #[serde(default)]
    pub version: i32,
    #[serde(default)]
    pub profiles: HashMap<String, Credential>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<HashMap<String, Vec<String>>>,
    #[serde(rename = "lastGood", default, skip_serializing_if = "Option::is_none")]
    pub last_good: Option<HashMap<String, String>>,
    #[serde(rename = "usageStats", default, skip_serializing_if = "Option::is_none")]
    pub usage_stats: Option<HashMap<String, Stats>>,
}

//! Component H: the channel bridge. Owns a runtime for exactly one call,
//! fans events out to caller callbacks, and assembles a reply.
//!
//! Stateless across calls beyond the session map: a long-lived session
//! object would track turn count and hold a provider handle open, but
//! nothing here needs to survive past one `handle()` call.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::auth::resolver::{resolve_api_key_for_provider, AuthResolverConfig};
use crate::runtime::base::{AbortSignal, CliRuntime};
use crate::session_map::SessionMap;
use crate::types::{AgentEvent, AgentRunResult, AgentRuntimeParams, AuthProfileStore, ErrorCategory, SessionMapKey};

/// An inbound message from a chat surface.
#[derive(Debug, Clone)]
pub struct ChannelMessage {
    pub channel_id: String,
    pub user_id: String,
    pub thread_id: Option<String>,
    pub text: String,
}

/// The assembled outcome of one `handle()` call.
#[derive(Debug, Clone, Default)]
pub struct ChannelReply {
    pub text: String,
    pub session_id: Option<String>,
    pub duration_ms: u64,
    pub usage: Option<crate::types::AgentUsage>,
    pub aborted: bool,
    pub error: Option<String>,
    pub total_cost_usd: Option<f64>,
    pub api_duration_ms: Option<u64>,
    pub num_turns: Option<u32>,
    pub stop_reason: Option<String>,
    pub error_subtype: Option<String>,
    pub permission_denials: Vec<serde_json::Value>,
}

/// Zero or more optional async callbacks the caller may implement. None
/// return a value; an implementation that needs to handle its own
/// failures is responsible for catching them internally — the bridge
/// never inspects what a callback does.
#[async_trait]
pub trait ChannelCallbacks: Send + Sync {
    async fn on_partial_text(&self, _text: &str) {}
    async fn on_tool_use(&self, _tool_id: &str, _tool_name: &str, _input: &str) {}
    async fn on_tool_result(&self, _tool_id: &str, _output: &str, _is_error: bool) {}
    async fn on_tool_progress(&self, _tool_id: &str, _tool_name: &str, _elapsed_seconds: f64) {}
    async fn on_tool_summary(&self, _summary: &str, _tool_ids: &[String]) {}
    async fn on_status(&self, _status: &str) {}
    async fn on_task_started(&self, _task_id: &str, _description: &str, _task_type: &str) {}
    async fn on_task_notification(&self, _task_id: &str, _status: &str, _summary: &str) {}
    async fn on_error(&self, _message: &str, _category: ErrorCategory) {}
}

/// A no-op callback set for callers that don't need per-event hooks.
pub struct NoopCallbacks;

impl ChannelCallbacks for NoopCallbacks {}

/// Operator-configured defaults applied to every run this bridge drives.
#[derive(Debug, Clone, Default)]
pub struct BridgeDefaults {
    pub workspace_dir: String,
    pub model: Option<String>,
    pub max_turns: Option<u32>,
    pub timeout_ms: Option<u64>,
}

/// Owns one runtime and the session map it reads/writes. Stateless across
/// calls beyond that map.
pub struct ChannelBridge {
    provider: String,
    runtime: CliRuntime,
    auth_store: AuthProfileStore,
    auth_config: AuthResolverConfig,
    auth_store_path: PathBuf,
    defaults: BridgeDefaults,
    session_map: tokio::sync::Mutex<SessionMap>,
}

impl ChannelBridge {
    #[must_use]
    pub fn new(
        provider: impl Into<String>,
        runtime: CliRuntime,
        auth_store: AuthProfileStore,
        auth_config: AuthResolverConfig,
        auth_store_path: PathBuf,
        defaults: BridgeDefaults,
        session_map: SessionMap,
    ) -> Self {
        Self {
            provider: provider.into(),
            runtime,
            auth_store,
            auth_config,
            auth_store_path,
            defaults,
            session_map: tokio::sync::Mutex::new(session_map),
        }
    }

    pub async fn handle(&self, message: &ChannelMessage, callbacks: &dyn ChannelCallbacks, abort_signal: Option<AbortSignal>) -> ChannelReply {
        let key = SessionMapKey::new(message.channel_id.clone(), message.user_id.clone(), message.thread_id.clone());
        let span = tracing::info_span!("channel_bridge_handle", provider = %self.provider, channel_id = %message.channel_id);
        let _enter = span.enter();

        let existing_session_id = self.session_map.lock().await.get(&key);

        let auth = match resolve_api_key_for_provider(&self.provider, &self.auth_store, &self.auth_config, &self.auth_store_path) {
            Ok(auth) => auth,
            Err(e) => {
                tracing::warn!(error = %e, "auth resolution failed before runtime start");
                return ChannelReply { error: Some(e.to_string()), ..ChannelReply::default() };
            }
        };

        let params = AgentRuntimeParams {
            prompt: message.text.clone(),
            session_id: existing_session_id,
            workspace_dir: self.defaults.workspace_dir.clone(),
            model: self.defaults.model.clone(),
            max_turns: self.defaults.max_turns,
            timeout_ms: self.defaults.timeout_ms,
            auth,
            abort_signal,
        };

        let mut receiver = match self.runtime.execute(params).await {
            Ok(receiver) => receiver,
            Err(e) => {
                tracing::warn!(error = %e, "runtime failed to start");
                callbacks.on_error(&e.to_string(), ErrorCategory::Fatal).await;
                return ChannelReply { error: Some(e.to_string()), ..ChannelReply::default() };
            }
        };

        let mut result: Option<AgentRunResult> = None;
        let mut last_error: Option<String> = None;

        while let Some(event) = receiver.recv().await {
            match event {
                AgentEvent::Text { text } => callbacks.on_partial_text(&text).await,
                AgentEvent::ToolUse { tool_id, tool_name, input } => callbacks.on_tool_use(&tool_id, &tool_name, &input).await,
                AgentEvent::ToolResult { tool_id, output, is_error } => callbacks.on_tool_result(&tool_id, &output, is_error).await,
                AgentEvent::ToolProgress { tool_id, tool_name, elapsed_seconds } => {
                    callbacks.on_tool_progress(&tool_id, &tool_name, elapsed_seconds).await;
                }
                AgentEvent::ToolSummary { summary, tool_ids } => callbacks.on_tool_summary(&summary, &tool_ids).await,
                AgentEvent::Status { status } => callbacks.on_status(&status).await,
                AgentEvent::TaskStarted { task_id, description, task_type } => {
                    callbacks.on_task_started(&task_id, &description, &task_type).await;
                }
                AgentEvent::TaskNotification { task_id, status, summary } => {
                    callbacks.on_task_notification(&task_id, &status, &summary).await;
                }
                AgentEvent::Error { message, category } => {
                    last_error = Some(message.clone());
                    callbacks.on_error(&message, category).await;
                }
                AgentEvent::Done { result: run_result } => result = Some(run_result),
            }
        }

        let result = result.unwrap_or_default();

        if let Some(sid) = &result.session_id {
            if let Err(e) = self.session_map.lock().await.set(&key, sid.clone()).await {
                tracing::warn!(error = %e, "failed to persist session map entry");
            }
        }

        ChannelReply {
            text: result.text,
            session_id: result.session_id,
            duration_ms: result.duration_ms,
            usage: result.usage,
            aborted: result.aborted,
            error: last_error,
            total_cost_usd: result.total_cost_usd,
            api_duration_ms: result.api_duration_ms,
            num_turns: result.num_turns,
            stop_reason: result.stop_reason,
            error_subtype: result.error_subtype,
            permission_denials: result.permission_denials,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::factory::{build_runtime, RuntimeFactoryConfig};

    async fn bridge_with_no_credentials() -> ChannelBridge {
        let runtime = build_runtime("claude", &RuntimeFactoryConfig::default()).unwrap();
        let session_map = SessionMap::load("/tmp/nonexistent-bridge-test-sessions.json", crate::session_map::DEFAULT_TTL_MS).await;
        ChannelBridge::new(
            "claude",
            runtime,
            AuthProfileStore::default(),
            AuthResolverConfig::default(),
            PathBuf::from("/tmp/auth.json"),
            BridgeDefaults { workspace_dir: "/tmp".to_string(), ..Default::default() },
            session_map,
        )
    }

    #[tokio::test]
    async fn missing_credentials_return_error_reply_with_empty_text() {
        let bridge = bridge_with_no_credentials().await;
        let message = ChannelMessage { channel_id: "tg".to_string(), user_id: "u1".to_string(), thread_id: None, text: "hi".to_string() };
        let reply = bridge.handle(&message, &NoopCallbacks, None).await;
        assert!(reply.text.is_empty());
        assert!(reply.error.is_some());
        assert!(!reply.aborted);
    }
}

//! Component E: maps a provider id to a configured [`CliRuntime`].
//!
//! Normalizes aliases the way a fixed provider-id lookup table would, then
//! injects whatever backend config the operator supplied for that id.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{AgentError, AgentResult};
use crate::runtime::base::{BackendConfig, CliRuntime, RuntimeSpec};
use crate::runtime::claude::ClaudeRuntimeSpec;
use crate::runtime::codex::CodexRuntimeSpec;
use crate::runtime::gemini::GeminiRuntimeSpec;
use crate::runtime::opencode::OpenCodeRuntimeSpec;

/// Operator configuration: one `BackendConfig` per provider id, keyed by
/// the *normalized* id.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct RuntimeFactoryConfig {
    #[serde(default)]
    pub backends: HashMap<String, BackendConfig>,
}

/// Normalize a provider id: lower-case, then apply the fixed alias table.
#[must_use]
pub fn normalize_provider_id(provider: &str) -> String {
    let lower = provider.to_lowercase();
    match lower.as_str() {
        "z.ai" => "zai".to_string(),
        "opencode-zen" => "opencode".to_string(),
        "qwen" => "qwen-portal".to_string(),
        other => other.to_string(),
    }
}

/// Build a configured runtime for `provider`. Recognized built-in families
/// (`claude`, `codex`, `gemini`, `opencode`) always succeed, using a
/// matching backend config if one was supplied or defaults otherwise. An
/// unrecognized provider succeeds only if the config carries a backend
/// entry for it — in which case it is treated as a Claude-compatible CLI,
/// the common case for third-party forks of the Claude Code protocol.
pub fn build_runtime(provider: &str, config: &RuntimeFactoryConfig) -> AgentResult<CliRuntime> {
    let id = normalize_provider_id(provider);
    let backend = config.backends.get(&id).cloned().unwrap_or_default();

    let spec: Arc<dyn RuntimeSpec> = match id.as_str() {
        "claude" => Arc::new(ClaudeRuntimeSpec),
        "codex" => Arc::new(CodexRuntimeSpec),
        "gemini" => Arc::new(GeminiRuntimeSpec),
        "opencode" => Arc::new(OpenCodeRuntimeSpec),
        _ if config.backends.contains_key(&id) => Arc::new(ClaudeRuntimeSpec),
        _ => return Err(AgentError::NoRuntimeForProvider { provider: id }),
    };

    Ok(CliRuntime::new(spec, backend))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_normalize_to_canonical_ids() {
        assert_eq!(normalize_provider_id("Z.AI"), "zai");
        assert_eq!(normalize_provider_id("opencode-zen"), "opencode");
        assert_eq!(normalize_provider_id("qwen"), "qwen-portal");
        assert_eq!(normalize_provider_id("Claude"), "claude");
    }

    #[test]
    fn recognized_family_builds_regardless_of_config() {
        let config = RuntimeFactoryConfig::default();
        let runtime = build_runtime("claude", &config).unwrap();
        assert_eq!(runtime.provider_id(), "claude");
    }

    #[test]
    fn unknown_provider_without_backend_config_fails() {
        let config = RuntimeFactoryConfig::default();
        let err = build_runtime("some-custom-tool", &config).unwrap_err();
        assert!(matches!(err, AgentError::NoRuntimeForProvider { .. }));
    }

    #[test]
    fn unknown_provider_with_backend_config_falls_back_to_claude() {
        let mut config = RuntimeFactoryConfig::default();
        config.backends.insert("some-custom-tool".to_string(), BackendConfig::default());
        let runtime = build_runtime("some-custom-tool", &config).unwrap();
        assert_eq!(runtime.provider_id(), "claude");
    }
}

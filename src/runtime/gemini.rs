//! Gemini `RuntimeSpec`: `gemini --output-format stream-json` mode.
//!
//! Exit code 53 is Gemini's fixed "turn limit exceeded" signal and is
//! always fatal, regardless of what the default exit-code classifier would
//! make of the accompanying stderr text.

use std::collections::HashMap;

use crate::parsers::gemini::parse_line;
use crate::runtime::base::{BackendConfig, LineParser, RuntimeSpec, StatelessParser};
use crate::types::{AgentRuntimeParams, AuthMode, ErrorCategory, ResolvedProviderAuth};

pub struct GeminiRuntimeSpec;

impl RuntimeSpec for GeminiRuntimeSpec {
    fn provider_id(&self) -> &'static str {
        "gemini"
    }

    fn default_command(&self) -> &'static str {
        "gemini"
    }

    fn build_argv(&self, params: &AgentRuntimeParams, backend: &BackendConfig, prompt_via_stdin: bool) -> Vec<String> {
        let mut argv = vec!["--output-format".to_string(), "stream-json".to_string()];
        argv.extend(backend.extra_args.iter().cloned());
        if let Some(sid) = &params.session_id {
            argv.push("-r".to_string());
            argv.push(sid.clone());
        }
        if let Some(max_turns) = params.max_turns {
            argv.push("--max-turns".to_string());
            argv.push(max_turns.to_string());
        }
        if let Some(model) = &params.model {
            argv.push("--model".to_string());
            argv.push(model.clone());
        }
        if !prompt_via_stdin {
            argv.push("-p".to_string());
            argv.push(params.prompt.clone());
        }
        argv
    }

    fn auth_env(&self, auth: &ResolvedProviderAuth) -> HashMap<String, String> {
        let mut env = HashMap::new();
        if auth.mode == AuthMode::ApiKey {
            if let Some(key) = &auth.api_key {
                env.insert("GEMINI_API_KEY".to_string(), key.clone());
            }
        }
        env
    }

    fn make_parser(&self, _child_pid: u32) -> Box<dyn LineParser> {
        Box::new(StatelessParser(parse_line))
    }

    fn classify_exit(&self, exit_code: i32, stderr: &str) -> Option<(String, ErrorCategory)> {
        if exit_code == 53 {
            let message = if stderr.is_empty() { "Turn limit exceeded".to_string() } else { stderr.to_string() };
            return Some((message, ErrorCategory::Fatal));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::base::BackendConfig;

    fn params() -> AgentRuntimeParams {
        AgentRuntimeParams {
            prompt: "hi".to_string(),
            session_id: None,
            workspace_dir: "/tmp".to_string(),
            model: None,
            max_turns: None,
            timeout_ms: None,
            auth: ResolvedProviderAuth { mode: AuthMode::ApiKey, api_key: Some("k".to_string()), profile_id: None, source: "t".to_string() },
            abort_signal: None,
        }
    }

    #[test]
    fn prompt_uses_dash_p_flag() {
        let spec = GeminiRuntimeSpec;
        let argv = spec.build_argv(&params(), &BackendConfig::default(), false);
        let idx = argv.iter().position(|a| a == "-p").unwrap();
        assert_eq!(argv[idx + 1], "hi");
    }

    #[test]
    fn extra_args_land_before_per_invocation_flags_and_prompt() {
        let spec = GeminiRuntimeSpec;
        let backend = BackendConfig { extra_args: vec!["--sandbox".to_string()], ..BackendConfig::default() };
        let argv = spec.build_argv(&params(), &backend, false);
        let extra_pos = argv.iter().position(|a| a == "--sandbox").unwrap();
        let prompt_pos = argv.iter().position(|a| a == "-p").unwrap();
        assert!(extra_pos < prompt_pos);
    }

    #[test]
    fn exit_53_with_stderr_reports_stderr_as_fatal() {
        let spec = GeminiRuntimeSpec;
        let (message, category) = spec.classify_exit(53, "Max turns (5) exceeded").unwrap();
        assert_eq!(message, "Max turns (5) exceeded");
        assert_eq!(category, ErrorCategory::Fatal);
    }

    #[test]
    fn exit_53_with_empty_stderr_uses_default_message() {
        let spec = GeminiRuntimeSpec;
        let (message, category) = spec.classify_exit(53, "").unwrap();
        assert_eq!(message, "Turn limit exceeded");
        assert_eq!(category, ErrorCategory::Fatal);
    }

    #[test]
    fn other_exit_codes_fall_back_to_default_policy() {
        let spec = GeminiRuntimeSpec;
        assert!(spec.classify_exit(1, "boom").is_none());
    }
}

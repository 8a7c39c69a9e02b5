//! OpenCode `RuntimeSpec`: `opencode --format json --quiet` mode.
//!
//! Follows the same argv-layering and auth-env-mapping rules as its
//! Claude/Codex/Gemini siblings.

use std::collections::HashMap;

use crate::parsers::opencode::OpenCodeParser;
use crate::runtime::base::{BackendConfig, LineParser, RuntimeSpec};
use crate::types::{AgentRuntimeParams, AuthMode, ResolvedProviderAuth};

pub struct OpenCodeRuntimeSpec;

struct OpenCodeLineParser(OpenCodeParser);

impl LineParser for OpenCodeLineParser {
    fn parse_line(&mut self, line: &str) -> Vec<crate::types::ParsedLine> {
        self.0.parse_line(line)
    }
}

impl RuntimeSpec for OpenCodeRuntimeSpec {
    fn provider_id(&self) -> &'static str {
        "opencode"
    }

    fn default_command(&self) -> &'static str {
        "opencode"
    }

    fn build_argv(&self, params: &AgentRuntimeParams, backend: &BackendConfig, prompt_via_stdin: bool) -> Vec<String> {
        let mut argv = vec!["--format".to_string(), "json".to_string(), "--quiet".to_string()];
        argv.extend(backend.extra_args.iter().cloned());
        if let Some(sid) = &params.session_id {
            argv.push("--session".to_string());
            argv.push(sid.clone());
        }
        if let Some(model) = &params.model {
            argv.push("--model".to_string());
            argv.push(model.clone());
        }
        if !prompt_via_stdin {
            argv.push("--prompt".to_string());
            argv.push(params.prompt.clone());
        }
        argv
    }

    fn auth_env(&self, auth: &ResolvedProviderAuth) -> HashMap<String, String> {
        let mut env = HashMap::new();
        if matches!(auth.mode, AuthMode::ApiKey | AuthMode::Token) {
            if let Some(key) = &auth.api_key {
                env.insert("ANTHROPIC_API_KEY".to_string(), key.clone());
            }
        }
        env
    }

    fn make_parser(&self, child_pid: u32) -> Box<dyn LineParser> {
        Box::new(OpenCodeLineParser(OpenCodeParser::new(child_pid)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::base::BackendConfig;

    fn params() -> AgentRuntimeParams {
        AgentRuntimeParams {
            prompt: "hi".to_string(),
            session_id: Some("oc-1".to_string()),
            workspace_dir: "/tmp".to_string(),
            model: None,
            max_turns: Some(10),
            timeout_ms: None,
            auth: ResolvedProviderAuth { mode: AuthMode::ApiKey, api_key: Some("k".to_string()), profile_id: None, source: "t".to_string() },
            abort_signal: None,
        }
    }

    #[test]
    fn resume_uses_session_flag_and_no_max_turns_flag() {
        let spec = OpenCodeRuntimeSpec;
        let argv = spec.build_argv(&params(), &BackendConfig::default(), false);
        let idx = argv.iter().position(|a| a == "--session").unwrap();
        assert_eq!(argv[idx + 1], "oc-1");
        assert!(!argv.contains(&"--max-turns".to_string()));
    }

    #[test]
    fn extra_args_land_before_per_invocation_flags() {
        let spec = OpenCodeRuntimeSpec;
        let backend = BackendConfig { extra_args: vec!["--verbose".to_string()], ..BackendConfig::default() };
        let argv = spec.build_argv(&params(), &backend, false);
        let extra_pos = argv.iter().position(|a| a == "--verbose").unwrap();
        let session_pos = argv.iter().position(|a| a == "--session").unwrap();
        assert!(extra_pos < session_pos);
    }

    #[test]
    fn token_mode_also_maps_to_anthropic_api_key() {
        let spec = OpenCodeRuntimeSpec;
        let auth = ResolvedProviderAuth { mode: AuthMode::Token, api_key: Some("tok".to_string()), profile_id: None, source: "t".to_string() };
        assert_eq!(spec.auth_env(&auth).get("ANTHROPIC_API_KEY").map(String::as_str), Some("tok"));
    }
}

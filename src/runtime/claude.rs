//! Claude family `RuntimeSpec`: `claude` CLI in `--print --output-format
//! stream-json` mode.

use std::collections::HashMap;

use crate::parsers::claude::parse_line;
use crate::runtime::base::{BackendConfig, LineParser, RuntimeSpec, StatelessParser};
use crate::types::{AgentRuntimeParams, AuthMode, ResolvedProviderAuth};

pub struct ClaudeRuntimeSpec;

impl RuntimeSpec for ClaudeRuntimeSpec {
    fn provider_id(&self) -> &'static str {
        "claude"
    }

    fn default_command(&self) -> &'static str {
        "claude"
    }

    fn build_argv(&self, params: &AgentRuntimeParams, backend: &BackendConfig, prompt_via_stdin: bool) -> Vec<String> {
        let mut argv = vec![
            "--print".to_string(),
            "--output-format".to_string(),
            "stream-json".to_string(),
            "--verbose".to_string(),
            "--dangerously-skip-permissions".to_string(),
        ];
        argv.extend(backend.extra_args.iter().cloned());
        if let Some(sid) = &params.session_id {
            argv.push("--resume".to_string());
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
            argv.push(params.prompt.clone());
        }
        argv
    }

    fn intrinsic_env(&self) -> HashMap<String, String> {
        HashMap::from([("CLAUDECODE".to_string(), String::new())])
    }

    fn auth_env(&self, auth: &ResolvedProviderAuth) -> HashMap<String, String> {
        let mut env = HashMap::new();
        match auth.mode {
            AuthMode::ApiKey => {
                if let Some(key) = &auth.api_key {
                    env.insert("ANTHROPIC_API_KEY".to_string(), key.clone());
                }
            }
            AuthMode::Token | AuthMode::Oauth => {
                if let Some(key) = &auth.api_key {
                    env.insert("CLAUDE_CODE_OAUTH_TOKEN".to_string(), key.clone());
                }
            }
            AuthMode::AwsSdk => {}
        }
        env
    }

    fn make_parser(&self, _child_pid: u32) -> Box<dyn LineParser> {
        Box::new(StatelessParser(parse_line))
    }
}

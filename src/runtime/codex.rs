//! Codex `RuntimeSpec`: `codex exec --json` one-shot mode.
//!
//! Codex never takes a prompt on resume — the resumed thread already has
//! it — and it always strips any inherited `ANTHROPIC_API_KEY` so a stray
//! Claude credential in the parent environment can't leak into an OpenAI
//! run.

use std::collections::HashMap;

use crate::parsers::codex::parse_line;
use crate::runtime::base::{BackendConfig, LineParser, RuntimeSpec, StatelessParser};
use crate::types::{AgentRuntimeParams, AuthMode, ResolvedProviderAuth};

pub struct CodexRuntimeSpec;

impl RuntimeSpec for CodexRuntimeSpec {
    fn provider_id(&self) -> &'static str {
        "codex"
    }

    fn default_command(&self) -> &'static str {
        "codex"
    }

    fn build_argv(&self, params: &AgentRuntimeParams, backend: &BackendConfig, prompt_via_stdin: bool) -> Vec<String> {
        let mut argv = vec!["exec".to_string()];
        if let Some(sid) = &params.session_id {
            argv.push("resume".to_string());
            argv.push(sid.clone());
        }
        argv.push("--json".to_string());
        argv.push("--color".to_string());
        argv.push("never".to_string());
        argv.extend(backend.extra_args.iter().cloned());
        if let Some(model) = &params.model {
            argv.push("--model".to_string());
            argv.push(model.clone());
        }
        if let Some(max_turns) = params.max_turns {
            argv.push("--max-turns".to_string());
            argv.push(max_turns.to_string());
        }
        if params.session_id.is_none() && !prompt_via_stdin {
            argv.push(params.prompt.clone());
        }
        argv
    }

    fn stdin_payload(&self, params: &AgentRuntimeParams, prompt_via_stdin: bool) -> Option<String> {
        if params.session_id.is_some() {
            return None;
        }
        if prompt_via_stdin { Some(params.prompt.clone()) } else { None }
    }

    fn intrinsic_clear_env(&self) -> Vec<String> {
        vec!["ANTHROPIC_API_KEY".to_string()]
    }

    fn auth_env(&self, auth: &ResolvedProviderAuth) -> HashMap<String, String> {
        let mut env = HashMap::new();
        if auth.mode == AuthMode::ApiKey {
            if let Some(key) = &auth.api_key {
                env.insert("OPENAI_API_KEY".to_string(), key.clone());
            }
        }
        env
    }

    fn make_parser(&self, _child_pid: u32) -> Box<dyn LineParser> {
        Box::new(StatelessParser(parse_line))
    }
}

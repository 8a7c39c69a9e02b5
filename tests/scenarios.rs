//! End-to-end runtime scenarios against real child processes (`/bin/sh`).
//! Mock children are `/bin/sh -c` one-liners that print a canned
//! transcript, not a fake-process abstraction.

use std::collections::HashMap;

use remoteclaw_core::runtime::base::{AbortController, BackendConfig, CliRuntime, LineParser, RuntimeSpec, StatelessParser, WatchdogConfig};
use remoteclaw_core::runtime::gemini::GeminiRuntimeSpec;
use remoteclaw_core::types::{AgentEvent, AgentRuntimeParams, AuthMode, ErrorCategory, ResolvedProviderAuth};

struct MockRuntimeSpec;

impl RuntimeSpec for MockRuntimeSpec {
    fn provider_id(&self) -> &'static str {
        "mock"
    }

    fn default_command(&self) -> &'static str {
        "/bin/sh"
    }

    fn build_argv(&self, _params: &AgentRuntimeParams, backend: &BackendConfig, _prompt_via_stdin: bool) -> Vec<String> {
        backend.extra_args.clone()
    }

    fn auth_env(&self, _auth: &ResolvedProviderAuth) -> HashMap<String, String> {
        HashMap::new()
    }

    fn make_parser(&self, _child_pid: u32) -> Box<dyn LineParser> {
        Box::new(StatelessParser(remoteclaw_core::parsers::claude::parse_line))
    }
}

/// Delegates exit classification to the real Gemini policy (exit 53 is
/// always fatal); `build_argv` passes `backend.extra_args` straight through
/// so the mock shell script is the only thing in argv.
struct MockGeminiExitSpec;

impl RuntimeSpec for MockGeminiExitSpec {
    fn provider_id(&self) -> &'static str {
        "mock-gemini"
    }

    fn default_command(&self) -> &'static str {
        "/bin/sh"
    }

    fn build_argv(&self, _params: &AgentRuntimeParams, backend: &BackendConfig, _prompt_via_stdin: bool) -> Vec<String> {
        backend.extra_args.clone()
    }

    fn auth_env(&self, _auth: &ResolvedProviderAuth) -> HashMap<String, String> {
        HashMap::new()
    }

    fn make_parser(&self, _child_pid: u32) -> Box<dyn LineParser> {
        Box::new(StatelessParser(remoteclaw_core::parsers::claude::parse_line))
    }

    fn classify_exit(&self, exit_code: i32, stderr: &str) -> Option<(String, ErrorCategory)> {
        GeminiRuntimeSpec.classify_exit(exit_code, stderr)
    }
}

fn params() -> AgentRuntimeParams {
    AgentRuntimeParams {
        prompt: "hello".to_string(),
        session_id: None,
        workspace_dir: "/tmp".to_string(),
        model: None,
        max_turns: None,
        timeout_ms: Some(5_000),
        auth: ResolvedProviderAuth { mode: AuthMode::ApiKey, api_key: Some("k".to_string()), profile_id: None, source: "test".to_string() },
        abort_signal: None,
    }
}

fn shell_script(script: impl Into<String>) -> BackendConfig {
    BackendConfig { extra_args: vec!["-c".to_string(), script.into()], ..BackendConfig::default() }
}

#[tokio::test]
async fn fresh_claude_turn_end_to_end() {
    let transcript = [
        r#"{"type":"system","subtype":"init","session_id":"s-1"}"#,
        r#"{"type":"assistant","session_id":"s-1","message":{"content":[{"type":"text","text":"Hi"}]}}"#,
        r#"{"type":"result","session_id":"s-1","usage":{"input_tokens":10,"output_tokens":1}}"#,
    ]
    .join("\\n");

    let runtime = CliRuntime::new(std::sync::Arc::new(MockRuntimeSpec), shell_script(format!("printf '{transcript}\\n'")));
    let mut receiver = runtime.execute(params()).await.unwrap();

    let mut texts = Vec::new();
    let mut done = None;
    while let Some(event) = receiver.recv().await {
        match event {
            AgentEvent::Text { text } => texts.push(text),
            AgentEvent::Error { .. } => panic!("unexpected error event"),
            AgentEvent::Done { result } => done = Some(result),
            _ => {}
        }
    }

    assert_eq!(texts, vec!["Hi".to_string()]);
    let result = done.expect("a done event");
    assert_eq!(result.text, "Hi");
    assert_eq!(result.session_id.as_deref(), Some("s-1"));
    assert_eq!(result.usage.as_ref().and_then(|u| u.input_tokens), Some(10));
    assert_eq!(result.usage.as_ref().and_then(|u| u.output_tokens), Some(1));
    assert!(!result.aborted);
}

#[tokio::test]
async fn exit_zero_with_empty_stdout_produces_done_with_empty_text_and_no_error() {
    let runtime = CliRuntime::new(std::sync::Arc::new(MockRuntimeSpec), shell_script("true"));
    let mut receiver = runtime.execute(params()).await.unwrap();

    let mut saw_error = false;
    let mut done = None;
    while let Some(event) = receiver.recv().await {
        match event {
            AgentEvent::Error { .. } => saw_error = true,
            AgentEvent::Done { result } => done = Some(result),
            _ => {}
        }
    }

    assert!(!saw_error);
    let result = done.expect("a done event");
    assert_eq!(result.text, "");
    assert!(!result.aborted);
}

#[tokio::test]
async fn aborting_before_any_output_yields_one_aborted_error_and_an_aborted_done() {
    let controller = AbortController::new();
    let mut run_params = params();
    run_params.abort_signal = Some(controller.signal());

    let runtime = CliRuntime::new(std::sync::Arc::new(MockRuntimeSpec), shell_script("sleep 5"));
    let mut receiver = runtime.execute(run_params).await.unwrap();

    controller.abort();

    let mut errors = Vec::new();
    let mut done = None;
    while let Some(event) = receiver.recv().await {
        match event {
            AgentEvent::Error { message, category } => errors.push((message, category)),
            AgentEvent::Done { result } => done = Some(result),
            _ => {}
        }
    }

    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].1, ErrorCategory::Aborted);
    let result = done.expect("a done event");
    assert!(result.aborted);
    assert_eq!(result.text, "");
}

#[tokio::test]
async fn gemini_turn_limit_exit_is_fatal_with_the_exact_stderr_message() {
    let runtime = CliRuntime::new(std::sync::Arc::new(MockGeminiExitSpec), shell_script("echo 'Max turns (5) exceeded' >&2; exit 53"));
    let mut receiver = runtime.execute(params()).await.unwrap();

    let mut errors = Vec::new();
    let mut done = None;
    while let Some(event) = receiver.recv().await {
        match event {
            AgentEvent::Error { message, category } => errors.push((message, category)),
            AgentEvent::Done { result } => done = Some(result),
            _ => {}
        }
    }

    assert_eq!(errors, vec![("Max turns (5) exceeded".to_string(), ErrorCategory::Fatal)]);
    assert!(!done.expect("a done event").aborted);
}

#[tokio::test]
async fn watchdog_fires_when_the_child_never_writes() {
    let mut run_params = params();
    run_params.timeout_ms = Some(60_000);
    let backend = BackendConfig {
        extra_args: vec!["-c".to_string(), "sleep 5".to_string()],
        fresh: WatchdogConfig { no_output_timeout_ms: Some(50) },
        ..BackendConfig::default()
    };

    let runtime = CliRuntime::new(std::sync::Arc::new(MockRuntimeSpec), backend);
    let mut receiver = runtime.execute(run_params).await.unwrap();

    let mut errors = Vec::new();
    let mut done = None;
    while let Some(event) = receiver.recv().await {
        match event {
            AgentEvent::Error { message, category } => errors.push((message, category)),
            AgentEvent::Done { result } => done = Some(result),
            _ => {}
        }
    }

    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].1, ErrorCategory::Timeout);
    assert!(errors[0].0.contains("watchdog"));
    assert!(done.expect("a done event").aborted);
}

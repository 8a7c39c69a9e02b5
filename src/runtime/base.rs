//! Component C: the CLI runtime base — spawns a child, streams its stdout
//! through a family-specific parser, enforces the total timeout and
//! no-output watchdog, and terminates the child on abort or completion.
//!
//! Component D implementations (see the sibling modules) plug into this
//! base via [`RuntimeSpec`], supplying only the family-specific argv/env
//! construction and exit-code policy. The spawn/stream/timeout/abort
//! skeleton itself is shared, generalizing the one-trait-per-provider
//! duplication this crate's ancestor used for Claude/Codex/Gemini into a
//! single engine.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::time::Instant as TokioInstant;

use crate::classify::classify;
use crate::error::{AgentError, AgentResult};
use crate::events::{self, EventEmitter, EventReceiver};
use crate::types::{AgentEvent, AgentRunResult, AgentRuntimeParams, ErrorCategory, ParsedLine, ResolvedProviderAuth};

// ---------------------------------------------------------------------------
// Abort signal
// ---------------------------------------------------------------------------

/// Owns the cancellation flag for one run. Dropping the controller does not
/// itself cancel the run — call [`AbortController::abort`] explicitly.
#[derive(Debug, Clone)]
pub struct AbortController(Arc<AtomicBool>);

impl AbortController {
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    #[must_use]
    pub fn signal(&self) -> AbortSignal {
        AbortSignal(self.0.clone())
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::Release);
    }
}

impl Default for AbortController {
    fn default() -> Self {
        Self::new()
    }
}

/// A read-only handle a runtime polls to learn whether the caller cancelled
/// the run.
#[derive(Debug, Clone)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Resolves once the signal has been raised. Polls on a short interval;
    /// there is no platform waker to hook into for a plain atomic flag.
    pub async fn cancelled(&self) {
        while !self.is_aborted() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Backend configuration (ambient; operator overrides)
// ---------------------------------------------------------------------------

/// Per-provider operator overrides: command, extra argv/env, env to strip,
/// and explicit watchdog bounds. Plain data, no I/O — the gateway binary is
/// responsible for loading this from wherever it keeps configuration.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub extra_args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub clear_env: Vec<String>,
    #[serde(default)]
    pub fresh: WatchdogConfig,
    #[serde(default)]
    pub resume: WatchdogConfig,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct WatchdogConfig {
    #[serde(default)]
    pub no_output_timeout_ms: Option<u64>,
}

// ---------------------------------------------------------------------------
// LineParser — per-run parser state
// ---------------------------------------------------------------------------

/// A stateful per-run parser. Most families are pure functions, wrapped in
/// [`StatelessParser`]; OpenCode needs a per-run tool-id counter seeded
/// from the child's pid, so it gets its own impl.
pub trait LineParser: Send {
    fn parse_line(&mut self, line: &str) -> Vec<ParsedLine>;
}

/// Adapts a stateless `fn(&str) -> Vec<ParsedLine>` into a [`LineParser`].
pub struct StatelessParser(pub fn(&str) -> Vec<ParsedLine>);

impl LineParser for StatelessParser {
    fn parse_line(&mut self, line: &str) -> Vec<ParsedLine> {
        (self.0)(line)
    }
}

// ---------------------------------------------------------------------------
// RuntimeSpec — component D's contract with the base
// ---------------------------------------------------------------------------

/// What one CLI family contributes to the shared runtime base: its command
/// name, argv/env construction, and any exit-code overrides.
pub trait RuntimeSpec: Send + Sync {
    /// Normalized provider id, e.g. `"claude"`.
    fn provider_id(&self) -> &'static str;

    /// Default command name, overridable by `backend.command`.
    fn default_command(&self) -> &'static str;

    /// Canonical argv order: intrinsic protocol flags, then `backend.extra_args`
    /// (inserted by the implementation, immediately after its own protocol
    /// flags), then per-invocation flags, then the prompt/resume positional
    /// — unless `prompt_via_stdin` is set, in which case the prompt
    /// positional/flag is dropped. Operator extra args must never land
    /// after a per-invocation flag or the prompt positional, or they'd mask
    /// the former (last-wins argv parsing) or become a stray positional
    /// (the latter).
    fn build_argv(&self, params: &AgentRuntimeParams, backend: &BackendConfig, prompt_via_stdin: bool) -> Vec<String>;

    /// Env vars this family always sets regardless of operator config,
    /// e.g. Claude's `CLAUDECODE=""`. Applied after operator `env`, before
    /// auth env.
    fn intrinsic_env(&self) -> HashMap<String, String> {
        HashMap::new()
    }

    /// Env vars this family always strips from the inherited parent env,
    /// regardless of operator `clear_env`, e.g. Codex stripping
    /// `ANTHROPIC_API_KEY`.
    fn intrinsic_clear_env(&self) -> Vec<String> {
        Vec::new()
    }

    /// Map resolved auth into the env vars the child expects.
    fn auth_env(&self, auth: &ResolvedProviderAuth) -> HashMap<String, String>;

    /// Above this many characters, the prompt is written to stdin instead
    /// of argv.
    fn long_prompt_threshold(&self) -> usize {
        10_000
    }

    /// What to write to the child's stdin, if anything. `prompt_via_stdin`
    /// is true when the prompt exceeded `long_prompt_threshold`. Codex
    /// overrides this to never write a prompt at all when resuming.
    fn stdin_payload(&self, params: &AgentRuntimeParams, prompt_via_stdin: bool) -> Option<String> {
        if prompt_via_stdin { Some(params.prompt.clone()) } else { None }
    }

    /// Build a fresh per-run parser (stateful for OpenCode, stateless for
    /// everyone else).
    fn make_parser(&self, child_pid: u32) -> Box<dyn LineParser>;

    /// Override the default exit-code classification. Returning `None`
    /// falls back to the base's default policy (stderr through the error
    /// classifier, or a generic "Process exited with code N" message).
    fn classify_exit(&self, _exit_code: i32, _stderr: &str) -> Option<(String, ErrorCategory)> {
        None
    }
}

// ---------------------------------------------------------------------------
// Watchdog defaults
// ---------------------------------------------------------------------------

/// Default no-output watchdog window when the backend supplies none.
/// Fresh runs: `min(max(0.8 * total, 180_000), 600_000)` ms. Resume runs
/// get a distinct, larger bound (hydrating server-side state can be slow)
/// — 1.5x the fresh bound, capped at 900_000 ms.
fn default_watchdog_ms(total_timeout_ms: Option<u64>, resume: bool) -> u64 {
    let total = total_timeout_ms.unwrap_or(0) as f64;
    let fresh = (0.8 * total).clamp(180_000.0, 600_000.0);
    if resume { (fresh * 1.5).min(900_000.0) as u64 } else { fresh as u64 }
}

fn watchdog_ms(resume: bool, backend: &BackendConfig, total_timeout_ms: Option<u64>) -> u64 {
    let explicit = if resume { backend.resume.no_output_timeout_ms } else { backend.fresh.no_output_timeout_ms };
    match explicit {
        Some(ms) => ms.max(1_000),
        None => default_watchdog_ms(total_timeout_ms, resume),
    }
}

// ---------------------------------------------------------------------------
// Secret masking
// ---------------------------------------------------------------------------

/// Mask env values before they reach a log line: keep a 4-char prefix and
/// suffix, collapse the middle; values under 10 chars are masked entirely.
/// Indexes by `char`, not byte, so a multi-byte character straddling the
/// cut point never panics.
#[must_use]
pub fn mask_env_for_log(env: &HashMap<String, String>) -> HashMap<String, String> {
    env.iter()
        .map(|(k, v)| {
            let chars: Vec<char> = v.chars().collect();
            let masked = if chars.len() < 10 {
                "***".to_string()
            } else {
                let prefix: String = chars[..4].iter().collect();
                let suffix: String = chars[chars.len() - 4..].iter().collect();
                format!("{prefix}…{suffix}")
            };
            (k.clone(), masked)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// CliRuntime
// ---------------------------------------------------------------------------

/// A configured runtime: one [`RuntimeSpec`] plus its operator backend
/// config, ready to execute any number of runs.
pub struct CliRuntime {
    spec: Arc<dyn RuntimeSpec>,
    backend: BackendConfig,
}

impl CliRuntime {
    #[must_use]
    pub fn new(spec: Arc<dyn RuntimeSpec>, backend: BackendConfig) -> Self {
        Self { spec, backend }
    }

    #[must_use]
    pub fn provider_id(&self) -> &'static str {
        self.spec.provider_id()
    }

    /// Spawn the child and return an [`EventReceiver`] the caller iterates
    /// in real time. Only failures that occur before any event could have
    /// been produced — the binary is missing, or `spawn` itself fails —
    /// are returned as an `Err`; everything after that point is folded
    /// into the event stream so the contract "always exactly one `done`"
    /// holds for any run that actually started.
    pub async fn execute(&self, params: AgentRuntimeParams) -> AgentResult<EventReceiver> {
        let spawned_at = TokioInstant::now();
        let command_name = self.backend.command.clone().unwrap_or_else(|| self.spec.default_command().to_string());

        which::which(&command_name).map_err(|_| AgentError::CliNotFound { binary: command_name.clone() })?;

        let resume = params.session_id.is_some();
        let prompt_via_stdin = params.prompt.len() > self.spec.long_prompt_threshold();

        let argv = self.spec.build_argv(&params, &self.backend, prompt_via_stdin);

        let env = self.build_env(&params);
        tracing::info!(
            provider = self.spec.provider_id(),
            command = %command_name,
            argv = ?argv,
            env = ?mask_env_for_log(&env),
            "spawning CLI runtime"
        );

        let mut cmd = Command::new(&command_name);
        cmd.args(&argv)
            .current_dir(&params.workspace_dir)
            .env_clear()
            .envs(&env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| AgentError::SpawnFailed { command: command_name.clone(), message: e.to_string() })?;

        let stdin_payload = self.spec.stdin_payload(&params, prompt_via_stdin);
        let child_pid = child.id().unwrap_or(0);
        let parser = self.spec.make_parser(child_pid);
        let total_timeout_ms = params.timeout_ms.filter(|ms| *ms > 0);
        let watchdog_window_ms = watchdog_ms(resume, &self.backend, total_timeout_ms);
        let abort = params.abort_signal.clone();
        let spec = self.spec.clone();

        let stdin = child.stdin.take().expect("stdin piped");
        let stdout = child.stdout.take().expect("stdout piped");
        let stderr = child.stderr.take().expect("stderr piped");

        let (emitter, receiver) = events::channel();

        tokio::spawn(run_stream(RunContext {
            spec,
            child,
            stdin,
            stdout,
            stderr,
            stdin_payload,
            parser,
            emitter,
            abort,
            total_timeout_ms,
            watchdog_window_ms,
            spawned_at,
        }));

        Ok(receiver)
    }

    fn build_env(&self, params: &AgentRuntimeParams) -> HashMap<String, String> {
        let mut env: HashMap<String, String> = std::env::vars().collect();
        for key in self.spec.intrinsic_clear_env().iter().chain(self.backend.clear_env.iter()) {
            env.remove(key);
        }
        env.extend(self.backend.env.clone());
        env.extend(self.spec.intrinsic_env());
        env.extend(self.spec.auth_env(&params.auth));
        env
    }
}

struct RunContext {
    spec: Arc<dyn RuntimeSpec>,
    child: Child,
    stdin: tokio::process::ChildStdin,
    stdout: tokio::process::ChildStdout,
    stderr: tokio::process::ChildStderr,
    stdin_payload: Option<String>,
    parser: Box<dyn LineParser>,
    emitter: EventEmitter,
    abort: Option<AbortSignal>,
    total_timeout_ms: Option<u64>,
    watchdog_window_ms: u64,
    spawned_at: TokioInstant,
}

enum StopReason {
    Eof,
    Aborted,
    TotalTimeout,
    Watchdog,
    ReadError,
}

async fn run_stream(mut ctx: RunContext) {
    if let Some(payload) = ctx.stdin_payload.take() {
        let _ = ctx.stdin.write_all(payload.as_bytes()).await;
    }
    drop(ctx.stdin);

    let stderr_task = tokio::spawn(async move {
        let mut stderr = ctx.stderr;
        let mut buf = String::new();
        let _ = stderr.read_to_string(&mut buf).await;
        buf
    });

    let mut accumulated_text = String::new();
    let mut latest_session_id = None;
    let mut latest_usage = None;
    let mut latest_meta: Option<crate::types::ResultMeta> = None;
    let mut pending = String::new();
    let mut buf = [0u8; 8192];
    let mut last_chunk_at = TokioInstant::now();
    let total_deadline = ctx.total_timeout_ms.map(|ms| ctx.spawned_at + Duration::from_millis(ms));

    let stop = loop {
        let watchdog_deadline = last_chunk_at + Duration::from_millis(ctx.watchdog_window_ms);

        let abort_fut = async {
            match &ctx.abort {
                Some(signal) => signal.cancelled().await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            () = abort_fut => break StopReason::Aborted,
            () = deadline_sleep(total_deadline) => break StopReason::TotalTimeout,
            () = tokio::time::sleep_until(watchdog_deadline) => break StopReason::Watchdog,
            result = ctx.stdout.read(&mut buf) => {
                match result {
                    Ok(0) => break StopReason::Eof,
                    Ok(n) => {
                        last_chunk_at = TokioInstant::now();
                        pending.push_str(&String::from_utf8_lossy(&buf[..n]));
                        while let Some(pos) = pending.find('\n') {
                            let line: String = pending.drain(..=pos).collect();
                            emit_parsed_lines(
                                ctx.parser.parse_line(line.trim_end_matches('\n')),
                                &ctx.emitter,
                                &mut accumulated_text,
                                &mut latest_session_id,
                                &mut latest_usage,
                                &mut latest_meta,
                            );
                        }
                    }
                    Err(_) => break StopReason::ReadError,
                }
            }
        }
    };

    if !pending.trim().is_empty() {
        emit_parsed_lines(
            ctx.parser.parse_line(&pending),
            &ctx.emitter,
            &mut accumulated_text,
            &mut latest_session_id,
            &mut latest_usage,
            &mut latest_meta,
        );
    }

    let aborted_flag = matches!(stop, StopReason::Aborted | StopReason::TotalTimeout | StopReason::Watchdog);

    match stop {
        StopReason::Aborted => {
            abort_child(&mut ctx.child).await;
            ctx.emitter.emit(AgentEvent::Error { message: "Aborted".to_string(), category: ErrorCategory::Aborted });
        }
        StopReason::TotalTimeout => {
            kill_child(&mut ctx.child).await;
            let ms = ctx.total_timeout_ms.unwrap_or(0);
            ctx.emitter.emit(AgentEvent::Error {
                message: format!("Execution timed out after {ms}ms"),
                category: ErrorCategory::Timeout,
            });
        }
        StopReason::Watchdog => {
            kill_child(&mut ctx.child).await;
            ctx.emitter.emit(AgentEvent::Error {
                message: format!("No output for {}ms (watchdog)", ctx.watchdog_window_ms),
                category: ErrorCategory::Timeout,
            });
        }
        StopReason::Eof | StopReason::ReadError => {
            let status = ctx.child.wait().await.ok();
            let success = status.as_ref().is_some_and(|s| s.success());
            if !success {
                let code = status.and_then(|s| s.code()).unwrap_or(-1);
                let stderr_text = stderr_task.await.unwrap_or_default();
                let (message, category) = ctx
                    .spec
                    .classify_exit(code, stderr_text.trim())
                    .unwrap_or_else(|| default_exit_classification(code, stderr_text.trim()));
                ctx.emitter.emit(AgentEvent::Error { message, category });
            }
        }
    }

    let duration_ms = ctx.spawned_at.elapsed().as_millis() as u64;
    let meta = latest_meta.unwrap_or_default();
    ctx.emitter.emit(AgentEvent::Done {
        result: AgentRunResult {
            text: accumulated_text,
            session_id: latest_session_id,
            duration_ms,
            usage: latest_usage,
            aborted: aborted_flag,
            total_cost_usd: meta.total_cost_usd,
            api_duration_ms: meta.api_duration_ms,
            num_turns: meta.num_turns,
            stop_reason: meta.stop_reason,
            error_subtype: meta.error_subtype,
            permission_denials: meta.permission_denials,
        },
    });
}

async fn deadline_sleep(deadline: Option<TokioInstant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending::<()>().await,
    }
}

fn emit_parsed_lines(
    lines: Vec<ParsedLine>,
    emitter: &EventEmitter,
    accumulated_text: &mut String,
    latest_session_id: &mut Option<String>,
    latest_usage: &mut Option<crate::types::AgentUsage>,
    latest_meta: &mut Option<crate::types::ResultMeta>,
) {
    for parsed in lines {
        if let Some(sid) = parsed.session_id {
            *latest_session_id = Some(sid);
        }
        if let Some(usage) = parsed.usage {
            *latest_usage = Some(usage);
        }
        if let Some(meta) = parsed.result_meta {
            *latest_meta = Some(meta);
        }
        if let Some(event) = parsed.event {
            if let AgentEvent::Text { text } = &event {
                accumulated_text.push_str(text);
            }
            emitter.emit(event);
        }
    }
}

fn default_exit_classification(code: i32, stderr: &str) -> (String, ErrorCategory) {
    let text = if stderr.is_empty() { format!("Process exited with code {code}") } else { stderr.to_string() };
    let category = classify(&text);
    (text, category)
}

async fn kill_child(child: &mut Child) {
    let _ = child.start_kill();
    let _ = child.wait().await;
}

/// SIGTERM, then a 5s grace period, then SIGKILL if still alive.
async fn abort_child(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        send_signal(pid as i32, libc::SIGTERM);
    }
    #[cfg(not(unix))]
    {
        let _ = child.start_kill();
    }

    tokio::select! {
        _ = child.wait() => {}
        () = tokio::time::sleep(Duration::from_secs(5)) => {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
    }
}

#[cfg(unix)]
fn send_signal(pid: i32, sig: i32) {
    // SAFETY: `pid` is the live child's own pid, obtained from `Child::id`;
    // signaling it is equivalent to `Child::start_kill` except for the
    // choice of signal.
    unsafe {
        libc::kill(pid, sig);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_watchdog_default_is_80_percent_of_total_clamped() {
        assert_eq!(default_watchdog_ms(Some(300_000), false), 240_000);
        assert_eq!(default_watchdog_ms(Some(10_000), false), 180_000);
        assert_eq!(default_watchdog_ms(Some(10_000_000), false), 600_000);
    }

    #[test]
    fn resume_watchdog_default_is_larger_than_fresh() {
        let fresh = default_watchdog_ms(Some(300_000), false);
        let resume = default_watchdog_ms(Some(300_000), true);
        assert!(resume > fresh);
        assert_eq!(resume, 360_000);
    }

    #[test]
    fn resume_watchdog_default_is_capped_at_900_seconds() {
        assert_eq!(default_watchdog_ms(Some(10_000_000), true), 900_000);
    }

    #[test]
    fn explicit_backend_watchdog_overrides_default_with_a_floor() {
        let backend = BackendConfig { fresh: WatchdogConfig { no_output_timeout_ms: Some(10) }, ..BackendConfig::default() };
        assert_eq!(watchdog_ms(false, &backend, Some(300_000)), 1_000);
    }

    #[test]
    fn short_values_are_masked_entirely() {
        let env = HashMap::from([("TOKEN".to_string(), "short".to_string())]);
        assert_eq!(mask_env_for_log(&env).get("TOKEN").map(String::as_str), Some("***"));
    }

    #[test]
    fn long_values_keep_prefix_and_suffix() {
        let env = HashMap::from([("TOKEN".to_string(), "sk-ant-abcdefghijklmnop".to_string())]);
        assert_eq!(mask_env_for_log(&env).get("TOKEN").map(String::as_str), Some("sk-a…mnop"));
    }

    #[test]
    fn multibyte_values_are_masked_without_panicking() {
        let value: String = std::iter::repeat('é').take(12).collect();
        let env = HashMap::from([("TOKEN".to_string(), value)]);
        let masked = mask_env_for_log(&env);
        assert_eq!(masked.get("TOKEN").map(String::as_str), Some("éééé…éééé"));
    }
}

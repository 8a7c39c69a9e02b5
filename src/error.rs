//! Operational error hierarchy for the gateway core.
//!
//! Distinct from [`crate::types::ErrorCategory`], which rides inside an
//! `AgentEvent::Error`/`ChannelReply` and classifies *model/process*
//! failures. `AgentError` covers failures this crate's own code can raise
//! before or around a run — spawn failures, auth resolution, session-map
//! I/O — each surfaced as a `Result` to its caller.

use std::fmt;

/// The result type for core operations.
pub type AgentResult<T> = Result<T, AgentError>;

/// All match arms in classification methods are exhaustive (no wildcards)
/// so that adding a new variant forces a compile-time decision.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AgentError {
    /// The configured CLI binary could not be found on `PATH`.
    #[error("CLI binary not found: {binary}")]
    CliNotFound { binary: String },

    /// `Command::spawn` failed.
    #[error("failed to spawn {command}: {message}")]
    SpawnFailed { command: String, message: String },

    /// Writing the prompt to the child's stdin failed.
    #[error("failed to write to child stdin: {message}")]
    StdinWriteFailed { message: String },

    /// Waiting on the child process failed.
    #[error("failed to wait for child: {message}")]
    ChildWaitFailed { message: String },

    /// General I/O error (session map, auth store).
    #[error("i/o error: {message}")]
    Io { message: String },

    /// No profile produced usable credentials for a provider.
    #[error("auth resolution failed for provider '{provider}': {message}")]
    AuthResolutionFailed { provider: String, message: String },

    /// The runtime factory has no runtime registered for this provider id.
    #[error("No CLI runtime registered for provider: {provider}")]
    NoRuntimeForProvider { provider: String },
}

impl AgentError {
    /// A short error code suitable for logging or event payloads.
    ///
    /// All arms are listed explicitly — no wildcards — so adding a new
    /// variant produces a compile error until classified.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::CliNotFound { .. } => "CLI_NOT_FOUND",
            Self::SpawnFailed { .. } => "SPAWN_FAILED",
            Self::StdinWriteFailed { .. } => "STDIN_WRITE_FAILED",
            Self::ChildWaitFailed { .. } => "CHILD_WAIT_FAILED",
            Self::Io { .. } => "IO_ERROR",
            Self::AuthResolutionFailed { .. } => "AUTH_RESOLUTION_FAILED",
            Self::NoRuntimeForProvider { .. } => "NO_RUNTIME_FOR_PROVIDER",
        }
    }

    /// Whether this error happens before a child is spawned, i.e. the
    /// bridge should synthesize an `error` + `done` pair rather than ever
    /// having started a runtime.
    #[must_use]
    pub fn is_pre_spawn(&self) -> bool {
        match self {
            Self::CliNotFound { .. }
            | Self::SpawnFailed { .. }
            | Self::AuthResolutionFailed { .. }
            | Self::NoRuntimeForProvider { .. } => true,

            Self::StdinWriteFailed { .. } | Self::ChildWaitFailed { .. } | Self::Io { .. } => false,
        }
    }

    /// Convert an `io::Error` into the most specific `AgentError` variant,
    /// using `path` for context in the error message.
    pub fn from_io(err: std::io::Error, path: &std::path::Path) -> Self {
        Self::Io {
            message: format!("{}: {err}", path.display()),
        }
    }
}

/// Serialize `AgentError` as a JSON object with `code` and `message`
/// fields, matching the shape the bridge attaches to a `ChannelReply`.
impl serde::Serialize for AgentError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("AgentError", 2)?;
        s.serialize_field("code", self.code())?;
        s.serialize_field("message", &fmt::format(format_args!("{self}")))?;
        s.end()
    }
}

//! A gateway that runs coding-assistant CLIs (Claude Code, Codex, Gemini,
//! OpenCode, and Claude-compatible forks) as child processes on behalf of a
//! chat surface, normalizing each family's NDJSON protocol into one typed
//! event stream.
//!
//! The pieces, bottom-up:
//!
//! - [`classify`] turns free-form stderr/exit text into an [`types::ErrorCategory`].
//! - [`parsers`] turn one family's NDJSON lines into [`types::ParsedLine`]s.
//! - [`runtime::base`] is the shared spawn/stream/timeout/abort engine every
//!   family plugs into via [`runtime::base::RuntimeSpec`].
//! - [`runtime::claude`], [`runtime::codex`], [`runtime::gemini`], and
//!   [`runtime::opencode`] are the per-family `RuntimeSpec` implementations.
//! - [`runtime::factory`] resolves a provider id to a configured runtime.
//! - [`session_map`] persists the `(channel, user, thread) -> sessionId` map
//!   a resumed conversation needs.
//! - [`auth::resolver`] rotates between configured credential profiles.
//! - [`bridge`] ties all of the above into one `handle()` call per message.

pub mod auth;
pub mod bridge;
pub mod classify;
pub mod error;
pub mod events;
pub mod parsers;
pub mod runtime;
pub mod session_map;
pub mod types;

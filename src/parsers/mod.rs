//! Component B: one NDJSON parser per CLI family.
//!
//! Every parser turns one UTF-8 text line into zero or more [`ParsedLine`]
//! records. None of them ever panic or propagate an error — unparseable
//! input is silently dropped, per the universal parser contract.

pub mod claude;
pub mod codex;
pub mod gemini;
pub mod opencode;

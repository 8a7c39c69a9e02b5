//! Component C/D/E: the shared CLI runtime engine, one `RuntimeSpec` per
//! family, and the factory that wires a provider id to a configured
//! runtime.

pub mod base;
pub mod claude;
pub mod codex;
pub mod factory;
pub mod gemini;
pub mod opencode;

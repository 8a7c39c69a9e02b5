//! Component A: classify a free-form error string into an [`ErrorCategory`].
//!
//! Used whenever a runtime has only text to go on — stderr from a
//! non-zero exit, or a parser-reported `error` envelope that doesn't carry
//! its own category.

use crate::types::ErrorCategory;

const RETRYABLE_PATTERNS: &[&str] = &[
    "rate limit",
    "429",
    "503",
    "overloaded",
    "etimedout",
    "econnreset",
    "econnrefused",
    "network",
];

const CONTEXT_OVERFLOW_PATTERNS: &[&str] = &[
    "context length",
    "context window",
    "context overflow",
    "too many tokens",
    "maximum context",
    "token limit",
];

const FATAL_AUTH_PATTERNS: &[&str] = &[
    "401",
    "403",
    "unauthorized",
    "forbidden",
    "invalid key",
    "authentication",
];

/// Classify `message` into an [`ErrorCategory`]. Matching is case
/// insensitive and substring-based; the first matching rule wins, in this
/// order: retryable, context overflow, fatal auth. Anything else is
/// `fatal`.
#[must_use]
pub fn classify(message: &str) -> ErrorCategory {
    let lower = message.to_lowercase();

    if RETRYABLE_PATTERNS.iter().any(|p| lower.contains(p)) {
        return ErrorCategory::Retryable;
    }
    if CONTEXT_OVERFLOW_PATTERNS.iter().any(|p| lower.contains(p)) {
        return ErrorCategory::ContextOverflow;
    }
    if FATAL_AUTH_PATTERNS.iter().any(|p| lower.contains(p)) {
        return ErrorCategory::Fatal;
    }
    ErrorCategory::Fatal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_patterns() {
        assert_eq!(classify("Rate limit exceeded"), ErrorCategory::Retryable);
        assert_eq!(classify("HTTP 429 Too Many Requests"), ErrorCategory::Retryable);
        assert_eq!(classify("upstream is overloaded"), ErrorCategory::Retryable);
        assert_eq!(classify("connect ECONNREFUSED 127.0.0.1:443"), ErrorCategory::Retryable);
    }

    #[test]
    fn context_overflow_patterns() {
        assert_eq!(classify("maximum context length exceeded"), ErrorCategory::ContextOverflow);
        assert_eq!(classify("too many tokens in request"), ErrorCategory::ContextOverflow);
    }

    #[test]
    fn fatal_auth_patterns() {
        assert_eq!(classify("401 Unauthorized"), ErrorCategory::Fatal);
        assert_eq!(classify("invalid key provided"), ErrorCategory::Fatal);
    }

    #[test]
    fn default_is_fatal() {
        assert_eq!(classify("something unexpected happened"), ErrorCategory::Fatal);
    }

    #[test]
    fn case_insensitive() {
        assert_eq!(classify("RATE LIMIT HIT"), ErrorCategory::Retryable);
    }

    #[test]
    fn retryable_precedes_context_overflow_in_order() {
        // "network" matches retryable before context patterns are checked.
        assert_eq!(classify("network error: context length unknown"), ErrorCategory::Retryable);
    }
}

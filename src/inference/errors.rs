//! Inference error types.
//!
//! All errors implement `std::error::Error` via `thiserror`. Structured logging
//! is the caller's responsibility; these types carry the provider/model context
//! needed to build meaningful log entries.

use thiserror::Error;

/// Maximum number of characters of an upstream error body kept in an error.
pub const ERROR_BODY_PREFIX_CHARS: usize = 200;

/// Errors that can occur while calling upstream providers.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// The call did not complete within its budget.
    #[error("{provider}/{model} timed out after {duration_ms}ms")]
    Timeout {
        provider: String,
        model: String,
        duration_ms: u64,
    },

    /// Non-2xx HTTP response from the provider endpoint.
    #[error("{provider}/{model} returned HTTP {status}: {body}")]
    UpstreamError {
        provider: String,
        model: String,
        status: u16,
        body: String,
    },

    /// TCP/TLS/HTTP-level failure before a status line was received.
    #[error("{provider}/{model} connection failed: {reason}")]
    ConnectionFailed {
        provider: String,
        model: String,
        reason: String,
    },

    /// A 2xx response whose body is not a chat completion.
    #[error("{provider}/{model} returned a malformed response: {reason}")]
    MalformedResponse {
        provider: String,
        model: String,
        reason: String,
    },

    /// No credential (or no endpoint) is configured for a candidate.
    #[error("no credential for {model} ({reason})")]
    MissingCredential { model: String, reason: String },

    /// Every candidate in a tier failed or was skipped.
    #[error("all models failed: {}", errors.join("; "))]
    AllCandidatesExhausted { errors: Vec<String> },

    /// The request itself could not be built. Not a provider failure.
    #[error("invalid request for {model}: {reason}")]
    InvalidRequest { model: String, reason: String },

    /// Configuration loading or validation error.
    #[error("config error: {reason}")]
    ConfigError { reason: String },
}

impl InferenceError {
    /// Whether the fallback executor should move on to the next candidate.
    ///
    /// `InvalidRequest` and `ConfigError` describe bugs or broken setup on
    /// our side; retrying them against another provider would hide them.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            InferenceError::Timeout { .. }
                | InferenceError::UpstreamError { .. }
                | InferenceError::ConnectionFailed { .. }
                | InferenceError::MalformedResponse { .. }
                | InferenceError::MissingCredential { .. }
        )
    }

    /// Whether this error is a configuration gap rather than a runtime failure.
    pub fn is_configuration_gap(&self) -> bool {
        matches!(self, InferenceError::MissingCredential { .. })
    }
}

/// Keep at most [`ERROR_BODY_PREFIX_CHARS`] characters of an error body.
pub fn body_prefix(body: &str) -> String {
    match body.char_indices().nth(ERROR_BODY_PREFIX_CHARS) {
        Some((idx, _)) => format!("{}…", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_failures_are_retriable() {
        let timeout = InferenceError::Timeout {
            provider: "groq".into(),
            model: "m".into(),
            duration_ms: 12_000,
        };
        assert!(timeout.is_retriable());

        let upstream = InferenceError::UpstreamError {
            provider: "groq".into(),
            model: "m".into(),
            status: 503,
            body: "overloaded".into(),
        };
        assert!(upstream.is_retriable());

        let gap = InferenceError::MissingCredential {
            model: "m".into(),
            reason: "GROQ_API_KEY not set".into(),
        };
        assert!(gap.is_retriable());
        assert!(gap.is_configuration_gap());
    }

    #[test]
    fn test_programming_errors_are_not_retriable() {
        let err = InferenceError::InvalidRequest {
            model: "m".into(),
            reason: "bad body".into(),
        };
        assert!(!err.is_retriable());
        assert!(!InferenceError::ConfigError { reason: "x".into() }.is_retriable());
        assert!(!InferenceError::AllCandidatesExhausted { errors: vec![] }.is_retriable());
    }

    #[test]
    fn test_timeout_message_names_provider_model_duration() {
        let err = InferenceError::Timeout {
            provider: "cerebras".into(),
            model: "llama-3.3-70b".into(),
            duration_ms: 15_000,
        };
        let msg = err.to_string();
        assert!(msg.contains("cerebras/llama-3.3-70b"));
        assert!(msg.contains("15000ms"));
    }

    #[test]
    fn test_exhausted_joins_errors() {
        let err = InferenceError::AllCandidatesExhausted {
            errors: vec!["a failed".into(), "b failed".into()],
        };
        assert_eq!(err.to_string(), "all models failed: a failed; b failed");
    }

    #[test]
    fn test_body_prefix_truncates_on_char_boundary() {
        let long = "ש".repeat(300);
        let prefix = body_prefix(&long);
        assert_eq!(prefix.chars().count(), ERROR_BODY_PREFIX_CHARS + 1);
        assert!(prefix.ends_with('…'));

        assert_eq!(body_prefix("short"), "short");
    }
}

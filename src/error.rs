//! Error types for the edit feed and its generation sources.

use std::time::Duration;

/// Maximum length of an upstream error body carried in an error message.
const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Errors that can occur while building or driving an edit feed.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// API key missing or invalid.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Sanitized response body.
        message: String,
    },

    /// Rate limit exceeded.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited {
        /// Server-suggested delay, if any.
        retry_after: Option<Duration>,
    },

    /// Account has a billing problem.
    #[error("billing error: {0}")]
    Billing(String),

    /// Content was blocked by safety filters.
    #[error("content blocked: {0}")]
    ContentBlocked(String),

    /// Invalid request parameters.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Network or HTTP error.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Failed to decode base64 data.
    #[error("failed to decode: {0}")]
    Decode(String),

    /// I/O error (e.g., reading the source photo).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The source image could not be normalized into a payload.
    #[error("could not read source image: {0}")]
    Intake(String),

    /// A capture device (camera) failed or was denied.
    #[error("capture failed: {0}")]
    Capture(String),

    /// The prompt source could not produce instructions.
    #[error("could not generate prompts: {0}")]
    PromptGeneration(String),

    /// No source image has been accepted yet.
    #[error("no active session")]
    NoSession,

    /// A background trigger was fired with no tokio runtime to run it on.
    #[error("no tokio runtime available to run the request")]
    NoRuntime,

    /// The session was reset or replaced before the operation finished.
    #[error("session was replaced before the operation finished")]
    Superseded,

    /// Requested feed index is outside `1..=instructions`.
    #[error("feed index {index} out of range (instructions: {available})")]
    IndexOutOfRange {
        /// The requested index.
        index: usize,
        /// Number of instructions in the session.
        available: usize,
    },

    /// Requested feed index skips ahead of the next one to materialize.
    #[error("feed index {index} requested out of order (next is {expected})")]
    OutOfOrder {
        /// The requested index.
        index: usize,
        /// The only index that may be requested now.
        expected: usize,
    },
}

impl FeedError {
    /// Returns true if this error is likely transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Network(_))
    }

    /// Returns the suggested retry delay, if available.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            Self::Network(_) => Some(Duration::from_secs(2)),
            _ => None,
        }
    }

    /// Returns true for errors that abort the whole session rather than one item.
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            Self::Intake(_) | Self::Decode(_) | Self::PromptGeneration(_)
        )
    }
}

/// Result type alias for feed operations.
pub type Result<T> = std::result::Result<T, FeedError>;

/// Scrubs secrets from an upstream error body and bounds its length.
///
/// Error bodies are echoed to users, and some services reflect the
/// request URL (including `key=` query parameters) back in them.
pub(crate) fn sanitize_error_message(text: &str) -> String {
    let mut out = String::with_capacity(text.len().min(MAX_ERROR_MESSAGE_LEN));
    for (i, token) in text.split(' ').enumerate() {
        if i > 0 {
            out.push(' ');
        }
        match token.find("key=") {
            Some(pos) => {
                out.push_str(&token[..pos]);
                out.push_str("key=[REDACTED]");
            }
            None if token.starts_with("AIza") && token.len() > 30 => out.push_str("[REDACTED]"),
            None => out.push_str(token),
        }
    }

    let trimmed = out.trim();
    if trimmed.chars().count() > MAX_ERROR_MESSAGE_LEN {
        let cut: String = trimmed.chars().take(MAX_ERROR_MESSAGE_LEN).collect();
        format!("{}...", cut)
    } else {
        trimmed.to_string()
    }
}

/// Reads a `Retry-After` header expressed in seconds.
pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable() {
        assert!(FeedError::RateLimited { retry_after: None }.is_retryable());

        assert!(!FeedError::Auth("bad key".into()).is_retryable());
        assert!(!FeedError::ContentBlocked("nsfw".into()).is_retryable());
        assert!(!FeedError::Decode("bad base64".into()).is_retryable());
        assert!(!FeedError::NoSession.is_retryable());
    }

    #[test]
    fn test_retry_after() {
        let rate_limited = FeedError::RateLimited {
            retry_after: Some(Duration::from_secs(60)),
        };
        assert_eq!(rate_limited.retry_after(), Some(Duration::from_secs(60)));

        let rate_limited_no_hint = FeedError::RateLimited { retry_after: None };
        assert_eq!(rate_limited_no_hint.retry_after(), None);

        let auth = FeedError::Auth("bad".into());
        assert_eq!(auth.retry_after(), None);
    }

    #[test]
    fn test_session_fatal() {
        assert!(FeedError::PromptGeneration("empty".into()).is_session_fatal());
        assert!(FeedError::Intake("unknown format".into()).is_session_fatal());
        assert!(!FeedError::ContentBlocked("x".into()).is_session_fatal());
        assert!(!FeedError::OutOfOrder {
            index: 3,
            expected: 1
        }
        .is_session_fatal());
    }

    #[test]
    fn test_error_display() {
        let err = FeedError::Api {
            status: 404,
            message: "Not found".into(),
        };
        assert_eq!(err.to_string(), "API error: 404 - Not found");

        let err = FeedError::IndexOutOfRange {
            index: 3,
            available: 2,
        };
        assert_eq!(
            err.to_string(),
            "feed index 3 out of range (instructions: 2)"
        );
    }

    #[test]
    fn test_sanitize_redacts_keys() {
        let msg = sanitize_error_message("bad url https://x/y?key=AIzaSecret123 failed");
        assert!(!msg.contains("AIzaSecret123"));
        assert!(msg.contains("key=[REDACTED]"));

        let msg = sanitize_error_message("token AIzaSyA1234567890123456789012345678 rejected");
        assert_eq!(msg, "token [REDACTED] rejected");
    }

    #[test]
    fn test_sanitize_truncates() {
        let long = "x".repeat(2000);
        let msg = sanitize_error_message(&long);
        assert_eq!(msg.len(), MAX_ERROR_MESSAGE_LEN + 3);
        assert!(msg.ends_with("..."));
    }

    #[test]
    fn test_parse_retry_after() {
        let mut headers = reqwest::header::HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert(reqwest::header::RETRY_AFTER, "42".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), Some(42));

        headers.insert(
            reqwest::header::RETRY_AFTER,
            "Wed, 21 Oct 2015 07:28:00 GMT".parse().unwrap(),
        );
        assert_eq!(parse_retry_after(&headers), None);
    }
}

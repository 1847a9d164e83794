//! Upstream error taxonomy
//!
//! Every non-2xx upstream response is classified into one of a closed set of
//! kinds, carrying the HTTP status and a short body prefix. Transport
//! failures map to `Timeout`/`Network`. The HTTP layer decides how each kind
//! surfaces to DAV clients.

use thiserror::Error;

/// How much of an upstream error body is kept for diagnostics
const BODY_PREFIX_LEN: usize = 200;

/// Errors from the upstream API
#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("upstream authentication failed ({status}): {detail}")]
    Auth { status: u16, detail: String },

    #[error("upstream resource not found: {detail}")]
    NotFound { detail: String },

    #[error("upstream rejected the request ({status}): {detail}")]
    BadRequest { status: u16, detail: String },

    #[error("upstream server error ({status}): {detail}")]
    Server { status: u16, detail: String },

    #[error("upstream request timed out")]
    Timeout,

    #[error("upstream network error: {0}")]
    Network(String),

    #[error("upstream returned a malformed payload: {0}")]
    Decode(String),
}

impl UpstreamError {
    /// Classify a non-2xx status with its body prefix
    pub fn from_status(status: u16, body: &str) -> Self {
        let detail: String = body.chars().take(BODY_PREFIX_LEN).collect();
        match status {
            401 | 403 => UpstreamError::Auth { status, detail },
            404 => UpstreamError::NotFound { detail },
            400..=499 => UpstreamError::BadRequest { status, detail },
            _ => UpstreamError::Server { status, detail },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, UpstreamError::NotFound { .. })
    }

    /// Errors that justify falling back from a refresh grant to a fresh
    /// password grant
    pub fn is_grant_rejection(&self) -> bool {
        matches!(
            self,
            UpstreamError::Auth { .. } | UpstreamError::BadRequest { .. }
        )
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout
        } else if err.is_decode() {
            UpstreamError::Decode(err.to_string())
        } else {
            UpstreamError::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_classification() {
        assert!(matches!(
            UpstreamError::from_status(401, "bad token"),
            UpstreamError::Auth { status: 401, .. }
        ));
        assert!(UpstreamError::from_status(404, "gone").is_not_found());
        assert!(matches!(
            UpstreamError::from_status(422, "bad payload"),
            UpstreamError::BadRequest { status: 422, .. }
        ));
        assert!(matches!(
            UpstreamError::from_status(500, "boom"),
            UpstreamError::Server { status: 500, .. }
        ));
        assert!(matches!(
            UpstreamError::from_status(503, ""),
            UpstreamError::Server { status: 503, .. }
        ));
    }

    #[test]
    fn test_body_prefix_is_truncated() {
        let long = "x".repeat(1000);
        match UpstreamError::from_status(500, &long) {
            UpstreamError::Server { detail, .. } => assert_eq!(detail.len(), 200),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_grant_rejection_kinds() {
        assert!(UpstreamError::from_status(401, "").is_grant_rejection());
        assert!(UpstreamError::from_status(400, "").is_grant_rejection());
        assert!(!UpstreamError::from_status(500, "").is_grant_rejection());
        assert!(!UpstreamError::Timeout.is_grant_rejection());
    }
}

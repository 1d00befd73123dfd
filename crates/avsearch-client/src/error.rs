//! Client-wide error types.

use thiserror::Error;

/// Client-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Client-wide error type.
///
/// A domain failure (a processing stage reporting `FAILED`) is *not* an error:
/// it is a successfully fetched [`JobStatus`](crate::JobStatus) whose overall
/// status is failed. Errors here mean "we don't know".
#[derive(Error, Debug)]
pub enum Error {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("backend returned {status}: {message}")]
    Backend { status: u16, message: String },

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn backend(status: u16, message: impl Into<String>) -> Self {
        Self::Backend {
            status,
            message: message.into(),
        }
    }

    /// Whether the failure may resolve itself on a later attempt.
    ///
    /// Transport failures, timeouts, server errors, `408` and `429` are
    /// transient. Validation and decode failures are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http(e) => {
                if e.is_decode() || e.is_builder() {
                    return false;
                }
                match e.status() {
                    Some(status) => is_transient_status(status.as_u16()),
                    None => true,
                }
            }
            Error::Backend { status, .. } => is_transient_status(*status),
            Error::Io(_) => true,
            _ => false,
        }
    }

    /// Whether the failure was raised locally before anything was sent.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }
}

fn is_transient_status(status: u16) -> bool {
    status >= 500 || status == 408 || status == 429
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_status_classification() {
        assert!(Error::backend(503, "unavailable").is_transient());
        assert!(Error::backend(500, "boom").is_transient());
        assert!(Error::backend(429, "slow down").is_transient());
        assert!(Error::backend(408, "timeout").is_transient());
        assert!(!Error::backend(404, "missing").is_transient());
        assert!(!Error::backend(403, "forbidden").is_transient());
    }

    #[test]
    fn test_validation_is_not_transient() {
        let err = Error::validation("empty key");
        assert!(!err.is_transient());
        assert!(err.is_validation());
        assert_eq!(err.to_string(), "validation error: empty key");
    }

    #[test]
    fn test_decode_is_not_transient() {
        assert!(!Error::decode("bad stage").is_transient());
    }
}

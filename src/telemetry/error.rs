/// Fetch failure taxonomy
///
/// Every failure a domain fetcher can observe. Errors are `Clone` because a
/// single outcome is shared by every caller joined on the same pending request.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The collector's cancellation scope was invalidated mid-flight
    #[error("request cancelled")]
    Cancelled,

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("malformed response: {0}")]
    Malformed(String),

    /// The source answered with `success: false`
    #[error("source rejected request: {0}")]
    Rejected(String),

    /// The operation panicked before settling
    #[error("fetch aborted: {0}")]
    Aborted(String),
}

impl FetchError {
    /// Cancellation is expected and must stay silent
    pub fn is_cancellation(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            FetchError::Status(status.as_u16())
        } else if err.is_decode() {
            FetchError::Malformed(err.to_string())
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_cancelled_is_cancellation() {
        assert!(FetchError::Cancelled.is_cancellation());
        assert!(!FetchError::Status(500).is_cancellation());
        assert!(!FetchError::Transport("refused".into()).is_cancellation());
        assert!(!FetchError::Rejected("no docker".into()).is_cancellation());
        assert!(!FetchError::Aborted("overflow".into()).is_cancellation());
    }

    #[test]
    fn test_display() {
        assert_eq!(FetchError::Status(503).to_string(), "HTTP 503");
        assert_eq!(FetchError::Cancelled.to_string(), "request cancelled");
    }
}

use thiserror::Error;

/// Failure of a single poll against the meter.
///
/// The `Display` text is what the coordinator keeps as its last error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request timed out after {0} seconds")]
    Timeout(u64),
    #[error("HTTP error {0}")]
    Status(u16),
    #[error("undecodable response body: {0}")]
    Decode(String),
}

/// Coarse classification of a [`FetchError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Timeout, DNS, TLS handshake, refused connection.
    Transport,
    /// The meter answered, but not with a usable document.
    Protocol,
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Transport(_) | FetchError::Timeout(_) => ErrorKind::Transport,
            FetchError::Status(_) | FetchError::Decode(_) => ErrorKind::Protocol,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing configuration value: {0}")]
    Missing(&'static str),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("config file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that prevent the integration from being set up at all.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_kinds() {
        assert_eq!(
            FetchError::Transport("connection refused".into()).kind(),
            ErrorKind::Transport
        );
        assert_eq!(FetchError::Timeout(10).kind(), ErrorKind::Transport);
        assert_eq!(FetchError::Status(503).kind(), ErrorKind::Protocol);
        assert_eq!(
            FetchError::Decode("expected value".into()).kind(),
            ErrorKind::Protocol
        );
    }

    #[test]
    fn test_fetch_error_messages() {
        assert_eq!(FetchError::Status(503).to_string(), "HTTP error 503");
        assert_eq!(
            FetchError::Timeout(10).to_string(),
            "request timed out after 10 seconds"
        );
    }
}

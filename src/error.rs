use crate::auth::AuthError;
use crate::config::ConfigError;
use crate::connector::Backend;
use thiserror::Error;

/// Failure of a single connection attempt.
///
/// Cloneable so that every caller waiting on the same attempt receives it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    /// The driver rejected the connection options before any I/O happened
    #[error("Invalid {backend} connection options: {message}")]
    InvalidOptions {
        /// Backend the options were meant for
        backend: Backend,
        /// Driver error message
        message: String,
    },

    /// The server could not be reached or did not answer the handshake
    #[error("Failed to connect to {backend} at {target}: {message}")]
    Unreachable {
        /// Backend that was being contacted
        backend: Backend,
        /// Redacted connection target
        target: String,
        /// Driver error message
        message: String,
    },

    /// The connector panicked while the attempt was running
    #[error("{backend} connector panicked: {message}")]
    Panicked {
        /// Backend that was being contacted
        backend: Backend,
        /// Panic payload, when it was a string
        message: String,
    },
}

impl ConnectError {
    /// Backend the failed attempt was aimed at
    #[must_use]
    pub const fn backend(&self) -> Backend {
        match self {
            Self::InvalidOptions { backend, .. }
            | Self::Unreachable { backend, .. }
            | Self::Panicked { backend, .. } => *backend,
        }
    }
}

/// Top-level error type for `conncache`
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration could not be loaded or validated
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A connection attempt failed
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// The auth server call failed
    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Result type alias for `conncache` operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_error_reports_backend() {
        let err = ConnectError::Unreachable {
            backend: Backend::Document,
            target: "mongodb://localhost:27017/".to_string(),
            message: "connection refused".to_string(),
        };
        assert_eq!(err.backend(), Backend::Document);
        assert_eq!(
            err.to_string(),
            "Failed to connect to mongodb at mongodb://localhost:27017/: connection refused"
        );
    }

    #[test]
    fn test_panicked_reports_backend() {
        let err = ConnectError::Panicked {
            backend: Backend::Relational,
            message: "boom".to_string(),
        };
        assert_eq!(err.backend(), Backend::Relational);
        assert_eq!(err.to_string(), "postgres connector panicked: boom");
    }

    #[test]
    fn test_error_wraps_config_error() {
        let err: Error = ConfigError::MissingUri {
            var: "MONGODB_URI".to_string(),
        }
        .into();
        assert!(matches!(err, Error::Config(ConfigError::MissingUri { .. })));
        assert!(err.to_string().contains("MONGODB_URI"));
    }
}

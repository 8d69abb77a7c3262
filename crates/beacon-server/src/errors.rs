//! Server error types.

/// Errors raised while bringing a worker up.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The listener could not bind.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: String,
        /// Underlying socket error.
        source: std::io::Error,
    },

    /// Other socket I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The Prometheus recorder could not be installed.
    #[error("metrics recorder: {0}")]
    Metrics(String),
}

/// Result alias for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

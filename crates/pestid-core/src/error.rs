use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClassifyError {
    /// Undecodable image, unreadable reference file, or a bad request argument.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Backbone or classifier weights missing, unloadable, or failing at inference.
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("reference index rebuild already in progress")]
    RebuildInProgress,

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid reference pattern: {0}")]
    InvalidPattern(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Internal(String),
}

impl ClassifyError {
    /// Whether the failure was caused by the caller's input rather than the engine.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_) | Self::RebuildInProgress)
    }
}

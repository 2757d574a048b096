use thiserror::Error;

/// Errors from repository operations (used by trait definitions in mnemon-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors from LLM gateway operations.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("provider error: {message}")]
    Provider { message: String },

    /// The completion did not conform to the requested response schema.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("rate limited (retry after {retry_after_ms:?}ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("transport error: {0}")]
    Transport(String),
}

/// Errors surfaced by an extraction run.
///
/// Failures before the commit stage leave no side effects; the scheduler's
/// retry budget applies to all of these.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// A message's story names a handler that was never registered. Fatal
    /// for the batch: nothing is marked extracted.
    #[error("unknown story handler: '{0}'")]
    UnknownHandler(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

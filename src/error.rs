use thiserror::Error;

/// Error taxonomy for everything that can go wrong while collecting one
/// entity.
///
/// Propagation rules:
/// - All variants except `ConfigurationInvalid` are contained at the task
///   boundary (see `collector::task`) and never reach the orchestrator.
/// - `ConfigurationInvalid` is only produced at startup and is fatal.
///
#[derive(Debug, Error)]
pub enum CollectError {
    /// Network failure, timeout or non-success HTTP status.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The upstream answered but explicitly refused this request
    /// (e.g. a region-locked title probed from the wrong region).
    #[error("upstream rejected {probe}: {reason}")]
    UpstreamRejected { probe: String, reason: String },

    /// Body or field could not be decoded into the expected shape.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("cache error: {0}")]
    Cache(#[from] redis::RedisError),

    /// Serialization of a cache snapshot failed.
    #[error("snapshot encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    /// Deadline or shutdown fired while the task was waiting.
    #[error("cancelled")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    ConfigurationInvalid(String),
}

impl From<reqwest::Error> for CollectError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            CollectError::MalformedPayload(err.to_string())
        } else {
            CollectError::UpstreamUnavailable(err.to_string())
        }
    }
}

pub type CollectResult<T> = Result<T, CollectError>;

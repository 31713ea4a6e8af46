use thiserror::Error;

/// Errors returned by frame codec operations.
#[derive(Debug, Error)]
pub enum CodecError {
    /// JSON serialization/deserialization failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    /// Frame-level schema validation failure.
    #[error("invalid frame: {0}")]
    InvalidFrame(&'static str),
}

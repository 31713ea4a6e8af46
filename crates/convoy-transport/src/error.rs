use thiserror::Error;

/// Failure reported by a session sink.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("session is closed")]
    Closed,
    #[error("outbound queue is full")]
    QueueFull,
    #[error("send failed: {0}")]
    Send(String),
}

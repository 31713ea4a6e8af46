use convoy_core::PathError;
use thiserror::Error;

/// Local registry invariant violations. These are caller bugs and are
/// returned, never swallowed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("path already registered: {0}")]
    PathCollision(String),
    #[error("entity has no assigned path")]
    UnknownPath,
}

/// Errors returned by the [`crate::service::SyncClient`] facade.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error(transparent)]
    Path(#[from] PathError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Why a handshake ended in the terminal failed state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthFailure {
    #[error("handshake rejected with HTTP status {0}")]
    Rejected(u16),
    #[error("credential is not a three-segment token")]
    MalformedCredential,
    #[error("credential carries no email claim")]
    MissingEmailClaim,
    #[error("handshake request failed: {0}")]
    Network(String),
    #[error("ConnectionId frame carried no connection id")]
    MissingConnectionId,
}

#[cfg(test)]
mod tests {
    use super::{AuthFailure, RegistryError};

    #[test]
    fn messages_name_the_offending_value() {
        assert_eq!(
            RegistryError::PathCollision("/root".into()).to_string(),
            "path already registered: /root"
        );
        assert_eq!(
            AuthFailure::Rejected(401).to_string(),
            "handshake rejected with HTTP status 401"
        );
    }
}

use thiserror::Error;

/// Errors returned while building or deriving [`crate::Path`] values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// Raw path text had no segments.
    #[error("invalid path: {0:?}")]
    InvalidPath(String),
    /// Child name was empty or contained a separator.
    #[error("invalid child name: {0:?}")]
    InvalidName(String),
    /// Only cluster paths may own children.
    #[error("{kind} path {path} cannot own children")]
    InvalidHierarchy { path: String, kind: crate::EntityKind },
}

#[cfg(test)]
mod tests {
    use super::PathError;
    use crate::EntityKind;

    #[test]
    fn error_messages_are_stable() {
        assert_eq!(
            PathError::InvalidPath(String::new()).to_string(),
            "invalid path: \"\""
        );
        assert_eq!(
            PathError::InvalidName("a/b".into()).to_string(),
            "invalid child name: \"a/b\""
        );
        assert_eq!(
            PathError::InvalidHierarchy {
                path: "/root/7".into(),
                kind: EntityKind::Transport,
            }
            .to_string(),
            "Transport path /root/7 cannot own children"
        );
    }
}

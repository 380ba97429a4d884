//! Error taxonomy shared by every engine component.

use thiserror::Error;

use crate::command::CommandError;
use crate::config::ConfigError;
use crate::entity::StoreError;
use crate::session::SessionError;
use crate::snapshot::SnapshotError;
use crate::wire::WireError;

/// Coarse classification of an engine error.
///
/// Callers branch on the kind to decide how to recover: protocol and version
/// errors mean the input is unusable, referential errors point at a stale id,
/// session-misuse errors leave the state machine where it was, and resource
/// errors mean a transient buffer could not be allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Protocol,
    Referential,
    Version,
    SessionMisuse,
    Resource,
    Config,
}

/// Any error surfaced by a [`Document`](crate::Document) operation.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Store(e) => e.kind(),
            EngineError::Command(e) => e.kind(),
            EngineError::Session(e) => e.kind(),
            EngineError::Snapshot(e) => e.kind(),
            EngineError::Wire(e) => e.kind(),
            EngineError::Config(_) => ErrorKind::Config,
        }
    }
}

/// Result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_passes_through_wrapped_errors() {
        let err: EngineError = StoreError::UnknownEntity(7).into();
        assert_eq!(err.kind(), ErrorKind::Referential);

        let err: EngineError = SessionError::AlreadyActive.into();
        assert_eq!(err.kind(), ErrorKind::SessionMisuse);

        let err: EngineError = SnapshotError::UnsupportedVersion { found: 9, supported: 1 }.into();
        assert_eq!(err.kind(), ErrorKind::Version);
    }

    #[test]
    fn test_display_is_not_empty() {
        let err: EngineError = StoreError::UnknownLayer(3).into();
        assert!(err.to_string().contains('3'));
    }
}

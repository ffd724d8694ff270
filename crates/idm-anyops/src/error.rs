use thiserror::Error;

use crate::to::EntityKind;

pub type Result<T> = std::result::Result<T, AnyOpsError>;

/// Precondition violations raised by diff and patch.
///
/// Neither variant is recoverable by retrying: the caller handed over
/// snapshots or requests that do not belong together.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnyOpsError {
    #[error("{kind} keys must be the same: expected {expected:?}, found {found:?}")]
    KeyMismatch {
        kind: EntityKind,
        expected: Option<String>,
        found: Option<String>,
    },

    #[error("unsupported combination: {left} with {right}")]
    KindMismatch { left: EntityKind, right: EntityKind },
}

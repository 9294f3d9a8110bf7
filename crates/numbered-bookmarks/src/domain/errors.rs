//! Domain-specific errors.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BookmarkError {
    /// A slot index outside `0..=9` reached the core.
    #[error("bookmark slot {index} is out of range (expected 0-9)")]
    IndexOutOfRange { index: usize },
    /// A persisted document failed to parse or validate.
    #[error("persisted bookmark state is corrupt: {reason}")]
    CorruptState { reason: String },
    /// The persisted document exists but could not be read. Its contents are unknown, so it is
    /// left in place.
    #[error("failed to read bookmark state from {}: {reason}", path.display())]
    PersistenceReadFailed { path: PathBuf, reason: String },
    /// Writing the persisted document failed; in-memory state is still authoritative.
    #[error("failed to write bookmark state to {}: {reason}", path.display())]
    PersistenceWriteFailed { path: PathBuf, reason: String },
}

impl BookmarkError {
    pub(crate) fn corrupt(reason: impl Into<String>) -> Self {
        Self::CorruptState {
            reason: reason.into(),
        }
    }
}

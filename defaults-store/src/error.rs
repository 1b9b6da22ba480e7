//! Error handling for default action persistence

use compact_str::CompactString;
use thiserror::Error;

pub type DefaultsResult<T> = Result<T, DefaultsError>;

#[derive(Error, Debug, Clone)]
pub enum DefaultsError {
    #[error("Invalid default record: {0}")]
    InvalidRecord(CompactString),

    #[error("Serialization error: {0}")]
    SerializationError(CompactString),

    #[error("Could not determine a data directory for default actions")]
    NoDataDirectory,

    // Persistence-related errors
    #[error("Persistence error: {message}")]
    PersistenceError { message: CompactString },

    #[error("Persistence file corrupted: {path}")]
    PersistenceCorrupted { path: CompactString },

    #[error("Persistence version mismatch: expected {expected}, found {found}")]
    PersistenceVersionMismatch { expected: u32, found: u32 },

    #[error("Atomic save operation failed: {0}")]
    AtomicSaveError(CompactString),

    #[error("Defaults deserialization failed: {0}")]
    DeserializationError(CompactString),
}

impl DefaultsError {
    /// Errors after which loading may fall back to the backup file
    #[inline]
    pub fn is_persistence_error(&self) -> bool {
        matches!(
            self,
            DefaultsError::PersistenceError { .. }
                | DefaultsError::PersistenceCorrupted { .. }
                | DefaultsError::PersistenceVersionMismatch { .. }
                | DefaultsError::AtomicSaveError(_)
                | DefaultsError::DeserializationError(_)
        )
    }

    #[inline]
    pub fn persistence_error(message: impl Into<CompactString>) -> Self {
        Self::PersistenceError {
            message: message.into(),
        }
    }

    #[inline]
    pub fn persistence_corrupted(path: &std::path::Path) -> Self {
        Self::PersistenceCorrupted {
            path: CompactString::from(path.to_string_lossy()),
        }
    }

    #[inline]
    pub fn atomic_save_error(message: impl Into<CompactString>) -> Self {
        Self::AtomicSaveError(message.into())
    }
}

impl From<rmp_serde::encode::Error> for DefaultsError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        DefaultsError::SerializationError(CompactString::from(err.to_string()))
    }
}

impl From<rmp_serde::decode::Error> for DefaultsError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        DefaultsError::DeserializationError(CompactString::from(err.to_string()))
    }
}

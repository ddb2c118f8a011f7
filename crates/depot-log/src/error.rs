use std::io;
use std::path::PathBuf;

/// Errors produced by the append-log store.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// I/O error from the underlying log file.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The log path exists but is not a regular file.
    #[error("log path is not a regular file: {0}")]
    NotAFile(PathBuf),

    /// Lookup of a key with no live record.
    ///
    /// This is a normal, caller-handleable outcome, never a bug.
    #[error("key not found: {key:?}")]
    KeyNotFound {
        /// Lossy rendering of the key for diagnostics.
        key: String,
    },

    /// A record failed to decode at a position the key directory points at.
    #[error("corrupt record at offset {offset}: {reason}")]
    Corrupt { offset: u64, reason: String },

    /// A record's key or value exceeds the length field width.
    #[error("record too large: {len} bytes")]
    RecordTooLarge { len: usize },

    /// Internal consistency failure: the in-memory index has diverged from
    /// the log. Unrecoverable; reopen the store from disk.
    #[error("invariant violation at offset {offset}: {details}")]
    Invariant { offset: u64, details: String },
}

impl LogError {
    /// Build a `KeyNotFound` for the given raw key bytes.
    pub(crate) fn key_not_found(key: &[u8]) -> Self {
        Self::KeyNotFound {
            key: String::from_utf8_lossy(key).into_owned(),
        }
    }
}

/// Result alias for append-log operations.
pub type LogResult<T> = Result<T, LogError>;

use depot_types::ContentHash;

/// Errors from catalog operations.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// No catalog entry exists for the given content hash.
    ///
    /// A normal, caller-handleable outcome, never a bug.
    #[error("unknown hash: {0}")]
    UnknownHash(ContentHash),

    /// No reference with the given attributes exists for the hash.
    #[error("no reference on {hash} with priority {priority}, max_copies {max_copies}")]
    UnknownReference {
        hash: ContentHash,
        priority: u32,
        max_copies: u32,
    },

    /// A disk index outside the registered disk set.
    #[error("invalid disk index: {index}")]
    InvalidDiskIndex { index: u32 },

    /// A reference reported a size that disagrees with the recorded size
    /// for its hash. Same hash means same content, so this is caller error.
    #[error("size mismatch for {hash}: recorded {recorded}, given {given}")]
    SizeMismatch {
        hash: ContentHash,
        recorded: u64,
        given: u64,
    },

    /// A disk with this name is already registered.
    #[error("duplicate disk name: {0}")]
    DuplicateDisk(String),

    /// No disk with this name is registered.
    #[error("unknown disk name: {0}")]
    UnknownDisk(String),

    /// Serialization or deserialization failure on a persisted row.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Error from the underlying append log.
    #[error("log error: {0}")]
    Log(#[from] depot_log::LogError),

    /// Internal consistency failure: the aggregation rollup has diverged
    /// from the catalog rows. Unrecoverable; rebuild from the rows.
    #[error("invariant violation: {details}")]
    Invariant { details: String },
}

/// Result alias for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

//! Content-addressed object catalog with replica bookkeeping.
//!
//! The catalog deduplicates backup objects by content hash and tracks, for
//! each object, which backup disks hold a verified copy (its *nexus*), how
//! many logical files reference it, and how many copies it should have. A
//! per-nexus aggregation rollup is maintained incrementally alongside the
//! rows, so replication planning — "how many bytes still need another
//! copy" — is a query over distinct disk subsets, not a scan over objects.
//!
//! The pieces:
//!
//! - [`ObjectCatalog`] — the mutation surface; every change to a row applies
//!   its paired rollup delta in the same call
//! - [`NexusAggregator`] — the derived per-nexus rollup and its queries
//! - [`DiskRegistry`] — backup-disk identity and stable nexus indices
//! - catalog persistence over a [`depot_log::AppendLog`] (rows only; the
//!   rollup is rebuilt on load)
//!
//! Capacity accounting uses [`block_size`] (allocation-rounded, with a
//! fixed metadata overhead) rather than raw byte sizes throughout.

pub mod aggregate;
pub mod catalog;
pub mod disks;
pub mod entry;
pub mod error;
pub mod persist;

pub use aggregate::{Contribution, NexusAggregate, NexusAggregator};
pub use catalog::ObjectCatalog;
pub use disks::{BackupDisk, DiskRegistry};
pub use entry::{block_size, CatalogEntry, ReferenceAttrs, ALLOC_UNIT};
pub use error::{CatalogError, CatalogResult};

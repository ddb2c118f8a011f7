//! Per-object catalog rows and block-size accounting.

use serde::{Deserialize, Serialize};

use depot_types::{ContentHash, Nexus};

/// Allocation unit for capacity accounting, in bytes.
pub const ALLOC_UNIT: u64 = 4096;

/// Accountable on-disk footprint of an object: its exact size rounded up to
/// the next allocation unit, plus one allocation unit of metadata overhead.
///
/// Capacity accounting always uses this figure, never the raw size, because
/// on-disk storage is not byte-granular.
pub fn block_size(size: u64) -> u64 {
    size.div_ceil(ALLOC_UNIT) * ALLOC_UNIT + ALLOC_UNIT
}

/// The attributes one logical file contributes to an object it references.
///
/// The catalog caches only the maxima over these; the full multiset is kept
/// so the maxima can be recomputed when any single reference goes away.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceAttrs {
    /// Copy-scheduling priority of the referencing file.
    pub priority: u32,
    /// Replication target the referencing file asks for.
    pub max_copies: u32,
}

/// One catalog row: the dedup metadata for a distinct content hash.
///
/// An entry exists from the first reference to its hash. `nexus` records
/// which disks hold a verified copy; `priority` and `max_copies` are the
/// maxima over all current references. An entry whose last reference is
/// removed is orphaned and lingers until pruned, but its bytes leave the
/// aggregation rollup the instant the reference count hits zero.
///
/// All mutation goes through the catalog so the paired rollup delta can
/// never be skipped; nothing outside this crate gets a `&mut CatalogEntry`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    hash: ContentHash,
    size: u64,
    nexus: Nexus,
    references: Vec<ReferenceAttrs>,
}

impl CatalogEntry {
    /// Create an entry for a previously-unseen hash with its first
    /// reference. No disk holds a copy yet.
    pub(crate) fn new(hash: ContentHash, size: u64, attrs: ReferenceAttrs) -> Self {
        Self {
            hash,
            size,
            nexus: Nexus::empty(),
            references: vec![attrs],
        }
    }

    /// The content hash identifying this object.
    pub fn hash(&self) -> ContentHash {
        self.hash
    }

    /// Exact byte size of the object's content.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Allocation-rounded footprint used for capacity accounting.
    pub fn block_size(&self) -> u64 {
        block_size(self.size)
    }

    /// The disks currently holding a verified copy.
    pub fn nexus(&self) -> &Nexus {
        &self.nexus
    }

    /// Number of disks currently holding a copy.
    pub fn copies(&self) -> u32 {
        self.nexus.level()
    }

    /// Max priority over all current references; 0 when orphaned.
    pub fn priority(&self) -> u32 {
        self.references.iter().map(|r| r.priority).max().unwrap_or(0)
    }

    /// Max replication target over all current references; 0 when orphaned.
    pub fn max_copies(&self) -> u32 {
        self.references
            .iter()
            .map(|r| r.max_copies)
            .max()
            .unwrap_or(0)
    }

    /// Number of logical files currently referencing this object.
    pub fn refs(&self) -> u32 {
        self.references.len() as u32
    }

    /// Whether the object has reached its replication target.
    ///
    /// Only meaningful for referenced entries; an orphan's target is 0.
    pub fn saturated(&self) -> bool {
        self.copies() >= self.max_copies()
    }

    /// Whether no logical file references this object any more.
    pub fn is_orphaned(&self) -> bool {
        self.references.is_empty()
    }

    pub(crate) fn push_reference(&mut self, attrs: ReferenceAttrs) {
        self.references.push(attrs);
    }

    /// Remove one reference matching `attrs` from the multiset.
    /// Returns `false` if no matching reference exists.
    pub(crate) fn remove_reference(&mut self, attrs: ReferenceAttrs) -> bool {
        match self.references.iter().position(|r| *r == attrs) {
            Some(index) => {
                self.references.swap_remove(index);
                true
            }
            None => false,
        }
    }

    pub(crate) fn set_nexus(&mut self, nexus: Nexus) {
        self.nexus = nexus;
    }
}

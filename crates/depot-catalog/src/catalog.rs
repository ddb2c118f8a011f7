//! The object catalog: the single mutation surface for dedup metadata.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use tracing::debug;

use depot_types::ContentHash;

use crate::aggregate::{Contribution, NexusAggregator};
use crate::disks::DiskRegistry;
use crate::entry::{CatalogEntry, ReferenceAttrs};
use crate::error::{CatalogError, CatalogResult};

/// Content-addressed registry of deduplicated objects.
///
/// Every entry is keyed by its content hash and tracks which disks hold a
/// copy, its replication target, and how many logical files reference it.
/// The catalog owns the per-nexus aggregation rollup and applies the
/// matching delta inside every mutation, so the rollup can never drift from
/// the rows: there is no way to change an entry's nexus, references, or
/// size without the paired delta.
///
/// Logical files are external; they hold their hash, size, priority, and
/// replication target authoritatively and feed the catalog via
/// [`ObjectCatalog::upsert_reference`] / [`ObjectCatalog::remove_reference`].
/// The physical copy executor is likewise external and reports through
/// [`ObjectCatalog::record_copy_landed`] / [`ObjectCatalog::record_copy_lost`].
#[derive(Debug)]
pub struct ObjectCatalog {
    entries: BTreeMap<ContentHash, CatalogEntry>,
    aggregator: NexusAggregator,
    disks: DiskRegistry,
}

impl ObjectCatalog {
    /// Create an empty catalog over the given disk set.
    pub fn new(disks: DiskRegistry) -> Self {
        Self {
            entries: BTreeMap::new(),
            aggregator: NexusAggregator::new(),
            disks,
        }
    }

    pub(crate) fn from_parts(
        entries: BTreeMap<ContentHash, CatalogEntry>,
        disks: DiskRegistry,
    ) -> Self {
        let mut aggregator = NexusAggregator::new();
        aggregator.rebuild(entries.values());
        Self {
            entries,
            aggregator,
            disks,
        }
    }

    /// Record that a logical file references `hash`.
    ///
    /// The first reference to an unseen hash creates its entry with an
    /// empty nexus. Later references raise the entry's cached priority and
    /// replication-target maxima as needed. A size that disagrees with the
    /// recorded size is rejected: same hash, same content.
    pub fn upsert_reference(
        &mut self,
        hash: ContentHash,
        size: u64,
        priority: u32,
        max_copies: u32,
    ) -> CatalogResult<()> {
        let attrs = ReferenceAttrs {
            priority,
            max_copies,
        };
        match self.entries.get_mut(&hash) {
            Some(entry) => {
                if entry.size() != size {
                    return Err(CatalogError::SizeMismatch {
                        hash,
                        recorded: entry.size(),
                        given: size,
                    });
                }
                let old = Contribution::of(entry);
                entry.push_reference(attrs);
                let new = Contribution::of(entry);
                self.aggregator.apply_delta(old, new);
            }
            None => {
                let entry = CatalogEntry::new(hash, size, attrs);
                let new = Contribution::of(&entry);
                self.entries.insert(hash, entry);
                self.aggregator.apply_delta(None, new);
            }
        }
        Ok(())
    }

    /// Record that a logical file stopped referencing `hash`.
    ///
    /// The departing reference's own attributes identify it; the entry's
    /// cached maxima are recomputed from the survivors, so removing the
    /// single reference that held the maximum lowers it. When the last
    /// reference goes, the entry is orphaned: its bytes leave the rollup
    /// immediately, and the row itself lingers until [`ObjectCatalog::prune`].
    pub fn remove_reference(
        &mut self,
        hash: ContentHash,
        priority: u32,
        max_copies: u32,
    ) -> CatalogResult<()> {
        let entry = self
            .entries
            .get_mut(&hash)
            .ok_or(CatalogError::UnknownHash(hash))?;
        let attrs = ReferenceAttrs {
            priority,
            max_copies,
        };

        let old = Contribution::of(entry);
        if !entry.remove_reference(attrs) {
            return Err(CatalogError::UnknownReference {
                hash,
                priority,
                max_copies,
            });
        }
        let new = Contribution::of(entry);
        self.aggregator.apply_delta(old, new);
        Ok(())
    }

    /// Record that the copy executor verified a copy of `hash` on `disk`.
    ///
    /// Re-reporting a disk already in the nexus is a no-op.
    pub fn record_copy_landed(&mut self, hash: ContentHash, disk: u32) -> CatalogResult<()> {
        self.update_nexus(hash, disk, true)
    }

    /// Record that the copy on `disk` was lost or removed.
    ///
    /// Reporting a disk not in the nexus is a no-op.
    pub fn record_copy_lost(&mut self, hash: ContentHash, disk: u32) -> CatalogResult<()> {
        self.update_nexus(hash, disk, false)
    }

    fn update_nexus(&mut self, hash: ContentHash, disk: u32, present: bool) -> CatalogResult<()> {
        if !self.disks.contains_index(disk) {
            return Err(CatalogError::InvalidDiskIndex { index: disk });
        }
        let entry = self
            .entries
            .get_mut(&hash)
            .ok_or(CatalogError::UnknownHash(hash))?;

        if entry.nexus().contains(disk) == present {
            return Ok(());
        }
        let nexus = if present {
            entry.nexus().with_disk(disk)
        } else {
            entry.nexus().without_disk(disk)
        };

        let old = Contribution::of(entry);
        entry.set_nexus(nexus);
        let new = Contribution::of(entry);
        self.aggregator.apply_delta(old, new);

        debug!(
            hash = %hash.short_hex(),
            disk,
            present,
            copies = self.entries[&hash].copies(),
            "copy state changed"
        );
        Ok(())
    }

    /// Referenced, unsaturated entries with fewer than `min_copies_wanted`
    /// copies, ordered most-urgent-first: highest priority, then fewest
    /// copies, then ascending hash so equal candidates order reproducibly.
    pub fn find_replication_candidates(&self, min_copies_wanted: u32) -> Vec<&CatalogEntry> {
        let mut candidates: Vec<&CatalogEntry> = self
            .entries
            .values()
            .filter(|e| !e.is_orphaned() && !e.saturated() && e.copies() < min_copies_wanted)
            .collect();
        // BTreeMap iteration is hash-ascending; the stable sort keeps that
        // as the tie-break.
        candidates.sort_by_key(|e| (Reverse(e.priority()), e.copies()));
        candidates
    }

    /// Look up an entry by hash.
    pub fn get(&self, hash: &ContentHash) -> Option<&CatalogEntry> {
        self.entries.get(hash)
    }

    /// Number of entries, orphans included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the catalog has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries, hash-ascending.
    pub fn entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.values()
    }

    /// The per-nexus aggregation rollup, for replication-planning queries.
    pub fn aggregator(&self) -> &NexusAggregator {
        &self.aggregator
    }

    /// The registered disk set.
    pub fn disks(&self) -> &DiskRegistry {
        &self.disks
    }

    /// Mutable access to the disk set, for registering and renaming disks.
    pub fn disks_mut(&mut self) -> &mut DiskRegistry {
        &mut self.disks
    }

    /// Drop entries that are orphaned and have no remaining copies, then
    /// discard zeroed rollup buckets. Returns the number of entries dropped.
    ///
    /// An orphan that still has copies is kept so the copy executor can
    /// reclaim the disk space first; its bytes are already out of the
    /// rollup.
    pub fn prune(&mut self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| !(entry.is_orphaned() && entry.copies() == 0));
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(removed, "pruned orphaned entries");
        }
        self.aggregator.prune_empty();
        removed
    }

    /// Check that the rollup agrees with the rows. Failure is a bug in the
    /// incremental maintenance, not a recoverable condition.
    pub fn verify(&self) -> CatalogResult<()> {
        self.aggregator.verify(self.entries.values())
    }
}

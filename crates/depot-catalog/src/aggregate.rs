//! Incremental per-nexus aggregation of replication state.
//!
//! For every distinct nexus value in use, the aggregator keeps the count of
//! referenced objects at that exact disk subset and their total/saturated
//! block-size footprint. "How many bytes still need another copy" is then a
//! query over distinct nexus values instead of a scan over every object.
//!
//! The aggregator is derived state: it can always be rebuilt by replaying
//! the catalog rows, and [`NexusAggregator::verify`] checks that it agrees
//! with them. All mutation flows through the single
//! [`NexusAggregator::apply_delta`] primitive so the subtract-then-add math
//! lives in exactly one place.

use std::collections::BTreeMap;

use tracing::debug;

use depot_types::Nexus;

use crate::entry::CatalogEntry;
use crate::error::{CatalogError, CatalogResult};

/// The rollup for one distinct nexus value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NexusAggregate {
    /// The disk subset this bucket aggregates over.
    pub nexus: Nexus,
    /// Replication factor of this bucket (population count of `nexus`).
    pub level: u32,
    /// Referenced objects currently at exactly this nexus.
    pub object_count: u32,
    /// Sum of block sizes over those objects.
    pub total_bytes: u64,
    /// Sum of block sizes over the subset that has reached its target.
    pub saturated_bytes: u64,
}

impl NexusAggregate {
    /// Bytes in this bucket still wanting another copy.
    pub fn undersaturated_bytes(&self) -> u64 {
        self.total_bytes - self.saturated_bytes
    }
}

/// What one referenced object contributes to its nexus bucket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Contribution {
    /// The bucket the contribution lands in.
    pub nexus: Nexus,
    /// The object's accountable footprint.
    pub block_size: u64,
    /// Whether the object has reached its replication target.
    pub saturated: bool,
}

impl Contribution {
    /// The contribution `entry` currently makes, or `None` if it is
    /// orphaned — only referenced objects are counted.
    pub fn of(entry: &CatalogEntry) -> Option<Self> {
        if entry.is_orphaned() {
            return None;
        }
        Some(Self {
            nexus: entry.nexus().clone(),
            block_size: entry.block_size(),
            saturated: entry.saturated(),
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct Counts {
    object_count: u32,
    total_bytes: u64,
    saturated_bytes: u64,
}

impl Counts {
    fn is_zero(&self) -> bool {
        self.object_count == 0 && self.total_bytes == 0 && self.saturated_bytes == 0
    }
}

/// Incrementally-maintained rollup keyed by nexus value.
///
/// The empty-nexus bucket (no copies anywhere) always exists, even with
/// zero objects: it is the base case for "everything needing a first copy".
#[derive(Clone, Debug)]
pub struct NexusAggregator {
    buckets: BTreeMap<Nexus, Counts>,
}

impl NexusAggregator {
    /// Create an aggregator with only the empty-nexus bucket.
    pub fn new() -> Self {
        let mut buckets = BTreeMap::new();
        buckets.insert(Nexus::empty(), Counts::default());
        Self { buckets }
    }

    /// The single mutation primitive: move one object's contribution from
    /// `old` to `new`.
    ///
    /// A pure insert passes `old = None`; a pure removal passes
    /// `new = None`; a move (copy landed or lost, target change) passes
    /// both. Every catalog mutation funnels through here, so the buckets
    /// cannot drift from the rows by a missed call site.
    pub fn apply_delta(&mut self, old: Option<Contribution>, new: Option<Contribution>) {
        if let Some(old) = old {
            let bucket = self
                .buckets
                .get_mut(&old.nexus)
                .expect("delta subtracts from a bucket that was never credited");
            bucket.object_count -= 1;
            bucket.total_bytes -= old.block_size;
            if old.saturated {
                bucket.saturated_bytes -= old.block_size;
            }
        }
        if let Some(new) = new {
            let bucket = self.buckets.entry(new.nexus).or_default();
            bucket.object_count += 1;
            bucket.total_bytes += new.block_size;
            if new.saturated {
                bucket.saturated_bytes += new.block_size;
            }
        }
    }

    /// The rollup for `nexus`, all-zero if the bucket has never been used.
    pub fn bucket(&self, nexus: &Nexus) -> NexusAggregate {
        let counts = self.buckets.get(nexus).cloned().unwrap_or_default();
        NexusAggregate {
            nexus: nexus.clone(),
            level: nexus.level(),
            object_count: counts.object_count,
            total_bytes: counts.total_bytes,
            saturated_bytes: counts.saturated_bytes,
        }
    }

    /// All buckets, ordered by nexus.
    pub fn buckets(&self) -> impl Iterator<Item = NexusAggregate> + '_ {
        self.buckets.keys().map(|nexus| self.bucket(nexus))
    }

    /// Unsaturated bytes across all buckets below the given replication
    /// level: the outstanding copy work to bring everything to that level.
    pub fn total_undersaturated_bytes(&self, below_level: u32) -> u64 {
        self.buckets()
            .filter(|b| b.level < below_level)
            .map(|b| b.undersaturated_bytes())
            .sum()
    }

    /// Referenced bytes currently occupying the given disk.
    pub fn used_space(&self, disk: u32) -> u64 {
        self.buckets()
            .filter(|b| b.nexus.contains(disk))
            .map(|b| b.total_bytes)
            .sum()
    }

    /// Discard buckets that have returned to all-zero counts. The
    /// empty-nexus bucket is always kept. Returns the number removed.
    pub fn prune_empty(&mut self) -> usize {
        let before = self.buckets.len();
        self.buckets
            .retain(|nexus, counts| nexus.is_empty() || !counts.is_zero());
        let removed = before - self.buckets.len();
        if removed > 0 {
            debug!(removed, "pruned empty nexus buckets");
        }
        removed
    }

    /// Reconstruct the rollup from catalog rows, discarding current state.
    ///
    /// The aggregator is a cache over the rows; this is the reconstruction
    /// path used after loading persisted rows.
    pub fn rebuild<'a>(&mut self, entries: impl Iterator<Item = &'a CatalogEntry>) {
        self.buckets.clear();
        self.buckets.insert(Nexus::empty(), Counts::default());
        for entry in entries {
            let contribution = Contribution::of(entry);
            self.apply_delta(None, contribution);
        }
    }

    /// Check that the rollup agrees with the given catalog rows.
    ///
    /// Failure means the incremental maintenance has a bug; the error is
    /// not recoverable by callers, only by a [`NexusAggregator::rebuild`].
    pub fn verify<'a>(
        &self,
        entries: impl Iterator<Item = &'a CatalogEntry>,
    ) -> CatalogResult<()> {
        let mut fresh = Self::new();
        fresh.rebuild(entries);

        for nexus in self.buckets.keys().chain(fresh.buckets.keys()) {
            let current = self.bucket(nexus);
            let expected = fresh.bucket(nexus);
            if current != expected {
                return Err(CatalogError::Invariant {
                    details: format!(
                        "bucket {:?} holds {}/{}/{} but rows say {}/{}/{}",
                        nexus.as_str(),
                        current.object_count,
                        current.total_bytes,
                        current.saturated_bytes,
                        expected.object_count,
                        expected.total_bytes,
                        expected.saturated_bytes,
                    ),
                });
            }
        }
        Ok(())
    }
}

impl Default for NexusAggregator {
    fn default() -> Self {
        Self::new()
    }
}

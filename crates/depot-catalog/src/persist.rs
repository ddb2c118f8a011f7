//! Catalog persistence over an append log.
//!
//! Each catalog row is stored as one log record: the key is the raw 32-byte
//! content hash, the value a bincode payload of the row. The aggregation
//! rollup is derived state and is never persisted; loading rebuilds it from
//! the rows.

use std::collections::BTreeMap;

use tracing::debug;

use depot_log::AppendLog;
use depot_types::ContentHash;

use crate::catalog::ObjectCatalog;
use crate::disks::DiskRegistry;
use crate::entry::CatalogEntry;
use crate::error::{CatalogError, CatalogResult};

impl ObjectCatalog {
    /// Persist every catalog row into `log`, one record per hash.
    ///
    /// Rows that were pruned since the last save are tombstoned so a later
    /// load sees exactly the current entry set.
    pub fn save_to(&self, log: &AppendLog) -> CatalogResult<()> {
        for entry in self.entries() {
            let payload = bincode::serialize(entry)
                .map_err(|e| CatalogError::Serialization(e.to_string()))?;
            log.put(entry.hash().as_bytes(), &payload)?;
        }
        for key in log.keys() {
            let stale = match hash_from_key(&key) {
                Ok(hash) => self.get(&hash).is_none(),
                Err(_) => true,
            };
            if stale {
                log.remove(&key)?;
            }
        }
        log.sync()?;
        debug!(entries = self.len(), "catalog saved");
        Ok(())
    }

    /// Load a catalog from rows persisted in `log`, rebuilding the
    /// aggregation rollup from scratch.
    pub fn load_from(log: &AppendLog, disks: DiskRegistry) -> CatalogResult<Self> {
        let mut entries = BTreeMap::new();
        for key in log.keys() {
            let hash = hash_from_key(&key)?;
            let payload = log.get(&key)?;
            let entry: CatalogEntry = bincode::deserialize(&payload)
                .map_err(|e| CatalogError::Serialization(e.to_string()))?;
            if entry.hash() != hash {
                return Err(CatalogError::Invariant {
                    details: format!(
                        "row keyed {} decodes to hash {}",
                        hash.short_hex(),
                        entry.hash().short_hex()
                    ),
                });
            }
            entries.insert(hash, entry);
        }
        debug!(entries = entries.len(), "catalog loaded");
        Ok(Self::from_parts(entries, disks))
    }
}

fn hash_from_key(key: &[u8]) -> CatalogResult<ContentHash> {
    let digest: [u8; 32] = key.try_into().map_err(|_| CatalogError::Serialization(
        format!("catalog row key is {} bytes, want 32", key.len()),
    ))?;
    Ok(ContentHash::from_digest(digest))
}

//! Registry of backup disks and their stable nexus indices.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use depot_types::Nexus;

use crate::error::{CatalogError, CatalogResult};

/// One registered backup destination.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupDisk {
    /// Stable identity of the disk, independent of its name or index.
    pub uuid: Uuid,
    /// Human-facing name, unique within the registry.
    pub name: String,
    /// The disk's bit position in every nexus. Stable for the disk's
    /// lifetime; freed indices are reused by later additions.
    pub index: u32,
    /// Capacity in bytes.
    pub size: u64,
}

/// The set of registered backup disks, keyed by nexus index.
///
/// Indices are assigned lowest-free-first so the nexus bitsets stay short:
/// removing a disk leaves a hole that the next addition fills.
#[derive(Clone, Debug, Default)]
pub struct DiskRegistry {
    disks: BTreeMap<u32, BackupDisk>,
}

impl DiskRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a disk under the lowest free index.
    ///
    /// Fails with [`CatalogError::DuplicateDisk`] if the name is taken.
    pub fn add_disk(&mut self, name: &str, size: u64) -> CatalogResult<&BackupDisk> {
        if self.by_name(name).is_some() {
            return Err(CatalogError::DuplicateDisk(name.to_string()));
        }

        let index = (0u32..)
            .find(|candidate| !self.disks.contains_key(candidate))
            .expect("fewer than u32::MAX disks");
        let disk = BackupDisk {
            uuid: Uuid::now_v7(),
            name: name.to_string(),
            index,
            size,
        };
        Ok(self.disks.entry(index).or_insert(disk))
    }

    /// Remove a disk by name, freeing its index for reuse.
    /// Returns `false` if no such disk exists.
    pub fn remove_disk(&mut self, name: &str) -> bool {
        match self.by_name(name).map(|d| d.index) {
            Some(index) => {
                self.disks.remove(&index);
                true
            }
            None => false,
        }
    }

    /// Rename a disk. The uuid and index are unchanged.
    pub fn rename_disk(&mut self, old: &str, new: &str) -> CatalogResult<()> {
        if old != new && self.by_name(new).is_some() {
            return Err(CatalogError::DuplicateDisk(new.to_string()));
        }
        let index = self
            .by_name(old)
            .map(|d| d.index)
            .ok_or_else(|| CatalogError::UnknownDisk(old.to_string()))?;
        self.disks
            .get_mut(&index)
            .expect("index resolved from registry")
            .name = new.to_string();
        Ok(())
    }

    /// Look up a disk by nexus index.
    pub fn get(&self, index: u32) -> Option<&BackupDisk> {
        self.disks.get(&index)
    }

    /// Look up a disk by name.
    pub fn by_name(&self, name: &str) -> Option<&BackupDisk> {
        self.disks.values().find(|d| d.name == name)
    }

    /// Returns `true` if a disk is registered at the given index.
    pub fn contains_index(&self, index: u32) -> bool {
        self.disks.contains_key(&index)
    }

    /// Number of registered disks.
    pub fn len(&self) -> usize {
        self.disks.len()
    }

    /// Returns `true` if no disks are registered.
    pub fn is_empty(&self) -> bool {
        self.disks.is_empty()
    }

    /// All disks, ordered by index.
    pub fn iter(&self) -> impl Iterator<Item = &BackupDisk> {
        self.disks.values()
    }

    /// Names of the disks in a nexus, sorted, for human-facing reporting.
    ///
    /// Indices without a registered disk (a disk removed after copies
    /// landed on it) are reported by index.
    pub fn disk_names(&self, nexus: &Nexus) -> Vec<String> {
        let mut names: Vec<String> = nexus
            .disks()
            .map(|index| match self.get(index) {
                Some(disk) => disk.name.clone(),
                None => format!("disk#{index}"),
            })
            .collect();
        names.sort();
        names
    }
}

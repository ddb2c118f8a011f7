//! The nexus bitset: which backup disks hold a copy of an object.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// The subset of backup disks known to hold a verified copy of an object.
///
/// A nexus is a bitset over stable disk indices, kept in a canonical string
/// form of `'0'`/`'1'` characters with trailing zeros stripped: `""` means
/// no copies anywhere, `"1"` means disk 0 only, `"011"` means disks 1 and 2.
/// The canonical form makes equal disk subsets compare equal as strings, so
/// a `Nexus` can key the per-subset aggregation rollup directly.
///
/// Invariant: the string never ends in `'0'`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Nexus(String);

impl Nexus {
    /// The empty nexus: no disk holds a copy.
    pub const fn empty() -> Self {
        Self(String::new())
    }

    /// Returns `true` if no disk is in this nexus.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` if the given disk index is in this nexus.
    pub fn contains(&self, disk: u32) -> bool {
        self.0.as_bytes().get(disk as usize) == Some(&b'1')
    }

    /// Number of disks in this nexus (the replication factor).
    pub fn level(&self) -> u32 {
        self.0.bytes().filter(|&b| b == b'1').count() as u32
    }

    /// This nexus with the given disk added.
    pub fn with_disk(&self, disk: u32) -> Self {
        let mut bits: Vec<u8> = self.0.clone().into_bytes();
        let index = disk as usize;
        if bits.len() <= index {
            bits.resize(index + 1, b'0');
        }
        bits[index] = b'1';
        // Setting a bit never creates a trailing zero.
        Self(String::from_utf8(bits).expect("nexus bits are ASCII"))
    }

    /// This nexus with the given disk removed.
    pub fn without_disk(&self, disk: u32) -> Self {
        let index = disk as usize;
        if index >= self.0.len() {
            return self.clone();
        }
        let mut bits: Vec<u8> = self.0.clone().into_bytes();
        bits[index] = b'0';
        while bits.last() == Some(&b'0') {
            bits.pop();
        }
        Self(String::from_utf8(bits).expect("nexus bits are ASCII"))
    }

    /// Indices of the disks in this nexus, ascending.
    pub fn disks(&self) -> impl Iterator<Item = u32> + '_ {
        self.0
            .bytes()
            .enumerate()
            .filter(|(_, b)| *b == b'1')
            .map(|(i, _)| i as u32)
    }

    /// The canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Nexus {
    fn default() -> Self {
        Self::empty()
    }
}

impl FromStr for Nexus {
    type Err = TypeError;

    /// Parse a bitset string, canonicalizing trailing zeros away.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        for (position, found) in s.chars().enumerate() {
            if found != '0' && found != '1' {
                return Err(TypeError::InvalidNexusChar { found, position });
            }
        }
        let trimmed = s.trim_end_matches('0');
        Ok(Self(trimmed.to_string()))
    }
}

impl TryFrom<String> for Nexus {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Nexus> for String {
    fn from(nexus: Nexus) -> Self {
        nexus.0
    }
}

impl fmt::Debug for Nexus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nexus({:?})", self.0)
    }
}

impl fmt::Display for Nexus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

//! Foundation types for depot.
//!
//! This crate provides the two identity types shared by every other depot
//! crate:
//!
//! - [`ContentHash`] — content-addressed identifier for a deduplicated object
//! - [`Nexus`] — the subset of backup disks currently holding a verified copy
//!   of an object, as a canonical bitset
//!
//! Both are small value types with full ordering, so they can key maps and
//! produce deterministic iteration order.

pub mod error;
pub mod hash;
pub mod nexus;

pub use error::TypeError;
pub use hash::ContentHash;
pub use nexus::Nexus;

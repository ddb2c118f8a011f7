//! Durable single-writer append-log key/value store.
//!
//! [`AppendLog`] stores key/value pairs in a sequential on-disk log file.
//! Writes always append; nothing is ever rewritten in place. An in-memory
//! index (the key directory) maps each live key to the offset and length of
//! its most recent record, and is rebuilt by replaying the log from offset 0
//! on open. Later records for a key supersede earlier ones, so the log grows
//! monotonically and a `get` is one positioned read.
//!
//! # Durability
//!
//! Two modes, chosen at construction via [`LogConfig`]:
//!
//! - [`SyncMode::EveryWrite`] — fsync after every `put` (safest, slowest)
//! - [`SyncMode::OsDefault`] — flush to the OS only; a power loss can drop
//!   the last few records but never corrupts earlier ones, because records
//!   are immutable once written
//!
//! # Crash recovery
//!
//! A crash mid-write leaves a torn record at the end of the file. Replay
//! stops at the last fully-readable record, logs a warning, and truncates
//! the tail so the next append is contiguous. Everything written before the
//! torn record is recovered intact.
//!
//! # Concurrency
//!
//! One process, one writer. Writes serialize on an internal mutex; reads
//! take a shared lock on the key directory and a positioned read on a
//! separate reader handle. Opening the same log file from two processes is
//! unsupported.

pub mod error;
pub mod log;
pub mod record;

pub use error::{LogError, LogResult};
pub use log::{AppendLog, KeyDirEntry, LogConfig, SyncMode};
pub use record::LogRecord;

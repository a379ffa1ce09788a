//! Partitioned Record Store
//!
//! Confidential key-value partitions backing the settlement engine.
//!
//! # Partitions
//!
//! - `col-{a}-{b}` - Bilateral partition shared by two participants
//!   (ids sorted lexicographically, so both sides name the same partition)
//! - `col-settlement-{p}` - Settlement account of a single participant
//! - `public` - Integrity stubs readable by every ledger member
//!
//! # Guarantees
//!
//! - `write_batch` commits all of its operations or none of them
//! - `scan` enumerates a partition in key order
//! - A partition that cannot be read surfaces as
//!   [`Error::PartitionUnavailable`], never as an empty scan

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod config;
pub mod crypto;
pub mod error;
pub mod storage;
pub mod types;

#[cfg(feature = "rocksdb")]
pub mod rocks;

// Re-exports
pub use config::Config;
pub use error::{Error, Result};
pub use storage::{MemoryStore, PartitionStore, ScanIter, WriteOp};
pub use types::{Currency, ParticipantId, PartitionName};

#[cfg(feature = "rocksdb")]
pub use rocks::RocksStore;

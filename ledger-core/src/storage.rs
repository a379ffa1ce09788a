//! Partitioned key-value storage
//!
//! [`PartitionStore`] is the seam between the settlement engine and whatever
//! holds the confidential partitions. Every engine operation funnels its
//! writes into one [`PartitionStore::write_batch`] call, so a store that
//! commits batches atomically gives the engine all-or-nothing operations.

use crate::{
    error::{Error, Result},
    types::PartitionName,
};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Lazy, finite sequence of `(key, value)` pairs from one partition
pub type ScanIter<'a> = Box<dyn Iterator<Item = Result<(String, Vec<u8>)>> + 'a>;

/// Single put inside a write batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOp {
    /// Target partition
    pub partition: PartitionName,
    /// Key within the partition
    pub key: String,
    /// Serialized value
    pub value: Vec<u8>,
}

impl WriteOp {
    /// Create new put operation
    pub fn put(partition: PartitionName, key: impl Into<String>, value: Vec<u8>) -> Self {
        Self {
            partition,
            key: key.into(),
            value,
        }
    }
}

/// Confidential partitioned record store
pub trait PartitionStore: Send + Sync {
    /// Read one value; `Ok(None)` when the key is absent
    fn get(&self, partition: &PartitionName, key: &str) -> Result<Option<Vec<u8>>>;

    /// Enumerate a partition
    ///
    /// An `Err` from this call means the partition itself is unreadable.
    /// An `Err` item means a single entry could not be read.
    fn scan(&self, partition: &PartitionName) -> Result<ScanIter<'_>>;

    /// Commit every operation, or none of them
    fn write_batch(&self, ops: Vec<WriteOp>) -> Result<()>;

    /// Write a single value
    fn put(&self, partition: &PartitionName, key: &str, value: Vec<u8>) -> Result<()> {
        self.write_batch(vec![WriteOp::put(partition.clone(), key, value)])
    }
}

/// In-memory partition store
///
/// Partitions are key-ordered maps guarded by a single lock; a write batch
/// is applied under one write guard. Partitions can be marked unavailable to
/// reproduce an unreadable peer collection.
#[derive(Debug, Default)]
pub struct MemoryStore {
    partitions: RwLock<HashMap<PartitionName, BTreeMap<String, Vec<u8>>>>,
    unavailable: RwLock<HashSet<PartitionName>>,
}

impl MemoryStore {
    /// Create empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every read and write against `partition` fail
    pub fn mark_unavailable(&self, partition: PartitionName) {
        tracing::warn!(partition = %partition, "Partition marked unavailable");
        self.unavailable.write().insert(partition);
    }

    /// Undo [`MemoryStore::mark_unavailable`]
    pub fn mark_available(&self, partition: &PartitionName) {
        self.unavailable.write().remove(partition);
    }

    /// Number of keys held in a partition
    pub fn partition_len(&self, partition: &PartitionName) -> usize {
        self.partitions
            .read()
            .get(partition)
            .map(|p| p.len())
            .unwrap_or(0)
    }

    fn check_available(&self, partition: &PartitionName) -> Result<()> {
        if self.unavailable.read().contains(partition) {
            return Err(Error::PartitionUnavailable(partition.to_string()));
        }
        Ok(())
    }
}

impl PartitionStore for MemoryStore {
    fn get(&self, partition: &PartitionName, key: &str) -> Result<Option<Vec<u8>>> {
        self.check_available(partition)?;

        Ok(self
            .partitions
            .read()
            .get(partition)
            .and_then(|p| p.get(key).cloned()))
    }

    fn scan(&self, partition: &PartitionName) -> Result<ScanIter<'_>> {
        self.check_available(partition)?;

        // Snapshot so the read guard is not held by the caller
        let entries: Vec<(String, Vec<u8>)> = self
            .partitions
            .read()
            .get(partition)
            .map(|p| p.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();

        Ok(Box::new(entries.into_iter().map(Ok)))
    }

    fn write_batch(&self, ops: Vec<WriteOp>) -> Result<()> {
        // Validate the whole batch before touching anything
        for op in &ops {
            self.check_available(&op.partition)?;
        }

        let count = ops.len();
        let mut partitions = self.partitions.write();
        for op in ops {
            partitions
                .entry(op.partition)
                .or_default()
                .insert(op.key, op.value);
        }

        tracing::debug!(writes = count, "Write batch committed");
        Ok(())
    }
}

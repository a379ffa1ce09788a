//! RocksDB-backed partition store
//!
//! All partitions share the default column family. A record key is the
//! partition name, a NUL byte, then the record key, so one partition is a
//! contiguous key range and a partition scan is a bounded forward seek.

use crate::{
    error::{Error, Result},
    storage::{PartitionStore, ScanIter, WriteOp},
    types::PartitionName,
    Config,
};
use rocksdb::{DBCompactionStyle, Direction, IteratorMode, Options, WriteBatch, WriteOptions, DB};
use std::sync::Arc;

const PARTITION_DELIMITER: u8 = 0;

/// Partition store persisted in RocksDB
pub struct RocksStore {
    db: Arc<DB>,
    sync_writes: bool,
}

impl RocksStore {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);

        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);
        db_opts.set_compaction_style(DBCompactionStyle::Level);
        db_opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let db = DB::open(&db_opts, path)?;

        tracing::info!(path = ?path, "Opened RocksDB partition store");

        Ok(Self {
            db: Arc::new(db),
            sync_writes: config.rocksdb.sync_writes,
        })
    }

    fn prefix(partition: &PartitionName) -> Vec<u8> {
        let mut prefix = Vec::with_capacity(partition.as_str().len() + 1);
        prefix.extend_from_slice(partition.as_str().as_bytes());
        prefix.push(PARTITION_DELIMITER);
        prefix
    }

    fn record_key(partition: &PartitionName, key: &str) -> Vec<u8> {
        let mut full = Self::prefix(partition);
        full.extend_from_slice(key.as_bytes());
        full
    }
}

impl PartitionStore for RocksStore {
    fn get(&self, partition: &PartitionName, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get(Self::record_key(partition, key))?)
    }

    fn scan(&self, partition: &PartitionName) -> Result<ScanIter<'_>> {
        let prefix = Self::prefix(partition);
        let prefix_len = prefix.len();

        let iter = self
            .db
            .iterator(IteratorMode::From(&prefix, Direction::Forward));
        let iter = iter
            .take_while(move |item| match item {
                Ok((k, _)) => k.starts_with(&prefix),
                Err(_) => true,
            })
            .map(move |item| {
                let (k, v) = item?;
                let key = std::str::from_utf8(&k[prefix_len..])
                    .map_err(|e| Error::Storage(format!("Non UTF-8 record key: {}", e)))?
                    .to_string();
                Ok((key, v.into_vec()))
            });

        Ok(Box::new(iter))
    }

    fn write_batch(&self, ops: Vec<WriteOp>) -> Result<()> {
        let mut batch = WriteBatch::default();
        let count = ops.len();

        for op in ops {
            batch.put(Self::record_key(&op.partition, &op.key), op.value);
        }

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.sync_writes);
        self.db.write_opt(batch, &write_opts)?;

        tracing::debug!(writes = count, "Write batch committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ParticipantId;
    use tempfile::TempDir;

    fn open_temp() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let config = Config {
            data_dir: dir.path().to_path_buf(),
            ..Config::default()
        };
        (RocksStore::open(&config).unwrap(), dir)
    }

    #[test]
    fn test_scan_stays_inside_partition() {
        let (store, _dir) = open_temp();
        let a = PartitionName::settlement(&ParticipantId::new("BankA"));
        let ab = PartitionName::bilateral(&ParticipantId::new("BankA"), &ParticipantId::new("BankB"));

        store
            .write_batch(vec![
                WriteOp::put(a.clone(), "balance", b"1".to_vec()),
                WriteOp::put(ab.clone(), "pay1", b"2".to_vec()),
                WriteOp::put(ab.clone(), "pay2", b"3".to_vec()),
            ])
            .unwrap();

        let entries: Vec<(String, Vec<u8>)> =
            store.scan(&ab).unwrap().map(|e| e.unwrap()).collect();
        assert_eq!(
            entries,
            vec![
                ("pay1".to_string(), b"2".to_vec()),
                ("pay2".to_string(), b"3".to_vec()),
            ]
        );
        assert_eq!(store.get(&a, "balance").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn test_reopen_keeps_data() {
        let dir = TempDir::new().unwrap();
        let config = Config {
            data_dir: dir.path().to_path_buf(),
            ..Config::default()
        };
        let public = PartitionName::public();

        {
            let store = RocksStore::open(&config).unwrap();
            store.put(&public, "stub1", b"x".to_vec()).unwrap();
        }

        let store = RocksStore::open(&config).unwrap();
        assert_eq!(store.get(&public, "stub1").unwrap(), Some(b"x".to_vec()));
    }
}

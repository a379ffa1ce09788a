//! Property-based tests for the partition store
//!
//! - Last write wins per key within a partition
//! - Scans return keys in order and never leak across partitions
//! - Bilateral partition naming is symmetric

use ledger_core::{MemoryStore, ParticipantId, PartitionName, PartitionStore, WriteOp};
use proptest::prelude::*;
use std::collections::BTreeMap;

fn participant_strategy() -> impl Strategy<Value = ParticipantId> {
    "[A-Za-z]{1,8}(MSP)?".prop_map(ParticipantId::new)
}

fn partition_strategy() -> impl Strategy<Value = PartitionName> {
    prop_oneof![
        Just(PartitionName::public()),
        participant_strategy().prop_map(|p| PartitionName::settlement(&p)),
        (participant_strategy(), participant_strategy())
            .prop_map(|(a, b)| PartitionName::bilateral(&a, &b)),
    ]
}

fn write_strategy() -> impl Strategy<Value = WriteOp> {
    (
        partition_strategy(),
        "[a-z0-9]{1,6}",
        proptest::collection::vec(any::<u8>(), 0..16),
    )
        .prop_map(|(partition, key, value)| WriteOp::put(partition, key, value))
}

proptest! {
    #[test]
    fn prop_scan_matches_model(ops in proptest::collection::vec(write_strategy(), 0..64)) {
        let store = MemoryStore::new();
        let mut model: BTreeMap<PartitionName, BTreeMap<String, Vec<u8>>> = BTreeMap::new();

        for op in &ops {
            model
                .entry(op.partition.clone())
                .or_default()
                .insert(op.key.clone(), op.value.clone());
        }
        store.write_batch(ops).unwrap();

        for (partition, expected) in &model {
            let scanned: BTreeMap<String, Vec<u8>> = store
                .scan(partition)
                .unwrap()
                .map(|item| item.unwrap())
                .collect();
            prop_assert_eq!(&scanned, expected);

            let keys: Vec<String> = store
                .scan(partition)
                .unwrap()
                .map(|item| item.unwrap().0)
                .collect();
            let mut sorted = keys.clone();
            sorted.sort();
            prop_assert_eq!(keys, sorted);
        }
    }

    #[test]
    fn prop_bilateral_partition_symmetric(a in participant_strategy(), b in participant_strategy()) {
        prop_assert_eq!(PartitionName::bilateral(&a, &b), PartitionName::bilateral(&b, &a));
    }

    #[test]
    fn prop_get_sees_last_write(
        key in "[a-z]{1,4}",
        values in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..8), 1..10),
    ) {
        let store = MemoryStore::new();
        let partition = PartitionName::public();

        for value in &values {
            store.put(&partition, &key, value.clone()).unwrap();
        }

        prop_assert_eq!(store.get(&partition, &key).unwrap(), values.last().cloned());
    }
}

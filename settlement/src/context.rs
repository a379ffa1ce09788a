//! Shared collaborators and the per-operation write set
//!
//! Every component holds an `Arc<SettlementContext>`. An operation reads
//! through the context, stages its writes in a [`WriteSet`] and commits them
//! with a single [`SettlementContext::commit`], so the store sees one batch
//! per operation.

use crate::{
    events::{EventSink, SettlementEvent},
    identity::IdentityProvider,
    metrics::SettlementMetrics,
    types::{ParticipantId, ParticipantSet, PartitionName, PaymentRecord},
    window::BatchWindowScheduler,
    Error, Result,
};
use ledger_core::{PartitionStore, WriteOp};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Writes staged by one operation
///
/// Later puts to the same key replace earlier ones; reads made through
/// [`WriteSet::read_json`] see staged values before the store.
#[derive(Debug, Default)]
pub struct WriteSet {
    staged: BTreeMap<(PartitionName, String), Vec<u8>>,
}

impl WriteSet {
    /// Create empty write set
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a JSON value
    pub fn put_json<T: Serialize>(
        &mut self,
        partition: PartitionName,
        key: impl Into<String>,
        value: &T,
    ) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.staged.insert((partition, key.into()), bytes);
        Ok(())
    }

    /// Read a JSON value, staged writes first
    pub fn read_json<T: DeserializeOwned>(
        &self,
        store: &dyn PartitionStore,
        partition: &PartitionName,
        key: &str,
    ) -> Result<Option<T>> {
        let staged = self.staged.get(&(partition.clone(), key.to_string()));
        let bytes = match staged {
            Some(bytes) => Some(bytes.clone()),
            None => store.get(partition, key)?,
        };
        bytes
            .map(|b| serde_json::from_slice(&b).map_err(Error::from))
            .transpose()
    }

    /// Number of staged writes
    pub fn len(&self) -> usize {
        self.staged.len()
    }

    /// Nothing staged
    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    fn into_ops(self) -> Vec<WriteOp> {
        self.staged
            .into_iter()
            .map(|((partition, key), value)| WriteOp::put(partition, key, value))
            .collect()
    }
}

/// Collaborators shared by every settlement component
pub struct SettlementContext {
    store: Arc<dyn PartitionStore>,
    identity: Arc<dyn IdentityProvider>,
    events: Arc<dyn EventSink>,
    participants: ParticipantSet,
    windows: BatchWindowScheduler,
    metrics: SettlementMetrics,
}

impl SettlementContext {
    /// Create new context
    pub fn new(
        store: Arc<dyn PartitionStore>,
        identity: Arc<dyn IdentityProvider>,
        events: Arc<dyn EventSink>,
        participants: ParticipantSet,
        windows: BatchWindowScheduler,
        metrics: SettlementMetrics,
    ) -> Self {
        Self {
            store,
            identity,
            events,
            participants,
            windows,
            metrics,
        }
    }

    /// Record store
    pub fn store(&self) -> &dyn PartitionStore {
        self.store.as_ref()
    }

    /// Network membership
    pub fn participants(&self) -> &ParticipantSet {
        &self.participants
    }

    /// Batch window calculator
    pub fn windows(&self) -> &BatchWindowScheduler {
        &self.windows
    }

    /// Metrics
    pub fn metrics(&self) -> &SettlementMetrics {
        &self.metrics
    }

    /// Participant invoking the current operation
    pub fn caller(&self) -> Result<ParticipantId> {
        self.identity.current_participant()
    }

    /// Fail unless the caller is the clearinghouse
    pub fn require_clearinghouse(&self, operation: &str) -> Result<ParticipantId> {
        let caller = self.caller()?;
        if !self.participants.is_clearinghouse(&caller) {
            return Err(Error::Unauthorized(format!(
                "{} is restricted to the clearinghouse, caller is {}",
                operation, caller
            )));
        }
        Ok(caller)
    }

    /// Fail unless the caller is one of `parties` or the clearinghouse
    pub fn require_party_or_clearinghouse(
        &self,
        operation: &str,
        parties: &[&ParticipantId],
    ) -> Result<ParticipantId> {
        let caller = self.caller()?;
        if !self.participants.is_clearinghouse(&caller) && !parties.contains(&&caller) {
            return Err(Error::Unauthorized(format!(
                "{} is not permitted for {}",
                operation, caller
            )));
        }
        Ok(caller)
    }

    /// Fail unless `id` is a configured bank
    pub fn require_bank(&self, id: &ParticipantId) -> Result<()> {
        if !self.participants.is_bank(id) {
            return Err(Error::InvalidInput(format!("{} is not a configured bank", id)));
        }
        Ok(())
    }

    /// Read one JSON value straight from the store
    pub fn read_json<T: DeserializeOwned>(
        &self,
        partition: &PartitionName,
        key: &str,
    ) -> Result<Option<T>> {
        WriteSet::new().read_json(self.store(), partition, key)
    }

    /// Every parseable payment record of a bilateral partition
    ///
    /// Unreadable or malformed entries are skipped with a warning. An
    /// unreadable partition is an error.
    pub fn scan_payments(&self, partition: &PartitionName) -> Result<Vec<PaymentRecord>> {
        let mut records = Vec::new();

        for item in self.store.scan(partition)? {
            let (key, bytes) = match item {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(partition = %partition, error = %e, "Skipping unreadable entry");
                    self.metrics.records_skipped.inc();
                    continue;
                }
            };

            match serde_json::from_slice::<PaymentRecord>(&bytes) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(
                        partition = %partition,
                        key = %key,
                        error = %e,
                        "Skipping malformed payment record"
                    );
                    self.metrics.records_skipped.inc();
                }
            }
        }

        Ok(records)
    }

    /// Commit staged writes as one batch
    pub fn commit(&self, writes: WriteSet) -> Result<()> {
        if writes.is_empty() {
            return Ok(());
        }
        self.store.write_batch(writes.into_ops())?;
        Ok(())
    }

    /// Publish an event; failures are logged and counted, never returned
    pub fn emit(&self, event: SettlementEvent) {
        if let Err(e) = self.events.emit(&event) {
            tracing::warn!(event = event.name(), error = %e, "Failed to emit settlement event");
            self.metrics.event_failures.inc();
        }
    }

    /// Publish events in order
    pub fn emit_all(&self, events: impl IntoIterator<Item = SettlementEvent>) {
        for event in events {
            self.emit(event);
        }
    }
}

impl std::fmt::Debug for SettlementContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettlementContext")
            .field("participants", &self.participants)
            .field("windows", &self.windows)
            .finish_non_exhaustive()
    }
}

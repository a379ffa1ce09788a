//! Settlement engine
//!
//! Wires the components around one shared [`SettlementContext`].

use crate::{
    accounts::SettlementLedger,
    bilateral::BilateralNetting,
    context::SettlementContext,
    events::EventSink,
    identity::IdentityProvider,
    lifecycle::PaymentLifecycle,
    metrics::SettlementMetrics,
    multilateral::MultilateralNetting,
    scheduler::NettingScheduler,
    types::{ParticipantSet, SettlementAccount},
    window::BatchWindowScheduler,
    Config, Error, Result,
};
use ledger_core::{config::StoreBackend, MemoryStore, PartitionStore};
use std::sync::Arc;

/// Settlement engine
#[derive(Debug)]
pub struct SettlementEngine {
    config: Config,
    ctx: Arc<SettlementContext>,
    lifecycle: PaymentLifecycle,
    ledger: SettlementLedger,
    bilateral: BilateralNetting,
    multilateral: MultilateralNetting,
}

impl SettlementEngine {
    /// Create engine over an existing store
    pub fn new(
        config: Config,
        store: Arc<dyn PartitionStore>,
        identity: Arc<dyn IdentityProvider>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self> {
        config.validate()?;

        let participants = config.participants.participant_set()?;
        let windows = BatchWindowScheduler::new(config.window.duration_seconds)?;
        let metrics = SettlementMetrics::new()?;

        let ctx = Arc::new(SettlementContext::new(
            store,
            identity,
            events,
            participants,
            windows,
            metrics,
        ));

        tracing::info!(
            service = %config.service_name,
            banks = ctx.participants().banks().len(),
            clearinghouse = %ctx.participants().clearinghouse(),
            window_seconds = config.window.duration_seconds,
            "Settlement engine initialized"
        );

        Ok(Self {
            lifecycle: PaymentLifecycle::new(ctx.clone()),
            ledger: SettlementLedger::new(ctx.clone()),
            bilateral: BilateralNetting::new(ctx.clone()),
            multilateral: MultilateralNetting::new(ctx.clone(), config.netting.eligibility),
            config,
            ctx,
        })
    }

    /// Create engine with the store the configuration names
    pub fn open(
        config: Config,
        identity: Arc<dyn IdentityProvider>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self> {
        let store = open_store(&config.store)?;
        Self::new(config, store, identity, events)
    }

    /// Seed every bank's settlement account (clearinghouse only)
    pub fn bootstrap(&self) -> Result<Vec<SettlementAccount>> {
        if !self.config.seed.enabled {
            tracing::info!("Account seeding disabled");
            return Ok(Vec::new());
        }

        self.ctx
            .participants()
            .banks()
            .iter()
            .map(|bank| {
                self.ledger
                    .seed_account(bank, self.config.seed.balance_for(bank))
            })
            .collect()
    }

    /// Scheduler driving multilateral netting for this engine
    pub fn scheduler(&self) -> NettingScheduler {
        NettingScheduler::new(
            self.multilateral.clone(),
            *self.ctx.windows(),
            self.config.netting.per_window,
            self.config.netting.poll_interval_seconds,
        )
    }

    /// Payment lifecycle
    pub fn lifecycle(&self) -> &PaymentLifecycle {
        &self.lifecycle
    }

    /// Settlement ledger
    pub fn ledger(&self) -> &SettlementLedger {
        &self.ledger
    }

    /// Bilateral netting
    pub fn bilateral(&self) -> &BilateralNetting {
        &self.bilateral
    }

    /// Multilateral netting
    pub fn multilateral(&self) -> &MultilateralNetting {
        &self.multilateral
    }

    /// Batch windows
    pub fn windows(&self) -> &BatchWindowScheduler {
        self.ctx.windows()
    }

    /// Network membership
    pub fn participants(&self) -> &ParticipantSet {
        self.ctx.participants()
    }

    /// Metrics
    pub fn metrics(&self) -> &SettlementMetrics {
        self.ctx.metrics()
    }

    /// Configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}

fn open_store(config: &ledger_core::Config) -> Result<Arc<dyn PartitionStore>> {
    match config.backend {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; records are lost on exit");
            Ok(Arc::new(MemoryStore::new()))
        }
        #[cfg(feature = "rocksdb")]
        StoreBackend::RocksDb => Ok(Arc::new(ledger_core::RocksStore::open(config)?)),
        #[cfg(not(feature = "rocksdb"))]
        StoreBackend::RocksDb => Err(Error::Config(
            "RocksDB backend requires the `rocksdb` feature".to_string(),
        )),
    }
}

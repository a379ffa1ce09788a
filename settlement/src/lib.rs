//! Interbank Netting & Settlement Engine
//!
//! Settles payment obligations among a fixed set of banks and a
//! clearinghouse using confidential bilateral records and periodic netting.
//!
//! # Architecture
//!
//! Components, leaves first:
//!
//! 1. **Payment lifecycle** ([`lifecycle`]): PENDING → ACKNOWLEDGED →
//!    BATCHED → netted or settled gross, re-QUEUED when funds are short
//! 2. **Settlement ledger** ([`accounts`]): debit/credit of per-participant
//!    settlement balances
//! 3. **Bilateral netting** ([`bilateral`]): offsets two participants'
//!    queued obligations against each other
//! 4. **Multilateral netting** ([`multilateral`]): nets all pairs at once and
//!    moves money once per participant
//! 5. **Batch windows** ([`window`]) and the [`scheduler`] that nets each
//!    window after it closes
//!
//! Netting is two-phase: `calculate_*` returns a proposal without writing
//! anything, `apply_*` takes that proposal and commits it in one atomic
//! batch. Each proposed update carries the record version it was computed
//! from, so a record changed in between makes the apply fail with
//! [`Error::WriteConflict`] and nothing is written.
//!
//! # Example
//!
//! ```no_run
//! use settlement::{Config, NewPayment, SettlementEngine, StaticIdentity, TracingEventSink};
//! use rust_decimal::Decimal;
//! use std::sync::Arc;
//!
//! fn main() -> settlement::Result<()> {
//!     let identity = Arc::new(StaticIdentity::new("CentralBankMSP"));
//!     let engine = SettlementEngine::open(Config::default(), identity.clone(), Arc::new(TracingEventSink))?;
//!     engine.bootstrap()?;
//!
//!     identity.switch_to("AccessBankMSP");
//!     let payment = engine
//!         .lifecycle()
//!         .create(NewPayment::new("AccessBankMSP", "GTBankMSP", Decimal::new(1_000_000, 2)))?;
//!
//!     identity.switch_to("GTBankMSP");
//!     engine.lifecycle().acknowledge(&payment.id)?;
//!
//!     identity.switch_to("CentralBankMSP");
//!     engine.lifecycle().batch(&payment.id)?;
//!     let report = engine.multilateral().execute_scheduled_netting()?;
//!     println!("Settled {} payments, {} moved", report.updates_count, report.total_settled);
//!
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod accounts;
pub mod bilateral;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod events;
pub mod identity;
pub mod lifecycle;
pub mod metrics;
pub mod multilateral;
pub mod scheduler;
pub mod types;
pub mod window;

// Re-exports
pub use accounts::{DebitOutcome, SettlementLedger};
pub use bilateral::BilateralNetting;
pub use config::Config;
pub use context::SettlementContext;
pub use engine::SettlementEngine;
pub use error::{Error, Result};
pub use events::{EventSink, RecordingEventSink, SettlementEvent, TracingEventSink};
pub use identity::{IdentityProvider, StaticIdentity};
pub use lifecycle::PaymentLifecycle;
pub use metrics::SettlementMetrics;
pub use multilateral::MultilateralNetting;
pub use scheduler::NettingScheduler;
pub use types::*;
pub use window::{BatchWindowInfo, BatchWindowScheduler, WindowStatus};

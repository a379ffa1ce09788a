//! Netting scheduler
//!
//! Runs a multilateral pass once per closed batch window. `tick` is the
//! synchronous, clock-injected step; `run` drives it from a tokio interval.

use crate::{
    multilateral::MultilateralNetting,
    types::{BatchWindowId, NettingReport},
    window::BatchWindowScheduler,
    Result,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Triggers scheduled netting as windows close
#[derive(Debug)]
pub struct NettingScheduler {
    netting: MultilateralNetting,
    windows: BatchWindowScheduler,
    per_window: bool,
    poll_interval_seconds: u64,
    last_processed: Mutex<Option<BatchWindowId>>,
}

impl NettingScheduler {
    /// Create scheduler
    ///
    /// With `per_window` each closed window gets its own pass, which also
    /// takes in earlier windows' records that became eligible late; otherwise
    /// one pass nets everything eligible whenever a window closes.
    pub fn new(
        netting: MultilateralNetting,
        windows: BatchWindowScheduler,
        per_window: bool,
        poll_interval_seconds: u64,
    ) -> Self {
        Self {
            netting,
            windows,
            per_window,
            poll_interval_seconds,
            last_processed: Mutex::new(None),
        }
    }

    /// Most recent window already netted
    pub fn last_processed(&self) -> Option<BatchWindowId> {
        *self.last_processed.lock()
    }

    /// Net every window that has closed since the previous tick
    ///
    /// A failed pass leaves the window unprocessed so the next tick retries
    /// it. The first tick starts from the most recently closed window.
    pub fn tick(&self, now: DateTime<Utc>) -> Result<Vec<NettingReport>> {
        let closed = self.windows.window_at(now) - 1;
        let mut last = self.last_processed.lock();

        let first = match *last {
            Some(done) if done >= closed => return Ok(Vec::new()),
            Some(done) => done + 1,
            None => closed,
        };

        let mut reports = Vec::new();
        if self.per_window {
            for window in first..=closed {
                reports.push(self.netting.execute_through_window_at(window, now)?);
                *last = Some(window);
            }
        } else {
            reports.push(self.netting.execute_scheduled_netting()?);
            *last = Some(closed);
        }

        debug!(closed_window = closed, passes = reports.len(), "Scheduler tick complete");
        Ok(reports)
    }

    /// Poll forever
    pub async fn run(self: Arc<Self>) {
        info!(
            poll_interval_seconds = self.poll_interval_seconds,
            per_window = self.per_window,
            "Starting netting scheduler"
        );

        let mut interval =
            tokio::time::interval(tokio::time::Duration::from_secs(self.poll_interval_seconds));

        loop {
            interval.tick().await;

            let scheduler = self.clone();
            match tokio::task::spawn_blocking(move || scheduler.tick(Utc::now())).await {
                Ok(Ok(reports)) => {
                    for report in reports.iter().filter(|r| r.executed) {
                        info!(
                            batch_window = ?report.batch_window,
                            updates = report.updates_count,
                            total_settled = %report.total_settled,
                            "Scheduled netting executed"
                        );
                    }
                }
                Ok(Err(e)) => warn!("Scheduled netting failed: {}", e),
                Err(e) => error!("Scheduler task panicked: {}", e),
            }
        }
    }
}

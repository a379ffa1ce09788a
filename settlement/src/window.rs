//! Batch window scheduling
//!
//! Windows are fixed-duration buckets of wall-clock time:
//! `window = floor(unix_seconds / duration)`. Nothing is stored; every
//! query is a pure function of the clock, and each has an `_at` form taking
//! an explicit instant.
//!
//! Relative to the current window `c`, a window `w` is
//! - FUTURE when `w > c`
//! - ACTIVE when `w == c`
//! - PROCESSING when `w == c - 1`
//! - COMPLETED otherwise
//!
//! A window is ready for settlement once it is no longer active (`w < c`).

use crate::{types::BatchWindowId, Error, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Window status relative to the current window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WindowStatus {
    /// Not started yet
    Future,
    /// Collecting payments
    Active,
    /// Immediately prior window, being netted
    Processing,
    /// Older than the processing window
    Completed,
}

impl fmt::Display for WindowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WindowStatus::Future => "FUTURE",
            WindowStatus::Active => "ACTIVE",
            WindowStatus::Processing => "PROCESSING",
            WindowStatus::Completed => "COMPLETED",
        };
        f.write_str(s)
    }
}

/// Description of one window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchWindowInfo {
    /// Window ID
    pub window_id: BatchWindowId,
    /// Inclusive start
    pub start_time: DateTime<Utc>,
    /// Exclusive end
    pub end_time: DateTime<Utc>,
    /// Status at the time of the query
    pub status: WindowStatus,
    /// Whether this is the current window
    pub is_current: bool,
}

/// Position of an instant inside its window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementCycleInfo {
    /// Current window
    pub current_window: BatchWindowId,
    /// Window start
    pub window_start: DateTime<Utc>,
    /// Window end
    pub window_end: DateTime<Utc>,
    /// Seconds since window start
    pub elapsed_seconds: i64,
    /// Seconds until window end
    pub remaining_seconds: i64,
    /// Elapsed share of the window, 0-100
    pub progress_percent: f64,
}

/// Batch window calculator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchWindowScheduler {
    duration_seconds: i64,
}

impl BatchWindowScheduler {
    /// Create scheduler with the given window duration
    pub fn new(duration_seconds: u64) -> Result<Self> {
        let duration_seconds = i64::try_from(duration_seconds)
            .ok()
            .filter(|d| *d > 0)
            .ok_or_else(|| {
                Error::Config(format!("Invalid window duration {}s", duration_seconds))
            })?;
        Ok(Self { duration_seconds })
    }

    /// Window duration
    pub fn duration(&self) -> Duration {
        Duration::seconds(self.duration_seconds)
    }

    /// Window containing `now`
    pub fn window_at(&self, now: DateTime<Utc>) -> BatchWindowId {
        now.timestamp().div_euclid(self.duration_seconds)
    }

    /// Current window
    pub fn current_window(&self) -> BatchWindowId {
        self.window_at(Utc::now())
    }

    /// Status of `window` as seen at `now`
    pub fn status_at(&self, window: BatchWindowId, now: DateTime<Utc>) -> WindowStatus {
        let current = self.window_at(now);
        if window > current {
            WindowStatus::Future
        } else if window == current {
            WindowStatus::Active
        } else if window == current - 1 {
            WindowStatus::Processing
        } else {
            WindowStatus::Completed
        }
    }

    /// Status of `window` now
    pub fn window_status(&self, window: BatchWindowId) -> WindowStatus {
        self.status_at(window, Utc::now())
    }

    /// `[start, end)` of `window`
    pub fn window_bounds(&self, window: BatchWindowId) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        let start_secs = window
            .checked_mul(self.duration_seconds)
            .ok_or_else(|| Error::InvalidInput(format!("Batch window {} out of range", window)))?;
        let start = Utc
            .timestamp_opt(start_secs, 0)
            .single()
            .ok_or_else(|| Error::InvalidInput(format!("Batch window {} out of range", window)))?;
        let end = start
            .checked_add_signed(self.duration())
            .ok_or_else(|| Error::InvalidInput(format!("Batch window {} out of range", window)))?;
        Ok((start, end))
    }

    /// Whether `window` has closed as of `now`
    pub fn is_ready_for_settlement_at(&self, window: BatchWindowId, now: DateTime<Utc>) -> bool {
        window < self.window_at(now)
    }

    /// Whether `window` has closed
    pub fn is_ready_for_settlement(&self, window: BatchWindowId) -> bool {
        self.is_ready_for_settlement_at(window, Utc::now())
    }

    /// Reject windows that have not started yet
    pub fn validate_window_at(&self, window: BatchWindowId, now: DateTime<Utc>) -> Result<()> {
        let current = self.window_at(now);
        if window > current {
            return Err(Error::InvalidInput(format!(
                "Batch window {} is in the future (current: {})",
                window, current
            )));
        }
        Ok(())
    }

    /// Describe `window` as seen at `now`
    pub fn info_at(&self, window: BatchWindowId, now: DateTime<Utc>) -> Result<BatchWindowInfo> {
        let (start_time, end_time) = self.window_bounds(window)?;
        Ok(BatchWindowInfo {
            window_id: window,
            start_time,
            end_time,
            status: self.status_at(window, now),
            is_current: window == self.window_at(now),
        })
    }

    /// Position of `now` inside its window
    pub fn cycle_info_at(&self, now: DateTime<Utc>) -> Result<SettlementCycleInfo> {
        let current_window = self.window_at(now);
        let (window_start, window_end) = self.window_bounds(current_window)?;
        let elapsed_seconds = (now - window_start).num_seconds();

        Ok(SettlementCycleInfo {
            current_window,
            window_start,
            window_end,
            elapsed_seconds,
            remaining_seconds: (window_end - now).num_seconds(),
            progress_percent: elapsed_seconds as f64 / self.duration_seconds as f64 * 100.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    #[test]
    fn test_window_assignment() {
        let windows = BatchWindowScheduler::new(120).unwrap();

        assert_eq!(windows.window_at(at(0)), 0);
        assert_eq!(windows.window_at(at(119)), 0);
        assert_eq!(windows.window_at(at(120)), 1);
        assert_eq!(windows.window_at(at(1_700_000_000)), 14_166_666);
    }

    #[test]
    fn test_window_status() {
        let windows = BatchWindowScheduler::new(120).unwrap();
        let now = at(1200); // window 10

        assert_eq!(windows.status_at(11, now), WindowStatus::Future);
        assert_eq!(windows.status_at(10, now), WindowStatus::Active);
        assert_eq!(windows.status_at(9, now), WindowStatus::Processing);
        assert_eq!(windows.status_at(8, now), WindowStatus::Completed);
    }

    #[test]
    fn test_ready_for_settlement() {
        let windows = BatchWindowScheduler::new(120).unwrap();
        let now = at(1250);

        assert!(windows.is_ready_for_settlement_at(9, now));
        assert!(!windows.is_ready_for_settlement_at(10, now));
        assert!(windows.validate_window_at(10, now).is_ok());
        assert!(windows.validate_window_at(11, now).is_err());
    }

    #[test]
    fn test_window_bounds_and_cycle() {
        let windows = BatchWindowScheduler::new(120).unwrap();
        let (start, end) = windows.window_bounds(10).unwrap();
        assert_eq!(start, at(1200));
        assert_eq!(end, at(1320));

        let cycle = windows.cycle_info_at(at(1230)).unwrap();
        assert_eq!(cycle.current_window, 10);
        assert_eq!(cycle.elapsed_seconds, 30);
        assert_eq!(cycle.remaining_seconds, 90);
        assert!((cycle.progress_percent - 25.0).abs() < f64::EPSILON);

        let info = windows.info_at(10, at(1230)).unwrap();
        assert!(info.is_current);
        assert_eq!(info.status, WindowStatus::Active);
    }

    #[test]
    fn test_last_representable_window_is_an_error() {
        let windows = BatchWindowScheduler::new(120).unwrap();
        let last = windows.window_at(DateTime::<Utc>::MAX_UTC);

        assert!(matches!(windows.window_bounds(last), Err(Error::InvalidInput(_))));
        assert!(windows.info_at(last, DateTime::<Utc>::MAX_UTC).is_err());
        assert!(windows.window_bounds(i64::MAX).is_err());
    }

    #[test]
    fn test_zero_duration_rejected() {
        assert!(BatchWindowScheduler::new(0).is_err());
    }
}

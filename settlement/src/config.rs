//! Configuration for settlement engine

use crate::types::{Eligibility, ParticipantId, ParticipantSet};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Settlement engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Record store configuration
    pub store: ledger_core::Config,

    /// Batch window configuration
    pub window: WindowConfig,

    /// Network membership
    pub participants: ParticipantConfig,

    /// Netting configuration
    pub netting: NettingConfig,

    /// Bootstrap balances
    pub seed: SeedConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "netting-engine".to_string(),
            store: ledger_core::Config::default(),
            window: WindowConfig::default(),
            participants: ParticipantConfig::default(),
            netting: NettingConfig::default(),
            seed: SeedConfig::default(),
        }
    }
}

/// Batch window configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Window duration in seconds (default: 2 minutes)
    pub duration_seconds: u64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            duration_seconds: 120,
        }
    }
}

/// Network membership
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticipantConfig {
    /// Banks holding bilateral partitions
    pub banks: Vec<String>,

    /// Clearinghouse (settlement operations only, no bilateral partitions)
    pub clearinghouse: String,
}

impl Default for ParticipantConfig {
    fn default() -> Self {
        Self {
            banks: vec![
                "AccessBankMSP".to_string(),
                "GTBankMSP".to_string(),
                "ZenithBankMSP".to_string(),
                "FirstBankMSP".to_string(),
            ],
            clearinghouse: "CentralBankMSP".to_string(),
        }
    }
}

impl ParticipantConfig {
    /// Validated participant set
    pub fn participant_set(&self) -> crate::Result<ParticipantSet> {
        ParticipantSet::new(
            self.banks.iter().map(ParticipantId::new),
            ParticipantId::new(self.clearinghouse.as_str()),
        )
    }
}

/// Netting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NettingConfig {
    /// Records a multilateral pass nets
    pub eligibility: Eligibility,

    /// How often the scheduler looks for closed windows (seconds)
    pub poll_interval_seconds: u64,

    /// Restrict scheduled passes to the closed window
    pub per_window: bool,
}

impl Default for NettingConfig {
    fn default() -> Self {
        Self {
            eligibility: Eligibility::default(),
            poll_interval_seconds: 30,
            per_window: false,
        }
    }
}

/// Bootstrap balances
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedConfig {
    /// Seed every bank at startup
    pub enabled: bool,

    /// Balance given to banks without an explicit entry
    pub initial_balance: Decimal,

    /// Per-bank overrides
    pub balances: BTreeMap<String, Decimal>,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_balance: Decimal::new(15_000_000_000, 0),
            balances: BTreeMap::new(),
        }
    }
}

impl SeedConfig {
    /// Balance to seed for `bank`
    pub fn balance_for(&self, bank: &ParticipantId) -> Decimal {
        self.balances
            .get(bank.as_str())
            .copied()
            .unwrap_or(self.initial_balance)
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `SETTLEMENT_*` and `LEDGER_*` environment variables
    pub fn apply_env(&mut self) -> crate::Result<()> {
        self.store.apply_env()?;

        if let Ok(duration) = std::env::var("SETTLEMENT_WINDOW_SECONDS") {
            self.window.duration_seconds = duration.parse().map_err(|e| {
                crate::Error::Config(format!("Invalid SETTLEMENT_WINDOW_SECONDS: {}", e))
            })?;
        }

        if let Ok(banks) = std::env::var("SETTLEMENT_BANKS") {
            self.participants.banks = banks
                .split(',')
                .map(str::trim)
                .filter(|b| !b.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Ok(clearinghouse) = std::env::var("SETTLEMENT_CLEARINGHOUSE") {
            self.participants.clearinghouse = clearinghouse;
        }

        if let Ok(interval) = std::env::var("SETTLEMENT_POLL_INTERVAL_SECONDS") {
            self.netting.poll_interval_seconds = interval.parse().map_err(|e| {
                crate::Error::Config(format!("Invalid SETTLEMENT_POLL_INTERVAL_SECONDS: {}", e))
            })?;
        }

        Ok(())
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.window.duration_seconds == 0 {
            return Err(crate::Error::Config(
                "Window duration must be positive".to_string(),
            ));
        }
        if self.netting.poll_interval_seconds == 0 {
            return Err(crate::Error::Config(
                "Poll interval must be positive".to_string(),
            ));
        }
        if self.participants.banks.is_empty() {
            return Err(crate::Error::Config("At least one bank is required".to_string()));
        }
        self.participants.participant_set()?;
        Ok(())
    }
}

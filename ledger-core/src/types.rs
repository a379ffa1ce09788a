//! Core identifiers for the record store
//!
//! Partition names are derived, never chosen by callers: the same pair of
//! participants always maps to the same bilateral partition regardless of
//! which side asks.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Participant identifier (membership service id of a bank or the clearinghouse)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    /// Create new participant ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Currency code carried on every payment record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Currency(String);

impl Currency {
    /// Create from code
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// The central-bank digital currency settled by the network
    pub fn enaira() -> Self {
        Self::new("eNaira")
    }

    /// Currency code
    pub fn code(&self) -> &str {
        &self.0
    }
}

impl Default for Currency {
    fn default() -> Self {
        Self::enaira()
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name of a confidential partition
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionName(String);

impl PartitionName {
    /// Separator between the segments of a partition name
    pub const SEPARATOR: char = '-';

    /// Bilateral partition shared by `a` and `b` (order-insensitive)
    pub fn bilateral(a: &ParticipantId, b: &ParticipantId) -> Self {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        Self(format!("col-{}-{}", lo, hi))
    }

    /// Settlement-account partition of a single participant
    pub fn settlement(participant: &ParticipantId) -> Self {
        Self(format!("col-settlement-{}", participant))
    }

    /// Public partition holding integrity stubs
    pub fn public() -> Self {
        Self("public".to_string())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartitionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bilateral_partition_is_canonical() {
        let access = ParticipantId::new("AccessBankMSP");
        let gtbank = ParticipantId::new("GTBankMSP");

        let ab = PartitionName::bilateral(&access, &gtbank);
        let ba = PartitionName::bilateral(&gtbank, &access);

        assert_eq!(ab, ba);
        assert_eq!(ab.as_str(), "col-AccessBankMSP-GTBankMSP");
    }

    #[test]
    fn test_settlement_partition() {
        let zenith = ParticipantId::new("ZenithBankMSP");
        assert_eq!(
            PartitionName::settlement(&zenith).as_str(),
            "col-settlement-ZenithBankMSP"
        );
    }

    #[test]
    fn test_participant_ordering_is_lexicographic() {
        // Byte-wise ordering: uppercase sorts before lowercase
        assert!(ParticipantId::new("Zenith") < ParticipantId::new("access"));
        assert!(ParticipantId::new("BankA") < ParticipantId::new("BankB"));
    }

    #[test]
    fn test_default_currency() {
        assert_eq!(Currency::default().code(), "eNaira");
    }
}

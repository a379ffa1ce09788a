//! Caller identity
//!
//! The engine never derives identity itself; it asks an [`IdentityProvider`]
//! who is invoking the current operation.

use crate::{types::ParticipantId, Result};
use parking_lot::RwLock;

/// Source of the invoking participant
pub trait IdentityProvider: Send + Sync {
    /// Participant invoking the current operation
    fn current_participant(&self) -> Result<ParticipantId>;
}

/// Fixed identity that can be switched between calls
#[derive(Debug)]
pub struct StaticIdentity {
    current: RwLock<ParticipantId>,
}

impl StaticIdentity {
    /// Act as `participant`
    pub fn new(participant: impl Into<String>) -> Self {
        Self {
            current: RwLock::new(ParticipantId::new(participant)),
        }
    }

    /// Act as someone else for subsequent calls
    pub fn switch_to(&self, participant: impl Into<String>) {
        *self.current.write() = ParticipantId::new(participant);
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_participant(&self) -> Result<ParticipantId> {
        Ok(self.current.read().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_switch_identity() {
        let identity = StaticIdentity::new("BankA");
        assert_eq!(identity.current_participant().unwrap().as_str(), "BankA");

        identity.switch_to("CentralBankMSP");
        assert_eq!(
            identity.current_participant().unwrap().as_str(),
            "CentralBankMSP"
        );
    }
}

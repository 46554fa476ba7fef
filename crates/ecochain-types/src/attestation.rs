use serde::{Deserialize, Serialize};

use crate::epoch::Epoch;
use crate::ids::{OperationId, ProofHandle};

/// Idempotency key of an attestation: at most one per operation per epoch.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttestationKey {
    pub operation_id: OperationId,
    pub epoch: Epoch,
}

impl AttestationKey {
    pub fn new(operation_id: OperationId, epoch: Epoch) -> Self {
        Self {
            operation_id,
            epoch,
        }
    }
}

/// Outcome of verifying an operation's proof for one epoch.
///
/// `verified = false` is a permanent rejection for that epoch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    pub operation_id: OperationId,
    pub epoch: Epoch,
    pub proof_handle: ProofHandle,
    /// blake3 digest of the claims the verifier was asked about.
    pub claims_digest: String,
    pub verified: bool,
    /// Epoch in which the verifier answered.
    pub verified_at_epoch: Epoch,
    /// Verifier calls made, including transient failures.
    pub attempts: u32,
}

impl Attestation {
    pub fn key(&self) -> AttestationKey {
        AttestationKey::new(self.operation_id.clone(), self.epoch)
    }
}

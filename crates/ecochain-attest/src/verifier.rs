use async_trait::async_trait;
use ecochain_types::{Epoch, OperationId, ProofHandle};
use serde::{Deserialize, Serialize};

use crate::error::VerifierFault;

/// What the caller asks the gateway to attest for one operation and epoch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimSet {
    pub proof_handle: ProofHandle,
    /// Overall score the proof is claimed to cover, if any.
    pub overall_score: Option<u8>,
}

impl ClaimSet {
    pub fn new(proof_handle: ProofHandle) -> Self {
        Self {
            proof_handle,
            overall_score: None,
        }
    }

    pub fn with_score(mut self, overall_score: u8) -> Self {
        self.overall_score = Some(overall_score);
        self
    }
}

/// The request handed to the external verifier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofClaims {
    pub operation_id: OperationId,
    pub epoch: Epoch,
    pub proof_handle: ProofHandle,
    pub overall_score: Option<u8>,
}

impl ProofClaims {
    pub fn new(operation_id: OperationId, epoch: Epoch, claims: ClaimSet) -> Self {
        Self {
            operation_id,
            epoch,
            proof_handle: claims.proof_handle,
            overall_score: claims.overall_score,
        }
    }

    /// blake3 over the canonical claim encoding, hex encoded.
    pub fn digest(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.operation_id.as_str().as_bytes());
        hasher.update(&[0]);
        hasher.update(&self.epoch.0.to_be_bytes());
        hasher.update(&[0]);
        hasher.update(self.proof_handle.as_str().as_bytes());
        hasher.update(&[0]);
        match self.overall_score {
            Some(score) => hasher.update(&[1, score]),
            None => hasher.update(&[0]),
        };
        hasher.finalize().to_hex().to_string()
    }
}

/// External proof verifier. Treated as a black box that may be slow or fail
/// transiently; `Ok(false)` is a definitive rejection.
#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(&self, claims: &ProofClaims) -> Result<bool, VerifierFault>;
}

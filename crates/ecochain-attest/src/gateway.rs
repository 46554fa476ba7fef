use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use ecochain_types::{
    Attestation, AttestationKey, BackoffConfig, Epoch, EpochClock, OperationId, RetryPolicy,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::error::{VerificationError, VerificationResult, VerifierFault};
use crate::verifier::{ClaimSet, ProofClaims, Verifier};

/// Retry and timeout settings for verifier calls.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_retry")]
    pub retry: RetryPolicy,

    /// Per-call timeout (milliseconds); a timeout counts as transient
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            retry: default_retry(),
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

fn default_retry() -> RetryPolicy {
    RetryPolicy::new(3, BackoffConfig::default())
}

fn default_call_timeout_ms() -> u64 {
    5_000
}

/// Verified/rejected counts over a set of attestations.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationSummary {
    pub epoch: Option<Epoch>,
    pub total: usize,
    pub verified: usize,
    pub rejected: usize,
}

/// Memoizing front for an external [`Verifier`].
pub struct ProofGateway {
    verifier: Arc<dyn Verifier>,
    config: GatewayConfig,
    clock: EpochClock,
    /// Definitive answers, one per (operation, epoch).
    attestations: DashMap<AttestationKey, Attestation>,
    /// Per-key locks for keys without a definitive answer yet; the lock
    /// serializes callers of the same key only.
    pending: DashMap<AttestationKey, Arc<Mutex<()>>>,
}

impl ProofGateway {
    pub fn new(verifier: Arc<dyn Verifier>, config: GatewayConfig, clock: EpochClock) -> Self {
        Self {
            verifier,
            config,
            clock,
            attestations: DashMap::new(),
            pending: DashMap::new(),
        }
    }

    fn lock_for(&self, key: &AttestationKey) -> Arc<Mutex<()>> {
        self.pending
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn cached(&self, key: &AttestationKey) -> Option<Attestation> {
        self.attestations.get(key).map(|entry| entry.value().clone())
    }

    /// Keys still waiting for a definitive answer.
    pub fn pending_keys(&self) -> usize {
        self.pending.len()
    }

    fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.config.call_timeout_ms.max(1))
    }

    /// Attest `claims` for `(operation_id, epoch)`.
    ///
    /// Returns the cached attestation if one exists for the key. Otherwise
    /// verifies, retrying transient faults, and caches the definitive answer.
    /// Exhausting the retry budget caches nothing, so a later call may try
    /// again.
    #[instrument(skip(self, claims), fields(operation_id = %operation_id, epoch = epoch.0))]
    pub async fn attest(
        &self,
        operation_id: &OperationId,
        epoch: Epoch,
        claims: ClaimSet,
    ) -> VerificationResult<Attestation> {
        if claims.proof_handle.as_str().trim().is_empty() {
            return Err(VerificationError::InvalidClaims {
                operation_id: operation_id.clone(),
                reason: "empty proof handle".into(),
            });
        }

        let key = AttestationKey::new(operation_id.clone(), epoch);
        if let Some(existing) = self.cached(&key) {
            debug!("Attestation cache hit");
            return Ok(existing);
        }
        let lock = self.lock_for(&key);
        let _guard = lock.lock().await;
        if let Some(existing) = self.cached(&key) {
            debug!("Attestation cache hit after wait");
            return Ok(existing);
        }

        let request = ProofClaims::new(operation_id.clone(), epoch, claims);
        let (verified, attempts) = self.verify_with_retry(&request).await?;

        let attestation = Attestation {
            operation_id: operation_id.clone(),
            epoch,
            proof_handle: request.proof_handle.clone(),
            claims_digest: request.digest(),
            verified,
            verified_at_epoch: self.clock.current(),
            attempts,
        };
        if verified {
            info!(attempts, "Proof verified");
        } else {
            warn!(attempts, "Proof rejected, permanent for this epoch");
        }
        self.attestations.insert(key.clone(), attestation.clone());
        self.pending.remove(&key);
        Ok(attestation)
    }

    async fn verify_with_retry(&self, claims: &ProofClaims) -> VerificationResult<(bool, u32)> {
        let policy = &self.config.retry;
        let timeout = self.call_timeout();
        let mut attempts = 0;
        loop {
            attempts += 1;
            let fault = match tokio::time::timeout(timeout, self.verifier.verify(claims)).await {
                Ok(Ok(verified)) => return Ok((verified, attempts)),
                Ok(Err(fault)) => fault,
                Err(_) => VerifierFault::Timeout {
                    after_ms: timeout.as_millis() as u64,
                },
            };

            if !policy.allows_retry(attempts) {
                warn!(attempts, fault = %fault, "Verifier retry budget exhausted");
                return Err(VerificationError::RetriesExhausted {
                    operation_id: claims.operation_id.clone(),
                    epoch: claims.epoch,
                    attempts,
                    last_fault: fault,
                });
            }

            let delay = policy.backoff.delay_for_attempt(attempts);
            warn!(
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                fault = %fault,
                "Transient verifier failure, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Cached attestation for a key. `None` if absent or still in flight.
    pub fn get(&self, operation_id: &OperationId, epoch: Epoch) -> Option<Attestation> {
        self.cached(&AttestationKey::new(operation_id.clone(), epoch))
    }

    /// Settled attestations, optionally for one epoch, by (epoch, operation).
    pub fn list(&self, epoch: Option<Epoch>) -> Vec<Attestation> {
        let mut attestations: Vec<Attestation> = self
            .attestations
            .iter()
            .filter(|entry| epoch.map_or(true, |e| entry.key().epoch == e))
            .map(|entry| entry.value().clone())
            .collect();
        attestations.sort_by(|a, b| (a.epoch, &a.operation_id).cmp(&(b.epoch, &b.operation_id)));
        attestations
    }

    pub fn summary(&self, epoch: Option<Epoch>) -> AttestationSummary {
        let attestations = self.list(epoch);
        let verified = attestations.iter().filter(|a| a.verified).count();
        AttestationSummary {
            epoch,
            total: attestations.len(),
            verified,
            rejected: attestations.len() - verified,
        }
    }
}

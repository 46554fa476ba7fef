//! Simulated Verifier and Ledger used when the daemon runs standalone.
//!
//! Both can inject transient faults at a configurable rate so the retry
//! paths see traffic.

use async_trait::async_trait;
use dashmap::DashMap;
use ecochain_attest::{ProofClaims, Verifier, VerifierFault};
use ecochain_distribution::{Ledger, LedgerError, LedgerTxStatus};
use ecochain_types::{OperationId, ProofHandle, TxHandle};
use rand::Rng;

use crate::config::SimulationConfig;

fn roll(rate: f64) -> bool {
    rate > 0.0 && rand::thread_rng().gen_bool(rate.clamp(0.0, 1.0))
}

/// Accepts a proof iff its handle is the digest of the claimed public inputs.
pub struct SimulatedVerifier {
    failure_rate: f64,
}

impl SimulatedVerifier {
    pub fn new(failure_rate: f64) -> Self {
        Self { failure_rate }
    }

    pub fn from_config(config: &SimulationConfig) -> Self {
        Self::new(config.verifier_failure_rate)
    }
}

#[async_trait]
impl Verifier for SimulatedVerifier {
    async fn verify(&self, claims: &ProofClaims) -> Result<bool, VerifierFault> {
        if roll(self.failure_rate) {
            return Err(VerifierFault::Transient("simulated verifier fault".into()));
        }
        let verified = match claims.overall_score {
            Some(score) => {
                claims.proof_handle
                    == ProofHandle::derive(&claims.operation_id, claims.epoch, score)
            }
            None => false,
        };
        Ok(verified)
    }
}

/// Ledger whose transfers become final after a fixed number of status polls.
pub struct SimulatedLedger {
    finality_polls: u32,
    failure_rate: f64,
    transactions: DashMap<TxHandle, u32>,
}

impl SimulatedLedger {
    pub fn new(finality_polls: u32, failure_rate: f64) -> Self {
        Self {
            finality_polls: finality_polls.max(1),
            failure_rate,
            transactions: DashMap::new(),
        }
    }

    pub fn from_config(config: &SimulationConfig) -> Self {
        Self::new(config.ledger_finality_polls, config.ledger_failure_rate)
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }
}

#[async_trait]
impl Ledger for SimulatedLedger {
    async fn transfer(
        &self,
        recipient: &OperationId,
        amount: i64,
    ) -> Result<TxHandle, LedgerError> {
        if recipient.as_str().trim().is_empty() {
            return Err(LedgerError::Rejected("empty recipient".into()));
        }
        if amount <= 0 {
            return Err(LedgerError::Rejected(format!("non-positive amount {amount}")));
        }
        if roll(self.failure_rate) {
            return Err(LedgerError::Transient("simulated ledger fault".into()));
        }
        let tx = TxHandle::new(format!("0x{}", uuid::Uuid::new_v4().simple()));
        self.transactions.insert(tx.clone(), 0);
        tracing::debug!(tx = %tx, recipient = %recipient, amount, "Simulated transfer accepted");
        Ok(tx)
    }

    async fn get_status(&self, tx: &TxHandle) -> Result<LedgerTxStatus, LedgerError> {
        let mut polls = match self.transactions.get_mut(tx) {
            Some(polls) => polls,
            None => return Ok(LedgerTxStatus::Failed),
        };
        *polls += 1;
        if *polls >= self.finality_polls {
            Ok(LedgerTxStatus::Confirmed)
        } else {
            Ok(LedgerTxStatus::Pending)
        }
    }
}

use ecochain_types::{Epoch, OperationId};
use thiserror::Error;

/// Collaborator-side failure of a single `verify` call. All are retryable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifierFault {
    #[error("transient verifier failure: {0}")]
    Transient(String),

    #[error("verifier unavailable: {0}")]
    Unavailable(String),

    #[error("verifier call timed out after {after_ms} ms")]
    Timeout { after_ms: u64 },
}

/// Surfaced by the gateway when no definitive answer could be obtained.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    #[error("verification of {operation_id} for epoch {epoch} gave up after {attempts} attempts: {last_fault}")]
    RetriesExhausted {
        operation_id: OperationId,
        epoch: Epoch,
        attempts: u32,
        last_fault: VerifierFault,
    },

    #[error("invalid claims for {operation_id}: {reason}")]
    InvalidClaims {
        operation_id: OperationId,
        reason: String,
    },
}

pub type VerificationResult<T> = Result<T, VerificationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_error_carries_context() {
        let err = VerificationError::RetriesExhausted {
            operation_id: OperationId::new("op-7"),
            epoch: Epoch(12),
            attempts: 3,
            last_fault: VerifierFault::Timeout { after_ms: 250 },
        };
        let s = err.to_string();
        assert!(s.contains("op-7"));
        assert!(s.contains("epoch 12"));
        assert!(s.contains("3 attempts"));
        assert!(s.contains("250 ms"));
    }
}

//! Error types for planning and executing distributions

use ecochain_types::{Epoch, OperationId, PlanId, RecordKey, TransitionError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// Qualifying operations exist but there is nothing to hand out.
    #[error("reward pool for epoch {epoch} is empty ({total_pool}) but operations qualify")]
    EmptyPool { epoch: Epoch, total_pool: i64 },

    #[error("epoch {epoch} already has plan {existing}")]
    AlreadyPlanned { epoch: Epoch, existing: PlanId },

    #[error("more than one score for {operation_id} in epoch {epoch}")]
    DuplicateScore { operation_id: OperationId, epoch: Epoch },
}

/// Failure of a ledger call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Network or ledger-side hiccup; worth retrying.
    #[error("transient ledger error: {0}")]
    Transient(String),

    #[error("ledger call timed out after {after_ms} ms")]
    Timeout { after_ms: u64 },

    /// The ledger refused the transfer (e.g. invalid recipient).
    #[error("ledger rejected transfer: {0}")]
    Rejected(String),
}

impl LedgerError {
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Transient(_) | LedgerError::Timeout { .. })
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("record store backend error: {0}")]
    Backend(String),
}

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    #[error("record store: {0}")]
    Store(#[from] StoreError),

    #[error("distribution record not found: {0}")]
    RecordNotFound(RecordKey),
}

pub type PlanResult<T> = Result<T, PlanError>;
pub type StoreResult<T> = Result<T, StoreError>;
pub type ExecutorResult<T> = Result<T, ExecutorError>;

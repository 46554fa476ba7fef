use async_trait::async_trait;
use ecochain_types::{OperationId, TxHandle};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Ledger-side state of a submitted transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerTxStatus {
    Pending,
    Confirmed,
    Failed,
}

/// External token ledger.
///
/// Amounts are minor token units. The ledger is not assumed to deduplicate
/// transfers; callers must not submit the same allocation twice.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn transfer(&self, recipient: &OperationId, amount: i64) -> Result<TxHandle, LedgerError>;

    async fn get_status(&self, tx: &TxHandle) -> Result<LedgerTxStatus, LedgerError>;
}

//! Reward distribution for EcoChain epochs.
//!
//! [`DistributionPlanner`] turns an epoch's scores and attestations into a
//! deterministic [`DistributionPlan`](ecochain_types::DistributionPlan);
//! [`PlanRegistry`] guards against planning one epoch twice.
//! [`DistributionExecutor`] drives each allocation through the external
//! [`Ledger`] with at-most-once effective delivery, persisting progress in a
//! [`RecordStore`].

pub mod error;
pub mod executor;
pub mod ledger;
pub mod planner;
pub mod store;

pub use error::{ExecutorError, LedgerError, PlanError, StoreError, StoreResult};
pub use executor::{DistributionExecutor, ExecutorConfig, PlanOutcome};
pub use ledger::{Ledger, LedgerTxStatus};
pub use planner::{DistributionPlanner, PlanRegistry, PlannerConfig};
pub use store::{InMemoryRecordStore, RecordStore};

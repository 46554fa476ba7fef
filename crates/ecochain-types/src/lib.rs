//! # ecochain-types
//!
//! Shared vocabulary for the EcoChain sustainability-scoring and reward
//! pipeline. Every entity that crosses a component boundary lives here:
//!
//! - [`OperationRecord`]: a normalized, immutable telemetry snapshot
//! - [`ScoreResult`]: the explainable composite score of one record
//! - [`Attestation`]: the verified-or-rejected outcome of a proof check
//! - [`DistributionPlan`] / [`DistributionRecord`]: a reward allocation and
//!   the per-recipient transfer state machine that carries it out
//!
//! Time is bucketed into fixed-length reporting epochs ([`EpochClock`]).
//! Retry behaviour for the external collaborators is described by
//! [`RetryPolicy`].
//!
//! This crate performs no I/O.

pub mod attestation;
pub mod distribution;
pub mod epoch;
pub mod ids;
pub mod operation;
pub mod retry;
pub mod score;

pub use attestation::{Attestation, AttestationKey};
pub use distribution::{
    AllocationPolicy, DistributionPlan, DistributionRecord, DistributionStatus, RecordKey,
    TransitionError,
};
pub use epoch::{Epoch, EpochClock};
pub use ids::{OperationId, PlanId, ProofHandle, TxHandle};
pub use operation::{CoolingKind, EnergySourceKind, LocationRegion, OperationRecord, UnknownVariant};
pub use retry::{BackoffConfig, RetryPolicy};
pub use score::ScoreResult;

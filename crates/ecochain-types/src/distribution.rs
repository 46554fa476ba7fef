use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::epoch::Epoch;
use crate::ids::{OperationId, PlanId, TxHandle};

/// How a reward pool is divided between eligible operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AllocationPolicy {
    /// Share proportional to `overall_score`.
    #[default]
    Proportional,
    /// Same share for every eligible operation.
    EqualSplit,
    /// Share proportional to a caller-supplied capacity weight.
    WeightedByCapacity,
}

impl AllocationPolicy {
    pub fn label(&self) -> &'static str {
        match self {
            AllocationPolicy::Proportional => "proportional",
            AllocationPolicy::EqualSplit => "equal_split",
            AllocationPolicy::WeightedByCapacity => "weighted_by_capacity",
        }
    }
}

impl fmt::Display for AllocationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A deterministic reward allocation for one epoch.
///
/// Only operations holding a qualifying score and a verified attestation for
/// `epoch` appear in `allocations`. `sum(allocations) + residual == total_pool`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionPlan {
    pub plan_id: PlanId,
    pub epoch: Epoch,
    pub policy: AllocationPolicy,
    /// Pool size in minor token units.
    pub total_pool: i64,
    /// Positive allocations, keyed and iterated in operation id order.
    pub allocations: BTreeMap<OperationId, i64>,
    /// Rounding remainder kept back from distribution.
    pub residual: i64,
    /// Eligible operations whose share rounded down to zero.
    pub zero_allocations: Vec<OperationId>,
}

impl DistributionPlan {
    pub fn allocated_total(&self) -> i64 {
        self.allocations.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.allocations.is_empty()
    }
}

/// Transfer state of one allocation.
///
/// ```text
/// Pending ──► Submitted ──► Confirmed
///    │            │
///    └────────────┴──► Failed
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionStatus {
    Pending,
    Submitted,
    Confirmed,
    Failed,
}

impl DistributionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DistributionStatus::Confirmed | DistributionStatus::Failed)
    }

    /// Status only ever moves forward.
    pub fn can_transition_to(&self, next: DistributionStatus) -> bool {
        use DistributionStatus::*;
        matches!(
            (self, next),
            (Pending, Submitted) | (Pending, Failed) | (Submitted, Confirmed) | (Submitted, Failed)
        )
    }
}

impl fmt::Display for DistributionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DistributionStatus::Pending => "pending",
            DistributionStatus::Submitted => "submitted",
            DistributionStatus::Confirmed => "confirmed",
            DistributionStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Backward or sideways status move.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid distribution transition {from} -> {to}")]
pub struct TransitionError {
    pub from: DistributionStatus,
    pub to: DistributionStatus,
}

/// Identity of a distribution record: one per plan per operation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    pub plan_id: PlanId,
    pub operation_id: OperationId,
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.plan_id, self.operation_id)
    }
}

/// Persisted progress of a single reward transfer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionRecord {
    pub plan_id: PlanId,
    pub operation_id: OperationId,
    pub amount: i64,
    pub status: DistributionStatus,
    /// Ledger transfer attempts made so far.
    pub attempts: u32,
    /// A transfer call was started and its result not yet recorded.
    #[serde(default)]
    pub transfer_in_flight: bool,
    pub last_error: Option<String>,
    /// Set once the ledger accepted the transfer.
    pub tx_handle: Option<TxHandle>,
    pub updated_at: DateTime<Utc>,
}

impl DistributionRecord {
    pub fn pending(plan_id: PlanId, operation_id: OperationId, amount: i64) -> Self {
        Self {
            plan_id,
            operation_id,
            amount,
            status: DistributionStatus::Pending,
            attempts: 0,
            transfer_in_flight: false,
            last_error: None,
            tx_handle: None,
            updated_at: Utc::now(),
        }
    }

    pub fn key(&self) -> RecordKey {
        RecordKey {
            plan_id: self.plan_id.clone(),
            operation_id: self.operation_id.clone(),
        }
    }

    fn transition(&mut self, next: DistributionStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.transfer_in_flight = false;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Count a transfer attempt and mark it unacknowledged until its result
    /// is recorded.
    pub fn begin_attempt(&mut self) {
        self.attempts += 1;
        self.transfer_in_flight = true;
        self.updated_at = Utc::now();
    }

    /// The ledger answered the current attempt with an error.
    pub fn attempt_refused(&mut self, reason: impl Into<String>) {
        self.transfer_in_flight = false;
        self.note_error(reason);
    }

    pub fn mark_submitted(&mut self, tx: TxHandle) -> Result<(), TransitionError> {
        self.transition(DistributionStatus::Submitted)?;
        self.tx_handle = Some(tx);
        self.last_error = None;
        Ok(())
    }

    pub fn mark_confirmed(&mut self) -> Result<(), TransitionError> {
        self.transition(DistributionStatus::Confirmed)?;
        self.last_error = None;
        Ok(())
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(DistributionStatus::Failed)?;
        self.last_error = Some(reason.into());
        Ok(())
    }

    /// Note a non-terminal error without changing status.
    pub fn note_error(&mut self, reason: impl Into<String>) {
        self.last_error = Some(reason.into());
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> DistributionRecord {
        DistributionRecord::pending(PlanId::new("plan-1"), OperationId::new("op-1"), 500)
    }

    #[test]
    fn happy_path_moves_forward() {
        let mut r = record();
        r.mark_submitted(TxHandle::new("tx-1")).unwrap();
        assert_eq!(r.status, DistributionStatus::Submitted);
        assert_eq!(r.tx_handle, Some(TxHandle::new("tx-1")));
        r.mark_confirmed().unwrap();
        assert!(r.status.is_terminal());
    }

    #[test]
    fn confirmed_cannot_move_back_or_fail() {
        let mut r = record();
        r.mark_submitted(TxHandle::new("tx-1")).unwrap();
        r.mark_confirmed().unwrap();
        let err = r.mark_failed("late").unwrap_err();
        assert_eq!(err.from, DistributionStatus::Confirmed);
        assert_eq!(err.to, DistributionStatus::Failed);
        assert!(r.mark_submitted(TxHandle::new("tx-2")).is_err());
        assert_eq!(r.status, DistributionStatus::Confirmed);
    }

    #[test]
    fn pending_cannot_skip_to_confirmed() {
        let mut r = record();
        assert!(r.mark_confirmed().is_err());
        assert_eq!(r.status, DistributionStatus::Pending);
    }

    #[test]
    fn attempt_marker_clears_on_answer() {
        let mut r = record();
        r.begin_attempt();
        assert_eq!(r.attempts, 1);
        assert!(r.transfer_in_flight);
        r.attempt_refused("503");
        assert!(!r.transfer_in_flight);
        assert_eq!(r.status, DistributionStatus::Pending);

        r.begin_attempt();
        r.mark_submitted(TxHandle::new("tx-1")).unwrap();
        assert_eq!(r.attempts, 2);
        assert!(!r.transfer_in_flight);
    }

    #[test]
    fn failure_keeps_reason() {
        let mut r = record();
        r.mark_failed("invalid recipient").unwrap();
        assert_eq!(r.last_error.as_deref(), Some("invalid recipient"));
        assert!(r.status.is_terminal());
    }

    #[test]
    fn plan_totals() {
        let mut allocations = BTreeMap::new();
        allocations.insert(OperationId::new("a"), 60);
        allocations.insert(OperationId::new("b"), 39);
        let plan = DistributionPlan {
            plan_id: PlanId::new("p"),
            epoch: Epoch(1),
            policy: AllocationPolicy::Proportional,
            total_pool: 100,
            allocations,
            residual: 1,
            zero_allocations: vec![],
        };
        assert_eq!(plan.allocated_total() + plan.residual, plan.total_pool);
        assert!(!plan.is_empty());
    }
}

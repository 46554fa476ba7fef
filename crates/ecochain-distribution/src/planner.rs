use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Write as _;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use ecochain_types::{
    AllocationPolicy, Attestation, DistributionPlan, Epoch, OperationId, PlanId, ScoreResult,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{PlanError, PlanResult};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannerConfig {
    #[serde(default)]
    pub policy: AllocationPolicy,
}

/// Turns an epoch's scores and attestations into a [`DistributionPlan`].
///
/// Planning is a pure function of its inputs. Input order never matters:
/// eligibility is resolved into maps keyed by operation id and shares are
/// computed in operation id order with integer arithmetic.
#[derive(Clone, Debug, Default)]
pub struct DistributionPlanner {
    config: PlannerConfig,
}

impl DistributionPlanner {
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    pub fn policy(&self) -> AllocationPolicy {
        self.config.policy
    }

    /// Plan the distribution of `total_pool` minor units for `epoch`.
    ///
    /// An operation is eligible when its score for `epoch` qualifies and it
    /// holds a verified attestation for `epoch`. `capacities` is only read by
    /// [`AllocationPolicy::WeightedByCapacity`]; a missing entry weighs zero.
    pub fn plan(
        &self,
        epoch: Epoch,
        total_pool: i64,
        scores: &[ScoreResult],
        attestations: &[Attestation],
        capacities: &HashMap<OperationId, u64>,
    ) -> PlanResult<DistributionPlan> {
        let mut epoch_scores: BTreeMap<&OperationId, &ScoreResult> = BTreeMap::new();
        for score in scores.iter().filter(|s| s.epoch == epoch) {
            if epoch_scores.insert(&score.operation_id, score).is_some() {
                return Err(PlanError::DuplicateScore {
                    operation_id: score.operation_id.clone(),
                    epoch,
                });
            }
        }

        let verified: BTreeSet<&OperationId> = attestations
            .iter()
            .filter(|a| a.epoch == epoch && a.verified)
            .map(|a| &a.operation_id)
            .collect();

        let eligible: Vec<(&OperationId, u128)> = epoch_scores
            .into_iter()
            .filter(|(id, score)| score.qualifies && verified.contains(id))
            .map(|(id, score)| (id, self.weight(id, score, capacities)))
            .collect();

        if !eligible.is_empty() && total_pool <= 0 {
            return Err(PlanError::EmptyPool { epoch, total_pool });
        }

        let total_weight: u128 = eligible.iter().map(|(_, w)| w).sum();
        let mut allocations = BTreeMap::new();
        let mut zero_allocations = Vec::new();
        for (id, weight) in eligible {
            let share = if total_weight == 0 {
                0
            } else {
                // total_pool > 0 here, and share <= total_pool fits in i64.
                (total_pool as u128 * weight / total_weight) as i64
            };
            if share > 0 {
                allocations.insert(id.clone(), share);
            } else {
                zero_allocations.push(id.clone());
            }
        }

        let allocated: i64 = allocations.values().sum();
        let residual = total_pool - allocated;
        let contents = canonical_contents(
            epoch,
            self.config.policy,
            total_pool,
            &allocations,
            &zero_allocations,
        );
        let plan_id = PlanId::derive(epoch, contents.as_bytes());

        debug!(
            plan_id = %plan_id,
            epoch = epoch.0,
            eligible = allocations.len() + zero_allocations.len(),
            allocated,
            residual,
            "Planned distribution"
        );

        Ok(DistributionPlan {
            plan_id,
            epoch,
            policy: self.config.policy,
            total_pool,
            allocations,
            residual,
            zero_allocations,
        })
    }

    fn weight(
        &self,
        id: &OperationId,
        score: &ScoreResult,
        capacities: &HashMap<OperationId, u64>,
    ) -> u128 {
        match self.config.policy {
            AllocationPolicy::Proportional => score.overall_score as u128,
            AllocationPolicy::EqualSplit => 1,
            AllocationPolicy::WeightedByCapacity => {
                capacities.get(id).copied().unwrap_or(0) as u128
            }
        }
    }
}

fn canonical_contents(
    epoch: Epoch,
    policy: AllocationPolicy,
    total_pool: i64,
    allocations: &BTreeMap<OperationId, i64>,
    zero_allocations: &[OperationId],
) -> String {
    let mut out = format!("epoch={};policy={};pool={}", epoch.0, policy.label(), total_pool);
    for (id, amount) in allocations {
        let _ = write!(out, ";alloc:{}={}", id, amount);
    }
    for id in zero_allocations {
        let _ = write!(out, ";zero:{}", id);
    }
    out
}

/// At most one plan per epoch.
#[derive(Default)]
pub struct PlanRegistry {
    plans: DashMap<Epoch, DistributionPlan>,
}

impl PlanRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `plan` for its epoch.
    ///
    /// Re-registering an identical plan returns the stored one; a different
    /// plan for an already planned epoch is refused.
    pub fn register(&self, plan: DistributionPlan) -> PlanResult<DistributionPlan> {
        match self.plans.entry(plan.epoch) {
            Entry::Occupied(existing) => {
                if existing.get() == &plan {
                    Ok(existing.get().clone())
                } else {
                    Err(PlanError::AlreadyPlanned {
                        epoch: plan.epoch,
                        existing: existing.get().plan_id.clone(),
                    })
                }
            }
            Entry::Vacant(slot) => {
                info!(
                    plan_id = %plan.plan_id,
                    epoch = plan.epoch.0,
                    "Registered distribution plan"
                );
                Ok(slot.insert(plan).clone())
            }
        }
    }

    pub fn for_epoch(&self, epoch: Epoch) -> Option<DistributionPlan> {
        self.plans.get(&epoch).map(|p| p.clone())
    }

    pub fn get(&self, plan_id: &PlanId) -> Option<DistributionPlan> {
        self.plans
            .iter()
            .find(|p| &p.plan_id == plan_id)
            .map(|p| p.clone())
    }

    /// All plans, by epoch.
    pub fn list(&self) -> Vec<DistributionPlan> {
        let mut plans: Vec<DistributionPlan> = self.plans.iter().map(|p| p.clone()).collect();
        plans.sort_by_key(|p| p.epoch);
        plans
    }
}

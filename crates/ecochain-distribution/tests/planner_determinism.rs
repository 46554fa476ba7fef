//! Planner properties under arbitrary inputs and input orderings.

use std::collections::HashMap;

use ecochain_distribution::{DistributionPlanner, PlannerConfig};
use ecochain_types::{
    AllocationPolicy, Attestation, Epoch, OperationId, ProofHandle, ScoreResult,
};
use proptest::prelude::*;

#[derive(Clone, Debug)]
struct Candidate {
    id: OperationId,
    overall: u8,
    qualifies: bool,
    verified: bool,
    capacity: u64,
}

fn candidates() -> impl Strategy<Value = Vec<Candidate>> {
    prop::collection::btree_map(
        "[a-z]{1,6}",
        (any::<u8>(), any::<bool>(), any::<bool>(), 0u64..5_000_000),
        0..12,
    )
    .prop_map(|m| {
        m.into_iter()
            .map(|(id, (overall, qualifies, verified, capacity))| Candidate {
                id: OperationId::new(id),
                overall: overall % 101,
                qualifies,
                verified,
                capacity,
            })
            .collect()
    })
}

fn policy() -> impl Strategy<Value = AllocationPolicy> {
    prop_oneof![
        Just(AllocationPolicy::Proportional),
        Just(AllocationPolicy::EqualSplit),
        Just(AllocationPolicy::WeightedByCapacity),
    ]
}

fn inputs(cands: &[Candidate]) -> (Vec<ScoreResult>, Vec<Attestation>, HashMap<OperationId, u64>) {
    let epoch = Epoch(7);
    let scores = cands
        .iter()
        .map(|c| ScoreResult {
            operation_id: c.id.clone(),
            epoch,
            efficiency_score: c.overall,
            carbon_score: c.overall,
            renewable_score: c.overall,
            overall_score: c.overall,
            qualifies: c.qualifies,
            tier: "Standard".into(),
        })
        .collect();
    let attestations = cands
        .iter()
        .map(|c| Attestation {
            operation_id: c.id.clone(),
            epoch,
            proof_handle: ProofHandle::new(format!("proof-{}", c.id)),
            claims_digest: String::new(),
            verified: c.verified,
            verified_at_epoch: epoch,
            attempts: 1,
        })
        .collect();
    let capacities = cands.iter().map(|c| (c.id.clone(), c.capacity)).collect();
    (scores, attestations, capacities)
}

proptest! {
    #[test]
    fn plan_ignores_input_order(
        (original, shuffled) in candidates()
            .prop_flat_map(|v| (Just(v.clone()), Just(v).prop_shuffle())),
        policy in policy(),
        pool in 1i64..1_000_000_000,
    ) {
        let planner = DistributionPlanner::new(PlannerConfig { policy });
        let (s1, a1, c1) = inputs(&original);
        let (mut s2, mut a2, c2) = inputs(&shuffled);
        a2.reverse();
        let mid = s2.len() / 2;
        s2.rotate_left(mid);

        let p1 = planner.plan(Epoch(7), pool, &s1, &a1, &c1).unwrap();
        let p2 = planner.plan(Epoch(7), pool, &s2, &a2, &c2).unwrap();
        prop_assert_eq!(p1, p2);
    }

    #[test]
    fn allocations_never_exceed_pool(
        cands in candidates(),
        policy in policy(),
        pool in 1i64..1_000_000_000,
    ) {
        let planner = DistributionPlanner::new(PlannerConfig { policy });
        let (scores, attestations, capacities) = inputs(&cands);
        let plan = planner.plan(Epoch(7), pool, &scores, &attestations, &capacities).unwrap();

        let allocated = plan.allocated_total();
        prop_assert!(allocated <= pool);
        prop_assert!(plan.residual >= 0);
        prop_assert_eq!(allocated + plan.residual, pool);
        prop_assert!(plan.allocations.values().all(|a| *a > 0));

        for id in plan.allocations.keys().chain(plan.zero_allocations.iter()) {
            let c = cands.iter().find(|c| &c.id == id).unwrap();
            prop_assert!(c.qualifies && c.verified);
        }
        let eligible = cands.iter().filter(|c| c.qualifies && c.verified).count();
        prop_assert_eq!(plan.allocations.len() + plan.zero_allocations.len(), eligible);
    }
}

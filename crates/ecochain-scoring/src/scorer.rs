use ecochain_types::{OperationId, OperationRecord, ScoreResult};

use crate::error::{ScoringError, ScoringResult};
use crate::tables::ScoringConfig;

const EFFICIENCY_SCALE: f64 = 1000.0 * 50.0;
const EFFICIENCY_WEIGHT: f64 = 0.4;
const CARBON_WEIGHT: f64 = 0.4;
const RENEWABLE_WEIGHT: f64 = 0.2;

/// Round half away from zero, then clamp into `[0, 100]`.
fn clamp_round(value: f64) -> u8 {
    value.round().clamp(0.0, 100.0) as u8
}

/// Pure mapping from an `OperationRecord` to its `ScoreResult`.
///
/// ```text
/// efficiency = clamp(round(hash_rate / energy * 1000 * 50))
/// renewable  = renewable_base[source]
/// carbon     = clamp(round(renewable * (1 + offset / 100)))
/// overall    = clamp(round((0.4 eff + 0.4 carbon + 0.2 renewable)
///                          * location_factor * cooling_factor))
/// ```
#[derive(Clone, Debug, Default)]
pub struct SustainabilityScorer {
    config: ScoringConfig,
}

/// Outcome of scoring many records. Both lists are sorted by operation id.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchScores {
    pub scored: Vec<ScoreResult>,
    pub failed: Vec<(OperationId, ScoringError)>,
}

impl SustainabilityScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn score(&self, record: &OperationRecord) -> ScoringResult<ScoreResult> {
        let energy = record.energy_consumption_kwh;
        if !energy.is_finite() || energy <= 0.0 {
            return Err(arithmetic(record, format!("energy consumption {} kWh", energy)));
        }
        if !record.hash_rate_th.is_finite() {
            return Err(arithmetic(record, "hash rate is not finite".into()));
        }
        if !record.carbon_offset_percent.is_finite() {
            return Err(arithmetic(record, "carbon offset is not finite".into()));
        }

        let efficiency_score = clamp_round(record.hash_rate_th / energy * EFFICIENCY_SCALE);
        let renewable_score = self.config.renewable_for(record.energy_source);
        let carbon_score =
            clamp_round(renewable_score as f64 * (1.0 + record.carbon_offset_percent / 100.0));

        let weighted = efficiency_score as f64 * EFFICIENCY_WEIGHT
            + carbon_score as f64 * CARBON_WEIGHT
            + renewable_score as f64 * RENEWABLE_WEIGHT;
        let overall_score = clamp_round(
            weighted
                * self.config.location_factor(record.location_region)
                * self.config.cooling_factor(record.cooling),
        );

        Ok(ScoreResult {
            operation_id: record.operation_id.clone(),
            epoch: record.epoch,
            efficiency_score,
            carbon_score,
            renewable_score,
            overall_score,
            qualifies: overall_score >= self.config.qualify_threshold,
            tier: self.config.tier_for(overall_score).to_string(),
        })
    }

    /// Score every record; a failing record is reported, never dropped.
    pub fn score_all(&self, records: &[OperationRecord]) -> BatchScores {
        let mut batch = BatchScores::default();
        for record in records {
            match self.score(record) {
                Ok(result) => batch.scored.push(result),
                Err(err) => {
                    tracing::warn!(
                        operation_id = %record.operation_id,
                        epoch = record.epoch.0,
                        error = %err,
                        "Scoring failed"
                    );
                    batch.failed.push((record.operation_id.clone(), err));
                }
            }
        }
        batch.scored.sort_by(|a, b| a.operation_id.cmp(&b.operation_id));
        batch.failed.sort_by(|a, b| a.0.cmp(&b.0));
        batch
    }
}

fn arithmetic(record: &OperationRecord, reason: String) -> ScoringError {
    ScoringError::Arithmetic {
        operation_id: record.operation_id.clone(),
        reason,
    }
}

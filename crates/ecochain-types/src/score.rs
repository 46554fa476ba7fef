use serde::{Deserialize, Serialize};

use crate::epoch::Epoch;
use crate::ids::OperationId;

/// Explainable composite score derived from exactly one `OperationRecord`.
///
/// Every sub-score and the overall score lie in `[0, 100]`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScoreResult {
    pub operation_id: OperationId,
    pub epoch: Epoch,
    pub efficiency_score: u8,
    pub carbon_score: u8,
    pub renewable_score: u8,
    pub overall_score: u8,
    /// `overall_score >= qualify_threshold` at scoring time.
    pub qualifies: bool,
    /// Sustainability tier label (e.g. "Gold").
    pub tier: String,
}

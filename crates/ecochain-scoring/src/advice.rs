//! Improvement suggestions derived from a score's sub-scores.

use ecochain_types::ScoreResult;
use serde::{Deserialize, Serialize};

const RENEWABLE_CUTOFF: u8 = 50;
const EFFICIENCY_CUTOFF: u8 = 60;
const CARBON_CUTOFF: u8 = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Advice {
    IncreaseRenewableShare,
    UpgradeHardware,
    ReduceCarbonFootprint,
    BelowQualifyingThreshold,
}

impl Advice {
    pub fn message(&self) -> &'static str {
        match self {
            Advice::IncreaseRenewableShare => {
                "Increase renewable energy usage through direct purchases, RECs, or on-site generation."
            }
            Advice::UpgradeHardware => "Upgrade to more energy-efficient mining hardware.",
            Advice::ReduceCarbonFootprint => {
                "Reduce carbon footprint or expand carbon offset programs for unavoidable emissions."
            }
            Advice::BelowQualifyingThreshold => {
                "Overall score is below the reward threshold for this epoch."
            }
        }
    }
}

pub fn advise(result: &ScoreResult) -> Vec<Advice> {
    let mut advice = Vec::new();
    if result.renewable_score < RENEWABLE_CUTOFF {
        advice.push(Advice::IncreaseRenewableShare);
    }
    if result.efficiency_score < EFFICIENCY_CUTOFF {
        advice.push(Advice::UpgradeHardware);
    }
    if result.carbon_score < CARBON_CUTOFF {
        advice.push(Advice::ReduceCarbonFootprint);
    }
    if !result.qualifies {
        advice.push(Advice::BelowQualifyingThreshold);
    }
    advice
}

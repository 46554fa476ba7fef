//! Scoring configuration: lookup tables, fallbacks, threshold and tier bands.

use std::collections::BTreeMap;

use ecochain_types::{CoolingKind, EnergySourceKind, LocationRegion};
use serde::{Deserialize, Serialize};

use crate::error::{ScoringError, ScoringResult};

/// A named tier reached at `min_score` and above.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierBand {
    pub name: String,
    pub min_score: u8,
}

impl TierBand {
    pub fn new(name: impl Into<String>, min_score: u8) -> Self {
        Self {
            name: name.into(),
            min_score,
        }
    }
}

/// All inputs to the scoring algorithm besides the record itself.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Minimum overall score that qualifies for rewards
    #[serde(default = "default_qualify_threshold")]
    pub qualify_threshold: u8,

    /// Renewable score per energy source
    #[serde(default = "default_renewable_base")]
    pub renewable_base: BTreeMap<EnergySourceKind, u8>,

    /// Grid-mix multiplier per region
    #[serde(default = "default_location_factors")]
    pub location_factors: BTreeMap<LocationRegion, f64>,

    /// Cooling efficiency multiplier per cooling kind
    #[serde(default = "default_cooling_factors")]
    pub cooling_factors: BTreeMap<CoolingKind, f64>,

    /// Renewable score for a source missing from the table
    #[serde(default = "default_renewable")]
    pub default_renewable: u8,

    /// Location factor for a region missing from the table
    #[serde(default = "default_factor")]
    pub default_location_factor: f64,

    /// Cooling factor for a kind missing from the table
    #[serde(default = "default_factor")]
    pub default_cooling_factor: f64,

    /// Tier bands; the highest band whose `min_score` is reached wins
    #[serde(default = "default_tiers")]
    pub tiers: Vec<TierBand>,

    /// Label when no band is reached
    #[serde(default = "default_fallback_tier")]
    pub fallback_tier: String,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            qualify_threshold: default_qualify_threshold(),
            renewable_base: default_renewable_base(),
            location_factors: default_location_factors(),
            cooling_factors: default_cooling_factors(),
            default_renewable: default_renewable(),
            default_location_factor: default_factor(),
            default_cooling_factor: default_factor(),
            tiers: default_tiers(),
            fallback_tier: default_fallback_tier(),
        }
    }
}

impl ScoringConfig {
    pub fn renewable_for(&self, kind: EnergySourceKind) -> u8 {
        self.renewable_base
            .get(&kind)
            .copied()
            .unwrap_or(self.default_renewable)
            .min(100)
    }

    pub fn location_factor(&self, region: LocationRegion) -> f64 {
        self.location_factors
            .get(&region)
            .copied()
            .unwrap_or(self.default_location_factor)
    }

    pub fn cooling_factor(&self, kind: CoolingKind) -> f64 {
        self.cooling_factors
            .get(&kind)
            .copied()
            .unwrap_or(self.default_cooling_factor)
    }

    pub fn tier_for(&self, overall: u8) -> &str {
        self.tiers
            .iter()
            .filter(|band| overall >= band.min_score)
            .max_by_key(|band| band.min_score)
            .map(|band| band.name.as_str())
            .unwrap_or(self.fallback_tier.as_str())
    }

    /// Reject tables the scorer cannot compute with.
    pub fn validate(&self) -> ScoringResult<()> {
        if self.qualify_threshold > 100 {
            return Err(ScoringError::InvalidConfig(format!(
                "qualify_threshold {} exceeds 100",
                self.qualify_threshold
            )));
        }
        if self.default_renewable > 100 {
            return Err(ScoringError::InvalidConfig(format!(
                "default_renewable {} exceeds 100",
                self.default_renewable
            )));
        }
        if let Some((kind, score)) = self.renewable_base.iter().find(|(_, s)| **s > 100) {
            return Err(ScoringError::InvalidConfig(format!(
                "renewable score {} for {} exceeds 100",
                score, kind
            )));
        }
        let factors = self
            .location_factors
            .values()
            .chain(self.cooling_factors.values())
            .chain([&self.default_location_factor, &self.default_cooling_factor]);
        for factor in factors {
            if !factor.is_finite() || *factor < 0.0 {
                return Err(ScoringError::InvalidConfig(format!(
                    "factor {} must be finite and non-negative",
                    factor
                )));
            }
        }
        Ok(())
    }
}

fn default_qualify_threshold() -> u8 {
    70
}

fn default_renewable() -> u8 {
    50
}

fn default_factor() -> f64 {
    1.0
}

fn default_renewable_base() -> BTreeMap<EnergySourceKind, u8> {
    use EnergySourceKind::*;
    BTreeMap::from([
        (Solar, 95),
        (Wind, 95),
        (Hydro, 90),
        (Geothermal, 92),
        (NaturalGas, 35),
        (Coal, 10),
        (Mixed, 50),
        (Grid, 40),
    ])
}

fn default_location_factors() -> BTreeMap<LocationRegion, f64> {
    use LocationRegion::*;
    BTreeMap::from([
        (Nordics, 1.05),
        (Europe, 1.0),
        (NorthAmerica, 0.95),
        (SouthAmerica, 0.95),
        (Oceania, 0.95),
        (Africa, 0.9),
        (MiddleEast, 0.85),
        (Asia, 0.85),
    ])
}

fn default_cooling_factors() -> BTreeMap<CoolingKind, f64> {
    use CoolingKind::*;
    BTreeMap::from([
        (Air, 0.9),
        (Liquid, 0.93),
        (Immersion, 0.95),
        (Geothermal, 1.0),
    ])
}

fn default_tiers() -> Vec<TierBand> {
    vec![
        TierBand::new("Platinum", 90),
        TierBand::new("Gold", 75),
        TierBand::new("Silver", 60),
        TierBand::new("Bronze", 45),
        TierBand::new("Standard", 30),
    ]
}

fn default_fallback_tier() -> String {
    "Needs Improvement".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ScoringConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.qualify_threshold, 70);
        assert_eq!(config.renewable_for(EnergySourceKind::Solar), 95);
        assert_eq!(config.location_factor(LocationRegion::Europe), 1.0);
        assert_eq!(config.cooling_factor(CoolingKind::Immersion), 0.95);
    }

    #[test]
    fn missing_table_entries_use_fallbacks() {
        let config = ScoringConfig {
            renewable_base: BTreeMap::new(),
            location_factors: BTreeMap::new(),
            cooling_factors: BTreeMap::new(),
            ..Default::default()
        };
        assert_eq!(config.renewable_for(EnergySourceKind::Coal), 50);
        assert_eq!(config.location_factor(LocationRegion::Asia), 1.0);
        assert_eq!(config.cooling_factor(CoolingKind::Air), 1.0);
    }

    #[test]
    fn tier_bands_pick_highest_reached() {
        let config = ScoringConfig::default();
        assert_eq!(config.tier_for(100), "Platinum");
        assert_eq!(config.tier_for(90), "Platinum");
        assert_eq!(config.tier_for(89), "Gold");
        assert_eq!(config.tier_for(60), "Silver");
        assert_eq!(config.tier_for(30), "Standard");
        assert_eq!(config.tier_for(29), "Needs Improvement");
    }

    #[test]
    fn tier_bands_need_not_be_sorted() {
        let config = ScoringConfig {
            tiers: vec![TierBand::new("Low", 10), TierBand::new("High", 80)],
            ..Default::default()
        };
        assert_eq!(config.tier_for(85), "High");
        assert_eq!(config.tier_for(50), "Low");
    }

    #[test]
    fn validate_rejects_bad_tables() {
        let mut config = ScoringConfig::default();
        config.cooling_factors.insert(CoolingKind::Air, f64::NAN);
        assert!(config.validate().is_err());

        let mut config = ScoringConfig::default();
        config.location_factors.insert(LocationRegion::Asia, -0.5);
        assert!(config.validate().is_err());

        let mut config = ScoringConfig::default();
        config.renewable_base.insert(EnergySourceKind::Solar, 101);
        assert!(config.validate().is_err());

        let config = ScoringConfig {
            qualify_threshold: 101,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_keeps_other_defaults() {
        let config: ScoringConfig =
            serde_json::from_str(r#"{"qualify_threshold": 80, "renewable_base": {"coal": 5}}"#)
                .unwrap();
        assert_eq!(config.qualify_threshold, 80);
        assert_eq!(config.renewable_for(EnergySourceKind::Coal), 5);
        assert_eq!(config.renewable_for(EnergySourceKind::Solar), 50);
        assert_eq!(config.cooling_factor(CoolingKind::Immersion), 0.95);
    }
}

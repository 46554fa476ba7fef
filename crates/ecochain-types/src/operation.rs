use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::epoch::Epoch;
use crate::ids::OperationId;

/// A raw enum label that matched no known variant.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value:?}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Lower-case a label and drop separators so `naturalGas`, `natural_gas`
/// and `Natural-Gas` all compare equal.
fn fold_label(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

macro_rules! label_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $( $(#[$vmeta:meta])* $variant:ident => $label:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Canonical snake_case label.
            pub fn label(&self) -> &'static str {
                match self {
                    $( $name::$variant => $label ),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(raw: &str) -> Result<Self, Self::Err> {
                let folded = fold_label(raw);
                $(
                    if folded == fold_label($label) {
                        return Ok($name::$variant);
                    }
                )+
                Err(UnknownVariant {
                    kind: $kind,
                    value: raw.to_string(),
                })
            }
        }
    };
}

label_enum! {
    /// Primary energy source powering an operation.
    EnergySourceKind, "energy source" {
        Solar => "solar",
        Wind => "wind",
        Hydro => "hydro",
        Geothermal => "geothermal",
        NaturalGas => "natural_gas",
        Coal => "coal",
        Mixed => "mixed",
        Grid => "grid",
    }
}

label_enum! {
    /// Coarse geographic region, used for the grid-mix location factor.
    LocationRegion, "location region" {
        NorthAmerica => "north_america",
        SouthAmerica => "south_america",
        Europe => "europe",
        Nordics => "nordics",
        Asia => "asia",
        MiddleEast => "middle_east",
        Africa => "africa",
        Oceania => "oceania",
    }
}

label_enum! {
    /// Cooling technology in use at the facility.
    CoolingKind, "cooling kind" {
        Air => "air",
        Liquid => "liquid",
        Immersion => "immersion",
        Geothermal => "geothermal",
    }
}

/// A normalized telemetry snapshot for one operation in one epoch.
///
/// Records are created by the normalizer and never mutated. A later epoch
/// produces a new record for the same operation rather than overwriting.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub operation_id: OperationId,
    pub epoch: Epoch,
    /// Reading timestamp floored to the start of `epoch` (unix seconds).
    pub timestamp_epoch: i64,
    pub energy_source: EnergySourceKind,
    /// Energy consumed over the reporting interval. Strictly positive.
    pub energy_consumption_kwh: f64,
    /// Sustained hash rate in TH/s. Strictly positive.
    pub hash_rate_th: f64,
    pub location_region: LocationRegion,
    pub cooling: CoolingKind,
    /// Offset share in `[0, 100]`.
    pub carbon_offset_percent: f64,
}

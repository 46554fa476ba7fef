use ecochain_types::{OperationId, UnknownVariant};
use thiserror::Error;

/// Raw telemetry rejected before it enters the pipeline.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("operation id is empty")]
    EmptyOperationId,

    #[error("{field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: f64 },

    #[error("{field} is not a finite number")]
    NotFinite { field: &'static str },

    #[error("carbon offset {0}% outside [0, 100]")]
    OffsetOutOfRange(f64),

    #[error("timestamp {0} is before the unix epoch")]
    InvalidTimestamp(i64),

    #[error(transparent)]
    UnknownVariant(#[from] UnknownVariant),
}

/// Errors from the scorer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScoringError {
    /// Degenerate numeric input the scorer refuses to compute on.
    #[error("arithmetic error scoring {operation_id}: {reason}")]
    Arithmetic {
        operation_id: OperationId,
        reason: String,
    },

    #[error("invalid scoring configuration: {0}")]
    InvalidConfig(String),
}

pub type ValidationResult<T> = Result<T, ValidationError>;
pub type ScoringResult<T> = Result<T, ScoringError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_positive_names_the_field() {
        let err = ValidationError::NonPositive {
            field: "energy_consumption_kwh",
            value: -3.0,
        };
        let s = err.to_string();
        assert!(s.contains("energy_consumption_kwh"));
        assert!(s.contains("-3"));
    }

    #[test]
    fn unknown_variant_is_transparent() {
        let err: ValidationError = UnknownVariant {
            kind: "cooling kind",
            value: "peltier".into(),
        }
        .into();
        assert_eq!(err.to_string(), "unknown cooling kind: \"peltier\"");
    }
}

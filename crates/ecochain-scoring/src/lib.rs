//! # ecochain-scoring
//!
//! The two pure stages at the front of the reward pipeline:
//!
//! - **Normalizer** ([`TelemetryNormalizer`], [`ReadingBuffer`]): validates
//!   raw readings, floors timestamps to the reporting epoch and keeps the
//!   latest reading per operation per epoch (last-write-wins).
//! - **Scorer** ([`SustainabilityScorer`]): maps one [`OperationRecord`] to
//!   an explainable [`ScoreResult`] using configurable lookup tables.
//!
//! Neither stage holds shared mutable state, so operations can be normalized
//! and scored concurrently in any order.
//!
//! [`OperationRecord`]: ecochain_types::OperationRecord
//! [`ScoreResult`]: ecochain_types::ScoreResult

pub mod advice;
pub mod error;
pub mod normalizer;
pub mod scorer;
pub mod tables;

pub use advice::{advise, Advice};
pub use error::{ScoringError, ValidationError};
pub use normalizer::{IngestOutcome, RawReading, ReadingBuffer, TelemetryNormalizer};
pub use scorer::{BatchScores, SustainabilityScorer};
pub use tables::{ScoringConfig, TierBand};

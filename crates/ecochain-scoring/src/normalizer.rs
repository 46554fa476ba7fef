use std::collections::{BTreeMap, BTreeSet, HashMap};

use ecochain_types::{
    CoolingKind, EnergySourceKind, Epoch, EpochClock, LocationRegion, OperationId, OperationRecord,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ValidationError, ValidationResult};

/// A telemetry reading as reported by an operation, before validation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    pub operation_id: String,
    /// Reading time, unix seconds.
    pub timestamp: i64,
    pub energy_source: String,
    pub energy_consumption_kwh: f64,
    pub hash_rate_th: f64,
    pub location_region: String,
    pub cooling: String,
    pub carbon_offset_percent: f64,
}

/// Validates and canonicalizes raw readings into `OperationRecord`s.
#[derive(Clone, Copy, Debug, Default)]
pub struct TelemetryNormalizer {
    clock: EpochClock,
}

impl TelemetryNormalizer {
    pub fn new(clock: EpochClock) -> Self {
        Self { clock }
    }

    pub fn clock(&self) -> EpochClock {
        self.clock
    }

    /// Validate one reading and floor its timestamp to the reporting epoch.
    pub fn normalize(&self, raw: &RawReading) -> ValidationResult<OperationRecord> {
        let operation_id = raw.operation_id.trim();
        if operation_id.is_empty() {
            return Err(ValidationError::EmptyOperationId);
        }
        if raw.timestamp < 0 {
            return Err(ValidationError::InvalidTimestamp(raw.timestamp));
        }

        let energy = positive("energy_consumption_kwh", raw.energy_consumption_kwh)?;
        let hash_rate = positive("hash_rate_th", raw.hash_rate_th)?;
        let offset = finite("carbon_offset_percent", raw.carbon_offset_percent)?;
        if !(0.0..=100.0).contains(&offset) {
            return Err(ValidationError::OffsetOutOfRange(offset));
        }

        let energy_source: EnergySourceKind = raw.energy_source.parse()?;
        let location_region: LocationRegion = raw.location_region.parse()?;
        let cooling: CoolingKind = raw.cooling.parse()?;

        let epoch = self.clock.epoch_of_secs(raw.timestamp);
        Ok(OperationRecord {
            operation_id: OperationId::new(operation_id),
            epoch,
            timestamp_epoch: self.clock.start_secs(epoch),
            energy_source,
            energy_consumption_kwh: energy,
            hash_rate_th: hash_rate,
            location_region,
            cooling,
            carbon_offset_percent: offset,
        })
    }
}

fn finite(field: &'static str, value: f64) -> ValidationResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ValidationError::NotFinite { field })
    }
}

fn positive(field: &'static str, value: f64) -> ValidationResult<f64> {
    let value = finite(field, value)?;
    if value <= 0.0 {
        return Err(ValidationError::NonPositive { field, value });
    }
    Ok(value)
}

/// What happened to a reading handed to [`ReadingBuffer::ingest`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IngestOutcome {
    /// First reading for this operation in this epoch.
    Accepted,
    /// Replaced an earlier reading for the same operation and epoch.
    Superseded { previous_timestamp: i64 },
    /// Older than the reading already held; discarded.
    Discarded { retained_timestamp: i64 },
    /// Its epoch was already taken for scoring; dropped.
    Late { epoch: Epoch },
}

#[derive(Clone, Debug)]
struct Slot {
    raw_timestamp: i64,
    record: OperationRecord,
}

/// Per-epoch collection of normalized records with last-write-wins.
///
/// "Later" means the larger raw timestamp. Equal timestamps resolve to the
/// reading ingested last. Superseded inputs are logged, not treated as errors.
/// Once an epoch has been taken, further readings for it are dropped as late.
#[derive(Debug, Default)]
pub struct ReadingBuffer {
    normalizer: TelemetryNormalizer,
    epochs: BTreeMap<Epoch, HashMap<OperationId, Slot>>,
    taken: BTreeSet<Epoch>,
}

impl ReadingBuffer {
    pub fn new(normalizer: TelemetryNormalizer) -> Self {
        Self {
            normalizer,
            epochs: BTreeMap::new(),
            taken: BTreeSet::new(),
        }
    }

    pub fn ingest(&mut self, raw: &RawReading) -> ValidationResult<IngestOutcome> {
        let record = self.normalizer.normalize(raw)?;
        let epoch = record.epoch;
        if self.taken.contains(&epoch) {
            info!(
                operation_id = %record.operation_id,
                epoch = epoch.0,
                timestamp = raw.timestamp,
                "Late telemetry input for closed epoch, dropped"
            );
            return Ok(IngestOutcome::Late { epoch });
        }
        let slots = self.epochs.entry(epoch).or_default();

        match slots.get_mut(&record.operation_id) {
            None => {
                debug!(operation_id = %record.operation_id, epoch = epoch.0, "Telemetry accepted");
                slots.insert(
                    record.operation_id.clone(),
                    Slot {
                        raw_timestamp: raw.timestamp,
                        record,
                    },
                );
                Ok(IngestOutcome::Accepted)
            }
            Some(slot) if raw.timestamp >= slot.raw_timestamp => {
                let previous_timestamp = slot.raw_timestamp;
                info!(
                    operation_id = %record.operation_id,
                    epoch = epoch.0,
                    previous_timestamp,
                    timestamp = raw.timestamp,
                    "Superseded telemetry input"
                );
                *slot = Slot {
                    raw_timestamp: raw.timestamp,
                    record,
                };
                Ok(IngestOutcome::Superseded { previous_timestamp })
            }
            Some(slot) => {
                info!(
                    operation_id = %record.operation_id,
                    epoch = epoch.0,
                    retained_timestamp = slot.raw_timestamp,
                    timestamp = raw.timestamp,
                    "Superseded telemetry input (older reading discarded)"
                );
                Ok(IngestOutcome::Discarded {
                    retained_timestamp: slot.raw_timestamp,
                })
            }
        }
    }

    /// Epochs that currently hold at least one record, ascending.
    pub fn epochs(&self) -> Vec<Epoch> {
        self.epochs.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.epochs.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current winning records for an epoch, by operation id.
    pub fn peek_epoch(&self, epoch: Epoch) -> Vec<OperationRecord> {
        let mut records: Vec<_> = self
            .epochs
            .get(&epoch)
            .map(|slots| slots.values().map(|s| s.record.clone()).collect())
            .unwrap_or_default();
        records.sort_by(|a, b| a.operation_id.cmp(&b.operation_id));
        records
    }

    /// Whether `epoch` was already taken.
    pub fn is_taken(&self, epoch: Epoch) -> bool {
        self.taken.contains(&epoch)
    }

    /// Remove and return the winning records for an epoch, by operation id.
    ///
    /// The epoch is closed to further input afterwards.
    pub fn take_epoch(&mut self, epoch: Epoch) -> Vec<OperationRecord> {
        self.taken.insert(epoch);
        let mut records: Vec<_> = self
            .epochs
            .remove(&epoch)
            .map(|slots| slots.into_values().map(|s| s.record).collect())
            .unwrap_or_default();
        records.sort_by(|a, b| a.operation_id.cmp(&b.operation_id));
        records
    }
}

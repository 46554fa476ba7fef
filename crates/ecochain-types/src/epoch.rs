use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a reporting epoch: `floor(unix_seconds / length_secs)`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Epoch(pub u64);

impl Epoch {
    pub fn next(self) -> Self {
        Epoch(self.0.saturating_add(1))
    }

    pub fn previous(self) -> Option<Self> {
        self.0.checked_sub(1).map(Epoch)
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Maps wall-clock timestamps onto fixed-length reporting epochs.
///
/// Timestamps before the unix epoch are clamped into epoch 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochClock {
    /// Epoch length in seconds. Always at least 1.
    length_secs: u64,
}

impl EpochClock {
    pub const DAILY_SECS: u64 = 86_400;

    pub fn new(length_secs: u64) -> Self {
        Self {
            length_secs: length_secs.max(1),
        }
    }

    pub fn daily() -> Self {
        Self::new(Self::DAILY_SECS)
    }

    pub fn length_secs(&self) -> u64 {
        self.length_secs
    }

    pub fn epoch_of_secs(&self, unix_secs: i64) -> Epoch {
        if unix_secs <= 0 {
            return Epoch(0);
        }
        Epoch(unix_secs as u64 / self.length_secs)
    }

    pub fn epoch_of(&self, at: DateTime<Utc>) -> Epoch {
        self.epoch_of_secs(at.timestamp())
    }

    pub fn current(&self) -> Epoch {
        self.epoch_of(Utc::now())
    }

    /// First second of the epoch, as unix seconds.
    pub fn start_secs(&self, epoch: Epoch) -> i64 {
        epoch.0.saturating_mul(self.length_secs).min(i64::MAX as u64) as i64
    }

    pub fn start_of(&self, epoch: Epoch) -> DateTime<Utc> {
        Utc.timestamp_opt(self.start_secs(epoch), 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Floor a timestamp to the start of its epoch.
    pub fn floor_secs(&self, unix_secs: i64) -> i64 {
        self.start_secs(self.epoch_of_secs(unix_secs))
    }
}

impl Default for EpochClock {
    fn default() -> Self {
        Self::daily()
    }
}

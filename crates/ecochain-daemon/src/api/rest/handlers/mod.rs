//! API request handlers

mod attestations;
mod distributions;
mod epochs;
mod health;
mod scores;

pub use attestations::*;
pub use distributions::*;
pub use epochs::*;
pub use health::*;
pub use scores::*;

use ecochain_types::Epoch;
use serde::Deserialize;

/// `?epoch=` filter shared by the list endpoints
#[derive(Debug, Default, Deserialize)]
pub struct EpochQuery {
    pub epoch: Option<u64>,
}

impl EpochQuery {
    pub fn epoch(&self) -> Option<Epoch> {
        self.epoch.map(Epoch)
    }
}

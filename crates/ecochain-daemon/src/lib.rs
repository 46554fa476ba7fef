//! EcoChain daemon library
//!
//! - Configuration loading
//! - The epoch pipeline wiring scoring, attestation and distribution
//! - Simulated Verifier and Ledger collaborators
//! - Epoch scheduler
//! - Read-only REST projection and server lifecycle

pub mod api;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod scheduler;
pub mod server;
pub mod simulated;

pub use config::DaemonConfig;
pub use error::{ApiError, DaemonError, PipelineError};
pub use pipeline::{EcoPipeline, EpochReport, IngestSummary};
pub use scheduler::Scheduler;
pub use server::Server;
pub use simulated::{SimulatedLedger, SimulatedVerifier};

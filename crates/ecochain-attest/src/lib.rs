//! # ecochain-attest
//!
//! The Proof Gateway turns an operation's score and proof handle into an
//! [`Attestation`] by asking an external [`Verifier`].
//!
//! - **At most one verification per (operation, epoch).** The first
//!   successful answer is cached; later calls for the same key return it
//!   without touching the verifier. Concurrent callers for the same key wait
//!   on a per-key lock; unrelated keys never contend.
//! - **Transient faults are retried** with bounded exponential backoff, and
//!   every verifier call runs under a timeout that counts as transient.
//! - **A rejection is permanent** for that epoch: `verified = false` is
//!   cached like any other answer.
//!
//! [`Attestation`]: ecochain_types::Attestation

pub mod error;
pub mod gateway;
pub mod verifier;

pub use error::{VerificationError, VerifierFault};
pub use gateway::{AttestationSummary, GatewayConfig, ProofGateway};
pub use verifier::{ClaimSet, ProofClaims, Verifier};

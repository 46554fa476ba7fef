use serde::{Deserialize, Serialize};
use std::fmt;

use crate::epoch::Epoch;

/// Identifier of a mining operation as reported by its telemetry feed.
///
/// Ordering is lexicographic and is the canonical tie-break order wherever
/// determinism across runs is required.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(pub String);

impl OperationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for OperationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier of a distribution plan.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanId(pub String);

impl PlanId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Content-addressed plan id: `plan-<epoch>-<16 hex of blake3(contents)>`.
    pub fn derive(epoch: Epoch, canonical_contents: &[u8]) -> Self {
        let digest = blake3::hash(canonical_contents);
        let hex = digest.to_hex();
        Self(format!("plan-{}-{}", epoch.0, &hex.as_str()[..16]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque reference to a proof produced outside this core.
///
/// The core never interprets the handle; it only forwards it to the
/// verifier and records it on the resulting attestation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProofHandle(pub String);

impl ProofHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    /// Digest of the public inputs a proof commits to.
    ///
    /// Canonical form is `operation_id \0 epoch \0 overall_score`, hashed
    /// with blake3 and hex encoded.
    pub fn derive(operation_id: &OperationId, epoch: Epoch, overall_score: u8) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(operation_id.as_str().as_bytes());
        hasher.update(&[0]);
        hasher.update(&epoch.0.to_be_bytes());
        hasher.update(&[0]);
        hasher.update(&[overall_score]);
        Self(hasher.finalize().to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProofHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ledger transaction handle returned by a successful transfer.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHandle(pub String);

impl TxHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }
}

impl fmt::Display for TxHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_id_is_content_addressed() {
        let a = PlanId::derive(Epoch(7), b"alloc:op-1=10");
        let b = PlanId::derive(Epoch(7), b"alloc:op-1=10");
        let c = PlanId::derive(Epoch(7), b"alloc:op-1=11");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.as_str().starts_with("plan-7-"));
        assert_eq!(a.as_str().len(), "plan-7-".len() + 16);
    }

    #[test]
    fn proof_handle_binds_every_public_input() {
        let op = OperationId::new("op-1");
        let base = ProofHandle::derive(&op, Epoch(3), 80);
        assert_eq!(base, ProofHandle::derive(&op, Epoch(3), 80));
        assert_ne!(base, ProofHandle::derive(&op, Epoch(4), 80));
        assert_ne!(base, ProofHandle::derive(&op, Epoch(3), 81));
        assert_ne!(base, ProofHandle::derive(&OperationId::new("op-2"), Epoch(3), 80));
    }

    #[test]
    fn operation_ids_order_lexicographically() {
        let mut ids = vec![OperationId::new("b"), OperationId::new("a"), OperationId::new("c")];
        ids.sort();
        assert_eq!(ids[0].as_str(), "a");
        assert_eq!(ids[2].as_str(), "c");
    }
}

//! Boundary to the on-chain verifier contract.
//!
//! The contract keeps a registry of published roots and re-verifies membership proofs with the
//! same sorted-pair fold as [`crate::merkle::verify`]. Proofs MUST be passed in the exact sibling
//! order produced by [`crate::merkle::MerkleTree::prove`].

use crate::types::Hash32;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// The call reached the contract and was reverted.
    #[error("contract call reverted: {0}")]
    Reverted(String),

    /// The verifier could not be reached (RPC down, wallet disconnected, ...).
    #[error("verifier unavailable: {0}")]
    Unavailable(String),
}

/// Result of an `unlock_access` call that did not revert.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccessOutcome {
    /// `AccessGranted` was emitted.
    Granted,
    /// `AccessDenied` was emitted.
    Denied { reason: String },
}

#[async_trait]
pub trait ChainVerifier: Send + Sync {
    /// Whether `root` has been published and is still active.
    async fn root_exists(&self, root: &Hash32) -> Result<bool, ChainError>;

    /// Ask the contract to verify `proof` for `leaf` under `root` and record the access.
    async fn unlock_access(
        &self,
        root: &Hash32,
        leaf: &Hash32,
        proof: &[Hash32],
    ) -> Result<AccessOutcome, ChainError>;
}

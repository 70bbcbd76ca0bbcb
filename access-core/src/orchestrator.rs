//! Admit/deny decision for a claimant presenting a group token.
//!
//! States: `TokenReceived -> IdentityChecked -> {Admitted | Denied}`.
//!
//! Admission requires BOTH:
//! 1) the claimant's Merkle proof folds to the token's root, and
//! 2) the on-chain verifier confirms the root is registered and accepts the proof.
//!
//! The orchestrator fails closed. Local-only admission (no verifier configured, or verifier
//! unreachable) is only possible with `allow_local_only`, which exists for demos. A timed-out
//! verifier call is always a denial.

use crate::chain::{AccessOutcome, ChainError, ChainVerifier};
use crate::errors::{CoreError, CoreResult};
use crate::issuer::open_group_token;
use crate::merkle::{MembershipProof, MerkleTree, leaf_for, verify};
use crate::token::{self, Token};
use crate::types::Hash32;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Admit on the local proof alone when the verifier is missing or unreachable.
    pub allow_local_only: bool,
    /// Upper bound for each verifier call.
    pub chain_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self { allow_local_only: false, chain_timeout: Duration::from_secs(5) }
    }
}

impl OrchestratorConfig {
    pub fn demo() -> Self {
        Self { allow_local_only: true, ..Self::default() }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// Claimant is not in the set, or the supplied proof does not reach the token root.
    ProofInvalid,
    /// Root not registered, `AccessDenied`, or the contract call reverted.
    OnChainRejected,
    /// A verifier call did not complete in time.
    Timeout,
    /// No verifier configured or reachable, and local-only admission is disabled.
    ChainUnavailable,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VerificationState {
    TokenReceived,
    IdentityChecked,
    Admitted,
    Denied(DenyReason),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    Admitted {
        plaintext: Vec<u8>,
        /// True when the verifier was skipped under `allow_local_only`.
        local_only: bool,
    },
    Denied(DenyReason),
}

impl Decision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admitted { .. })
    }
}

/// A claim to be decided.
#[derive(Clone, Debug)]
pub struct AccessRequest<'a> {
    pub token: &'a Token,
    pub identity: &'a str,
    /// Caller-supplied sibling list. When absent, the proof is recomputed from the token's
    /// embedded `authorizedIdentities`.
    pub proof: Option<&'a [Hash32]>,
}

pub struct Orchestrator {
    config: OrchestratorConfig,
    chain: Option<Arc<dyn ChainVerifier>>,
}

enum ChainStep {
    Confirmed,
    Denied(DenyReason),
    Skipped,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig, chain: Option<Arc<dyn ChainVerifier>>) -> Self {
        Self { config, chain }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Decode `token_json` and decide.
    pub async fn verify_encoded(
        &self,
        token_json: &str,
        identity: &str,
        proof: Option<&[Hash32]>,
    ) -> CoreResult<Decision> {
        let token = token::decode(token_json)?;
        self.verify(AccessRequest { token: &token, identity, proof }).await
    }

    /// Run the state machine for one claim.
    ///
    /// Structural and cryptographic failures (wallet token, malformed identity, AEAD mismatch
    /// after admission) are errors. Denials are values.
    pub async fn verify(&self, req: AccessRequest<'_>) -> CoreResult<Decision> {
        let mut state = VerificationState::TokenReceived;
        debug!(?state, "verification started");

        let group = req.token.group().ok_or_else(|| {
            CoreError::InvalidInput("wallet tokens carry no merkle root; open them with the wallet".to_string())
        })?;
        let root = group.merkle_root;
        let leaf = leaf_for(req.identity)?;

        let siblings = match req.proof {
            Some(p) => Some(p.to_vec()),
            None => match embedded_proof(group.authorized_identities.as_deref(), &leaf)? {
                Some(proof) if proof.root == root => Some(proof.siblings),
                _ => None,
            },
        };

        let Some(siblings) = siblings.filter(|s| verify(s, &leaf, &root)) else {
            return Ok(self.deny(&mut state, DenyReason::ProofInvalid, &root));
        };

        state = VerificationState::IdentityChecked;
        debug!(?state, %root, "membership proof verified locally");

        let local_only = match self.chain_step(&root, &leaf, &siblings).await {
            ChainStep::Confirmed => false,
            ChainStep::Skipped => true,
            ChainStep::Denied(reason) => return Ok(self.deny(&mut state, reason, &root)),
        };

        let plaintext = open_group_token(req.token)?;
        state = VerificationState::Admitted;
        info!(?state, %root, local_only, "access granted");
        Ok(Decision::Admitted { plaintext, local_only })
    }

    fn deny(&self, state: &mut VerificationState, reason: DenyReason, root: &Hash32) -> Decision {
        *state = VerificationState::Denied(reason);
        warn!(?state, %root, "access denied");
        Decision::Denied(reason)
    }

    async fn chain_step(&self, root: &Hash32, leaf: &Hash32, siblings: &[Hash32]) -> ChainStep {
        let Some(chain) = &self.chain else {
            return self.fallback("no on-chain verifier configured");
        };

        match self.bounded(chain.root_exists(root)).await {
            Err(()) => return ChainStep::Denied(DenyReason::Timeout),
            Ok(Ok(true)) => {}
            Ok(Ok(false)) => {
                debug!(%root, "root not registered on-chain");
                return ChainStep::Denied(DenyReason::OnChainRejected);
            }
            Ok(Err(e)) => return self.chain_failure(e),
        }

        match self.bounded(chain.unlock_access(root, leaf, siblings)).await {
            Err(()) => ChainStep::Denied(DenyReason::Timeout),
            Ok(Ok(AccessOutcome::Granted)) => ChainStep::Confirmed,
            Ok(Ok(AccessOutcome::Denied { reason })) => {
                debug!(%root, %reason, "contract emitted AccessDenied");
                ChainStep::Denied(DenyReason::OnChainRejected)
            }
            Ok(Err(e)) => self.chain_failure(e),
        }
    }

    async fn bounded<T>(&self, call: impl Future<Output = T>) -> Result<T, ()> {
        tokio::time::timeout(self.config.chain_timeout, call).await.map_err(|_| {
            warn!(timeout_ms = self.config.chain_timeout.as_millis() as u64, "verifier call timed out");
        })
    }

    fn chain_failure(&self, err: ChainError) -> ChainStep {
        match err {
            ChainError::Reverted(ref msg) if !self.config.allow_local_only => {
                debug!(%msg, "unlock_access reverted");
                ChainStep::Denied(DenyReason::OnChainRejected)
            }
            other => self.fallback(&other.to_string()),
        }
    }

    fn fallback(&self, why: &str) -> ChainStep {
        if self.config.allow_local_only {
            warn!(%why, "on-chain verification skipped; admitting on local proof (demo mode)");
            ChainStep::Skipped
        } else {
            ChainStep::Denied(DenyReason::ChainUnavailable)
        }
    }
}

/// Proof recomputed from the identities embedded in the token, if any.
fn embedded_proof(identities: Option<&[String]>, leaf: &Hash32) -> CoreResult<Option<MembershipProof>> {
    let Some(identities) = identities else {
        return Ok(None);
    };
    let tree = match MerkleTree::build(identities) {
        Ok(tree) => tree,
        Err(CoreError::EmptySet) => return Ok(None),
        Err(e) => return Err(e),
    };
    match tree.prove_leaf(leaf) {
        Ok(proof) => Ok(Some(proof)),
        Err(CoreError::NotAMember) => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issuer::issue_group_token;

    #[tokio::test]
    async fn strict_default_denies_without_verifier() {
        let (token, tree) = issue_group_token(&["0xaaa", "0xbbb"], b"hi", false).unwrap();
        let proof = tree.prove("0xaaa").unwrap();
        let orch = Orchestrator::new(OrchestratorConfig::default(), None);
        let decision = orch
            .verify(AccessRequest { token: &token, identity: "0xaaa", proof: Some(&proof.siblings) })
            .await
            .unwrap();
        assert_eq!(decision, Decision::Denied(DenyReason::ChainUnavailable));
    }

    #[tokio::test]
    async fn demo_mode_admits_on_local_proof() {
        let (token, _) = issue_group_token(&["0xaaa", "0xbbb"], b"hi", true).unwrap();
        let orch = Orchestrator::new(OrchestratorConfig::demo(), None);
        let decision = orch
            .verify(AccessRequest { token: &token, identity: "0xBBB", proof: None })
            .await
            .unwrap();
        assert_eq!(decision, Decision::Admitted { plaintext: b"hi".to_vec(), local_only: true });
    }

    #[tokio::test]
    async fn missing_proof_without_embedded_set_is_proof_invalid() {
        let (token, _) = issue_group_token(&["0xaaa"], b"hi", false).unwrap();
        let orch = Orchestrator::new(OrchestratorConfig::demo(), None);
        let decision = orch
            .verify(AccessRequest { token: &token, identity: "0xaaa", proof: None })
            .await
            .unwrap();
        // A single-member tree has an empty proof, but nothing was supplied.
        assert_eq!(decision, Decision::Denied(DenyReason::ProofInvalid));
    }
}

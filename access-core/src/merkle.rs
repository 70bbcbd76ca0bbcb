//! Sorted-pair Merkle accumulator over authorized identities.
//!
//! Construction:
//! 1) Every identity is normalized (trim + lowercase) and hashed into a leaf.
//! 2) Leaves are sorted by byte value and de-duplicated, so any permutation of the same set
//!    yields the same root.
//! 3) Adjacent nodes are combined with [`hash_pair`] (sorted pair). An unpaired trailing node is
//!    carried up to the next layer unchanged; no sibling is recorded for it at that level.
//!
//! Proofs are plain sibling lists (leaf level first). Sorted-pair hashing makes left/right flags
//! unnecessary, which is also what the verifier contract expects.

use crate::errors::{CoreError, CoreResult};
use crate::hash::{hash_pair, keccak256};
use crate::kdf::normalize_identity;
use crate::types::Hash32;
use serde::{Deserialize, Serialize};

/// Leaf hash of one identity. Matches the contract's `keccak256(lowercase(address))`.
pub fn leaf_for(identity: &str) -> CoreResult<Hash32> {
    let normalized = normalize_identity(identity)?;
    Ok(keccak256(normalized.as_bytes()))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerkleTree {
    /// `layers[0]` holds the sorted leaves, the last layer holds only the root.
    layers: Vec<Vec<Hash32>>,
}

/// Membership proof for one leaf.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipProof {
    pub leaf: Hash32,
    /// Sibling hashes, leaf level first. This order is what `unlock_access` folds.
    pub siblings: Vec<Hash32>,
    pub root: Hash32,
}

impl MembershipProof {
    pub fn verify(&self) -> bool {
        verify(&self.siblings, &self.leaf, &self.root)
    }
}

impl MerkleTree {
    pub fn build<S: AsRef<str>>(identities: &[S]) -> CoreResult<Self> {
        let leaves = identities
            .iter()
            .map(|id| leaf_for(id.as_ref()))
            .collect::<CoreResult<Vec<_>>>()?;
        Self::from_leaves(leaves)
    }

    /// Build from precomputed leaf hashes.
    pub fn from_leaves(mut leaves: Vec<Hash32>) -> CoreResult<Self> {
        if leaves.is_empty() {
            return Err(CoreError::EmptySet);
        }
        leaves.sort_unstable();
        leaves.dedup();

        let mut layers = vec![leaves];
        while layers[layers.len() - 1].len() > 1 {
            let current = &layers[layers.len() - 1];
            let next = current
                .chunks(2)
                .map(|pair| match pair {
                    [a, b] => hash_pair(a, b),
                    [carried] => *carried,
                    _ => unreachable!("chunks(2) yields one or two nodes"),
                })
                .collect();
            layers.push(next);
        }

        Ok(Self { layers })
    }

    pub fn root(&self) -> Hash32 {
        self.layers[self.layers.len() - 1][0]
    }

    pub fn leaves(&self) -> &[Hash32] {
        &self.layers[0]
    }

    /// Number of distinct leaves.
    pub fn len(&self) -> usize {
        self.layers[0].len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Number of combination levels above the leaves.
    pub fn depth(&self) -> usize {
        self.layers.len() - 1
    }

    pub fn contains(&self, leaf: &Hash32) -> bool {
        self.layers[0].binary_search(leaf).is_ok()
    }

    pub fn prove(&self, identity: &str) -> CoreResult<MembershipProof> {
        self.prove_leaf(&leaf_for(identity)?)
    }

    pub fn prove_leaf(&self, leaf: &Hash32) -> CoreResult<MembershipProof> {
        let mut index = self.layers[0].binary_search(leaf).map_err(|_| CoreError::NotAMember)?;

        let mut siblings = Vec::with_capacity(self.depth());
        for layer in &self.layers[..self.layers.len() - 1] {
            if let Some(sibling) = layer.get(index ^ 1) {
                siblings.push(*sibling);
            }
            index /= 2;
        }

        Ok(MembershipProof { leaf: *leaf, siblings, root: self.root() })
    }
}

/// Fold `siblings` onto `leaf` and compare with `root`.
pub fn verify(siblings: &[Hash32], leaf: &Hash32, root: &Hash32) -> bool {
    let computed = siblings.iter().fold(*leaf, |acc, sib| hash_pair(&acc, sib));
    computed == *root
}

/// [`verify`] over untrusted hex strings. Any malformed element means `false`.
pub fn verify_hex<S: AsRef<str>>(siblings: &[S], leaf: &str, root: &str) -> bool {
    let (Ok(leaf), Ok(root)) = (Hash32::from_hex(leaf), Hash32::from_hex(root)) else {
        return false;
    };
    let Ok(siblings) = siblings
        .iter()
        .map(|s| Hash32::from_hex(s.as_ref()))
        .collect::<CoreResult<Vec<_>>>()
    else {
        return false;
    };
    verify(&siblings, &leaf, &root)
}

/// Root over leaf hashes, for receivers that only hold the published leaves.
pub fn compute_root(leaves: &[Hash32]) -> CoreResult<Hash32> {
    MerkleTree::from_leaves(leaves.to_vec()).map(|t| t.root())
}

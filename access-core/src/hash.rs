//! Keccak-256, used identically for leaves and internal nodes.
//!
//! Keccak (not SHA3-256) is required so roots and proofs match what the verifier contract
//! recomputes on-chain.

use crate::types::Hash32;
use sha3::{Digest, Keccak256};

pub fn keccak256(data: &[u8]) -> Hash32 {
    let digest = Keccak256::digest(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    Hash32(out)
}

/// Combine two child hashes into their parent.
///
/// The pair is ordered by byte value before hashing, so the parent does not depend on which
/// child is "left". Build and verify sides MUST both use this.
#[inline]
pub fn hash_pair(a: &Hash32, b: &Hash32) -> Hash32 {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let mut h = Keccak256::new();
    h.update(lo.as_bytes());
    h.update(hi.as_bytes());
    let digest = h.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    Hash32(out)
}

//! Issuing and opening tokens for both product variants.
//!
//! - Group tokens: random key, AES-256-GCM, access gated by a Merkle root over the authorized
//!   identities. The key travels inside the token; admission is decided by the orchestrator.
//! - Wallet tokens: key derived from the recipient wallet (see [`crate::kdf`]). The medical
//!   clients issue these with AES-256-CBC.

use crate::cipher::{self, Algorithm};
use crate::constants::TOKEN_VERSION;
use crate::errors::{CoreError, CoreResult};
use crate::kdf::derive_key;
use crate::merkle::{MerkleTree, leaf_for};
use crate::token::{Binding, GroupBinding, Token, now_millis};
use tracing::debug;

/// Contract-compatible hash of one identity, hex encoded.
pub fn hash_identity(identity: &str) -> CoreResult<String> {
    leaf_for(identity).map(|h| h.to_hex())
}

/// Encrypt `plaintext` for the group `identities`.
///
/// Returns the token and the tree it commits to; the tree is needed to hand out proofs.
pub fn issue_group_token<S: AsRef<str>>(
    identities: &[S],
    plaintext: &[u8],
    embed_identities: bool,
) -> CoreResult<(Token, MerkleTree)> {
    let tree = MerkleTree::build(identities)?;
    let key = cipher::random_key();
    let sealed = cipher::encrypt_gcm(plaintext, &key)?;

    let authorized_identities = embed_identities
        .then(|| identities.iter().map(|s| s.as_ref().trim().to_lowercase()).collect());

    let token = Token {
        version: TOKEN_VERSION.to_string(),
        algorithm: Algorithm::Aes256Gcm,
        encrypted: sealed.wire_bytes(),
        iv: sealed.iv,
        timestamp: now_millis(),
        binding: Binding::Group(GroupBinding {
            merkle_root: tree.root(),
            key,
            authorized_identities,
        }),
    };

    debug!(root = %tree.root(), members = tree.len(), "issued group token");
    Ok((token, tree))
}

/// Decrypt a group token with its embedded key.
///
/// This performs NO membership check; it is what runs after the orchestrator admits.
pub fn open_group_token(token: &Token) -> CoreResult<Vec<u8>> {
    let group = token
        .group()
        .ok_or_else(|| CoreError::InvalidInput("not a group token".to_string()))?;
    cipher::decrypt(token.algorithm, &token.sealed()?, &group.key)
}

/// Encrypt `plaintext` under the key derived from `identity`.
pub fn issue_wallet_token(identity: &str, plaintext: &[u8], algorithm: Algorithm) -> CoreResult<Token> {
    let key = derive_key(identity)?;
    let sealed = cipher::encrypt(algorithm, plaintext, &key)?;

    Ok(Token {
        version: TOKEN_VERSION.to_string(),
        algorithm,
        encrypted: sealed.wire_bytes(),
        iv: sealed.iv,
        timestamp: now_millis(),
        binding: Binding::Wallet,
    })
}

/// Decrypt a wallet token with the key derived from `identity`.
///
/// For CBC tokens a wrong identity yields garbage bytes, not an error.
pub fn open_wallet_token(token: &Token, identity: &str) -> CoreResult<Vec<u8>> {
    if token.group().is_some() {
        return Err(CoreError::InvalidInput("not a wallet token".to_string()));
    }
    let key = derive_key(identity)?;
    cipher::decrypt(token.algorithm, &token.sealed()?, &key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{decode, encode};

    const PATIENT: &str = "0x742d35Cc6634C0532925a3b844Bc9e7595f0bEb0";

    #[test]
    fn group_token_opens_with_embedded_key() {
        let (token, tree) = issue_group_token(&["0xAAA", "0xBBB"], b"hello", false).unwrap();
        assert_eq!(token.merkle_root(), Some(&tree.root()));
        assert!(token.group().unwrap().authorized_identities.is_none());

        let decoded = decode(&encode(&token).unwrap()).unwrap();
        assert_eq!(open_group_token(&decoded).unwrap(), b"hello");
    }

    #[test]
    fn embedded_identities_are_normalized() {
        let (token, _) = issue_group_token(&["0xAAA", " 0xbBb "], b"m", true).unwrap();
        assert_eq!(
            token.group().unwrap().authorized_identities.as_deref(),
            Some(&["0xaaa".to_string(), "0xbbb".to_string()][..])
        );
    }

    #[test]
    fn wallet_token_round_trips_for_both_algorithms() {
        for alg in [Algorithm::Aes256Cbc, Algorithm::Aes256Gcm] {
            let token = issue_wallet_token(PATIENT, b"{\"testType\":\"CBC\"}", alg).unwrap();
            let decoded = decode(&encode(&token).unwrap()).unwrap();
            let same_wallet_other_case = PATIENT.to_uppercase().replace("0X", "0x");
            assert_eq!(open_wallet_token(&decoded, &same_wallet_other_case).unwrap(), b"{\"testType\":\"CBC\"}");
        }
    }

    #[test]
    fn wrong_wallet_on_gcm_is_authentication_error() {
        let token = issue_wallet_token(PATIENT, b"secret", Algorithm::Aes256Gcm).unwrap();
        let err = open_wallet_token(&token, "0x1234567890123456789012345678901234567890").unwrap_err();
        assert_eq!(err, CoreError::Authentication);
    }

    #[test]
    fn wrong_wallet_on_cbc_returns_garbage() {
        let token = issue_wallet_token(PATIENT, b"secret results", Algorithm::Aes256Cbc).unwrap();
        let out = open_wallet_token(&token, "0x1234567890123456789012345678901234567890").unwrap();
        assert_ne!(out, b"secret results");
    }

    #[test]
    fn variants_do_not_mix() {
        let (group, _) = issue_group_token(&["0xaaa"], b"m", false).unwrap();
        assert!(matches!(open_wallet_token(&group, PATIENT), Err(CoreError::InvalidInput(_))));
        let wallet = issue_wallet_token(PATIENT, b"m", Algorithm::Aes256Cbc).unwrap();
        assert!(matches!(open_group_token(&wallet), Err(CoreError::InvalidInput(_))));
    }

    #[test]
    fn hash_identity_is_lowercase_keccak() {
        assert_eq!(hash_identity("0xABC").unwrap(), hash_identity("0xabc").unwrap());
        assert_eq!(hash_identity("0xabc").unwrap().len(), 64);
    }
}

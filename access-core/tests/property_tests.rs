//! Property-based tests for the accumulator, the cipher and the token codec.

use access_core::cipher::{self, Algorithm};
use access_core::kdf::derive_key;
use access_core::merkle::{MerkleTree, leaf_for, verify};
use access_core::token::{Binding, GroupBinding, Token, decode, encode};
use access_core::{CoreError, Hash32, Iv, Key};
use proptest::prelude::*;

fn identity() -> impl Strategy<Value = String> {
    "0x[0-9a-fA-F]{40}"
}

fn identity_set() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(identity(), 1..24)
}

proptest! {
    #[test]
    fn root_is_order_independent(ids in identity_set(), seed in any::<u64>()) {
        let mut shuffled = ids.clone();
        // Deterministic rotation + reversal driven by the seed.
        let k = (seed as usize) % shuffled.len();
        shuffled.rotate_left(k);
        if seed & 1 == 1 {
            shuffled.reverse();
        }
        let a = MerkleTree::build(&ids).unwrap();
        let b = MerkleTree::build(&shuffled).unwrap();
        prop_assert_eq!(a.root(), b.root());
    }

    #[test]
    fn every_member_verifies(ids in identity_set()) {
        let tree = MerkleTree::build(&ids).unwrap();
        for id in &ids {
            let proof = tree.prove(id).unwrap();
            prop_assert!(verify(&proof.siblings, &leaf_for(id).unwrap(), &tree.root()));
        }
    }

    #[test]
    fn outsiders_are_not_members(ids in identity_set(), outsider in identity()) {
        let lowered: Vec<String> = ids.iter().map(|s| s.to_lowercase()).collect();
        prop_assume!(!lowered.contains(&outsider.to_lowercase()));
        let tree = MerkleTree::build(&ids).unwrap();
        prop_assert_eq!(tree.prove(&outsider).unwrap_err(), CoreError::NotAMember);
    }

    #[test]
    fn verify_never_panics(
        siblings in prop::collection::vec(prop::array::uniform32(any::<u8>()), 0..12),
        leaf in prop::array::uniform32(any::<u8>()),
        root in prop::array::uniform32(any::<u8>()),
    ) {
        let siblings: Vec<Hash32> = siblings.into_iter().map(Hash32).collect();
        let a = verify(&siblings, &Hash32(leaf), &Hash32(root));
        let b = verify(&siblings, &Hash32(leaf), &Hash32(root));
        prop_assert_eq!(a, b);
    }

    #[test]
    fn gcm_round_trip(msg in prop::collection::vec(any::<u8>(), 0..512), key in prop::array::uniform32(any::<u8>())) {
        let key = Key(key);
        let sealed = cipher::encrypt(Algorithm::Aes256Gcm, &msg, &key).unwrap();
        prop_assert_eq!(cipher::decrypt(Algorithm::Aes256Gcm, &sealed, &key).unwrap(), msg);
    }

    #[test]
    fn gcm_detects_any_bit_flip(
        msg in prop::collection::vec(any::<u8>(), 1..128),
        pos in any::<usize>(),
        bit in 0u8..8,
    ) {
        let key = cipher::random_key();
        let sealed = cipher::encrypt_gcm(&msg, &key).unwrap();
        let mut wire = sealed.wire_bytes();
        let i = pos % wire.len();
        wire[i] ^= 1 << bit;

        let tampered = cipher::Sealed::from_wire(Algorithm::Aes256Gcm, &wire, sealed.iv).unwrap();
        prop_assert_eq!(
            cipher::decrypt(Algorithm::Aes256Gcm, &tampered, &key).unwrap_err(),
            CoreError::Authentication
        );
    }

    #[test]
    fn key_derivation_ignores_case_and_prefix(digits in "[0-9a-f]{1,80}") {
        let upper = format!("0x{}", digits.to_uppercase());
        prop_assert_eq!(derive_key(&upper).unwrap(), derive_key(&digits).unwrap());
    }

    #[test]
    fn token_round_trip(
        encrypted in prop::collection::vec(any::<u8>(), 16..200),
        iv in prop::array::uniform16(any::<u8>()),
        root in prop::array::uniform32(any::<u8>()),
        key in prop::array::uniform32(any::<u8>()),
        timestamp in any::<u64>(),
        members in prop::option::of(prop::collection::vec(identity(), 0..4)),
        group in any::<bool>(),
    ) {
        let binding = if group {
            Binding::Group(GroupBinding {
                merkle_root: Hash32(root),
                key: Key(key),
                authorized_identities: members,
            })
        } else {
            Binding::Wallet
        };
        let token = Token {
            version: "1.0.0".to_string(),
            algorithm: Algorithm::Aes256Gcm,
            encrypted,
            iv: Iv(iv),
            timestamp,
            binding,
        };
        prop_assert_eq!(decode(&encode(&token).unwrap()).unwrap(), token);
    }
}

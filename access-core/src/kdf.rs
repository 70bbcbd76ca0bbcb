//! Identity normalization and wallet-key derivation.
//!
//! SECURITY NOTE: `derive_key` is NOT a cryptographic KDF. It expands the wallet address's own
//! hex digits into 32 bytes, so anyone who knows the address knows the key. The derived key bytes
//! match what the medical-results clients compute; their token envelopes are a different format
//! and do not decode here.

use crate::constants::DERIVED_KEY_HEX_LEN;
use crate::errors::{CoreError, CoreResult};
use crate::types::Key;

/// Canonical form of an identity for leaf hashing: trimmed and lowercased.
///
/// A `0x` prefix is kept here; the verifier contract hashes the lowercased address string as-is.
pub fn normalize_identity(identity: &str) -> CoreResult<String> {
    let normalized = identity.trim().to_lowercase();
    if normalized.is_empty() {
        return Err(CoreError::InvalidInput("identity is empty".to_string()));
    }
    Ok(normalized)
}

/// Derive the wallet key for `identity`.
///
/// Lowercase, strip one leading `0x`, repeat the digits until there are at least 64 of them,
/// truncate to exactly 64 and hex-decode.
pub fn derive_key(identity: &str) -> CoreResult<Key> {
    let lowered = identity.trim().to_lowercase();
    let digits = lowered.strip_prefix("0x").unwrap_or(&lowered);

    if digits.is_empty() {
        return Err(CoreError::KeyDerivation("identity has no hex digits".to_string()));
    }
    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(CoreError::KeyDerivation(
            "identity contains non-hex characters".to_string(),
        ));
    }

    let expanded: String = digits
        .repeat(DERIVED_KEY_HEX_LEN.div_ceil(digits.len()))
        .chars()
        .take(DERIVED_KEY_HEX_LEN)
        .collect();

    let mut key = [0u8; 32];
    hex::decode_to_slice(&expanded, &mut key)
        .map_err(|e| CoreError::KeyDerivation(format!("{e}")))?;
    Ok(Key(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_length_address_repeats_to_64_digits() {
        let addr = "0x1234567890123456789012345678901234567890";
        let key = derive_key(addr).unwrap();
        // 40 digits + the first 24 digits again.
        assert_eq!(
            key.to_hex(),
            "1234567890123456789012345678901234567890123456789012345678901234"
        );
    }

    #[test]
    fn short_identity_is_cycled() {
        let key = derive_key("abc").unwrap();
        assert_eq!(key.to_hex(), "abc".repeat(22)[..64].to_string());
    }

    #[test]
    fn case_and_prefix_do_not_matter() {
        let a = derive_key("0xABCDEFabcdef0123").unwrap();
        let b = derive_key("abcdefabcdef0123").unwrap();
        let c = derive_key("  0XabcdefABCDEF0123 ").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn rejects_empty_and_non_hex() {
        assert!(matches!(derive_key(""), Err(CoreError::KeyDerivation(_))));
        assert!(matches!(derive_key("0x"), Err(CoreError::KeyDerivation(_))));
        assert!(matches!(derive_key("0xnothex"), Err(CoreError::KeyDerivation(_))));
    }

    #[test]
    fn normalization_keeps_prefix_and_lowercases() {
        assert_eq!(normalize_identity(" 0xAbC ").unwrap(), "0xabc");
        assert!(matches!(normalize_identity("   "), Err(CoreError::InvalidInput(_))));
    }
}

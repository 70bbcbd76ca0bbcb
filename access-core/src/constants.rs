//! Crate-wide constants shared by the cipher, the token codec and the Merkle accumulator.

/// Size of a Keccak-256 digest (leaves, nodes, roots).
pub const HASH_LEN: usize = 32;

/// AES-256 key length.
pub const KEY_LEN: usize = 32;

/// Per-encryption IV length. GCM is run with a 128-bit nonce to stay
/// wire-compatible with tokens issued by the browser clients.
pub const IV_LEN: usize = 16;

/// GCM authentication tag length, appended to the ciphertext on the wire.
pub const TAG_LEN: usize = 16;

/// AES block size (CBC padding granularity).
pub const BLOCK_LEN: usize = 16;

/// Envelope version emitted by the codec.
pub const TOKEN_VERSION: &str = "1.0.0";

/// Only tokens with this major version are accepted on decode.
pub const SUPPORTED_MAJOR_VERSION: u64 = 1;

/// Number of hex characters the wallet key derivation expands an identity to.
pub const DERIVED_KEY_HEX_LEN: usize = KEY_LEN * 2;

/// Ledger `type` attribute for stored medical results.
pub const MEDICAL_RESULT_TYPE: &str = "medical_result";

/// Default time-to-live for stored medical results, in days.
pub const DEFAULT_RESULT_TTL_DAYS: u64 = 30;

/// Maximum number of results returned by a patient query.
pub const PATIENT_QUERY_LIMIT: usize = 100;

//! Token envelope and its JSON codec.
//!
//! Wire format (camelCase JSON):
//!
//! ```json
//! {
//!   "version": "1.0.0",
//!   "algorithm": "AES-256-GCM",
//!   "merkleRoot": "<64 hex>",
//!   "keyInfo": { "key": "<64 hex>", "iv": "<32 hex>" },
//!   "authorizedIdentities": ["0x…"],
//!   "encrypted": "<hex ciphertext‖tag>",
//!   "iv": "<32 hex>",
//!   "timestamp": 1700000000000
//! }
//! ```
//!
//! `merkleRoot`, `keyInfo` and `authorizedIdentities` only appear on group tokens. Wallet tokens
//! carry no key material; the key is derived from the patient's wallet.

use crate::cipher::{Algorithm, Sealed};
use crate::constants::{BLOCK_LEN, SUPPORTED_MAJOR_VERSION, TAG_LEN};
use crate::errors::{CoreError, CoreResult};
use crate::kdf::normalize_identity;
use crate::types::{Hash32, Iv, Key};
use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub version: String,
    pub algorithm: Algorithm,
    /// Ciphertext, with the GCM tag appended.
    pub encrypted: Vec<u8>,
    pub iv: Iv,
    /// Unix milliseconds at issuance.
    pub timestamp: u64,
    pub binding: Binding,
}

/// How the decryption key is obtained.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Binding {
    /// Random key shipped in the token, access gated by Merkle membership.
    Group(GroupBinding),
    /// Key derived from the recipient's wallet address.
    Wallet,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupBinding {
    pub merkle_root: Hash32,
    pub key: Key,
    /// The full authorized set, when the issuer chose to embed it.
    pub authorized_identities: Option<Vec<String>>,
}

impl Token {
    pub fn merkle_root(&self) -> Option<&Hash32> {
        match &self.binding {
            Binding::Group(g) => Some(&g.merkle_root),
            Binding::Wallet => None,
        }
    }

    pub fn group(&self) -> Option<&GroupBinding> {
        match &self.binding {
            Binding::Group(g) => Some(g),
            Binding::Wallet => None,
        }
    }

    pub fn sealed(&self) -> CoreResult<Sealed> {
        Sealed::from_wire(self.algorithm, &self.encrypted, self.iv)
    }
}

pub(crate) fn now_millis() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct WireToken {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    algorithm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    merkle_root: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    key_info: Option<WireKeyInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    authorized_identities: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    encrypted: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct WireKeyInfo {
    key: String,
    iv: String,
}

impl From<&Token> for WireToken {
    fn from(t: &Token) -> Self {
        let mut wire = WireToken {
            version: Some(t.version.clone()),
            algorithm: Some(t.algorithm.as_str().to_string()),
            encrypted: Some(hex::encode(&t.encrypted)),
            iv: Some(t.iv.to_hex()),
            timestamp: Some(t.timestamp),
            ..Default::default()
        };
        if let Binding::Group(g) = &t.binding {
            wire.merkle_root = Some(g.merkle_root.to_hex());
            wire.key_info = Some(WireKeyInfo { key: g.key.to_hex(), iv: t.iv.to_hex() });
            wire.authorized_identities = g.authorized_identities.clone();
        }
        wire
    }
}

fn malformed(msg: impl Into<String>) -> CoreError {
    CoreError::MalformedToken(msg.into())
}

fn required<T>(field: Option<T>, name: &str) -> CoreResult<T> {
    field.ok_or_else(|| malformed(format!("missing field `{name}`")))
}

fn check_version(version: &str) -> CoreResult<()> {
    let major = version
        .split('.')
        .next()
        .and_then(|m| m.parse::<u64>().ok())
        .ok_or_else(|| malformed(format!("invalid version `{version}`")))?;
    if major != SUPPORTED_MAJOR_VERSION {
        return Err(malformed(format!("unsupported version `{version}`")));
    }
    Ok(())
}

fn check_ciphertext_len(algorithm: Algorithm, len: usize) -> CoreResult<()> {
    match algorithm {
        Algorithm::Aes256Gcm if len < TAG_LEN => Err(malformed("`encrypted` is shorter than the GCM tag")),
        Algorithm::Aes256Cbc if len == 0 || len % BLOCK_LEN != 0 => {
            Err(malformed("`encrypted` is not a whole number of CBC blocks"))
        }
        _ => Ok(()),
    }
}

impl TryFrom<WireToken> for Token {
    type Error = CoreError;

    fn try_from(wire: WireToken) -> CoreResult<Self> {
        let version = required(wire.version, "version")?;
        check_version(&version)?;

        let algorithm: Algorithm = required(wire.algorithm, "algorithm")?
            .parse()
            .map_err(|e: CoreError| malformed(e.to_string()))?;

        let encrypted = hex::decode(required(wire.encrypted, "encrypted")?)
            .map_err(|e| malformed(format!("`encrypted` is not valid hex: {e}")))?;
        check_ciphertext_len(algorithm, encrypted.len())?;

        let iv = Iv::from_hex(&required(wire.iv, "iv")?).map_err(|e| malformed(e.to_string()))?;
        let timestamp = required(wire.timestamp, "timestamp")?;

        let binding = match (wire.merkle_root, wire.key_info) {
            (Some(root), Some(key_info)) => {
                let merkle_root = Hash32::from_hex(&root).map_err(|e| malformed(format!("merkleRoot: {e}")))?;
                let key = Key::from_hex(&key_info.key).map_err(|e| malformed(format!("keyInfo.key: {e}")))?;
                let key_iv = Iv::from_hex(&key_info.iv).map_err(|e| malformed(format!("keyInfo.iv: {e}")))?;
                if key_iv != iv {
                    return Err(malformed("keyInfo.iv does not match iv"));
                }
                for (i, identity) in wire.authorized_identities.iter().flatten().enumerate() {
                    normalize_identity(identity).map_err(|e| malformed(format!("authorizedIdentities[{i}]: {e}")))?;
                }
                Binding::Group(GroupBinding {
                    merkle_root,
                    key,
                    authorized_identities: wire.authorized_identities,
                })
            }
            (None, None) => {
                if wire.authorized_identities.is_some() {
                    return Err(malformed("authorizedIdentities requires merkleRoot"));
                }
                Binding::Wallet
            }
            (Some(_), None) => return Err(malformed("missing field `keyInfo`")),
            (None, Some(_)) => return Err(malformed("missing field `merkleRoot`")),
        };

        Ok(Token { version, algorithm, encrypted, iv, timestamp, binding })
    }
}

pub fn encode(token: &Token) -> CoreResult<String> {
    serde_json::to_string(&WireToken::from(token)).map_err(|e| CoreError::InvalidInput(format!("{e}")))
}

/// Indented form, as shown to users for copy/paste.
pub fn encode_pretty(token: &Token) -> CoreResult<String> {
    serde_json::to_string_pretty(&WireToken::from(token)).map_err(|e| CoreError::InvalidInput(format!("{e}")))
}

pub fn decode(s: &str) -> CoreResult<Token> {
    let wire: WireToken = serde_json::from_str(s).map_err(|e| malformed(e.to_string()))?;
    Token::try_from(wire)
}

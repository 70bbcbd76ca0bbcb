//! Symmetric payload encryption.
//!
//! Two profiles exist and both are addressable from the token envelope:
//! - `AES-256-GCM`: authenticated. A tag mismatch is always surfaced as
//!   [`CoreError::Authentication`].
//! - `AES-256-CBC`: NOT authenticated. Decrypting with the wrong key returns garbage bytes
//!   instead of an error. This is a known limitation of the medical-result tokens and is kept
//!   as-is; callers that need to detect a wrong key must parse the plaintext themselves.
//!
//! Every `encrypt` call draws a fresh IV from the OS RNG.

use crate::constants::{BLOCK_LEN, IV_LEN, TAG_LEN};
use crate::errors::{CoreError, CoreResult};
use crate::types::{Iv, Key};
use aes::cipher::block_padding::{NoPadding, Pkcs7};
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{AesGcm, Nonce, Tag};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// AES-256-GCM with a 128-bit nonce.
type Aes256Gcm16 = AesGcm<aes::Aes256, U16>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    #[serde(rename = "AES-256-GCM")]
    Aes256Gcm,
    #[serde(rename = "AES-256-CBC")]
    Aes256Cbc,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Aes256Gcm => "AES-256-GCM",
            Algorithm::Aes256Cbc => "AES-256-CBC",
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Algorithm::Aes256Gcm)
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AES-256-GCM" => Ok(Algorithm::Aes256Gcm),
            "AES-256-CBC" => Ok(Algorithm::Aes256Cbc),
            other => Err(CoreError::InvalidInput(format!("unsupported algorithm: {other}"))),
        }
    }
}

/// Output of one encryption.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sealed {
    pub ciphertext: Vec<u8>,
    pub iv: Iv,
    /// Present for GCM only.
    pub tag: Option<[u8; TAG_LEN]>,
}

impl Sealed {
    /// Ciphertext with the tag appended (GCM), as carried in the token's `encrypted` field.
    pub fn wire_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.ciphertext.len() + TAG_LEN);
        out.extend_from_slice(&self.ciphertext);
        if let Some(tag) = &self.tag {
            out.extend_from_slice(tag);
        }
        out
    }

    /// Split wire bytes back into ciphertext and tag for `algorithm`.
    pub fn from_wire(algorithm: Algorithm, bytes: &[u8], iv: Iv) -> CoreResult<Self> {
        match algorithm {
            Algorithm::Aes256Gcm => {
                if bytes.len() < TAG_LEN {
                    return Err(CoreError::InvalidInput(format!(
                        "GCM payload shorter than its {TAG_LEN}-byte tag"
                    )));
                }
                let (ct, tag_bytes) = bytes.split_at(bytes.len() - TAG_LEN);
                let mut tag = [0u8; TAG_LEN];
                tag.copy_from_slice(tag_bytes);
                Ok(Sealed { ciphertext: ct.to_vec(), iv, tag: Some(tag) })
            }
            Algorithm::Aes256Cbc => Ok(Sealed { ciphertext: bytes.to_vec(), iv, tag: None }),
        }
    }
}

/// Fresh random 256-bit key.
pub fn random_key() -> Key {
    let mut key = [0u8; 32];
    OsRng.fill_bytes(&mut key);
    Key(key)
}

fn fresh_iv() -> Iv {
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    Iv(iv)
}

pub fn encrypt(algorithm: Algorithm, plaintext: &[u8], key: &Key) -> CoreResult<Sealed> {
    match algorithm {
        Algorithm::Aes256Gcm => encrypt_gcm(plaintext, key),
        Algorithm::Aes256Cbc => Ok(encrypt_cbc(plaintext, key)),
    }
}

pub fn decrypt(algorithm: Algorithm, sealed: &Sealed, key: &Key) -> CoreResult<Vec<u8>> {
    match algorithm {
        Algorithm::Aes256Gcm => {
            let tag = sealed
                .tag
                .as_ref()
                .ok_or_else(|| CoreError::InvalidInput("GCM ciphertext without tag".to_string()))?;
            decrypt_gcm(&sealed.ciphertext, key, &sealed.iv, tag)
        }
        Algorithm::Aes256Cbc => decrypt_cbc(&sealed.ciphertext, key, &sealed.iv),
    }
}

pub fn encrypt_gcm(plaintext: &[u8], key: &Key) -> CoreResult<Sealed> {
    let cipher = Aes256Gcm16::new_from_slice(key.as_bytes())
        .map_err(|_| CoreError::InvalidInput("invalid key length".to_string()))?;
    let iv = fresh_iv();

    let mut buf = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::<U16>::from_slice(iv.as_bytes()), b"", &mut buf)
        .map_err(|_| CoreError::InvalidInput("plaintext too large for GCM".to_string()))?;

    let mut tag_bytes = [0u8; TAG_LEN];
    tag_bytes.copy_from_slice(&tag);
    Ok(Sealed { ciphertext: buf, iv, tag: Some(tag_bytes) })
}

pub fn decrypt_gcm(ciphertext: &[u8], key: &Key, iv: &Iv, tag: &[u8; TAG_LEN]) -> CoreResult<Vec<u8>> {
    let cipher = Aes256Gcm16::new_from_slice(key.as_bytes())
        .map_err(|_| CoreError::InvalidInput("invalid key length".to_string()))?;

    let mut buf = ciphertext.to_vec();
    cipher
        .decrypt_in_place_detached(
            Nonce::<U16>::from_slice(iv.as_bytes()),
            b"",
            &mut buf,
            Tag::<U16>::from_slice(tag),
        )
        .map_err(|_| CoreError::Authentication)?;
    Ok(buf)
}

pub fn encrypt_cbc(plaintext: &[u8], key: &Key) -> Sealed {
    let iv = fresh_iv();
    let ciphertext = Aes256CbcEnc::new(key.as_bytes().into(), iv.as_bytes().into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);
    Sealed { ciphertext, iv, tag: None }
}

/// CBC decryption with lenient unpadding.
///
/// Well-formed PKCS#7 padding is stripped; anything else is returned untouched. A wrong key
/// therefore yields garbage rather than an error.
pub fn decrypt_cbc(ciphertext: &[u8], key: &Key, iv: &Iv) -> CoreResult<Vec<u8>> {
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_LEN != 0 {
        return Err(CoreError::InvalidInput(format!(
            "CBC ciphertext length {} is not a positive multiple of {BLOCK_LEN}",
            ciphertext.len()
        )));
    }

    let mut plain = Aes256CbcDec::new(key.as_bytes().into(), iv.as_bytes().into())
        .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
        .map_err(|_| CoreError::InvalidInput("CBC ciphertext is not block aligned".to_string()))?;

    let pad = plain.last().copied().unwrap_or(0) as usize;
    let well_padded = (1..=BLOCK_LEN).contains(&pad)
        && pad <= plain.len()
        && plain[plain.len() - pad..].iter().all(|&b| b as usize == pad);
    if well_padded {
        plain.truncate(plain.len() - pad);
    }
    Ok(plain)
}

use access_core::cipher::Algorithm;
use access_core::orchestrator::DenyReason;
use access_core::records::{MedicalRecord, MedicalResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct GroupTokenRequest {
    /// Wallet addresses (or any identity strings) allowed to read the message.
    pub identities: Vec<String>,
    pub message: String,

    /// Carry the lowercased identity list inside the token so receivers can prove themselves.
    #[serde(default)]
    pub embed_identities: bool,

    /// Also register the root with the registry under this publisher.
    pub publish_as: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GroupTokenResponse {
    /// Serialized token JSON, ready to hand to receivers.
    pub token: String,
    pub merkle_root: String,
    pub members: usize,
    pub published: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProofRequest {
    pub identities: Vec<String>,
    pub identity: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProofResponse {
    pub leaf: String,
    pub root: String,

    /// Leaf level first. Pass these unchanged to `/api/v1/access/verify`.
    pub siblings: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyAccessRequest {
    pub token: String,
    pub identity: String,

    /// Hex sibling hashes. When absent, the token's embedded identities are used.
    pub proof: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyAccessResponse {
    pub admitted: bool,
    pub local_only: bool,
    pub reason: Option<DenyReason>,
    pub plaintext_b64: Option<String>,

    /// Present when the plaintext is valid UTF-8.
    pub plaintext_utf8: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PublishRootRequest {
    pub root: String,
    pub publisher: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LastAccessResponse {
    pub root: String,
    pub leaf: String,

    /// `None` when this leaf never unlocked the root.
    pub last_access: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MedicalResultCreateRequest {
    pub record: MedicalRecord,
    pub doctor_id: String,

    /// Defaults to AES-256-CBC, which is what the clinic clients read.
    pub algorithm: Option<Algorithm>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MedicalResultCreateResponse {
    pub entity_id: String,
    pub tx_ref: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MedicalResultListResponse {
    pub wallet: String,
    pub results: Vec<MedicalResult>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DecryptResultRequest {
    pub encrypted_token: String,
    pub wallet: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DecryptResultResponse {
    pub record: MedicalRecord,
}

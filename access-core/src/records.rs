//! Encrypted medical results stored on the ledger.
//!
//! A doctor publishes a record as a wallet token (key derived from the patient's wallet) inside
//! a JSON payload, indexed by `type`, `doctor`, `patient` and `timestamp` attributes. The patient
//! queries by wallet and decrypts locally. Raw records never reach the ledger.

use crate::cipher::Algorithm;
use crate::constants::{MEDICAL_RESULT_TYPE, PATIENT_QUERY_LIMIT};
use crate::errors::{CoreError, CoreResult};
use crate::issuer::{issue_wallet_token, open_wallet_token};
use crate::ledger::{Attribute, Entity, Ledger, Receipt};
use crate::token::{self, Token};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicalRecord {
    pub patient_name: String,
    pub patient_wallet: String,
    pub test_type: String,
    /// Free-form result values, e.g. `{"glucose_mg_dl": 95}`.
    pub results: serde_json::Map<String, serde_json::Value>,
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Ledger payload wrapping one encrypted token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultPayload {
    pub encrypted_data: String,
    pub metadata: ResultMetadata,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultMetadata {
    pub doctor: String,
    pub patient: String,
    pub timestamp: u64,
    #[serde(rename = "type")]
    pub kind: String,
}

/// One stored result as seen by the patient.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicalResult {
    pub entity_id: String,
    pub encrypted_token: String,
    pub doctor: String,
    pub patient: String,
    pub timestamp: u64,
}

/// Encrypt `record` for its patient and store it.
pub async fn publish_result(
    ledger: &dyn Ledger,
    record: &MedicalRecord,
    doctor_id: &str,
    algorithm: Algorithm,
    ttl: Duration,
) -> CoreResult<Receipt> {
    let plaintext = serde_json::to_vec(record).map_err(|e| CoreError::InvalidInput(format!("{e}")))?;
    let token = issue_wallet_token(&record.patient_wallet, &plaintext, algorithm)?;
    let patient = record.patient_wallet.trim().to_lowercase();

    let payload = ResultPayload {
        encrypted_data: token::encode(&token)?,
        metadata: ResultMetadata {
            doctor: doctor_id.to_string(),
            patient: patient.clone(),
            timestamp: token.timestamp,
            kind: MEDICAL_RESULT_TYPE.to_string(),
        },
    };
    let bytes = serde_json::to_vec(&payload).map_err(|e| CoreError::InvalidInput(format!("{e}")))?;

    let attributes = vec![
        Attribute::new("type", MEDICAL_RESULT_TYPE),
        Attribute::new("doctor", doctor_id),
        Attribute::new("patient", patient.as_str()),
        Attribute::new("timestamp", token.timestamp.to_string()),
    ];

    let receipt = ledger.put(bytes, attributes, ttl).await?;
    info!(entity_id = %receipt.id, doctor = %doctor_id, ttl_secs = ttl.as_secs(), "medical result stored");
    Ok(receipt)
}

fn to_result(entity: Entity) -> CoreResult<MedicalResult> {
    let payload: ResultPayload = serde_json::from_slice(&entity.payload)
        .map_err(|e| CoreError::Ledger(format!("entity {} has an unreadable payload: {e}", entity.id)))?;
    let doctor = entity.attribute("doctor").unwrap_or("unknown").to_string();
    let patient = entity.attribute("patient").unwrap_or_default().to_string();
    let timestamp = entity
        .attribute("timestamp")
        .and_then(|t| t.parse().ok())
        .unwrap_or(payload.metadata.timestamp);

    Ok(MedicalResult {
        entity_id: entity.id,
        encrypted_token: payload.encrypted_data,
        doctor,
        patient,
        timestamp,
    })
}

/// All live results stored for `wallet`.
pub async fn patient_results(ledger: &dyn Ledger, wallet: &str) -> CoreResult<Vec<MedicalResult>> {
    let filter = [
        Attribute::new("type", MEDICAL_RESULT_TYPE),
        Attribute::new("patient", wallet.trim().to_lowercase()),
    ];
    let entities = ledger.query(&filter, PATIENT_QUERY_LIMIT).await?;
    entities.into_iter().map(to_result).collect()
}

/// One live result by entity id. Entities that are not medical results read as `None`.
pub async fn result_by_id(ledger: &dyn Ledger, entity_id: &str) -> CoreResult<Option<MedicalResult>> {
    match ledger.get(entity_id).await? {
        Some(entity) if entity.attribute("type") == Some(MEDICAL_RESULT_TYPE) => to_result(entity).map(Some),
        _ => Ok(None),
    }
}

/// Decrypt a stored result with the patient's wallet.
///
/// With CBC tokens a wrong wallet produces garbage; it surfaces here as `InvalidInput` because
/// the garbage does not parse as a record.
pub fn open_result(encrypted_token: &str, wallet: &str) -> CoreResult<MedicalRecord> {
    let token: Token = token::decode(encrypted_token)?;
    let plaintext = open_wallet_token(&token, wallet)?;
    serde_json::from_slice(&plaintext)
        .map_err(|e| CoreError::InvalidInput(format!("decrypted payload is not a medical record: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;
    use serde_json::json;

    const PATIENT: &str = "0xAbCdEf0123456789abcdef0123456789ABCDEF01";

    fn record() -> MedicalRecord {
        let results = json!({ "glucose_mg_dl": 95, "hba1c": 5.4 });
        MedicalRecord {
            patient_name: "Ada".to_string(),
            patient_wallet: PATIENT.to_string(),
            test_type: "Blood panel".to_string(),
            results: results.as_object().cloned().unwrap(),
            date: "2025-01-01".to_string(),
            notes: None,
        }
    }

    #[tokio::test]
    async fn publish_query_open() {
        let ledger = MemoryLedger::new();
        let ttl = Duration::from_secs(3600);
        let receipt = publish_result(&ledger, &record(), "dr-house", Algorithm::Aes256Cbc, ttl)
            .await
            .unwrap();

        let results = patient_results(&ledger, &PATIENT.to_lowercase()).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].entity_id, receipt.id);
        assert_eq!(results[0].doctor, "dr-house");
        assert_eq!(results[0].patient, PATIENT.to_lowercase());

        let opened = open_result(&results[0].encrypted_token, PATIENT).unwrap();
        assert_eq!(opened, record());
    }

    #[tokio::test]
    async fn result_is_fetched_by_entity_id() {
        let ledger = MemoryLedger::new();
        let receipt = publish_result(&ledger, &record(), "dr", Algorithm::Aes256Gcm, Duration::from_secs(60))
            .await
            .unwrap();
        let other = ledger
            .put(b"{}".to_vec(), vec![Attribute::new("type", "note")], Duration::from_secs(60))
            .await
            .unwrap();

        let found = result_by_id(&ledger, &receipt.id).await.unwrap().unwrap();
        assert_eq!(found.entity_id, receipt.id);
        assert_eq!(open_result(&found.encrypted_token, PATIENT).unwrap(), record());

        assert!(result_by_id(&ledger, &other.id).await.unwrap().is_none());
        assert!(result_by_id(&ledger, "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn other_patients_see_nothing() {
        let ledger = MemoryLedger::new();
        publish_result(&ledger, &record(), "dr", Algorithm::Aes256Cbc, Duration::from_secs(60))
            .await
            .unwrap();
        let none = patient_results(&ledger, "0x1111111111111111111111111111111111111111").await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn wrong_wallet_cannot_read_the_record() {
        let ledger = MemoryLedger::new();
        publish_result(&ledger, &record(), "dr", Algorithm::Aes256Cbc, Duration::from_secs(60))
            .await
            .unwrap();
        let stored = patient_results(&ledger, PATIENT).await.unwrap();
        let err = open_result(&stored[0].encrypted_token, "0x1111111111111111111111111111111111111111");
        assert!(err.is_err());
    }
}

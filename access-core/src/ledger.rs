//! Boundary to the ledger/storage layer.
//!
//! The core treats the ledger as opaque blob storage: payload bytes in, payload bytes out,
//! selected by attribute equality. Entities expire after their TTL and are never returned once
//! expired.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::hash::keccak256;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    #[error("ledger rejected request: {0}")]
    Rejected(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Attribute {
    pub key: String,
    pub value: String,
}

impl Attribute {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self { key: key.into(), value: value.into() }
    }
}

/// Returned by `put`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub id: String,
    pub tx_ref: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub payload: Vec<u8>,
    pub attributes: Vec<Attribute>,
}

impl Entity {
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.iter().find(|a| a.key == key).map(|a| a.value.as_str())
    }
}

/// Whether `attributes` satisfies every equality predicate in `filter`.
pub fn matches_filter(attributes: &[Attribute], filter: &[Attribute]) -> bool {
    filter.iter().all(|f| attributes.iter().any(|a| a == f))
}

/// Transaction reference for a stored entity: Keccak over its id and payload.
pub fn tx_ref_for(id: &str, payload: &[u8]) -> String {
    let mut buf = Vec::with_capacity(id.len() + payload.len());
    buf.extend_from_slice(id.as_bytes());
    buf.extend_from_slice(payload);
    keccak256(&buf).to_prefixed_hex()
}

#[async_trait]
pub trait Ledger: Send + Sync {
    async fn put(
        &self,
        payload: Vec<u8>,
        attributes: Vec<Attribute>,
        ttl: Duration,
    ) -> Result<Receipt, LedgerError>;

    /// Live entities matching all of `filter`, oldest first, at most `limit`.
    async fn query(&self, filter: &[Attribute], limit: usize) -> Result<Vec<Entity>, LedgerError>;

    /// One live entity by id. Expired entities read as `None`.
    async fn get(&self, id: &str) -> Result<Option<Entity>, LedgerError>;
}

struct StoredEntity {
    entity: Entity,
    expires_at_ms: i64,
}

/// In-process ledger. Nothing is persisted.
#[derive(Default)]
pub struct MemoryLedger {
    entities: RwLock<Vec<StoredEntity>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired entities; returns how many went away.
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now().timestamp_millis();
        let mut entities = self.entities.write().await;
        let before = entities.len();
        entities.retain(|s| s.expires_at_ms > now);
        before - entities.len()
    }
}

fn ttl_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn put(
        &self,
        payload: Vec<u8>,
        attributes: Vec<Attribute>,
        ttl: Duration,
    ) -> Result<Receipt, LedgerError> {
        if ttl.is_zero() {
            return Err(LedgerError::Rejected("ttl must be positive".to_string()));
        }
        let id = Uuid::new_v4().to_string();
        let tx_ref = tx_ref_for(&id, &payload);
        let expires_at_ms = Utc::now().timestamp_millis().saturating_add(ttl_millis(ttl));

        let mut entities = self.entities.write().await;
        let now = Utc::now().timestamp_millis();
        entities.retain(|s| s.expires_at_ms > now);
        entities.push(StoredEntity {
            entity: Entity { id: id.clone(), payload, attributes },
            expires_at_ms,
        });

        Ok(Receipt { id, tx_ref })
    }

    async fn query(&self, filter: &[Attribute], limit: usize) -> Result<Vec<Entity>, LedgerError> {
        let now = Utc::now().timestamp_millis();
        let entities = self.entities.read().await;
        Ok(entities
            .iter()
            .filter(|s| s.expires_at_ms > now && matches_filter(&s.entity.attributes, filter))
            .take(limit)
            .map(|s| s.entity.clone())
            .collect())
    }

    async fn get(&self, id: &str) -> Result<Option<Entity>, LedgerError> {
        let now = Utc::now().timestamp_millis();
        let entities = self.entities.read().await;
        Ok(entities
            .iter()
            .find(|s| s.entity.id == id && s.expires_at_ms > now)
            .map(|s| s.entity.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn query_filters_on_every_attribute() {
        let ledger = MemoryLedger::new();
        let day = Duration::from_secs(86_400);
        ledger
            .put(b"a".to_vec(), vec![Attribute::new("type", "x"), Attribute::new("patient", "p1")], day)
            .await
            .unwrap();
        ledger
            .put(b"b".to_vec(), vec![Attribute::new("type", "x"), Attribute::new("patient", "p2")], day)
            .await
            .unwrap();

        let hits = ledger
            .query(&[Attribute::new("type", "x"), Attribute::new("patient", "p2")], 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].payload, b"b");
        assert_eq!(hits[0].attribute("patient"), Some("p2"));

        assert_eq!(ledger.query(&[Attribute::new("type", "x")], 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn expired_entities_are_hidden() {
        let ledger = MemoryLedger::new();
        ledger
            .put(b"short".to_vec(), vec![Attribute::new("k", "v")], Duration::from_millis(1))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(ledger.query(&[Attribute::new("k", "v")], 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn expired_entities_are_dropped_from_memory() {
        let ledger = MemoryLedger::new();
        ledger.put(b"old".to_vec(), vec![], Duration::from_millis(1)).await.unwrap();
        ledger.put(b"older".to_vec(), vec![], Duration::from_millis(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        // A new write sweeps what has expired.
        ledger.put(b"new".to_vec(), vec![], Duration::from_millis(1)).await.unwrap();
        assert_eq!(ledger.entities.read().await.len(), 1);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(ledger.purge_expired().await, 1);
        assert!(ledger.entities.read().await.is_empty());
    }

    #[tokio::test]
    async fn get_returns_live_entities_by_id() {
        let ledger = MemoryLedger::new();
        let kept = ledger.put(b"kept".to_vec(), vec![], Duration::from_secs(60)).await.unwrap();
        let gone = ledger.put(b"gone".to_vec(), vec![], Duration::from_millis(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(ledger.get(&kept.id).await.unwrap().unwrap().payload, b"kept");
        assert!(ledger.get(&gone.id).await.unwrap().is_none());
        assert!(ledger.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn zero_ttl_is_rejected() {
        let ledger = MemoryLedger::new();
        let err = ledger.put(vec![], vec![], Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, LedgerError::Rejected(_)));
    }

    #[test]
    fn receipts_reference_the_payload() {
        assert_ne!(tx_ref_for("id", b"one"), tx_ref_for("id", b"two"));
        assert!(tx_ref_for("id", b"one").starts_with("0x"));
    }
}

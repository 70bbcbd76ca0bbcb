//! SQLite-backed implementation of the core ledger boundary.

use crate::db::{self, Db};
use access_core::ledger::{tx_ref_for, Attribute, Entity, Ledger, LedgerError, Receipt};
use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Clone)]
pub struct SqliteLedger {
    db: Db,
}

impl SqliteLedger {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Remove expired entities; returns how many went away.
    pub async fn purge_expired(&self) -> Result<u64, LedgerError> {
        db::purge_expired(&self.db, Utc::now().timestamp_millis())
            .await
            .map_err(|e| LedgerError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl Ledger for SqliteLedger {
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
        let created_at = Utc::now().timestamp_millis();
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = created_at.saturating_add(ttl_ms);

        db::insert_entity(&self.db, &id, &payload, &attributes, &tx_ref, created_at, expires_at)
            .await
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;

        tracing::debug!(entity_id = %id, attributes = attributes.len(), "entity stored");
        Ok(Receipt { id, tx_ref })
    }

    async fn query(&self, filter: &[Attribute], limit: usize) -> Result<Vec<Entity>, LedgerError> {
        db::query_entities(&self.db, filter, limit as u64, Utc::now().timestamp_millis())
            .await
            .map_err(|e| LedgerError::Unavailable(e.to_string()))
    }

    async fn get(&self, id: &str) -> Result<Option<Entity>, LedgerError> {
        db::get_entity(&self.db, id, Utc::now().timestamp_millis())
            .await
            .map_err(|e| LedgerError::Unavailable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;

    #[tokio::test]
    async fn put_then_query_by_attribute() {
        let ledger = SqliteLedger::new(test_db().await);
        let receipt = ledger
            .put(b"blob".to_vec(), vec![Attribute::new("patient", "0xabc")], Duration::from_secs(60))
            .await
            .unwrap();
        assert!(receipt.tx_ref.starts_with("0x"));

        let hits = ledger.query(&[Attribute::new("patient", "0xabc")], 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, receipt.id);
        assert_eq!(hits[0].attribute("patient"), Some("0xabc"));

        assert!(ledger.query(&[Attribute::new("patient", "0xdef")], 10).await.unwrap().is_empty());

        assert_eq!(ledger.get(&receipt.id).await.unwrap().unwrap().payload, b"blob");
        assert!(ledger.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn zero_ttl_is_rejected() {
        let ledger = SqliteLedger::new(test_db().await);
        let err = ledger.put(vec![1], vec![], Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, LedgerError::Rejected(_)));
    }

    #[tokio::test]
    async fn limit_is_applied() {
        let ledger = SqliteLedger::new(test_db().await);
        for i in 0..5u8 {
            ledger
                .put(vec![i], vec![Attribute::new("type", "medical_result")], Duration::from_secs(60))
                .await
                .unwrap();
        }
        let hits = ledger.query(&[Attribute::new("type", "medical_result")], 3).await.unwrap();
        assert_eq!(hits.len(), 3);
    }
}

//! Root registry standing in for the verifier contract.
//!
//! Mirrors the contract's surface: publish a root, check it, and unlock access by re-running the
//! sorted-pair fold. Successful unlocks record the last access time per `(root, leaf)`.
//!
//! NOTE: There is no owner check here; publishing is gated by the API key at the HTTP layer.

use crate::db::{self, Db};
use crate::errors::ApiError;
use access_core::chain::{AccessOutcome, ChainError, ChainVerifier};
use access_core::merkle::verify;
use access_core::Hash32;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
pub struct RootRecord {
    pub root: String,
    pub publisher: String,
    pub published_at: DateTime<Utc>,
    pub is_active: bool,
}

#[derive(Clone)]
pub struct RootRegistry {
    db: Db,
}

fn unavailable(e: ApiError) -> ChainError {
    ChainError::Unavailable(e.to_string())
}

impl RootRegistry {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn publish_root(&self, root: &Hash32, publisher: &str) -> Result<RootRecord, ApiError> {
        let root_hex = root.to_hex();
        let published_at = db::publish_root(&self.db, &root_hex, publisher).await?;
        tracing::info!(root = %root_hex, %publisher, "RootPublished");
        Ok(RootRecord { root: root_hex, publisher: publisher.to_string(), published_at, is_active: true })
    }

    pub async fn revoke_root(&self, root: &Hash32) -> Result<bool, ApiError> {
        let revoked = db::deactivate_root(&self.db, &root.to_hex()).await?;
        if revoked {
            tracing::info!(root = %root, "RootRevoked");
        }
        Ok(revoked)
    }

    pub async fn get_root(&self, root: &Hash32) -> Result<Option<RootRecord>, ApiError> {
        let root_hex = root.to_hex();
        Ok(db::get_root(&self.db, &root_hex).await?.map(|(publisher, published_at, is_active)| {
            RootRecord { root: root_hex, publisher, published_at, is_active }
        }))
    }

    pub async fn last_access(&self, root: &Hash32, leaf: &Hash32) -> Result<Option<DateTime<Utc>>, ApiError> {
        db::last_access(&self.db, &root.to_hex(), &leaf.to_hex()).await
    }
}

#[async_trait]
impl ChainVerifier for RootRegistry {
    async fn root_exists(&self, root: &Hash32) -> Result<bool, ChainError> {
        let record = self.get_root(root).await.map_err(unavailable)?;
        Ok(record.is_some_and(|r| r.is_active))
    }

    async fn unlock_access(
        &self,
        root: &Hash32,
        leaf: &Hash32,
        proof: &[Hash32],
    ) -> Result<AccessOutcome, ChainError> {
        if !self.root_exists(root).await? {
            return Err(ChainError::Reverted("Root not found".to_string()));
        }

        if !verify(proof, leaf, root) {
            tracing::warn!(root = %root, leaf = %leaf, "AccessDenied");
            return Ok(AccessOutcome::Denied { reason: "Invalid proof".to_string() });
        }

        db::record_access(&self.db, &root.to_hex(), &leaf.to_hex())
            .await
            .map_err(unavailable)?;
        tracing::info!(root = %root, leaf = %leaf, "AccessGranted");
        Ok(AccessOutcome::Granted)
    }
}

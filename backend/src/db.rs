use crate::errors::ApiError;
use access_core::ledger::{Attribute, Entity};
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Row, Sqlite};

pub type Db = Pool<Sqlite>;

pub async fn connect(db_url: &str) -> Result<Db, ApiError> {
    connect_with(db_url, 5).await
}

/// `sqlite::memory:` databases are per-connection, so tests use a single connection.
pub async fn connect_with(db_url: &str, max_connections: u32) -> Result<Db, ApiError> {
    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(db_url)
        .await
        .map_err(|_| ApiError::Internal)
}

pub async fn init_schema(db: &Db) -> Result<(), ApiError> {
    // NOTE: Payloads are opaque token blobs; nothing in here is plaintext.
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS entities (
  id TEXT PRIMARY KEY,
  created_at INTEGER NOT NULL,
  expires_at INTEGER NOT NULL,
  payload BLOB NOT NULL,
  tx_ref TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS entity_attributes (
  entity_id TEXT NOT NULL,
  position INTEGER NOT NULL,
  key TEXT NOT NULL,
  value TEXT NOT NULL,
  PRIMARY KEY(entity_id, position)
);

CREATE INDEX IF NOT EXISTS entity_attributes_kv ON entity_attributes(key, value);

CREATE TABLE IF NOT EXISTS roots (
  root_hex TEXT PRIMARY KEY,
  publisher TEXT NOT NULL,
  published_at TEXT NOT NULL,
  is_active INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS root_access (
  root_hex TEXT NOT NULL,
  leaf_hex TEXT NOT NULL,
  last_access TEXT NOT NULL,
  PRIMARY KEY(root_hex, leaf_hex)
);
"#,
    )
    .execute(db)
    .await
    .map_err(|_| ApiError::Internal)?;

    Ok(())
}

pub async fn insert_entity(
    db: &Db,
    id: &str,
    payload: &[u8],
    attributes: &[Attribute],
    tx_ref: &str,
    created_at_ms: i64,
    expires_at_ms: i64,
) -> Result<(), ApiError> {
    let mut tx = db.begin().await.map_err(|_| ApiError::Internal)?;

    sqlx::query(
        r#"INSERT INTO entities (id, created_at, expires_at, payload, tx_ref)
           VALUES (?, ?, ?, ?, ?)"#,
    )
    .bind(id)
    .bind(created_at_ms)
    .bind(expires_at_ms)
    .bind(payload)
    .bind(tx_ref)
    .execute(&mut *tx)
    .await
    .map_err(|_| ApiError::Internal)?;

    for (position, attr) in attributes.iter().enumerate() {
        sqlx::query(
            r#"INSERT INTO entity_attributes (entity_id, position, key, value)
               VALUES (?, ?, ?, ?)"#,
        )
        .bind(id)
        .bind(position as i64)
        .bind(&attr.key)
        .bind(&attr.value)
        .execute(&mut *tx)
        .await
        .map_err(|_| ApiError::Internal)?;
    }

    tx.commit().await.map_err(|_| ApiError::Internal)?;
    Ok(())
}

async fn entity_attributes(db: &Db, id: &str) -> Result<Vec<Attribute>, ApiError> {
    let rows = sqlx::query(r#"SELECT key, value FROM entity_attributes WHERE entity_id = ? ORDER BY position"#)
        .bind(id)
        .fetch_all(db)
        .await
        .map_err(|_| ApiError::Internal)?;

    Ok(rows
        .into_iter()
        .map(|row| Attribute { key: row.get(0), value: row.get(1) })
        .collect())
}

/// Live entities carrying every `filter` attribute, oldest first.
pub async fn query_entities(
    db: &Db,
    filter: &[Attribute],
    limit: u64,
    now_ms: i64,
) -> Result<Vec<Entity>, ApiError> {
    let mut sql = String::from("SELECT e.id, e.payload FROM entities e WHERE e.expires_at > ?");
    for _ in filter {
        sql.push_str(
            " AND EXISTS (SELECT 1 FROM entity_attributes a WHERE a.entity_id = e.id AND a.key = ? AND a.value = ?)",
        );
    }
    sql.push_str(" ORDER BY e.created_at, e.rowid LIMIT ?");

    let mut query = sqlx::query(&sql).bind(now_ms);
    for attr in filter {
        query = query.bind(attr.key.clone()).bind(attr.value.clone());
    }
    let rows = query
        .bind(limit as i64)
        .fetch_all(db)
        .await
        .map_err(|_| ApiError::Internal)?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let id: String = row.get(0);
        let payload: Vec<u8> = row.get(1);
        let attributes = entity_attributes(db, &id).await?;
        out.push(Entity { id, payload, attributes });
    }
    Ok(out)
}

pub async fn get_entity(db: &Db, id: &str, now_ms: i64) -> Result<Option<Entity>, ApiError> {
    let row = sqlx::query(r#"SELECT payload FROM entities WHERE id = ? AND expires_at > ?"#)
        .bind(id)
        .bind(now_ms)
        .fetch_optional(db)
        .await
        .map_err(|_| ApiError::Internal)?;

    let Some(row) = row else { return Ok(None); };
    let payload: Vec<u8> = row.get(0);
    let attributes = entity_attributes(db, id).await?;
    Ok(Some(Entity { id: id.to_string(), payload, attributes }))
}

/// Drop expired entities. Returns how many were removed.
pub async fn purge_expired(db: &Db, now_ms: i64) -> Result<u64, ApiError> {
    let mut tx = db.begin().await.map_err(|_| ApiError::Internal)?;

    sqlx::query(
        r#"DELETE FROM entity_attributes
           WHERE entity_id IN (SELECT id FROM entities WHERE expires_at <= ?)"#,
    )
    .bind(now_ms)
    .execute(&mut *tx)
    .await
    .map_err(|_| ApiError::Internal)?;

    let res = sqlx::query(r#"DELETE FROM entities WHERE expires_at <= ?"#)
        .bind(now_ms)
        .execute(&mut *tx)
        .await
        .map_err(|_| ApiError::Internal)?;

    tx.commit().await.map_err(|_| ApiError::Internal)?;
    Ok(res.rows_affected())
}

pub async fn publish_root(db: &Db, root_hex: &str, publisher: &str) -> Result<DateTime<Utc>, ApiError> {
    let published_at = Utc::now();

    sqlx::query(
        r#"INSERT OR REPLACE INTO roots (root_hex, publisher, published_at, is_active)
           VALUES (?, ?, ?, 1)"#,
    )
    .bind(root_hex)
    .bind(publisher)
    .bind(published_at.to_rfc3339())
    .execute(db)
    .await
    .map_err(|_| ApiError::Internal)?;

    Ok(published_at)
}

pub async fn deactivate_root(db: &Db, root_hex: &str) -> Result<bool, ApiError> {
    let res = sqlx::query(r#"UPDATE roots SET is_active = 0 WHERE root_hex = ?"#)
        .bind(root_hex)
        .execute(db)
        .await
        .map_err(|_| ApiError::Internal)?;
    Ok(res.rows_affected() > 0)
}

pub async fn get_root(db: &Db, root_hex: &str) -> Result<Option<(String, DateTime<Utc>, bool)>, ApiError> {
    let row = sqlx::query(r#"SELECT publisher, published_at, is_active FROM roots WHERE root_hex = ?"#)
        .bind(root_hex)
        .fetch_optional(db)
        .await
        .map_err(|_| ApiError::Internal)?;

    let Some(row) = row else { return Ok(None); };

    let publisher: String = row.get(0);
    let published_at: String = row.get(1);
    let published_at = DateTime::parse_from_rfc3339(&published_at)
        .map_err(|_| ApiError::Internal)?
        .with_timezone(&Utc);
    let is_active: i64 = row.get(2);

    Ok(Some((publisher, published_at, is_active == 1)))
}

pub async fn record_access(db: &Db, root_hex: &str, leaf_hex: &str) -> Result<(), ApiError> {
    sqlx::query(
        r#"INSERT OR REPLACE INTO root_access (root_hex, leaf_hex, last_access)
           VALUES (?, ?, ?)"#,
    )
    .bind(root_hex)
    .bind(leaf_hex)
    .bind(Utc::now().to_rfc3339())
    .execute(db)
    .await
    .map_err(|_| ApiError::Internal)?;
    Ok(())
}

pub async fn last_access(db: &Db, root_hex: &str, leaf_hex: &str) -> Result<Option<DateTime<Utc>>, ApiError> {
    let row = sqlx::query(r#"SELECT last_access FROM root_access WHERE root_hex = ? AND leaf_hex = ?"#)
        .bind(root_hex)
        .bind(leaf_hex)
        .fetch_optional(db)
        .await
        .map_err(|_| ApiError::Internal)?;

    let Some(row) = row else { return Ok(None); };
    let ts: String = row.get(0);
    let ts = DateTime::parse_from_rfc3339(&ts)
        .map_err(|_| ApiError::Internal)?
        .with_timezone(&Utc);
    Ok(Some(ts))
}

#[cfg(test)]
pub(crate) async fn test_db() -> Db {
    let db = connect_with("sqlite::memory:", 1).await.unwrap();
    init_schema(&db).await.unwrap();
    db
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn entities_are_filtered_and_expire() {
        let db = test_db().await;
        let attrs_a = vec![Attribute::new("type", "medical_result"), Attribute::new("patient", "0xaa")];
        let attrs_b = vec![Attribute::new("type", "medical_result"), Attribute::new("patient", "0xbb")];

        insert_entity(&db, "a", b"payload-a", &attrs_a, "0x01", 1, 1_000).await.unwrap();
        insert_entity(&db, "b", b"payload-b", &attrs_b, "0x02", 2, 5_000).await.unwrap();

        let hits = query_entities(&db, &[Attribute::new("patient", "0xbb")], 10, 100).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].payload, b"payload-b");
        assert_eq!(hits[0].attributes, attrs_b);

        let all = query_entities(&db, &[Attribute::new("type", "medical_result")], 10, 100).await.unwrap();
        assert_eq!(all.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);

        // `a` expired at 1_000.
        let later = query_entities(&db, &[Attribute::new("type", "medical_result")], 10, 2_000).await.unwrap();
        assert_eq!(later.len(), 1);
        assert_eq!(later[0].id, "b");

        assert_eq!(get_entity(&db, "b", 100).await.unwrap().unwrap().attributes, attrs_b);
        assert!(get_entity(&db, "a", 2_000).await.unwrap().is_none());

        assert_eq!(purge_expired(&db, 2_000).await.unwrap(), 1);
        assert!(query_entities(&db, &[], 10, 0).await.unwrap().iter().all(|e| e.id == "b"));
    }

    #[tokio::test]
    async fn roots_can_be_published_and_deactivated() {
        let db = test_db().await;
        assert!(get_root(&db, "ab").await.unwrap().is_none());

        publish_root(&db, "ab", "doctor").await.unwrap();
        let (publisher, _, active) = get_root(&db, "ab").await.unwrap().unwrap();
        assert_eq!(publisher, "doctor");
        assert!(active);

        assert!(deactivate_root(&db, "ab").await.unwrap());
        assert!(!get_root(&db, "ab").await.unwrap().unwrap().2);
        assert!(!deactivate_root(&db, "missing").await.unwrap());
    }

    #[tokio::test]
    async fn access_is_recorded_per_leaf() {
        let db = test_db().await;
        assert!(last_access(&db, "r", "l").await.unwrap().is_none());
        record_access(&db, "r", "l").await.unwrap();
        assert!(last_access(&db, "r", "l").await.unwrap().is_some());
        assert!(last_access(&db, "r", "other").await.unwrap().is_none());
    }
}

use anyhow::Result;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use crate::delivery::queue::{EventPayload, PayloadKind};

/// Durable local persistence for events that could not be delivered at all.
///
/// Records are appended when the delivery channel is unreachable and removed
/// one by one during reconciliation, each only after its own replay was
/// acknowledged.
#[derive(Clone)]
pub struct FallbackStore {
    pool: SqlitePool,
}

/// One persisted payload plus the row id reconciliation removes it by.
#[derive(Debug, Clone)]
pub struct FallbackRecord {
    pub id: i64,
    pub payload: EventPayload,
}

impl FallbackStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn persist(&self, payload: &EventPayload) -> Result<()> {
        let kind = match payload.kind() {
            PayloadKind::Message => "message",
            PayloadKind::Warning => "warning",
        };
        let body = serde_json::to_string(payload)?;
        sqlx::query(r#"INSERT INTO fallback_events (kind, payload) VALUES (?1, ?2)"#)
            .bind(kind)
            .bind(body)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// All pending records in insertion order. Rows whose payload no longer
    /// parses are skipped with a warning rather than wedging reconciliation.
    pub async fn list(&self) -> Result<Vec<FallbackRecord>> {
        let rows = sqlx::query(r#"SELECT id, payload FROM fallback_events ORDER BY id ASC"#)
            .fetch_all(&self.pool)
            .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.try_get("id")?;
            let body: String = row.try_get("payload")?;
            match serde_json::from_str::<EventPayload>(&body) {
                Ok(payload) => records.push(FallbackRecord { id, payload }),
                Err(err) => {
                    tracing::warn!(
                        target: "fallback",
                        id,
                        error = %err,
                        "skipping unparseable fallback record"
                    );
                }
            }
        }
        Ok(records)
    }

    pub async fn remove(&self, id: i64) -> Result<bool> {
        let affected = sqlx::query(r#"DELETE FROM fallback_events WHERE id = ?1"#)
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(affected > 0)
    }

    pub async fn count(&self) -> Result<i64> {
        let row = sqlx::query(r#"SELECT COUNT(*) AS n FROM fallback_events"#)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ConversationMessage, Sender};

    async fn store() -> (tempfile::TempDir, FallbackStore) {
        let dir = tempfile::tempdir().unwrap();
        let pool = crate::db::init_pool(&dir.path().join("fallback.db"))
            .await
            .unwrap();
        (dir, FallbackStore::new(pool))
    }

    fn payload(content: &str) -> EventPayload {
        EventPayload::Message(ConversationMessage {
            bot_id: "div#chat..-0".into(),
            sender: Sender::User,
            content: content.into(),
            timestamp: chrono::Utc::now(),
            url: "https://bank.example/".into(),
            hostname: Some("bank.example".into()),
            risks: Vec::new(),
            risk_level: None,
        })
    }

    #[tokio::test]
    async fn persisted_records_survive_and_round_trip() {
        let (_dir, store) = store().await;
        store.persist(&payload("first")).await.unwrap();
        store.persist(&payload("second")).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 2);
        let records = store.list().await.unwrap();
        assert_eq!(records.len(), 2);
        match &records[0].payload {
            EventPayload::Message(m) => assert_eq!(m.content, "first"),
            _ => panic!("wrong payload kind"),
        }
    }

    #[tokio::test]
    async fn remove_deletes_exactly_one_record() {
        let (_dir, store) = store().await;
        store.persist(&payload("keep")).await.unwrap();
        store.persist(&payload("drop")).await.unwrap();

        let records = store.list().await.unwrap();
        assert!(store.remove(records[1].id).await.unwrap());
        assert!(!store.remove(records[1].id).await.unwrap());

        let left = store.list().await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, records[0].id);
    }
}

//! Database operations for chat records
//!
//! Raw `sqlx::query` calls against the `chat_records` table created by the
//! migrations in `migrations/`.
//!
//! Timestamps are strictly increasing per conversation in commit order:
//! `append` serializes writers of a conversation on a transaction-scoped
//! advisory lock and stamps each row past the newest committed one.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use super::store::RecordStore;
use crate::backend::error::RealtimeError;
use crate::backend::realtime::ChannelRouter;
use crate::shared::{
    ChatRecord, ConversationId, ConversationIdentity, ConversationKind, DraftRecord, Watermark,
};

/// PostgreSQL-backed [`RecordStore`]
#[derive(Debug, Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Emit a push notification from every insert, inside the inserting
    /// transaction
    pub async fn install_notify_trigger(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DROP TRIGGER IF EXISTS chat_records_notify ON chat_records")
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r#"
            CREATE TRIGGER chat_records_notify
            AFTER INSERT ON chat_records
            FOR EACH ROW EXECUTE FUNCTION chat_records_notify()
            "#,
        )
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::info!("[Store] Installed chat_records_notify trigger");
        Ok(())
    }

    /// Stop emitting push notifications from inserts
    pub async fn remove_notify_trigger(&self) -> Result<(), sqlx::Error> {
        sqlx::query("DROP TRIGGER IF EXISTS chat_records_notify ON chat_records")
            .execute(&self.pool)
            .await?;
        tracing::info!("[Store] Removed chat_records_notify trigger");
        Ok(())
    }
}

fn record_from_row(row: &PgRow) -> Result<ChatRecord, sqlx::Error> {
    let kind: String = row.try_get("conversation_kind")?;
    let kind = kind
        .parse::<ConversationKind>()
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
    let id: String = row.try_get("conversation_id")?;

    Ok(ChatRecord {
        id: row.try_get("id")?,
        conversation: ConversationIdentity::new(kind, ConversationId::new(id)),
        sender: row.try_get("sender")?,
        body: row.try_get("body")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn append(&self, draft: DraftRecord) -> Result<ChatRecord, RealtimeError> {
        let channel = ChannelRouter::channel_for(&draft.conversation)?;

        let mut tx = self.pool.begin().await?;

        // Held until commit: one writer per conversation at a time.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1::text || ':' || $2::text))")
            .bind(draft.conversation.kind.as_str())
            .bind(draft.conversation.id.as_str())
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query(
            r#"
            INSERT INTO chat_records (id, conversation_kind, conversation_id, channel_name, sender, body, created_at)
            SELECT $1::uuid, $2::text, $3::text, $4::text, $5::text, $6::text,
                   GREATEST(clock_timestamp(), MAX(created_at) + interval '1 microsecond')
            FROM chat_records
            WHERE conversation_kind = $2 AND conversation_id = $3
            RETURNING created_at
            "#,
        )
        .bind(draft.id)
        .bind(draft.conversation.kind.as_str())
        .bind(draft.conversation.id.as_str())
        .bind(channel.as_str())
        .bind(&draft.sender)
        .bind(&draft.body)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        let created_at = row.try_get("created_at")?;
        tracing::debug!("[Store] Appended {} to {}", draft.id, draft.conversation);
        Ok(draft.into_record(created_at))
    }

    async fn records_after(
        &self,
        conversation: &ConversationIdentity,
        watermark: Watermark,
    ) -> Result<Vec<ChatRecord>, RealtimeError> {
        let rows = sqlx::query(
            r#"
            SELECT id, conversation_kind, conversation_id, sender, body, created_at
            FROM chat_records
            WHERE conversation_kind = $1
              AND conversation_id = $2
              AND ($3::timestamptz IS NULL OR created_at > $3)
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(conversation.kind.as_str())
        .bind(conversation.id.as_str())
        .bind(watermark.timestamp())
        .fetch_all(&self.pool)
        .await?;

        let records = rows.iter().map(record_from_row).collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    async fn latest(
        &self,
        conversation: &ConversationIdentity,
        limit: i64,
    ) -> Result<Vec<ChatRecord>, RealtimeError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM (
                SELECT id, conversation_kind, conversation_id, sender, body, created_at
                FROM chat_records
                WHERE conversation_kind = $1 AND conversation_id = $2
                ORDER BY created_at DESC, id DESC
                LIMIT $3
            ) newest
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(conversation.kind.as_str())
        .bind(conversation.id.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let records = rows.iter().map(record_from_row).collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

//! # Message Repository
//!
//! Database operations for direct messages: the persist side of the
//! router's deliver-vs-queue decision, delivery/read bookkeeping, and the
//! conversation queries behind the REST surface.
//!
//! ## Timestamp Discipline
//!
//! The router owns `message_id` and `created_at`; this layer writes them
//! verbatim so the ack a sender already received always matches the row.
//! `delivered_at` and `read_at` only ever move from NULL to a value.

use chrono::{DateTime, Utc};
use shared::errors::ApiError;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{ConversationSummary, DirectMessage, DirectMessageWithSender, NewDirectMessage};

/// Repository for direct-message database operations.
#[derive(Debug, Clone)]
pub struct MessageRepository {
    pool: PgPool,
}

impl MessageRepository {
    /// Create a new repository instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Inserts a direct message.
    ///
    /// The online branch passes `delivered_at = Some(created_at)`; the
    /// offline branch passes `None` and lets replay set it later.
    pub async fn insert_direct(&self, msg: NewDirectMessage) -> Result<DirectMessage, ApiError> {
        let message = sqlx::query_as::<_, DirectMessage>(
            r#"
            INSERT INTO direct_messages (
                message_id, sender_id, recipient_id, content,
                message_type, created_at, delivered_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(msg.message_id)
        .bind(msg.sender_id)
        .bind(msg.recipient_id)
        .bind(&msg.content)
        .bind(&msg.message_type)
        .bind(msg.created_at)
        .bind(msg.delivered_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(message)
    }

    /// Marks a batch of messages delivered where still undelivered.
    ///
    /// One statement for the whole replay batch. Rows that already have
    /// `delivered_at` are left untouched so the timestamp never regresses.
    pub async fn mark_delivered(
        &self,
        message_ids: &[Uuid],
        delivered_at: DateTime<Utc>,
    ) -> Result<u64, ApiError> {
        if message_ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            r#"
            UPDATE direct_messages
            SET delivered_at = $2
            WHERE message_id = ANY($1) AND delivered_at IS NULL
            "#,
        )
        .bind(message_ids)
        .bind(delivered_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Marks a message read, if the caller is the recipient and it is not
    /// already read.
    ///
    /// Returns the updated row only when *this call* set `read_at`; a
    /// second identical call returns `None`, which is what keeps repeat
    /// read receipts from re-notifying the sender.
    pub async fn mark_read(
        &self,
        message_id: Uuid,
        recipient_id: Uuid,
        read_at: DateTime<Utc>,
    ) -> Result<Option<DirectMessage>, ApiError> {
        let message = sqlx::query_as::<_, DirectMessage>(
            r#"
            UPDATE direct_messages
            SET read_at = $3,
                delivered_at = COALESCE(delivered_at, $3)
            WHERE message_id = $1 AND recipient_id = $2 AND read_at IS NULL
            RETURNING *
            "#,
        )
        .bind(message_id)
        .bind(recipient_id)
        .bind(read_at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(message)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Finds a single direct message by id.
    pub async fn find_direct_by_id(
        &self,
        message_id: Uuid,
    ) -> Result<Option<DirectMessage>, ApiError> {
        let message =
            sqlx::query_as::<_, DirectMessage>("SELECT * FROM direct_messages WHERE message_id = $1")
                .bind(message_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(message)
    }

    /// Fetches a batch of direct messages by id, with sender usernames.
    ///
    /// One query for the whole offline-replay batch. Order is unspecified;
    /// the caller re-sorts by its queue order.
    pub async fn find_direct_by_ids(
        &self,
        message_ids: &[Uuid],
    ) -> Result<Vec<DirectMessageWithSender>, ApiError> {
        if message_ids.is_empty() {
            return Ok(Vec::new());
        }

        let messages = sqlx::query_as::<_, DirectMessageWithSender>(
            r#"
            SELECT m.message_id, m.sender_id, u.username AS sender_username,
                   m.recipient_id, m.content, m.message_type,
                   m.created_at, m.delivered_at, m.read_at
            FROM direct_messages m
            INNER JOIN users u ON u.user_id = m.sender_id
            WHERE m.message_id = ANY($1)
            "#,
        )
        .bind(message_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(messages)
    }

    /// One page of the conversation between two users, newest first.
    pub async fn conversation_page(
        &self,
        user_id: Uuid,
        peer_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<DirectMessageWithSender>, ApiError> {
        let messages = sqlx::query_as::<_, DirectMessageWithSender>(
            r#"
            SELECT m.message_id, m.sender_id, u.username AS sender_username,
                   m.recipient_id, m.content, m.message_type,
                   m.created_at, m.delivered_at, m.read_at
            FROM direct_messages m
            INNER JOIN users u ON u.user_id = m.sender_id
            WHERE (m.sender_id = $1 AND m.recipient_id = $2)
               OR (m.sender_id = $2 AND m.recipient_id = $1)
            ORDER BY m.created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(user_id)
        .bind(peer_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(messages)
    }

    /// Total message count between two users, for pagination.
    pub async fn conversation_count(&self, user_id: Uuid, peer_id: Uuid) -> Result<i64, ApiError> {
        let count: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM direct_messages
            WHERE (sender_id = $1 AND recipient_id = $2)
               OR (sender_id = $2 AND recipient_id = $1)
            "#,
        )
        .bind(user_id)
        .bind(peer_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.0)
    }

    /// One row per conversation peer: latest message preview plus the
    /// caller's unread count (`recipient = me AND read_at IS NULL`).
    pub async fn conversation_summaries(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<ConversationSummary>, ApiError> {
        let summaries = sqlx::query_as::<_, ConversationSummary>(
            r#"
            SELECT peer.user_id AS peer_id,
                   peer.username AS peer_username,
                   last.message_id AS last_message_id,
                   last.content AS last_content,
                   last.created_at AS last_message_at,
                   COALESCE(unread.count, 0) AS unread_count
            FROM (
                SELECT DISTINCT CASE WHEN sender_id = $1 THEN recipient_id ELSE sender_id END AS peer_id
                FROM direct_messages
                WHERE sender_id = $1 OR recipient_id = $1
            ) peers
            INNER JOIN users peer ON peer.user_id = peers.peer_id
            LEFT JOIN LATERAL (
                SELECT message_id, content, created_at
                FROM direct_messages
                WHERE (sender_id = $1 AND recipient_id = peers.peer_id)
                   OR (sender_id = peers.peer_id AND recipient_id = $1)
                ORDER BY created_at DESC
                LIMIT 1
            ) last ON true
            LEFT JOIN LATERAL (
                SELECT COUNT(*) AS count
                FROM direct_messages
                WHERE sender_id = peers.peer_id AND recipient_id = $1 AND read_at IS NULL
            ) unread ON true
            ORDER BY last.created_at DESC NULLS LAST
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(summaries)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    // Repository tests require a real database connection and run as
    // ignored integration tests against a disposable Postgres instance.
}

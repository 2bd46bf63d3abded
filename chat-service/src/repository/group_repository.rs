//! # Group Repository
//!
//! Database operations for groups, membership, group messages, and
//! per-recipient read state.
//!
//! Group messages are stored once regardless of member count; fan-out and
//! offline queueing work from the member list at send time. Read state
//! lives in `group_message_reads`, keyed (message_id, user_id).

use chrono::{DateTime, Utc};
use shared::errors::ApiError;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{Group, GroupMember, GroupMessage, NewGroupMessage};

/// Repository for group database operations.
#[derive(Debug, Clone)]
pub struct GroupRepository {
    pool: PgPool,
}

impl GroupRepository {
    /// Create a new repository instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Groups & Membership
    // =========================================================================

    /// Creates a group and its creator's admin membership in one
    /// transaction: a group can never exist without its creator as a
    /// member.
    pub async fn create_group(&self, name: &str, creator_id: Uuid) -> Result<Group, ApiError> {
        let mut tx = self.pool.begin().await?;

        let group = sqlx::query_as::<_, Group>(
            r#"
            INSERT INTO groups (name, creator_id)
            VALUES ($1, $2)
            RETURNING *
            "#,
        )
        .bind(name)
        .bind(creator_id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO group_members (group_id, user_id, role)
            VALUES ($1, $2, 'admin')
            "#,
        )
        .bind(group.group_id)
        .bind(creator_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(group)
    }

    /// Adds a member to a group (idempotent: re-adding keeps the existing
    /// role and joined_at).
    pub async fn add_member(
        &self,
        group_id: Uuid,
        user_id: Uuid,
        role: &str,
    ) -> Result<GroupMember, ApiError> {
        let member = sqlx::query_as::<_, GroupMember>(
            r#"
            INSERT INTO group_members (group_id, user_id, role)
            VALUES ($1, $2, $3)
            ON CONFLICT (group_id, user_id) DO UPDATE SET role = group_members.role
            RETURNING *
            "#,
        )
        .bind(group_id)
        .bind(user_id)
        .bind(role)
        .fetch_one(&self.pool)
        .await?;

        Ok(member)
    }

    /// Checks if a user is a current member of a group.
    pub async fn is_member(&self, group_id: Uuid, user_id: Uuid) -> Result<bool, ApiError> {
        let exists: (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM group_members
                WHERE group_id = $1 AND user_id = $2
            )
            "#,
        )
        .bind(group_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists.0)
    }

    /// Checks if a user is an admin of a group.
    pub async fn is_admin(&self, group_id: Uuid, user_id: Uuid) -> Result<bool, ApiError> {
        let exists: (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM group_members
                WHERE group_id = $1 AND user_id = $2 AND role = 'admin'
            )
            "#,
        )
        .bind(group_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists.0)
    }

    /// All member ids of a group.
    pub async fn member_ids(&self, group_id: Uuid) -> Result<Vec<Uuid>, ApiError> {
        let ids: Vec<(Uuid,)> =
            sqlx::query_as("SELECT user_id FROM group_members WHERE group_id = $1")
                .bind(group_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    /// Finds a group by id.
    pub async fn find_group(&self, group_id: Uuid) -> Result<Option<Group>, ApiError> {
        let group = sqlx::query_as::<_, Group>("SELECT * FROM groups WHERE group_id = $1")
            .bind(group_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(group)
    }

    /// All groups the user belongs to, most recently created first.
    pub async fn groups_for_user(&self, user_id: Uuid) -> Result<Vec<Group>, ApiError> {
        let groups = sqlx::query_as::<_, Group>(
            r#"
            SELECT g.*
            FROM groups g
            INNER JOIN group_members gm ON gm.group_id = g.group_id
            WHERE gm.user_id = $1
            ORDER BY g.created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(groups)
    }

    // =========================================================================
    // Group Messages
    // =========================================================================

    /// Inserts a group message (router-generated id and timestamp).
    pub async fn insert_message(&self, msg: NewGroupMessage) -> Result<GroupMessage, ApiError> {
        let message = sqlx::query_as::<_, GroupMessage>(
            r#"
            INSERT INTO group_messages (
                message_id, group_id, sender_id, content, message_type, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(msg.message_id)
        .bind(msg.group_id)
        .bind(msg.sender_id)
        .bind(&msg.content)
        .bind(&msg.message_type)
        .bind(msg.created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(message)
    }

    /// Finds a single group message by id.
    pub async fn find_message(&self, message_id: Uuid) -> Result<Option<GroupMessage>, ApiError> {
        let message =
            sqlx::query_as::<_, GroupMessage>("SELECT * FROM group_messages WHERE message_id = $1")
                .bind(message_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(message)
    }

    /// Fetches a batch of group messages by id, for offline replay.
    ///
    /// Order is unspecified; the caller re-sorts by its queue order.
    pub async fn find_messages_by_ids(
        &self,
        message_ids: &[Uuid],
    ) -> Result<Vec<GroupMessage>, ApiError> {
        if message_ids.is_empty() {
            return Ok(Vec::new());
        }

        let messages = sqlx::query_as::<_, GroupMessage>(
            "SELECT * FROM group_messages WHERE message_id = ANY($1)",
        )
        .bind(message_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(messages)
    }

    /// One page of a group's messages, newest first.
    pub async fn messages_page(
        &self,
        group_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<GroupMessage>, ApiError> {
        let messages = sqlx::query_as::<_, GroupMessage>(
            r#"
            SELECT * FROM group_messages
            WHERE group_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(group_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(messages)
    }

    /// Total message count in a group, for pagination.
    pub async fn messages_count(&self, group_id: Uuid) -> Result<i64, ApiError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM group_messages WHERE group_id = $1")
            .bind(group_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count.0)
    }

    // =========================================================================
    // Read State
    // =========================================================================

    /// Records that a user has read a group message.
    ///
    /// Returns `true` only on the first read; repeats hit the conflict arm
    /// and report `false`, so the sender is notified exactly once.
    pub async fn upsert_read(
        &self,
        message_id: Uuid,
        user_id: Uuid,
        read_at: DateTime<Utc>,
    ) -> Result<bool, ApiError> {
        let result = sqlx::query(
            r#"
            INSERT INTO group_message_reads (message_id, user_id, read_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (message_id, user_id) DO NOTHING
            "#,
        )
        .bind(message_id)
        .bind(user_id)
        .bind(read_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
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

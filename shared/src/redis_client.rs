//! # Redis Client: Presence, Offline Queues, Reset Tokens
//!
//! High-level Redis client for the chat cache layer.
//!
//! ## Why Redis?
//!
//! Redis is the fast, TTL-bounded side of the system; the durable log
//! stays in Postgres. The cache holds exactly three kinds of state:
//!
//! | Use Case | Description |
//! |----------|-------------|
//! | **Presence** | O(1) "is this user online" check for the router |
//! | **Offline queues** | Per-user list of undelivered message references |
//! | **Reset tokens** | Single-use password-reset tokens with TTL |
//!
//! ## Connection Management
//!
//! We use a `ConnectionManager` which automatically reconnects on failure.
//! This is more resilient than a simple connection for long-running
//! services. Every operation is additionally bounded by the configured
//! cache timeout (default 1 s) so a stalled Redis cannot block a socket
//! handler.
//!
//! ## Key Naming Convention
//!
//! | Pattern | Example | Purpose |
//! |---------|---------|---------|
//! | `user:online:{user_id}` | `user:online:550e...` | Presence flag, TTL = heartbeat TTL |
//! | `user:offline:{user_id}` | `user:offline:550e...` | Offline queue (list), TTL 7 days |
//! | `reset:{sha256}` | `reset:ab12...` | Password-reset token → user id, TTL 1 h |
//!
//! ## Important Invariants
//!
//! - The offline queue stores *references* (`{message_id, kind}`), never
//!   content; the canonical message lives in the log.
//! - Draining the queue is atomic (MULTI LRANGE+DEL) so a concurrent
//!   enqueue cannot be lost or double-delivered from the queue.
//! - Reset tokens are consumed with GETDEL: first redeemer wins.

use crate::config::RedisConfig;
use crate::errors::ApiError;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

// =============================================================================
// Offline Queue Records
// =============================================================================

/// Which log table an offline-queue entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfflineKind {
    /// A row in `direct_messages`
    Direct,
    /// A row in `group_messages`
    Group,
}

/// One entry in a user's offline queue.
///
/// Content is deliberately absent: the queue is a reference list and the
/// log is canonical. Replay resolves these ids back to full messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineEntry {
    pub message_id: Uuid,
    pub kind: OfflineKind,
}

// =============================================================================
// Key Construction
// =============================================================================

fn presence_key(user_id: Uuid) -> String {
    format!("user:online:{}", user_id)
}

fn offline_key(user_id: Uuid) -> String {
    format!("user:offline:{}", user_id)
}

fn reset_key(token_hash: &str) -> String {
    format!("reset:{}", token_hash)
}

// =============================================================================
// Redis Client
// =============================================================================

/// Async Redis client with automatic reconnection.
///
/// Wraps a `ConnectionManager`; safe to clone and share across tasks
/// (cloning is an Arc clone).
#[derive(Clone)]
pub struct RedisClient {
    /// Connection manager for automatic reconnection
    conn: ConnectionManager,
    /// Upper bound on any single cache operation
    op_timeout: Duration,
}

impl RedisClient {
    /// Creates a new Redis client and establishes the connection.
    ///
    /// ## Errors
    ///
    /// Returns `ApiError::RedisError` if the URL is invalid, the server is
    /// unreachable, or authentication fails.
    pub async fn new(config: &RedisConfig) -> Result<Self, ApiError> {
        info!(url = %config.url, "Connecting to Redis");

        let client = redis::Client::open(config.url.as_str()).map_err(ApiError::RedisError)?;

        let conn = ConnectionManager::new(client)
            .await
            .map_err(ApiError::RedisError)?;

        info!("Redis connection established");

        Ok(Self {
            conn,
            op_timeout: Duration::from_secs(config.op_timeout_seconds),
        })
    }

    /// Runs a cache operation under the configured timeout.
    async fn bounded<T, F>(&self, fut: F) -> Result<T, ApiError>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result.map_err(ApiError::RedisError),
            Err(_) => Err(ApiError::RedisError(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "cache operation timed out",
            )))),
        }
    }

    // =========================================================================
    // Health
    // =========================================================================

    /// Health check - verifies Redis is responding.
    pub async fn ping(&self) -> Result<(), ApiError> {
        let mut conn = self.conn.clone();
        self.bounded(redis::cmd("PING").query_async::<String>(&mut conn))
            .await?;
        Ok(())
    }

    // =========================================================================
    // Presence
    // =========================================================================
    // The presence key is the derived, TTL-bounded view of the connection
    // registry. Heartbeats refresh it; absence of heartbeats lets it lapse.

    /// Marks a user online for `ttl` (the heartbeat TTL).
    pub async fn mark_online(&self, user_id: Uuid, ttl: Duration) -> Result<(), ApiError> {
        let mut conn = self.conn.clone();
        self.bounded(conn.set_ex::<_, _, ()>(presence_key(user_id), "1", ttl.as_secs()))
            .await
    }

    /// Clears a user's presence key. Called when the last socket unregisters.
    pub async fn clear_online(&self, user_id: Uuid) -> Result<(), ApiError> {
        let mut conn = self.conn.clone();
        self.bounded(conn.del::<_, ()>(presence_key(user_id))).await
    }

    /// O(1) presence check for a single user.
    pub async fn is_online(&self, user_id: Uuid) -> Result<bool, ApiError> {
        let mut conn = self.conn.clone();
        self.bounded(conn.exists(presence_key(user_id))).await
    }

    /// Partitions a set of users into (online, offline) with a single MGET.
    ///
    /// Used by the group fan-out to avoid one round trip per member.
    pub async fn online_partition(
        &self,
        user_ids: &[Uuid],
    ) -> Result<(Vec<Uuid>, Vec<Uuid>), ApiError> {
        if user_ids.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }

        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("MGET");
        for id in user_ids {
            cmd.arg(presence_key(*id));
        }

        let flags: Vec<Option<String>> = self.bounded(cmd.query_async(&mut conn)).await?;

        let mut online = Vec::new();
        let mut offline = Vec::new();
        for (id, flag) in user_ids.iter().zip(flags) {
            if flag.is_some() {
                online.push(*id);
            } else {
                offline.push(*id);
            }
        }

        Ok((online, offline))
    }

    // =========================================================================
    // Offline Queues
    // =========================================================================

    /// Appends an entry to a user's offline queue and refreshes its TTL.
    ///
    /// RPUSH + EXPIRE run in one MULTI so the queue can never exist
    /// without an expiry.
    pub async fn queue_offline(
        &self,
        user_id: Uuid,
        entry: &OfflineEntry,
        ttl: Duration,
    ) -> Result<(), ApiError> {
        let serialized = serde_json::to_string(entry).map_err(|e| ApiError::Internal {
            message: e.to_string(),
        })?;

        let key = offline_key(user_id);
        let mut conn = self.conn.clone();

        let mut pipe = redis::pipe();
        pipe.atomic()
            .rpush(&key, serialized)
            .ignore()
            .expire(&key, ttl.as_secs() as i64)
            .ignore();

        self.bounded(pipe.query_async::<()>(&mut conn)).await
    }

    /// Atomically snapshots and clears a user's offline queue.
    ///
    /// LRANGE + DEL run in one MULTI: entries pushed after the snapshot
    /// land in a fresh queue rather than being lost. Order is preserved
    /// (oldest first). Entries that fail to parse are dropped with a
    /// warning rather than poisoning the whole replay.
    pub async fn drain_offline(&self, user_id: Uuid) -> Result<Vec<OfflineEntry>, ApiError> {
        let key = offline_key(user_id);
        let mut conn = self.conn.clone();

        let mut pipe = redis::pipe();
        pipe.atomic().lrange(&key, 0, -1).del(&key).ignore();

        let (raw,): (Vec<String>,) = self.bounded(pipe.query_async(&mut conn)).await?;

        let mut entries = Vec::with_capacity(raw.len());
        for item in raw {
            match serde_json::from_str::<OfflineEntry>(&item) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!(user_id = %user_id, error = %e, "Dropping unparseable offline-queue entry");
                }
            }
        }

        Ok(entries)
    }

    // =========================================================================
    // Password Reset Tokens
    // =========================================================================
    // Reset tokens live only in the cache, keyed by the SHA-256 of the
    // opaque token. TTL bounds their life; GETDEL makes them single-use.

    /// Stores a reset token hash → user id mapping with TTL.
    pub async fn store_reset_token(
        &self,
        token_hash: &str,
        user_id: Uuid,
        ttl: Duration,
    ) -> Result<(), ApiError> {
        let mut conn = self.conn.clone();
        self.bounded(conn.set_ex::<_, _, ()>(
            reset_key(token_hash),
            user_id.to_string(),
            ttl.as_secs(),
        ))
        .await
    }

    /// Consumes a reset token: returns the user id and deletes the key in
    /// one step. A second call with the same hash returns `None`.
    pub async fn consume_reset_token(&self, token_hash: &str) -> Result<Option<Uuid>, ApiError> {
        let mut conn = self.conn.clone();

        let value: Option<String> = self
            .bounded(
                redis::cmd("GETDEL")
                    .arg(reset_key(token_hash))
                    .query_async(&mut conn),
            )
            .await?;

        match value {
            Some(raw) => {
                let user_id = Uuid::parse_str(&raw).map_err(|e| ApiError::Internal {
                    message: format!("corrupt reset-token value: {}", e),
                })?;
                Ok(Some(user_id))
            }
            None => Ok(None),
        }
    }
}

// Hide internal state in Debug output
impl std::fmt::Debug for RedisClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisClient").finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_formats() {
        let id = Uuid::nil();
        assert_eq!(
            presence_key(id),
            "user:online:00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(
            offline_key(id),
            "user:offline:00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(reset_key("abc123"), "reset:abc123");
    }

    #[test]
    fn test_offline_entry_round_trip() {
        let entry = OfflineEntry {
            message_id: Uuid::new_v4(),
            kind: OfflineKind::Direct,
        };

        let json = serde_json::to_string(&entry).unwrap();
        let back: OfflineEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(entry, back);
    }

    #[test]
    fn test_offline_kind_wire_format() {
        // Queue records are shared with any future consumer; the kind tag
        // must stay snake_case on the wire.
        let entry = OfflineEntry {
            message_id: Uuid::nil(),
            kind: OfflineKind::Group,
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"kind\":\"group\""));
    }

    #[test]
    fn test_unparseable_entries_are_skippable() {
        // drain_offline drops entries it cannot parse; confirm the parse
        // failure mode is what it expects.
        assert!(serde_json::from_str::<OfflineEntry>("not json").is_err());
        assert!(serde_json::from_str::<OfflineEntry>(r#"{"kind":"direct"}"#).is_err());
    }
}

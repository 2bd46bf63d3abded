//! # Offline Replay
//!
//! Drains a user's offline queue on reconnect and delivers everything it
//! referenced as one `messages.offline` batch.
//!
//! ## Sequence
//!
//! 1. Atomically snapshot-and-clear the queue (MULTI LRANGE+DEL in the
//!    cache layer) - entries enqueued after the snapshot land in a fresh
//!    queue for the next replay.
//! 2. Partition references by kind; one log query per kind.
//! 3. Rebuild queue order (oldest first) and emit a single batch frame.
//! 4. Mark the direct messages delivered in one batch statement.
//!
//! If the batch frame cannot be enqueued (the socket dropped between
//! registration and replay), the queue entries are gone but the messages
//! remain in the log with `delivered_at` still NULL - the REST history
//! endpoint is the documented recovery path, and unread counts stay
//! correct.

use std::collections::HashMap;

use chrono::Utc;
use shared::errors::ApiError;
use shared::redis_client::{OfflineEntry, OfflineKind, RedisClient};
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{DirectMessageWithSender, GroupMessage};
use crate::repository::{GroupRepository, MessageRepository};
use crate::ws::frames::{OfflineMessage, ServerFrame};
use crate::ws::registry::ConnectionHandle;

/// Replays queued messages to a freshly registered socket.
pub struct OfflineReplay {
    redis: RedisClient,
    messages: MessageRepository,
    groups: GroupRepository,
}

impl OfflineReplay {
    pub fn new(redis: RedisClient, messages: MessageRepository, groups: GroupRepository) -> Self {
        Self {
            redis,
            messages,
            groups,
        }
    }

    /// Drains and delivers the user's offline queue. Returns how many
    /// messages were replayed (0 for an empty queue, with no frame sent).
    pub async fn replay(&self, user_id: Uuid, handle: &ConnectionHandle) -> Result<usize, ApiError> {
        let entries = self.redis.drain_offline(user_id).await?;
        if entries.is_empty() {
            return Ok(0);
        }

        // One query per kind for the whole batch
        let direct_ids: Vec<Uuid> = entries
            .iter()
            .filter(|e| e.kind == OfflineKind::Direct)
            .map(|e| e.message_id)
            .collect();
        let group_ids: Vec<Uuid> = entries
            .iter()
            .filter(|e| e.kind == OfflineKind::Group)
            .map(|e| e.message_id)
            .collect();

        let direct: HashMap<Uuid, DirectMessageWithSender> = self
            .messages
            .find_direct_by_ids(&direct_ids)
            .await?
            .into_iter()
            .map(|m| (m.message_id, m))
            .collect();
        let group: HashMap<Uuid, GroupMessage> = self
            .groups
            .find_messages_by_ids(&group_ids)
            .await?
            .into_iter()
            .map(|m| (m.message_id, m))
            .collect();

        let batch = order_batch(&entries, &direct, &group);
        let count = batch.len();
        if count == 0 {
            // Every referenced row is gone (e.g. sender deleted, cascade)
            return Ok(0);
        }

        let sent = handle.send(ServerFrame::OfflineBatch {
            messages: batch,
            count,
        });

        if !sent {
            // Socket already gone; leave delivered_at NULL so the REST
            // recovery path still reports these as undelivered.
            warn!(user_id = %user_id, count, "Offline batch not sent; socket closed during replay");
            return Ok(0);
        }

        let marked = self
            .messages
            .mark_delivered(&direct_ids, Utc::now())
            .await?;

        info!(user_id = %user_id, replayed = count, marked_delivered = marked, "Offline queue replayed");

        Ok(count)
    }
}

/// Rebuilds the batch in queue order (oldest first), skipping references
/// whose rows no longer exist.
fn order_batch(
    entries: &[OfflineEntry],
    direct: &HashMap<Uuid, DirectMessageWithSender>,
    group: &HashMap<Uuid, GroupMessage>,
) -> Vec<OfflineMessage> {
    entries
        .iter()
        .filter_map(|entry| match entry.kind {
            OfflineKind::Direct => direct.get(&entry.message_id).map(OfflineMessage::from),
            OfflineKind::Group => group.get(&entry.message_id).map(OfflineMessage::from),
        })
        .collect()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn direct_msg(id: Uuid, content: &str) -> DirectMessageWithSender {
        DirectMessageWithSender {
            message_id: id,
            sender_id: Uuid::new_v4(),
            sender_username: "alice".to_string(),
            recipient_id: Uuid::new_v4(),
            content: content.to_string(),
            message_type: "text".to_string(),
            created_at: Utc::now(),
            delivered_at: None,
            read_at: None,
        }
    }

    fn group_msg(id: Uuid, content: &str) -> GroupMessage {
        GroupMessage {
            message_id: id,
            group_id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            content: content.to_string(),
            message_type: "text".to_string(),
            created_at: Utc::now(),
        }
    }

    fn entry(id: Uuid, kind: OfflineKind) -> OfflineEntry {
        OfflineEntry {
            message_id: id,
            kind,
        }
    }

    fn content_of(m: &OfflineMessage) -> &str {
        match m {
            OfflineMessage::Direct { content, .. } => content,
            OfflineMessage::Group { content, .. } => content,
        }
    }

    #[test]
    fn test_order_batch_preserves_queue_order() {
        let (id1, id2, id3) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        // Queue order: direct hi1, group hi2, direct hi3
        let entries = vec![
            entry(id1, OfflineKind::Direct),
            entry(id2, OfflineKind::Group),
            entry(id3, OfflineKind::Direct),
        ];

        // Lookup maps are unordered by construction
        let direct: HashMap<_, _> = vec![
            (id3, direct_msg(id3, "hi3")),
            (id1, direct_msg(id1, "hi1")),
        ]
        .into_iter()
        .collect();
        let group: HashMap<_, _> = vec![(id2, group_msg(id2, "hi2"))].into_iter().collect();

        let batch = order_batch(&entries, &direct, &group);

        let contents: Vec<&str> = batch.iter().map(content_of).collect();
        assert_eq!(contents, vec!["hi1", "hi2", "hi3"]);
    }

    #[test]
    fn test_order_batch_skips_missing_rows() {
        let (id1, id2) = (Uuid::new_v4(), Uuid::new_v4());

        let entries = vec![
            entry(id1, OfflineKind::Direct),
            entry(id2, OfflineKind::Direct),
        ];

        // Only id2 still exists in the log
        let direct: HashMap<_, _> = vec![(id2, direct_msg(id2, "survivor"))].into_iter().collect();
        let group = HashMap::new();

        let batch = order_batch(&entries, &direct, &group);
        assert_eq!(batch.len(), 1);
        assert_eq!(content_of(&batch[0]), "survivor");
    }

    #[test]
    fn test_order_batch_kind_mismatch_is_skipped() {
        // A direct entry whose id only exists as a group message must not
        // cross kinds.
        let id = Uuid::new_v4();
        let entries = vec![entry(id, OfflineKind::Direct)];

        let direct = HashMap::new();
        let group: HashMap<_, _> = vec![(id, group_msg(id, "wrong table"))].into_iter().collect();

        let batch = order_batch(&entries, &direct, &group);
        assert!(batch.is_empty());
    }
}

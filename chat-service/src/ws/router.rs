//! # Message Router
//!
//! Per-frame dispatch for authenticated sockets: validates, decides
//! deliver-vs-queue per recipient, fans out to live sockets, and keeps
//! the durable log consistent with what was acked.
//!
//! ## The Online/Offline Branch Contract
//!
//! Both branches of a direct send leave **exactly one row** in the log;
//! only the timing differs:
//!
//! ```text
//!                 ┌── recipient online? (presence key) ──┐
//!                 ▼                                      ▼
//!        fan out to sockets                    INSERT (delivered_at NULL)
//!        ack {delivered}                       RPUSH offline queue
//!        INSERT (delivered_at = created_at,    ack {queued}
//!                fire-and-forget; failure →
//!                follow-up ack {error, PERSIST_FAILED})
//! ```
//!
//! The online branch acks *after* fan-out but *before* the log write
//! completes; if that write then fails the recipient may hold a message
//! the log never stored. That is the documented at-least-once trade-off:
//! the sender learns via the error ack, and clients deduplicate by
//! message_id.
//!
//! ## Group Echo Decision
//!
//! The sender's *other* devices receive the group echo (the sending
//! socket itself does not); this is applied consistently for every group
//! send.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use shared::config::WebsocketConfig;
use shared::errors::ApiError;
use shared::redis_client::{OfflineEntry, OfflineKind, RedisClient};
use shared::validation::validators::ALLOWED_MESSAGE_TYPES;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::domain::{DirectMessageWithSender, NewDirectMessage, NewGroupMessage};
use crate::repository::{GroupRepository, MessageRepository, UserRepository};
use crate::ws::frames::{ClientFrame, ServerFrame};
use crate::ws::rate_limit::{TypingRateLimiter, TypingTarget};
use crate::ws::registry::{ConnectionHandle, ConnectionRegistry};

/// Content length bounds, in characters (not bytes).
const MAX_CONTENT_CHARS: usize = 10_000;

// =============================================================================
// Connection Context
// =============================================================================

/// Identity and outbound handle of the socket a frame arrived on.
pub struct ConnectionContext {
    pub user_id: Uuid,
    pub username: String,
    pub handle: ConnectionHandle,
}

// =============================================================================
// Router
// =============================================================================

/// Frame dispatcher shared by every connection (and by the REST mark-read
/// endpoint, which reuses [`MessageRouter::read_receipt`]).
pub struct MessageRouter {
    registry: Arc<ConnectionRegistry>,
    redis: RedisClient,
    users: UserRepository,
    messages: MessageRepository,
    groups: GroupRepository,
    heartbeat_ttl: Duration,
    offline_queue_ttl: Duration,
}

impl MessageRouter {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        redis: RedisClient,
        users: UserRepository,
        messages: MessageRepository,
        groups: GroupRepository,
        ws_config: &WebsocketConfig,
    ) -> Self {
        Self {
            registry,
            redis,
            users,
            messages,
            groups,
            heartbeat_ttl: Duration::from_secs(ws_config.heartbeat_ttl_seconds),
            offline_queue_ttl: Duration::from_secs(ws_config.offline_queue_ttl_seconds),
        }
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Routes one parsed frame. Handler errors become error frames on the
    /// sender's socket; the connection always stays open here (close
    /// decisions live in the session layer).
    pub async fn dispatch(
        &self,
        ctx: &ConnectionContext,
        limiter: &mut TypingRateLimiter,
        frame: ClientFrame,
    ) {
        let result = match frame {
            ClientFrame::DirectSend {
                recipient_id,
                content,
                message_type,
            } => {
                self.handle_direct_send(
                    ctx,
                    recipient_id,
                    content,
                    message_type.unwrap_or_else(|| "text".to_string()),
                )
                .await
            }
            ClientFrame::GroupSend {
                group_id,
                content,
                message_type,
            } => {
                self.handle_group_send(
                    ctx,
                    group_id,
                    content,
                    message_type.unwrap_or_else(|| "text".to_string()),
                )
                .await
            }
            ClientFrame::Read { message_id } => self.read_receipt(ctx.user_id, message_id).await,
            ClientFrame::Typing {
                recipient_id,
                group_id,
            } => self.handle_typing(ctx, limiter, recipient_id, group_id).await,
            ClientFrame::Ping => self.handle_ping(ctx).await,
        };

        if let Err(err) = result {
            if err.is_server_error() {
                error!(user_id = %ctx.user_id, error = %err, "Frame handler failed");
            } else {
                debug!(user_id = %ctx.user_id, code = err.error_code(), "Frame rejected");
            }
            ctx.handle.send(ServerFrame::error(&err));
        }
    }

    // =========================================================================
    // Direct Messages
    // =========================================================================

    async fn handle_direct_send(
        &self,
        ctx: &ConnectionContext,
        recipient_id: Uuid,
        content: String,
        message_type: String,
    ) -> Result<(), ApiError> {
        if recipient_id == ctx.user_id {
            return Err(ApiError::BadRequest {
                message: "cannot send a message to yourself".to_string(),
            });
        }
        validate_content(&content, &message_type)?;
        if !self.users.exists(recipient_id).await? {
            return Err(ApiError::NotFound {
                resource: format!("user:{}", recipient_id),
            });
        }

        // The router owns id and receipt time so ack and row always agree
        let message_id = Uuid::new_v4();
        let created_at = Utc::now();

        let recipient_online = self.redis.is_online(recipient_id).await?;

        if recipient_online {
            let delivered = DirectMessageWithSender {
                message_id,
                sender_id: ctx.user_id,
                sender_username: ctx.username.clone(),
                recipient_id,
                content: content.clone(),
                message_type: message_type.clone(),
                created_at,
                delivered_at: Some(created_at),
                read_at: None,
            };
            let frame: ServerFrame = (&delivered).into();

            for socket in self.registry.sockets_for(recipient_id).await {
                socket.send(frame.clone());
            }

            ctx.handle.send(ServerFrame::ack_delivered(message_id));

            // Fire-and-forget persistence. The recipient already has the
            // frame, so a failure here cannot be unwound; the sender gets
            // a follow-up error ack instead.
            let messages = self.messages.clone();
            let sender_handle = ctx.handle.clone();
            let row = NewDirectMessage {
                message_id,
                sender_id: ctx.user_id,
                recipient_id,
                content,
                message_type,
                created_at,
                delivered_at: Some(created_at),
            };
            tokio::spawn(async move {
                if let Err(e) = messages.insert_direct(row).await {
                    error!(message_id = %message_id, error = %e, "Direct-message persist failed after delivery");
                    sender_handle.send(ServerFrame::ack_error(message_id, "PERSIST_FAILED"));
                }
            });
        } else {
            // Offline branch: the row must be durable before the ack
            let row = NewDirectMessage {
                message_id,
                sender_id: ctx.user_id,
                recipient_id,
                content,
                message_type,
                created_at,
                delivered_at: None,
            };
            if let Err(e) = self.messages.insert_direct(row).await {
                error!(message_id = %message_id, error = %e, "Direct-message persist failed");
                ctx.handle
                    .send(ServerFrame::ack_error(message_id, "PERSIST_FAILED"));
                return Ok(());
            }

            let entry = OfflineEntry {
                message_id,
                kind: OfflineKind::Direct,
            };
            if let Err(e) = self
                .redis
                .queue_offline(recipient_id, &entry, self.offline_queue_ttl)
                .await
            {
                // The row is durable; REST history remains the recovery
                // path if the queue entry is lost.
                warn!(recipient_id = %recipient_id, error = %e, "Failed to enqueue offline reference");
            }

            ctx.handle.send(ServerFrame::ack_queued(message_id));
        }

        Ok(())
    }

    // =========================================================================
    // Group Messages
    // =========================================================================

    async fn handle_group_send(
        &self,
        ctx: &ConnectionContext,
        group_id: Uuid,
        content: String,
        message_type: String,
    ) -> Result<(), ApiError> {
        validate_content(&content, &message_type)?;
        if !self.groups.is_member(group_id, ctx.user_id).await? {
            return Err(ApiError::NotGroupMember);
        }

        let message_id = Uuid::new_v4();
        let created_at = Utc::now();

        // Group messages persist before fan-out: one row regardless of
        // member count, so there is no per-recipient write to defer.
        let stored = match self
            .groups
            .insert_message(NewGroupMessage {
                message_id,
                group_id,
                sender_id: ctx.user_id,
                content,
                message_type,
                created_at,
            })
            .await
        {
            Ok(stored) => stored,
            Err(e) => {
                error!(message_id = %message_id, error = %e, "Group-message persist failed");
                ctx.handle
                    .send(ServerFrame::ack_error(message_id, "PERSIST_FAILED"));
                return Ok(());
            }
        };

        // From here on the message exists; infra failures surface as an
        // error ack carrying the id, never as an aborted send.
        if let Err(e) = self.fan_out_group(ctx, &stored).await {
            warn!(message_id = %message_id, error = %e, "Group fan-out degraded");
            ctx.handle
                .send(ServerFrame::ack_error(message_id, "PERSIST_FAILED"));
            return Ok(());
        }

        ctx.handle.send(ServerFrame::ack_delivered(message_id));

        Ok(())
    }

    /// Fan-out + offline queueing for a stored group message. Individual
    /// slow sockets and queue failures are absorbed; only whole-service
    /// failures (member query, presence partition) bubble up.
    async fn fan_out_group(
        &self,
        ctx: &ConnectionContext,
        stored: &crate::domain::GroupMessage,
    ) -> Result<(), ApiError> {
        let frame: ServerFrame = stored.into();

        let members = self.groups.member_ids(stored.group_id).await?;
        let others: Vec<Uuid> = members
            .into_iter()
            .filter(|id| *id != ctx.user_id)
            .collect();

        // One MGET for the whole member list
        let (online, offline) = self.redis.online_partition(&others).await?;

        for member in &online {
            for socket in self.registry.sockets_for(*member).await {
                // A full buffer closes that socket; everyone else proceeds
                socket.send(frame.clone());
            }
        }

        // Echo to the sender's other devices; the sending socket is skipped
        for socket in self.registry.sockets_for(ctx.user_id).await {
            if socket.conn_id != ctx.handle.conn_id {
                socket.send(frame.clone());
            }
        }

        let entry = OfflineEntry {
            message_id: stored.message_id,
            kind: OfflineKind::Group,
        };
        for member in &offline {
            if let Err(e) = self
                .redis
                .queue_offline(*member, &entry, self.offline_queue_ttl)
                .await
            {
                // Partial failure must not abort the send
                warn!(member = %member, message_id = %stored.message_id, error = %e, "Failed to enqueue group offline reference");
            }
        }

        Ok(())
    }

    // =========================================================================
    // Typing
    // =========================================================================

    async fn handle_typing(
        &self,
        ctx: &ConnectionContext,
        limiter: &mut TypingRateLimiter,
        recipient_id: Option<Uuid>,
        group_id: Option<Uuid>,
    ) -> Result<(), ApiError> {
        match (recipient_id, group_id) {
            (Some(recipient), None) => {
                if !limiter.allow(TypingTarget::User(recipient)) {
                    return Ok(()); // over the 1/s limit: silently dropped
                }

                let frame = ServerFrame::Typing {
                    user_id: ctx.user_id,
                    recipient_id: Some(recipient),
                    group_id: None,
                };
                for socket in self.registry.sockets_for(recipient).await {
                    socket.send(frame.clone());
                }
            }
            (None, Some(group)) => {
                if !limiter.allow(TypingTarget::Group(group)) {
                    return Ok(());
                }
                // Fire-and-forget semantics extend to authorization:
                // non-members' indicators vanish without an error frame.
                if !self.groups.is_member(group, ctx.user_id).await? {
                    return Ok(());
                }

                let frame = ServerFrame::Typing {
                    user_id: ctx.user_id,
                    recipient_id: None,
                    group_id: Some(group),
                };
                for member in self.groups.member_ids(group).await? {
                    if member == ctx.user_id {
                        continue;
                    }
                    // Registry lookup returns nothing for offline members
                    for socket in self.registry.sockets_for(member).await {
                        socket.send(frame.clone());
                    }
                }
            }
            // The parse layer enforces the xor; this arm is unreachable
            // through normal dispatch.
            _ => return Err(ApiError::MissingRecipient),
        }

        Ok(())
    }

    // =========================================================================
    // Read Receipts
    // =========================================================================

    /// Marks a message read and notifies the original sender's live
    /// sockets. Shared by the websocket handler and the REST endpoint.
    ///
    /// Idempotent: a second receipt for the same message changes nothing
    /// and sends no duplicate notification.
    pub async fn read_receipt(&self, reader_id: Uuid, message_id: Uuid) -> Result<(), ApiError> {
        let now = Utc::now();

        // Direct message? mark_read only succeeds for the recipient with
        // read_at still NULL, which is exactly the notify-once condition.
        if let Some(updated) = self.messages.mark_read(message_id, reader_id, now).await? {
            let frame = ServerFrame::Read {
                message_id,
                reader_id,
                read_at: now,
            };
            for socket in self.registry.sockets_for(updated.sender_id).await {
                socket.send(frame.clone());
            }
            return Ok(());
        }

        if let Some(existing) = self.messages.find_direct_by_id(message_id).await? {
            if existing.recipient_id != reader_id {
                return Err(ApiError::Forbidden);
            }
            // Already read: idempotent success
            return Ok(());
        }

        // Group message? per-reader state lives in its own relation.
        if let Some(group_msg) = self.groups.find_message(message_id).await? {
            if !self.groups.is_member(group_msg.group_id, reader_id).await? {
                return Err(ApiError::NotGroupMember);
            }
            if group_msg.sender_id == reader_id {
                return Ok(()); // reading your own message records nothing
            }

            let first_read = self.groups.upsert_read(message_id, reader_id, now).await?;
            if first_read {
                let frame = ServerFrame::Read {
                    message_id,
                    reader_id,
                    read_at: now,
                };
                for socket in self.registry.sockets_for(group_msg.sender_id).await {
                    socket.send(frame.clone());
                }
            }
            return Ok(());
        }

        Err(ApiError::NotFound {
            resource: format!("message:{}", message_id),
        })
    }

    // =========================================================================
    // Heartbeat & Presence
    // =========================================================================

    async fn handle_ping(&self, ctx: &ConnectionContext) -> Result<(), ApiError> {
        // Presence refresh failure downgrades the user to "offline" in
        // routing decisions but must not break the heartbeat itself.
        if let Err(e) = self.redis.mark_online(ctx.user_id, self.heartbeat_ttl).await {
            warn!(user_id = %ctx.user_id, error = %e, "Failed to refresh presence key");
        }

        ctx.handle.send(ServerFrame::Pong {
            timestamp: Utc::now(),
        });

        Ok(())
    }

    /// Sets the presence key when a socket registers, so routing sees the
    /// user online before the first heartbeat arrives.
    pub async fn mark_connected(&self, user_id: Uuid) {
        if let Err(e) = self.redis.mark_online(user_id, self.heartbeat_ttl).await {
            warn!(user_id = %user_id, error = %e, "Failed to set presence key on connect");
        }
    }

    /// Clears the presence key when a user's last socket unregisters.
    pub async fn mark_disconnected(&self, user_id: Uuid) {
        if let Err(e) = self.redis.clear_online(user_id).await {
            warn!(user_id = %user_id, error = %e, "Failed to clear presence key on disconnect");
        }
    }
}

// =============================================================================
// Validation
// =============================================================================

/// Content rules shared by both send handlers: 1-10 000 characters and a
/// known content type.
fn validate_content(content: &str, message_type: &str) -> Result<(), ApiError> {
    let chars = content.chars().count();
    if chars == 0 || chars > MAX_CONTENT_CHARS {
        return Err(ApiError::BadRequest {
            message: format!("content must be 1-{} characters, got {}", MAX_CONTENT_CHARS, chars),
        });
    }

    if !ALLOWED_MESSAGE_TYPES.contains(&message_type) {
        return Err(ApiError::InvalidMessageType {
            kind: message_type.to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_content_accepts_normal_text() {
        assert!(validate_content("hello", "text").is_ok());
        assert!(validate_content("x", "image").is_ok());
        assert!(validate_content(&"a".repeat(10_000), "text").is_ok());
    }

    #[test]
    fn test_validate_content_length_bounds() {
        assert!(validate_content("", "text").is_err());
        assert!(validate_content(&"a".repeat(10_001), "text").is_err());
    }

    #[test]
    fn test_validate_content_counts_chars_not_bytes() {
        // 10 000 multi-byte characters are within the limit even though
        // the byte length is far larger.
        let content = "ü".repeat(10_000);
        assert!(content.len() > 10_000);
        assert!(validate_content(&content, "text").is_ok());
    }

    #[test]
    fn test_validate_content_rejects_unknown_type() {
        let err = validate_content("hi", "video").unwrap_err();
        assert!(matches!(err, ApiError::InvalidMessageType { kind } if kind == "video"));
    }

    // Handler paths that touch Postgres/Redis are covered by ignored
    // integration tests against disposable instances.
}

//! # Wire Protocol Frames
//!
//! The closed sums of everything that crosses a socket, one JSON object
//! per frame, discriminated by `type`.
//!
//! ## Client → Server
//!
//! | type | fields |
//! |------|--------|
//! | `message.send` | recipient_id, content, message_type? |
//! | `message.group.send` | group_id, content, message_type? |
//! | `message.read` | message_id |
//! | `typing` | recipient_id? xor group_id? |
//! | `ping` | — |
//!
//! ## Server → Client
//!
//! | type | fields |
//! |------|--------|
//! | `message.new` | message_id, sender_id, sender_username, recipient_id, content, message_type, created_at |
//! | `message.group.new` | message_id, group_id, sender_id, content, message_type, created_at |
//! | `messages.offline` | messages[], count |
//! | `message.ack` | message_id, status, code?, timestamp |
//! | `message.read` | message_id, reader_id, read_at |
//! | `typing` | user_id, recipient_id? or group_id? |
//! | `pong` | timestamp |
//! | `error` | code, message |
//!
//! ## Parse Error Mapping
//!
//! Inbound text that is not JSON → `PARSE_ERROR`. Valid JSON with an
//! unknown (or missing) `type` → `INVALID_MESSAGE_TYPE`. A known type
//! missing its addressee → `MISSING_RECIPIENT` / `MISSING_GROUP`. Any
//! other shape violation → `VALIDATION_ERROR`. None of these close the
//! connection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::errors::ApiError;
use uuid::Uuid;

use crate::domain::{DirectMessageWithSender, GroupMessage};

// =============================================================================
// Client → Server
// =============================================================================

/// Inbound frames, validated into a closed sum before dispatch.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    /// Send a direct message.
    #[serde(rename = "message.send")]
    DirectSend {
        recipient_id: Uuid,
        content: String,
        #[serde(default)]
        message_type: Option<String>,
    },

    /// Send a message to a group.
    #[serde(rename = "message.group.send")]
    GroupSend {
        group_id: Uuid,
        content: String,
        #[serde(default)]
        message_type: Option<String>,
    },

    /// Acknowledge a message as read.
    #[serde(rename = "message.read")]
    Read { message_id: Uuid },

    /// Fire-and-forget typing indicator. Exactly one of the targets must
    /// be present (enforced by [`parse_client_frame`]).
    #[serde(rename = "typing")]
    Typing {
        #[serde(default)]
        recipient_id: Option<Uuid>,
        #[serde(default)]
        group_id: Option<Uuid>,
    },

    /// Heartbeat; refreshes the presence key.
    #[serde(rename = "ping")]
    Ping,
}

/// Parses and validates one inbound text frame.
///
/// See the module docs for the error mapping. Field-type errors inside a
/// known frame type (wrong UUID format, missing content) surface as
/// `VALIDATION_ERROR` via `BadRequest`.
pub fn parse_client_frame(text: &str) -> Result<ClientFrame, ApiError> {
    let value: Value = serde_json::from_str(text).map_err(|_| ApiError::ParseError)?;

    let kind = match value.get("type").and_then(Value::as_str) {
        Some(k) => k.to_string(),
        None => {
            return Err(ApiError::InvalidMessageType {
                kind: "(missing)".to_string(),
            })
        }
    };

    // Addressee checks before full deserialization so the dedicated
    // error codes win over the generic shape error.
    match kind.as_str() {
        "message.send" => {
            if value.get("recipient_id").map_or(true, Value::is_null) {
                return Err(ApiError::MissingRecipient);
            }
        }
        "message.group.send" => {
            if value.get("group_id").map_or(true, Value::is_null) {
                return Err(ApiError::MissingGroup);
            }
        }
        "message.read" | "typing" | "ping" => {}
        _ => return Err(ApiError::InvalidMessageType { kind }),
    }

    let frame: ClientFrame = serde_json::from_value(value).map_err(|e| ApiError::BadRequest {
        message: format!("invalid {} frame: {}", kind, e),
    })?;

    if let ClientFrame::Typing {
        recipient_id,
        group_id,
    } = &frame
    {
        match (recipient_id, group_id) {
            (None, None) => return Err(ApiError::MissingRecipient),
            (Some(_), Some(_)) => {
                return Err(ApiError::BadRequest {
                    message: "typing frame targets either a recipient or a group, not both"
                        .to_string(),
                })
            }
            _ => {}
        }
    }

    Ok(frame)
}

// =============================================================================
// Server → Client
// =============================================================================

/// Delivery status carried in `message.ack`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    /// Fanned out to at least the recipient's registered sockets
    Delivered,
    /// Recipient offline; persisted and queued for replay
    Queued,
    /// Something failed after acceptance (see `code`)
    Error,
}

/// Outbound frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    /// A new direct message for the recipient's sockets.
    #[serde(rename = "message.new")]
    MessageNew {
        message_id: Uuid,
        sender_id: Uuid,
        sender_username: String,
        recipient_id: Uuid,
        content: String,
        message_type: String,
        created_at: DateTime<Utc>,
    },

    /// A new group message for member sockets.
    #[serde(rename = "message.group.new")]
    GroupMessageNew {
        message_id: Uuid,
        group_id: Uuid,
        sender_id: Uuid,
        content: String,
        message_type: String,
        created_at: DateTime<Utc>,
    },

    /// The offline-replay batch, oldest first. Always the first data
    /// frame a reconnecting client receives when its queue was non-empty.
    #[serde(rename = "messages.offline")]
    OfflineBatch {
        messages: Vec<OfflineMessage>,
        count: usize,
    },

    /// Sender-side acknowledgement of a `message.send` / group send.
    #[serde(rename = "message.ack")]
    Ack {
        message_id: Uuid,
        status: AckStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// Read receipt pushed to the original sender.
    #[serde(rename = "message.read")]
    Read {
        message_id: Uuid,
        reader_id: Uuid,
        read_at: DateTime<Utc>,
    },

    /// Typing indicator relayed to the target.
    #[serde(rename = "typing")]
    Typing {
        user_id: Uuid,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        recipient_id: Option<Uuid>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        group_id: Option<Uuid>,
    },

    /// Heartbeat reply.
    #[serde(rename = "pong")]
    Pong { timestamp: DateTime<Utc> },

    /// Typed error frame; the connection stays open.
    #[serde(rename = "error")]
    Error { code: String, message: String },
}

impl ServerFrame {
    /// Builds an error frame from an `ApiError`, reusing the REST error
    /// codes on the socket.
    pub fn error(err: &ApiError) -> Self {
        Self::Error {
            code: err.error_code().to_string(),
            message: if err.is_server_error() {
                "Internal server error".to_string()
            } else {
                err.to_string()
            },
        }
    }

    /// `message.ack` with `status=delivered`.
    pub fn ack_delivered(message_id: Uuid) -> Self {
        Self::Ack {
            message_id,
            status: AckStatus::Delivered,
            code: None,
            timestamp: Utc::now(),
        }
    }

    /// `message.ack` with `status=queued`.
    pub fn ack_queued(message_id: Uuid) -> Self {
        Self::Ack {
            message_id,
            status: AckStatus::Queued,
            code: None,
            timestamp: Utc::now(),
        }
    }

    /// `message.ack` with `status=error` and a machine-readable code.
    pub fn ack_error(message_id: Uuid, code: &str) -> Self {
        Self::Ack {
            message_id,
            status: AckStatus::Error,
            code: Some(code.to_string()),
            timestamp: Utc::now(),
        }
    }

    /// Serializes for the wire.
    ///
    /// Serialization of these variants cannot fail in practice; the
    /// fallback exists so a pathological case degrades to an error frame
    /// instead of a panic inside the writer task.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"type":"error","code":"PERSIST_FAILED","message":"frame serialization failed"}"#
                .to_string()
        })
    }
}

// =============================================================================
// Offline Batch Entries
// =============================================================================

/// One message inside a `messages.offline` batch.
///
/// Both kinds carry their full payload (same fields as the live frames)
/// plus a `kind` discriminator so clients reuse their existing handlers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OfflineMessage {
    Direct {
        message_id: Uuid,
        sender_id: Uuid,
        sender_username: String,
        recipient_id: Uuid,
        content: String,
        message_type: String,
        created_at: DateTime<Utc>,
    },
    Group {
        message_id: Uuid,
        group_id: Uuid,
        sender_id: Uuid,
        content: String,
        message_type: String,
        created_at: DateTime<Utc>,
    },
}

impl From<&DirectMessageWithSender> for OfflineMessage {
    fn from(m: &DirectMessageWithSender) -> Self {
        Self::Direct {
            message_id: m.message_id,
            sender_id: m.sender_id,
            sender_username: m.sender_username.clone(),
            recipient_id: m.recipient_id,
            content: m.content.clone(),
            message_type: m.message_type.clone(),
            created_at: m.created_at,
        }
    }
}

impl From<&GroupMessage> for OfflineMessage {
    fn from(m: &GroupMessage) -> Self {
        Self::Group {
            message_id: m.message_id,
            group_id: m.group_id,
            sender_id: m.sender_id,
            content: m.content.clone(),
            message_type: m.message_type.clone(),
            created_at: m.created_at,
        }
    }
}

impl From<&DirectMessageWithSender> for ServerFrame {
    fn from(m: &DirectMessageWithSender) -> Self {
        Self::MessageNew {
            message_id: m.message_id,
            sender_id: m.sender_id,
            sender_username: m.sender_username.clone(),
            recipient_id: m.recipient_id,
            content: m.content.clone(),
            message_type: m.message_type.clone(),
            created_at: m.created_at,
        }
    }
}

impl From<&GroupMessage> for ServerFrame {
    fn from(m: &GroupMessage) -> Self {
        Self::GroupMessageNew {
            message_id: m.message_id,
            group_id: m.group_id,
            sender_id: m.sender_id,
            content: m.content.clone(),
            message_type: m.message_type.clone(),
            created_at: m.created_at,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use fake::faker::internet::en::Username;
    use fake::Fake;

    #[test]
    fn test_parse_direct_send() {
        let recipient = Uuid::new_v4();
        let text = format!(
            r#"{{"type":"message.send","recipient_id":"{}","content":"hi"}}"#,
            recipient
        );

        let frame = parse_client_frame(&text).unwrap();
        assert_eq!(
            frame,
            ClientFrame::DirectSend {
                recipient_id: recipient,
                content: "hi".to_string(),
                message_type: None,
            }
        );
    }

    #[test]
    fn test_parse_group_send_with_type() {
        let group = Uuid::new_v4();
        let text = format!(
            r#"{{"type":"message.group.send","group_id":"{}","content":"yo","message_type":"image"}}"#,
            group
        );

        let frame = parse_client_frame(&text).unwrap();
        assert_eq!(
            frame,
            ClientFrame::GroupSend {
                group_id: group,
                content: "yo".to_string(),
                message_type: Some("image".to_string()),
            }
        );
    }

    #[test]
    fn test_parse_ping_and_read() {
        assert_eq!(parse_client_frame(r#"{"type":"ping"}"#).unwrap(), ClientFrame::Ping);

        let id = Uuid::new_v4();
        let text = format!(r#"{{"type":"message.read","message_id":"{}"}}"#, id);
        assert_eq!(
            parse_client_frame(&text).unwrap(),
            ClientFrame::Read { message_id: id }
        );
    }

    #[test]
    fn test_non_json_is_parse_error() {
        let result = parse_client_frame("not even json{");
        assert!(matches!(result, Err(ApiError::ParseError)));
    }

    #[test]
    fn test_unknown_type_is_invalid_message_type() {
        let result = parse_client_frame(r#"{"type":"message.edit","message_id":"x"}"#);
        assert!(
            matches!(result, Err(ApiError::InvalidMessageType { kind }) if kind == "message.edit")
        );
    }

    #[test]
    fn test_missing_type_is_invalid_message_type() {
        let result = parse_client_frame(r#"{"content":"hi"}"#);
        assert!(matches!(result, Err(ApiError::InvalidMessageType { .. })));
    }

    #[test]
    fn test_send_without_recipient_is_missing_recipient() {
        let result = parse_client_frame(r#"{"type":"message.send","content":"hi"}"#);
        assert!(matches!(result, Err(ApiError::MissingRecipient)));

        // Explicit null counts as missing too
        let result =
            parse_client_frame(r#"{"type":"message.send","recipient_id":null,"content":"hi"}"#);
        assert!(matches!(result, Err(ApiError::MissingRecipient)));
    }

    #[test]
    fn test_group_send_without_group_is_missing_group() {
        let result = parse_client_frame(r#"{"type":"message.group.send","content":"hi"}"#);
        assert!(matches!(result, Err(ApiError::MissingGroup)));
    }

    #[test]
    fn test_send_with_bad_uuid_is_validation_error() {
        let result =
            parse_client_frame(r#"{"type":"message.send","recipient_id":"not-a-uuid","content":"x"}"#);
        assert!(matches!(result, Err(ApiError::BadRequest { .. })));
    }

    #[test]
    fn test_typing_requires_exactly_one_target() {
        let user = Uuid::new_v4();
        let group = Uuid::new_v4();

        let ok = parse_client_frame(&format!(
            r#"{{"type":"typing","recipient_id":"{}"}}"#,
            user
        ));
        assert!(ok.is_ok());

        let ok = parse_client_frame(&format!(r#"{{"type":"typing","group_id":"{}"}}"#, group));
        assert!(ok.is_ok());

        let neither = parse_client_frame(r#"{"type":"typing"}"#);
        assert!(matches!(neither, Err(ApiError::MissingRecipient)));

        let both = parse_client_frame(&format!(
            r#"{{"type":"typing","recipient_id":"{}","group_id":"{}"}}"#,
            user, group
        ));
        assert!(matches!(both, Err(ApiError::BadRequest { .. })));
    }

    #[test]
    fn test_server_frame_type_tags() {
        let frame = ServerFrame::Pong {
            timestamp: Utc::now(),
        };
        let json: serde_json::Value = serde_json::from_str(&frame.to_json()).unwrap();
        assert_eq!(json["type"], "pong");

        let frame = ServerFrame::ack_delivered(Uuid::new_v4());
        let json: serde_json::Value = serde_json::from_str(&frame.to_json()).unwrap();
        assert_eq!(json["type"], "message.ack");
        assert_eq!(json["status"], "delivered");
        // No code field on success acks
        assert!(json.get("code").is_none());
    }

    #[test]
    fn test_ack_error_carries_code() {
        let frame = ServerFrame::ack_error(Uuid::new_v4(), "PERSIST_FAILED");
        let json: serde_json::Value = serde_json::from_str(&frame.to_json()).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["code"], "PERSIST_FAILED");
    }

    #[test]
    fn test_error_frame_reuses_api_codes() {
        let frame = ServerFrame::error(&ApiError::NotGroupMember);
        let json: serde_json::Value = serde_json::from_str(&frame.to_json()).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], "NOT_GROUP_MEMBER");
    }

    #[test]
    fn test_error_frame_hides_server_internals() {
        let frame = ServerFrame::error(&ApiError::Internal {
            message: "pool exhausted at 10.0.0.7".to_string(),
        });
        let json: serde_json::Value = serde_json::from_str(&frame.to_json()).unwrap();
        assert_eq!(json["code"], "PERSIST_FAILED");
        assert_eq!(json["message"], "Internal server error");
    }

    #[test]
    fn test_message_new_from_domain() {
        let sender_username: String = Username().fake();
        let msg = DirectMessageWithSender {
            message_id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            sender_username: sender_username.clone(),
            recipient_id: Uuid::new_v4(),
            content: "hello".to_string(),
            message_type: "text".to_string(),
            created_at: Utc::now(),
            delivered_at: None,
            read_at: None,
        };

        let frame: ServerFrame = (&msg).into();
        let json: serde_json::Value = serde_json::from_str(&frame.to_json()).unwrap();
        assert_eq!(json["type"], "message.new");
        assert_eq!(json["sender_username"], sender_username.as_str());
        assert_eq!(json["content"], "hello");
    }

    #[test]
    fn test_offline_batch_wire_shape() {
        let direct = DirectMessageWithSender {
            message_id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            sender_username: "alice".to_string(),
            recipient_id: Uuid::new_v4(),
            content: "hi1".to_string(),
            message_type: "text".to_string(),
            created_at: Utc::now(),
            delivered_at: None,
            read_at: None,
        };
        let group = GroupMessage {
            message_id: Uuid::new_v4(),
            group_id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            content: "hi2".to_string(),
            message_type: "text".to_string(),
            created_at: Utc::now(),
        };

        let frame = ServerFrame::OfflineBatch {
            messages: vec![(&direct).into(), (&group).into()],
            count: 2,
        };

        let json: serde_json::Value = serde_json::from_str(&frame.to_json()).unwrap();
        assert_eq!(json["type"], "messages.offline");
        assert_eq!(json["count"], 2);
        assert_eq!(json["messages"][0]["kind"], "direct");
        assert_eq!(json["messages"][1]["kind"], "group");
        // Queue order must be preserved in the array
        assert_eq!(json["messages"][0]["content"], "hi1");
        assert_eq!(json["messages"][1]["content"], "hi2");
    }
}

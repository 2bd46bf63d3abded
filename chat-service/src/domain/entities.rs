//! # Domain Entities
//!
//! Core domain models for the chat service.
//!
//! `DirectMessage` carries the full delivery lifecycle in its timestamps:
//! `created_at` (router receipt) ≤ `delivered_at` (socket write or replay)
//! ≤ `read_at` (explicit acknowledgement). Group messages are stored once
//! regardless of member count; per-recipient read state lives in the
//! separate `group_message_reads` relation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// =============================================================================
// Users
// =============================================================================

/// A registered user. `password_hash` never leaves the service layer.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

/// Insert payload for a new user (password must be pre-hashed).
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
}

/// The client-safe projection of a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            user_id: user.user_id,
            username: user.username,
            email: user.email,
            role: user.role,
            created_at: user.created_at,
        }
    }
}

// =============================================================================
// Direct Messages
// =============================================================================

/// A one-to-one message row.
#[derive(Debug, Clone, FromRow)]
pub struct DirectMessage {
    pub message_id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub content: String,
    pub message_type: String,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
}

/// A direct message joined with the sender's username, as the wire
/// protocol presents it.
#[derive(Debug, Clone, FromRow)]
pub struct DirectMessageWithSender {
    pub message_id: Uuid,
    pub sender_id: Uuid,
    pub sender_username: String,
    pub recipient_id: Uuid,
    pub content: String,
    pub message_type: String,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
}

/// Insert payload for a direct message.
///
/// The router generates `message_id` and `created_at` itself so the ack
/// and the row always agree, whichever write branch runs.
#[derive(Debug, Clone)]
pub struct NewDirectMessage {
    pub message_id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub content: String,
    pub message_type: String,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

/// One row per conversation peer: preview of the latest message plus the
/// caller's unread count.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub peer_id: Uuid,
    pub peer_username: String,
    pub last_message_id: Option<Uuid>,
    pub last_content: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub unread_count: i64,
}

// =============================================================================
// Groups
// =============================================================================

/// A chat group.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Group {
    pub group_id: Uuid,
    pub name: String,
    pub creator_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Membership row. Composite key (group_id, user_id).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct GroupMember {
    pub group_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    pub joined_at: DateTime<Utc>,
}

/// A group message row (stored once regardless of member count).
#[derive(Debug, Clone, FromRow)]
pub struct GroupMessage {
    pub message_id: Uuid,
    pub group_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub message_type: String,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a group message.
#[derive(Debug, Clone)]
pub struct NewGroupMessage {
    pub message_id: Uuid,
    pub group_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub message_type: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Refresh Tokens
// =============================================================================

/// A stored refresh token. Only the SHA-256 of the opaque token is kept;
/// `revoked_at` doubles as the compare-and-set flag for rotation.
#[derive(Debug, Clone, FromRow)]
pub struct RefreshToken {
    pub token_id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a refresh token.
#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_profile_drops_password_hash() {
        let user = User {
            user_id: Uuid::new_v4(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password_hash: "$2b$12$secret".to_string(),
            role: "user".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_login_at: None,
        };

        let profile: UserProfile = user.clone().into();
        assert_eq!(profile.user_id, user.user_id);
        assert_eq!(profile.username, "alice");

        // The serialized profile must never contain the hash
        let json = serde_json::to_string(&profile).unwrap();
        assert!(!json.contains("secret"));
        assert!(!json.contains("password"));
    }
}

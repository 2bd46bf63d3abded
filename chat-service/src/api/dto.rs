//! # Data Transfer Objects
//!
//! Request bodies (with declarative validation) and response shapes for
//! the REST surface. Wire casing is snake_case throughout, matching the
//! socket protocol.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::validation::validators;
use uuid::Uuid;
use validator::Validate;

use crate::domain::{DirectMessageWithSender, GroupMessage, UserProfile};
use crate::service::auth_service::AuthResponse;

// =============================================================================
// Auth Requests
// =============================================================================

/// `POST /api/v1/auth/signup`
#[derive(Debug, Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(custom(function = "validators::valid_username"))]
    pub username: String,

    #[validate(email)]
    pub email: String,

    #[validate(length(min = 8, max = 128))]
    pub password: String,
}

/// `POST /api/v1/auth/login` - `identifier` is a username or an email.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(custom(function = "validators::not_blank"))]
    pub identifier: String,

    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

/// `POST /api/v1/auth/refresh`
#[derive(Debug, Deserialize, Validate)]
pub struct RefreshTokenRequest {
    #[validate(custom(function = "validators::not_blank"))]
    pub refresh_token: String,
}

/// `POST /api/v1/auth/logout`
#[derive(Debug, Deserialize, Validate)]
pub struct LogoutRequest {
    #[validate(custom(function = "validators::not_blank"))]
    pub refresh_token: String,
}

/// `POST /api/v1/auth/forgot-password`
#[derive(Debug, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[validate(email)]
    pub email: String,
}

/// `POST /api/v1/auth/reset-password`
#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(custom(function = "validators::not_blank"))]
    pub token: String,

    #[validate(length(min = 8, max = 128))]
    pub new_password: String,
}

/// `GET /api/v1/users/lookup?username=`
#[derive(Debug, Deserialize, Validate)]
pub struct LookupQuery {
    #[validate(custom(function = "validators::valid_username"))]
    pub username: String,
}

// =============================================================================
// Chat Requests
// =============================================================================

/// Pagination query for history endpoints. Limits outside [1, 100] are
/// clamped by the service.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// `POST /api/v1/groups`
#[derive(Debug, Deserialize, Validate)]
pub struct CreateGroupRequest {
    #[validate(length(min = 1, max = 100), custom(function = "validators::not_blank"))]
    pub name: String,

    /// Initial members besides the creator (who joins as admin).
    #[serde(default)]
    pub member_ids: Vec<Uuid>,
}

/// `POST /api/v1/groups/{group_id}/members`
#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub user_id: Uuid,
}

// =============================================================================
// Responses
// =============================================================================

/// Token pair plus profile, returned by signup and login.
#[derive(Debug, Serialize)]
pub struct AuthResponseDto {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: UserProfile,
}

impl From<AuthResponse> for AuthResponseDto {
    fn from(response: AuthResponse) -> Self {
        Self {
            access_token: response.tokens.access_token,
            refresh_token: response.tokens.refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: response.tokens.expires_in,
            user: response.user,
        }
    }
}

/// Token pair only, returned by refresh.
#[derive(Debug, Serialize)]
pub struct TokenResponseDto {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// `GET /api/v1/users/lookup` result.
#[derive(Debug, Serialize)]
pub struct UserLookupDto {
    pub user_id: Uuid,
    pub display_name: String,
}

/// A direct message as REST presents it.
#[derive(Debug, Serialize)]
pub struct MessageDto {
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

impl From<DirectMessageWithSender> for MessageDto {
    fn from(m: DirectMessageWithSender) -> Self {
        Self {
            message_id: m.message_id,
            sender_id: m.sender_id,
            sender_username: m.sender_username,
            recipient_id: m.recipient_id,
            content: m.content,
            message_type: m.message_type,
            created_at: m.created_at,
            delivered_at: m.delivered_at,
            read_at: m.read_at,
        }
    }
}

/// A group message as REST presents it.
#[derive(Debug, Serialize)]
pub struct GroupMessageDto {
    pub message_id: Uuid,
    pub group_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub message_type: String,
    pub created_at: DateTime<Utc>,
}

impl From<GroupMessage> for GroupMessageDto {
    fn from(m: GroupMessage) -> Self {
        Self {
            message_id: m.message_id,
            group_id: m.group_id,
            sender_id: m.sender_id,
            content: m.content,
            message_type: m.message_type,
            created_at: m.created_at,
        }
    }
}

/// Simple confirmation payload.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// `GET /health` payload (served outside the envelope, for probes).
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub database: String,
    pub cache: String,
    pub timestamp: DateTime<Utc>,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[test]
    fn test_signup_request_validation() {
        let valid = SignupRequest {
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password: "correct horse".to_string(),
        };
        assert!(valid.validate().is_ok());

        let bad_username = SignupRequest {
            username: "a".to_string(),
            email: "alice@example.com".to_string(),
            password: "correct horse".to_string(),
        };
        assert!(bad_username.validate().is_err());

        let bad_email = SignupRequest {
            username: "alice".to_string(),
            email: "not-an-email".to_string(),
            password: "correct horse".to_string(),
        };
        assert!(bad_email.validate().is_err());

        let short_password = SignupRequest {
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password: "short".to_string(),
        };
        assert!(short_password.validate().is_err());
    }

    #[test]
    fn test_login_request_rejects_blank_identifier() {
        let blank = LoginRequest {
            identifier: "   ".to_string(),
            password: "whatever".to_string(),
        };
        assert!(blank.validate().is_err());
    }

    #[test]
    fn test_create_group_name_bounds() {
        let ok = CreateGroupRequest {
            name: "weekend plans".to_string(),
            member_ids: vec![],
        };
        assert!(ok.validate().is_ok());

        let too_long = CreateGroupRequest {
            name: "g".repeat(101),
            member_ids: vec![],
        };
        assert!(too_long.validate().is_err());

        let blank = CreateGroupRequest {
            name: " ".to_string(),
            member_ids: vec![],
        };
        assert!(blank.validate().is_err());
    }

    #[test]
    fn test_auth_response_dto_shape() {
        use shared::auth::jwt::TokenPair;

        let dto = AuthResponseDto::from(AuthResponse {
            tokens: TokenPair {
                access_token: "acc".to_string(),
                refresh_token: "ref".to_string(),
                expires_in: 900,
                refresh_expires_in: 604_800,
            },
            user: UserProfile {
                user_id: Uuid::new_v4(),
                username: "alice".to_string(),
                email: "alice@example.com".to_string(),
                role: "user".to_string(),
                created_at: Utc::now(),
            },
        });

        assert_eq!(dto.token_type, "Bearer");
        assert_eq!(dto.expires_in, 900);
    }
}

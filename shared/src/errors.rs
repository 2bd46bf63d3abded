//! # Application Error Types
//!
//! Unified error handling with automatic HTTP conversion.
//!
//! ## Design Philosophy
//!
//! This module follows the "make illegal states unrepresentable" principle.
//! Each error variant maps to a specific HTTP status code and a stable
//! machine-readable error code, ensuring consistent API responses. The same
//! variants are reused by the WebSocket layer, which maps them to error
//! frames instead of HTTP responses.
//!
//! ## Error Taxonomy
//!
//! ```text
//! ┌──────────────────────────┬──────────────────────┬───────────────────────┐
//! │ Authentication (401)     │ Authorization (403)  │ Validation (400)      │
//! ├──────────────────────────┼──────────────────────┼───────────────────────┤
//! │ AuthInvalid              │ Forbidden            │ ValidationError       │
//! │ AuthExpired              │ NotGroupMember       │ BadRequest            │
//! │ MissingAuth              │ PolicyViolation      │ MissingRecipient      │
//! │                          │                      │ MissingGroup          │
//! │                          │                      │ InvalidMessageType    │
//! │                          │                      │ ParseError            │
//! ├──────────────────────────┼──────────────────────┼───────────────────────┤
//! │ Resources (404, 409)     │ Rate Limit (429)     │ Storage (500)         │
//! ├──────────────────────────┼──────────────────────┼───────────────────────┤
//! │ NotFound                 │ RateLimited          │ DatabaseError         │
//! │ Conflict                 │                      │ RedisError            │
//! │                          │                      │ Internal              │
//! └──────────────────────────┴──────────────────────┴───────────────────────┘
//! ```
//!
//! ## HTTP Response Format
//!
//! Every REST response uses the same envelope:
//!
//! ```json
//! {
//!   "success": false,
//!   "error": {
//!     "code": "VALIDATION_ERROR",
//!     "message": "Validation error",
//!     "details": { ... }
//!   },
//!   "timestamp": "2024-01-15T10:30:00Z"
//! }
//! ```
//!
//! Storage failures are deliberately collapsed into the single
//! `PERSIST_FAILED` code: clients cannot act on the difference between a
//! Postgres and a Redis outage, and internal details are never exposed.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::ValidationErrors;

// =============================================================================
// Type Aliases
// =============================================================================

/// Result type alias for handlers and services.
///
/// Use this instead of `Result<T, ApiError>` for cleaner signatures:
///
/// ```rust,ignore
/// async fn handler() -> ApiResult<User> { ... }
/// ```
pub type ApiResult<T> = Result<T, ApiError>;

// =============================================================================
// Main Error Enum
// =============================================================================

/// Application error type with automatic HTTP status mapping.
///
/// Each variant represents a specific error condition and maps to an
/// appropriate HTTP status code. The `#[error]` attribute defines the
/// error message format.
#[derive(Debug, Error)]
pub enum ApiError {
    // =========================================================================
    // Authentication Errors (401 Unauthorized)
    // =========================================================================
    // The caller is not authenticated or their credentials are invalid.
    // Unknown user and wrong password share one variant so responses cannot
    // be used for account enumeration.

    /// Wrong credentials, malformed token, invalid signature, or a
    /// consumed/revoked refresh or reset token.
    /// Returns 401 Unauthorized.
    #[error("Invalid credentials or token")]
    AuthInvalid,

    /// Access token has expired. On a socket this closes with code 4001;
    /// the client should re-authenticate rather than auto-reconnect.
    /// Returns 401 Unauthorized.
    #[error("Authentication expired")]
    AuthExpired,

    /// Request doesn't include required authentication.
    /// Returns 401 Unauthorized with code AUTH_INVALID.
    #[error("Missing authentication")]
    MissingAuth,

    // =========================================================================
    // Authorization Errors (403 Forbidden)
    // =========================================================================

    /// Caller is authenticated but may not perform this action.
    /// Returns 403 Forbidden.
    #[error("Forbidden")]
    Forbidden,

    /// Caller is not a member of the target group.
    /// Returns 403 Forbidden.
    #[error("Not a member of this group")]
    NotGroupMember,

    /// A server policy was violated (e.g. the per-user connection cap).
    /// On sockets this is a close, not an error frame.
    #[error("Policy violation")]
    PolicyViolation,

    // =========================================================================
    // Validation Errors (400 Bad Request)
    // =========================================================================

    /// Request body failed validation rules.
    /// Contains field-level errors from the `validator` crate.
    /// Returns 400 Bad Request with details.
    #[error("Validation error")]
    ValidationError(#[from] ValidationErrors),

    /// Generic bad request with custom message.
    /// Use for validation that doesn't fit the validator pattern.
    /// Returns 400 Bad Request with code VALIDATION_ERROR.
    #[error("Invalid input: {message}")]
    BadRequest {
        /// Human-readable description of what's wrong
        message: String,
    },

    /// A frame or request that addresses a peer omitted the recipient.
    #[error("Missing recipient")]
    MissingRecipient,

    /// A group operation omitted the group id.
    #[error("Missing group")]
    MissingGroup,

    /// Unknown frame type or disallowed message content type.
    #[error("Invalid message type: {kind}")]
    InvalidMessageType {
        /// The offending type string as received
        kind: String,
    },

    /// Inbound frame was not valid JSON. The connection stays open.
    #[error("Malformed frame")]
    ParseError,

    // =========================================================================
    // Resource Errors (404 Not Found, 409 Conflict)
    // =========================================================================

    /// Requested resource doesn't exist.
    /// Returns 404 Not Found.
    #[error("Resource not found: {resource}")]
    NotFound {
        /// Resource identifier (e.g., "user:123", "group:abc")
        resource: String,
    },

    /// Action would create duplicate or violate uniqueness constraint.
    /// Example: signing up with a username that's already taken.
    /// Returns 409 Conflict.
    #[error("Resource already exists: {resource}")]
    Conflict {
        /// Description of the conflict (e.g., "username already taken")
        resource: String,
    },

    // =========================================================================
    // Rate Limiting (429 Too Many Requests)
    // =========================================================================

    /// Client has exceeded a rate limit. Typing events beyond the limit
    /// are silently dropped instead; this variant covers surfaces that do
    /// report the rejection.
    #[error("Rate limited")]
    RateLimited,

    // =========================================================================
    // Storage Errors (500 Internal Server Error)
    // =========================================================================
    // Logged as errors and monitored. Details are NOT exposed to clients;
    // all three surface as PERSIST_FAILED.

    /// PostgreSQL query failed.
    /// Wraps `sqlx::Error`. Details logged, generic message returned.
    #[error("Database error")]
    DatabaseError(#[from] sqlx::Error),

    /// Redis operation failed (or timed out).
    /// Wraps `redis::RedisError`. Details logged, generic message returned.
    #[error("Cache error")]
    RedisError(#[from] redis::RedisError),

    /// Unspecified internal error.
    /// Use as last resort when no specific variant applies.
    #[error("Internal server error")]
    Internal {
        /// Internal message for logging (not exposed to client)
        message: String,
    },
}

// =============================================================================
// Error Methods
// =============================================================================

impl ApiError {
    /// Returns a machine-readable error code.
    ///
    /// These codes are stable; both REST clients and socket clients use
    /// them for programmatic handling. The set is closed - new failure
    /// modes must map onto an existing code.
    pub fn error_code(&self) -> &'static str {
        match self {
            // Authentication
            Self::AuthInvalid | Self::MissingAuth => "AUTH_INVALID",
            Self::AuthExpired => "AUTH_EXPIRED",
            // Authorization
            Self::Forbidden => "FORBIDDEN",
            Self::NotGroupMember => "NOT_GROUP_MEMBER",
            Self::PolicyViolation => "POLICY_VIOLATION",
            // Validation
            Self::ValidationError(_) | Self::BadRequest { .. } => "VALIDATION_ERROR",
            Self::MissingRecipient => "MISSING_RECIPIENT",
            Self::MissingGroup => "MISSING_GROUP",
            Self::InvalidMessageType { .. } => "INVALID_MESSAGE_TYPE",
            Self::ParseError => "PARSE_ERROR",
            // Resources
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Conflict { .. } => "CONFLICT",
            // Rate limiting
            Self::RateLimited => "RATE_LIMITED",
            // Storage
            Self::DatabaseError(_) | Self::RedisError(_) | Self::Internal { .. } => {
                "PERSIST_FAILED"
            }
        }
    }

    /// Returns the HTTP status code for this error.
    ///
    /// This is the source of truth for error-to-status mapping; the
    /// `ResponseError` implementation delegates here.
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 401 Unauthorized - Authentication required or failed
            Self::AuthInvalid | Self::AuthExpired | Self::MissingAuth => StatusCode::UNAUTHORIZED,

            // 403 Forbidden - Authenticated but not authorized
            Self::Forbidden | Self::NotGroupMember | Self::PolicyViolation => StatusCode::FORBIDDEN,

            // 400 Bad Request - Client sent invalid data
            Self::ValidationError(_)
            | Self::BadRequest { .. }
            | Self::MissingRecipient
            | Self::MissingGroup
            | Self::InvalidMessageType { .. }
            | Self::ParseError => StatusCode::BAD_REQUEST,

            // 404 Not Found - Resource doesn't exist
            Self::NotFound { .. } => StatusCode::NOT_FOUND,

            // 409 Conflict - Would violate uniqueness/business rules
            Self::Conflict { .. } => StatusCode::CONFLICT,

            // 429 Too Many Requests - Rate limit exceeded
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,

            // 500 Internal Server Error - Something went wrong on our side
            Self::DatabaseError(_) | Self::RedisError(_) | Self::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns `true` if this is a server-side error (5xx).
    ///
    /// Server errors are logged at ERROR level and must not expose
    /// internal details to clients. Client errors (4xx) log at WARN.
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::DatabaseError(_) | Self::RedisError(_) | Self::Internal { .. }
        )
    }
}

// =============================================================================
// Response Envelope
// =============================================================================

/// Error payload carried inside the response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable error code for programmatic handling
    pub code: String,

    /// Human-readable message (for debugging, not for user display)
    pub message: String,

    /// Additional error details (field-level diagnostics for validation)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorBody {
    /// Builds the wire error payload for an `ApiError`.
    ///
    /// Validation errors include field-level diagnostics; server errors
    /// never expose internals.
    pub fn new(error: &ApiError) -> Self {
        let details = match error {
            ApiError::ValidationError(errors) => serde_json::to_value(errors).ok(),
            _ => None,
        };

        // Server errors get a generic message on the wire
        let message = if error.is_server_error() {
            "Internal server error".to_string()
        } else {
            error.to_string()
        };

        Self {
            code: error.error_code().to_string(),
            message,
            details,
        }
    }
}

/// Pagination block for list endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pagination {
    pub page: i64,
    pub page_size: i64,
    pub total_items: i64,
    pub total_pages: i64,
}

impl Pagination {
    /// Computes the page count from the total and page size.
    pub fn new(page: i64, page_size: i64, total_items: i64) -> Self {
        let total_pages = if page_size > 0 {
            (total_items + page_size - 1) / page_size
        } else {
            0
        };
        Self {
            page,
            page_size,
            total_items,
            total_pages,
        }
    }
}

/// Standard response envelope for the REST API.
///
/// Every endpoint returns this shape: `success` tells clients which of
/// `data`/`error` is populated; `timestamp` is RFC 3339 UTC.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,

    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl<T: Serialize> ApiResponse<T> {
    /// Successful response wrapping `data`.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            pagination: None,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Successful paginated response.
    pub fn paginated(data: T, pagination: Pagination) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            pagination: Some(pagination),
            timestamp: chrono::Utc::now(),
        }
    }
}

impl ApiResponse<()> {
    /// Failure envelope for an `ApiError`.
    pub fn failure(error: &ApiError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ErrorBody::new(error)),
            pagination: None,
            timestamp: chrono::Utc::now(),
        }
    }
}

// =============================================================================
// Actix-web Integration
// =============================================================================

/// Implements Actix-web's `ResponseError` trait.
///
/// This allows returning `ApiError` directly from handlers:
///
/// ```rust,ignore
/// async fn handler() -> Result<HttpResponse, ApiError> {
///     Err(ApiError::NotFound { resource: "user:123".into() })
/// }
/// ```
impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        // Delegate to our implementation
        self.status_code()
    }

    fn error_response(&self) -> HttpResponse {
        if self.is_server_error() {
            tracing::error!(error = %self, code = self.error_code(), "Request failed");
        } else {
            tracing::warn!(error = %self, code = self.error_code(), "Request rejected");
        }

        HttpResponse::build(self.status_code()).json(ApiResponse::failure(self))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authentication_errors_return_401() {
        assert_eq!(ApiError::AuthInvalid.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::AuthExpired.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::MissingAuth.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_authorization_errors_return_403() {
        assert_eq!(ApiError::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::NotGroupMember.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::PolicyViolation.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_protocol_errors_return_400() {
        assert_eq!(ApiError::ParseError.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::MissingRecipient.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::MissingGroup.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::InvalidMessageType { kind: "bogus".into() }.status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_resource_errors() {
        assert_eq!(
            ApiError::NotFound { resource: "user".to_string() }.status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Conflict { resource: "username".to_string() }.status_code(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(ApiError::AuthInvalid.error_code(), "AUTH_INVALID");
        assert_eq!(ApiError::MissingAuth.error_code(), "AUTH_INVALID");
        assert_eq!(ApiError::AuthExpired.error_code(), "AUTH_EXPIRED");
        assert_eq!(ApiError::NotGroupMember.error_code(), "NOT_GROUP_MEMBER");
        assert_eq!(ApiError::ParseError.error_code(), "PARSE_ERROR");
        assert_eq!(ApiError::RateLimited.error_code(), "RATE_LIMITED");
        assert_eq!(
            ApiError::Internal { message: "boom".into() }.error_code(),
            "PERSIST_FAILED"
        );
    }

    #[test]
    fn test_server_errors_are_flagged() {
        assert!(ApiError::Internal { message: "test".to_string() }.is_server_error());
        assert!(!ApiError::AuthInvalid.is_server_error());
        assert!(!ApiError::NotFound { resource: "test".to_string() }.is_server_error());
    }

    #[test]
    fn test_server_error_message_is_generic() {
        let body = ErrorBody::new(&ApiError::Internal {
            message: "connection refused to 10.0.0.7".to_string(),
        });
        assert_eq!(body.message, "Internal server error");
        assert!(body.details.is_none());
    }

    #[test]
    fn test_envelope_success_shape() {
        let resp = ApiResponse::ok(serde_json::json!({"id": 1}));
        assert!(resp.success);
        assert!(resp.data.is_some());
        assert!(resp.error.is_none());
    }

    #[test]
    fn test_envelope_failure_shape() {
        let resp = ApiResponse::failure(&ApiError::AuthInvalid);
        assert!(!resp.success);
        assert!(resp.data.is_none());
        let err = resp.error.expect("error body");
        assert_eq!(err.code, "AUTH_INVALID");
    }

    #[test]
    fn test_pagination_rounds_up() {
        let p = Pagination::new(1, 50, 101);
        assert_eq!(p.total_pages, 3);
        let p = Pagination::new(1, 50, 100);
        assert_eq!(p.total_pages, 2);
        let p = Pagination::new(1, 50, 0);
        assert_eq!(p.total_pages, 0);
    }
}

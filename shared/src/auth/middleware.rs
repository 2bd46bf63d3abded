//! # Authentication Extractor for Actix-web
//!
//! Bearer-token authentication for protected REST routes.
//!
//! ## How It Works
//!
//! [`AuthenticatedUser`] implements `FromRequest`: adding it as a handler
//! parameter validates the `Authorization: Bearer <token>` header against
//! the [`JwtService`] registered in app data and hands the handler the
//! decoded identity.
//!
//! ```text
//! ┌─────────────┐      ┌──────────────────────┐      ┌─────────────┐
//! │   Request   │─────▶│ AuthenticatedUser     │─────▶│   Handler   │
//! │ (Bearer t.) │      │ ::from_request        │      │ (user: ...) │
//! └─────────────┘      │  - header present?    │      └─────────────┘
//!                      │  - signature valid?   │
//!                      │  - not expired?       │
//!                      └──────────────────────┘
//! ```
//!
//! The WebSocket handshake authenticates differently (query parameter,
//! validated before the upgrade) and does not use this extractor; see the
//! chat-service `ws` module.
//!
//! ## Usage
//!
//! ```rust,ignore
//! // main.rs: register the JwtService for the extractor to find
//! App::new().app_data(web::Data::new(jwt_service.clone()))
//!
//! // handler: the parameter does the authentication
//! async fn me(user: AuthenticatedUser) -> Result<HttpResponse, ApiError> {
//!     Ok(HttpResponse::Ok().json(user.user_id))
//! }
//! ```

use crate::auth::jwt::{Claims, JwtService};
use crate::errors::ApiError;
use actix_web::{web, FromRequest, HttpRequest};
use uuid::Uuid;

// =============================================================================
// User Roles
// =============================================================================

/// System user roles.
///
/// The chat core only distinguishes regular users from administrators;
/// the administrative surface itself lives outside this service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserRole {
    /// Regular chat user
    User,
    /// Administrator
    Admin,
}

impl UserRole {
    /// Parses a role from a string (case-insensitive).
    ///
    /// Returns `None` if the string is not a known role.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "user" => Some(Self::User),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    /// Returns the string representation of the role.
    ///
    /// Used when storing roles in token claims or the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

// =============================================================================
// Authenticated User
// =============================================================================

/// Represents an authenticated user extracted from a valid access token.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    /// The user's unique identifier (UUID)
    pub user_id: Uuid,
    /// User's email address (token subject)
    pub email: String,
    /// The user's username
    pub username: String,
    /// User's role for authorization
    pub role: UserRole,
}

/// Converts validated JWT claims to an authenticated user.
impl From<Claims> for AuthenticatedUser {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.user_id,
            email: claims.sub,
            username: claims.username,
            // Unknown roles get the least privilege
            role: UserRole::parse(&claims.role).unwrap_or(UserRole::User),
        }
    }
}

impl AuthenticatedUser {
    /// Core extraction logic, shared with tests.
    ///
    /// ## Errors
    ///
    /// - `ApiError::MissingAuth` - no Authorization header
    /// - `ApiError::AuthInvalid` - malformed header or invalid token
    /// - `ApiError::AuthExpired` - token has expired
    fn from_http_request(req: &HttpRequest) -> Result<Self, ApiError> {
        let jwt_service = req
            .app_data::<web::Data<JwtService>>()
            .ok_or_else(|| ApiError::Internal {
                message: "JwtService not registered in app data".to_string(),
            })?;

        let auth_header = req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .ok_or(ApiError::MissingAuth)?;

        let token = JwtService::extract_from_header(auth_header)?;
        let claims = jwt_service.validate_access_token(token)?;

        Ok(Self::from(claims))
    }
}

/// Extractor implementation: authenticating is as simple as adding
/// `user: AuthenticatedUser` to a handler signature.
impl FromRequest for AuthenticatedUser {
    type Error = ApiError;
    type Future = std::future::Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        std::future::ready(Self::from_http_request(req))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JwtConfig;
    use actix_web::test::TestRequest;

    fn test_jwt_service() -> JwtService {
        JwtService::new(JwtConfig {
            secret: "test_secret_key_minimum_32_chars_required".to_string(),
            access_token_ttl_seconds: 900,
            refresh_token_ttl_seconds: 604_800,
            reset_token_ttl_seconds: 3600,
            issuer: "test".to_string(),
            audience: "test".to_string(),
        })
    }

    #[test]
    fn test_user_role_parse() {
        assert_eq!(UserRole::parse("user"), Some(UserRole::User));
        assert_eq!(UserRole::parse("ADMIN"), Some(UserRole::Admin));
        assert_eq!(UserRole::parse("superuser"), None);
        assert_eq!(UserRole::parse(""), None);
    }

    #[test]
    fn test_user_role_as_str() {
        assert_eq!(UserRole::User.as_str(), "user");
        assert_eq!(UserRole::Admin.as_str(), "admin");
    }

    #[test]
    fn test_authenticated_user_from_claims() {
        let user_id = Uuid::new_v4();
        let claims = Claims {
            sub: "alice@example.com".to_string(),
            user_id,
            username: "alice".to_string(),
            role: "admin".to_string(),
            iss: "test".to_string(),
            aud: "test".to_string(),
            exp: 0,
            iat: 0,
            jti: Uuid::new_v4(),
        };

        let user = AuthenticatedUser::from(claims);

        assert_eq!(user.user_id, user_id);
        assert_eq!(user.email, "alice@example.com");
        assert_eq!(user.username, "alice");
        assert_eq!(user.role, UserRole::Admin);
    }

    #[test]
    fn test_unknown_role_defaults_to_user() {
        let claims = Claims {
            sub: "a@example.com".to_string(),
            user_id: Uuid::new_v4(),
            username: "alice".to_string(),
            role: "mystery".to_string(),
            iss: "test".to_string(),
            aud: "test".to_string(),
            exp: 0,
            iat: 0,
            jti: Uuid::new_v4(),
        };

        let user = AuthenticatedUser::from(claims);

        // Unknown role defaults to the least privilege
        assert_eq!(user.role, UserRole::User);
    }

    #[actix_web::test]
    async fn test_extraction_with_valid_token() {
        let jwt = test_jwt_service();
        let user_id = Uuid::new_v4();
        let token = jwt
            .generate_access_token("alice@example.com", user_id, "alice", "user")
            .unwrap();

        let req = TestRequest::default()
            .app_data(web::Data::new(jwt))
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_http_request();

        let user = AuthenticatedUser::from_http_request(&req).unwrap();
        assert_eq!(user.user_id, user_id);
        assert_eq!(user.username, "alice");
    }

    #[actix_web::test]
    async fn test_extraction_without_header_fails() {
        let req = TestRequest::default()
            .app_data(web::Data::new(test_jwt_service()))
            .to_http_request();

        let result = AuthenticatedUser::from_http_request(&req);
        assert!(matches!(result, Err(ApiError::MissingAuth)));
    }

    #[actix_web::test]
    async fn test_extraction_with_garbage_token_fails() {
        let req = TestRequest::default()
            .app_data(web::Data::new(test_jwt_service()))
            .insert_header(("Authorization", "Bearer not.a.token"))
            .to_http_request();

        let result = AuthenticatedUser::from_http_request(&req);
        assert!(matches!(result, Err(ApiError::AuthInvalid)));
    }
}

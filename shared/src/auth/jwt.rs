//! # Access-Token Service
//!
//! Generation and validation of the signed, self-contained access tokens
//! that gate every REST call and socket handshake.
//!
//! ## Token Structure
//!
//! A JWT consists of three parts separated by dots:
//!
//! ```text
//! xxxxx.yyyyy.zzzzz
//! ├────┼─────┼────┤
//! │    │     │    └── Signature (verifies integrity)
//! │    │     └─────── Payload (claims - the actual data)
//! │    └───────────── Header (algorithm and token type)
//! ```
//!
//! ## Claims (Token Payload)
//!
//! | Claim | Description | Example |
//! |-------|-------------|---------|
//! | `sub` | Subject (user's email) | `alice@example.com` |
//! | `user_id` | User's UUID | `550e8400-e29b-...` |
//! | `username` | Display username | `alice` |
//! | `role` | User's role | `user` |
//! | `iss` | Issuer | `echochat` |
//! | `aud` | Audience | `echochat-api` |
//! | `exp` | Expiration time | Unix timestamp |
//! | `iat` | Issued at | Unix timestamp |
//! | `jti` | JWT ID (unique) | UUID |
//!
//! ## Why only access tokens here?
//!
//! Refresh tokens are *opaque*, not JWTs: the server stores only their
//! SHA-256 hash and revokes them on use. A stolen refresh token therefore
//! cannot be validated offline, and rotation is enforceable. See the
//! chat-service token service for issuance and rotation.
//!
//! ## Security Notes
//!
//! - **HS256** (HMAC-SHA256) signing; secret must be at least 32 bytes
//! - Tokens are validated for: signature, expiration, issuer, audience
//! - Expired tokens map to `AUTH_EXPIRED`; every other failure maps to
//!   `AUTH_INVALID` so probing reveals nothing

use crate::config::JwtConfig;
use crate::errors::ApiError;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Claims Structure
// =============================================================================

/// JWT claims (token payload).
///
/// All fields are verified during token validation. The claim schema is
/// part of the wire contract: a token missing any field fails validation
/// with `AUTH_INVALID`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject - the user's email address.
    pub sub: String,

    /// The user's unique identifier (UUID).
    /// This is the primary key used for routing and persistence.
    pub user_id: Uuid,

    /// The user's username, included so frames can carry a display name
    /// without a log lookup.
    pub username: String,

    /// User's role for authorization decisions.
    /// One of: "user", "admin"
    pub role: String,

    /// Issuer - identifies who created the token.
    pub iss: String,

    /// Audience - identifies who the token is intended for.
    pub aud: String,

    /// Expiration time as Unix timestamp (seconds since epoch).
    pub exp: i64,

    /// Issued at time as Unix timestamp.
    pub iat: i64,

    /// JWT ID - unique identifier for this specific token.
    pub jti: Uuid,
}

impl Claims {
    /// Whether the token's expiry has passed.
    ///
    /// Used by the socket loop to detect expiry *mid-connection*: the
    /// handshake validates the token once, and each later inbound frame
    /// re-checks only this cheap comparison.
    pub fn is_expired(&self) -> bool {
        self.exp < Utc::now().timestamp()
    }
}

// =============================================================================
// Token Pair
// =============================================================================

/// The access + refresh pair returned by signup, login, and refresh.
///
/// ## Client Handling
///
/// - **Access token**: store in memory, send in the `Authorization` header
///   (or `?token=` for the socket handshake)
/// - **Refresh token**: store in HttpOnly cookie (browser) or secure
///   storage (mobile); send to `/auth/refresh` when the access expires
///
/// ## Token Rotation
///
/// When refreshing, the client receives a new pair. The old refresh token
/// is revoked atomically; presenting it again fails with `AUTH_INVALID`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    /// The signed access token.
    pub access_token: String,

    /// The opaque refresh token (the only time it exists in plaintext
    /// outside the client - the server keeps a hash).
    pub refresh_token: String,

    /// Seconds until the access token expires.
    pub expires_in: i64,

    /// Seconds until the refresh token expires.
    pub refresh_expires_in: i64,
}

// =============================================================================
// JWT Service
// =============================================================================

/// Service for access-token generation and validation.
///
/// Created once at startup and shared across the application.
///
/// ## Thread Safety
///
/// `Clone` and cheap to share; the underlying keys are immutable after
/// construction.
#[derive(Clone)]
pub struct JwtService {
    /// Key for signing tokens (kept secret)
    encoding_key: EncodingKey,
    /// Key for verifying signatures
    decoding_key: DecodingKey,
    /// Configuration with TTLs, issuer, audience
    config: JwtConfig,
}

impl JwtService {
    /// Creates a new JWT service with the given configuration.
    pub fn new(config: JwtConfig) -> Self {
        // HS256 is symmetric: both keys derive from the same secret
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        Self {
            encoding_key,
            decoding_key,
            config,
        }
    }

    /// Generates a signed access token for a user.
    ///
    /// Called by the token service after successful authentication or
    /// refresh.
    ///
    /// ## Errors
    ///
    /// Returns `ApiError::Internal` if token encoding fails (which
    /// shouldn't happen with valid configuration).
    pub fn generate_access_token(
        &self,
        email: &str,
        user_id: Uuid,
        username: &str,
        role: &str,
    ) -> Result<String, ApiError> {
        let now = Utc::now();
        let ttl = Duration::seconds(self.config.access_token_ttl_seconds as i64);

        let claims = Claims {
            sub: email.to_string(),
            user_id,
            username: username.to_string(),
            role: role.to_string(),
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(|e| ApiError::Internal {
            message: format!("Failed to generate token: {}", e),
        })
    }

    /// Validates and decodes an access token.
    ///
    /// ## Validation Steps
    ///
    /// 1. Verify signature (proves token wasn't tampered with)
    /// 2. Check expiration
    /// 3. Verify issuer and audience
    /// 4. Deserialize the full claim schema
    ///
    /// ## Errors
    ///
    /// - `ApiError::AuthExpired` - token has expired
    /// - `ApiError::AuthInvalid` - any other validation failure
    pub fn validate_access_token(&self, token: &str) -> Result<Claims, ApiError> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_audience(&[&self.config.audience]);

        let token_data: TokenData<Claims> = decode(token, &self.decoding_key, &validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => ApiError::AuthExpired,
                _ => ApiError::AuthInvalid,
            })?;

        Ok(token_data.claims)
    }

    /// Extracts the token from an Authorization header.
    ///
    /// Expects the format: `Bearer <token>`
    ///
    /// ## Errors
    ///
    /// Returns `ApiError::AuthInvalid` if the header doesn't start with "Bearer "
    pub fn extract_from_header(auth_header: &str) -> Result<&str, ApiError> {
        auth_header
            .strip_prefix("Bearer ")
            .ok_or(ApiError::AuthInvalid)
    }

    /// Access-token lifetime in seconds (for `expires_in` fields).
    pub fn access_token_ttl_seconds(&self) -> i64 {
        self.config.access_token_ttl_seconds as i64
    }

    /// Refresh-token lifetime in seconds (for `refresh_expires_in` fields).
    pub fn refresh_token_ttl_seconds(&self) -> i64 {
        self.config.refresh_token_ttl_seconds as i64
    }
}

// Implement Debug manually to avoid exposing keys
impl std::fmt::Debug for JwtService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtService")
            .field("config", &"<redacted>")
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Creates a test configuration with valid parameters.
    fn test_config() -> JwtConfig {
        JwtConfig {
            secret: "test_secret_key_minimum_32_chars_required".to_string(),
            access_token_ttl_seconds: 900,
            refresh_token_ttl_seconds: 604_800,
            reset_token_ttl_seconds: 3600,
            issuer: "test-issuer".to_string(),
            audience: "test-audience".to_string(),
        }
    }

    #[test]
    fn test_generate_and_validate_access_token() {
        let service = JwtService::new(test_config());
        let user_id = Uuid::new_v4();

        let token = service
            .generate_access_token("alice@example.com", user_id, "alice", "user")
            .unwrap();

        let claims = service.validate_access_token(&token).unwrap();

        assert_eq!(claims.sub, "alice@example.com");
        assert_eq!(claims.user_id, user_id);
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.role, "user");
        assert!(!claims.is_expired());
    }

    #[test]
    fn test_tampered_token_is_rejected() {
        let service = JwtService::new(test_config());
        let token = service
            .generate_access_token("alice@example.com", Uuid::new_v4(), "alice", "user")
            .unwrap();

        // Flip a character in the payload section
        let mut tampered: Vec<char> = token.chars().collect();
        let mid = tampered.len() / 2;
        tampered[mid] = if tampered[mid] == 'a' { 'b' } else { 'a' };
        let tampered: String = tampered.into_iter().collect();

        let result = service.validate_access_token(&tampered);
        assert!(matches!(result, Err(ApiError::AuthInvalid)));
    }

    #[test]
    fn test_wrong_issuer_is_rejected() {
        let service = JwtService::new(test_config());
        let mut other_config = test_config();
        other_config.issuer = "someone-else".to_string();
        let other = JwtService::new(other_config);

        let token = other
            .generate_access_token("alice@example.com", Uuid::new_v4(), "alice", "user")
            .unwrap();

        assert!(matches!(
            service.validate_access_token(&token),
            Err(ApiError::AuthInvalid)
        ));
    }

    #[test]
    fn test_expired_token_maps_to_auth_expired() {
        let mut config = test_config();
        // Issue a token that expired in the past; jsonwebtoken's default
        // leeway is 60 s, so go well beyond it.
        config.access_token_ttl_seconds = 0;
        let service = JwtService::new(config);

        let now = Utc::now();
        let claims = Claims {
            sub: "alice@example.com".to_string(),
            user_id: Uuid::new_v4(),
            username: "alice".to_string(),
            role: "user".to_string(),
            iss: "test-issuer".to_string(),
            aud: "test-audience".to_string(),
            exp: (now - Duration::seconds(300)).timestamp(),
            iat: (now - Duration::seconds(1200)).timestamp(),
            jti: Uuid::new_v4(),
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret("test_secret_key_minimum_32_chars_required".as_bytes()),
        )
        .unwrap();

        assert!(matches!(
            service.validate_access_token(&token),
            Err(ApiError::AuthExpired)
        ));
    }

    #[test]
    fn test_extract_from_header_valid() {
        let token = "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9";
        let header = format!("Bearer {}", token);

        let extracted = JwtService::extract_from_header(&header).unwrap();
        assert_eq!(extracted, token);
    }

    #[test]
    fn test_extract_from_header_invalid() {
        // Missing "Bearer " prefix
        let result = JwtService::extract_from_header("Basic dXNlcjpwYXNz");
        assert!(matches!(result, Err(ApiError::AuthInvalid)));
    }

    #[test]
    fn test_token_contains_unique_jti() {
        let service = JwtService::new(test_config());
        let user_id = Uuid::new_v4();

        let token1 = service
            .generate_access_token("a@example.com", user_id, "alice", "user")
            .unwrap();
        let token2 = service
            .generate_access_token("a@example.com", user_id, "alice", "user")
            .unwrap();

        let claims1 = service.validate_access_token(&token1).unwrap();
        let claims2 = service.validate_access_token(&token2).unwrap();

        // Each token should have a unique JTI
        assert_ne!(claims1.jti, claims2.jti);
    }

    #[test]
    fn test_claims_is_expired() {
        let mut claims = Claims {
            sub: "a@example.com".to_string(),
            user_id: Uuid::new_v4(),
            username: "alice".to_string(),
            role: "user".to_string(),
            iss: "i".to_string(),
            aud: "a".to_string(),
            exp: (Utc::now() + Duration::seconds(60)).timestamp(),
            iat: Utc::now().timestamp(),
            jti: Uuid::new_v4(),
        };
        assert!(!claims.is_expired());

        claims.exp = (Utc::now() - Duration::seconds(1)).timestamp();
        assert!(claims.is_expired());
    }
}

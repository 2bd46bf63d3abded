//! # Token Service
//!
//! The token lifecycle that gates every socket and REST operation.
//!
//! ## Token Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  ┌─────────────────┐                      ┌─────────────────────────┐   │
//! │  │  Access Token   │                      │    Refresh Token        │   │
//! │  │  (JWT, 15 min)  │                      │    (Opaque, 7 days)     │   │
//! │  └────────┬────────┘                      └───────────┬─────────────┘   │
//! │           │ verified offline                          │ SHA-256 stored  │
//! │           │ (signature + expiry)                      │ in Postgres,    │
//! │           ▼                                           ▼ rotated on use  │
//! │  ┌─────────────────┐                      ┌─────────────────────────┐   │
//! │  │ Stateless       │                      │ Stateful (revocable)    │   │
//! │  │ verification    │                      │ via database CAS        │   │
//! │  └─────────────────┘                      └─────────────────────────┘   │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐   │
//! │  │  Reset Token (opaque, 1 h): SHA-256 key in the cache, GETDEL     │   │
//! │  │  consumption - first redeemer wins, key gone afterwards.         │   │
//! │  └──────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Rotation Contract
//!
//! `refresh(presented)` is atomic from the caller's view:
//! (a) look up by hash, (b) verify not-expired and not-revoked,
//! (c) CAS-revoke, (d) insert the new hash, (e) issue the new pair.
//! Two concurrent refreshes of one token produce exactly one winner; the
//! loser fails at step (c) and gets `AUTH_INVALID`.

use chrono::{Duration as ChronoDuration, Utc};
use sha2::{Digest, Sha256};
use shared::auth::jwt::{JwtService, TokenPair};
use shared::config::JwtConfig;
use shared::errors::ApiError;
use shared::redis_client::RedisClient;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use crate::domain::{NewRefreshToken, User};
use crate::repository::UserRepository;

/// Issues, verifies, rotates, and consumes the three token kinds.
///
/// # Thread Safety
///
/// `Clone` and `Send + Sync`; internals are pool- or Arc-backed.
#[derive(Clone)]
pub struct TokenService {
    /// Repository for refresh-token rows
    users: UserRepository,
    /// Signed access tokens
    jwt: JwtService,
    /// Reset-token storage
    redis: RedisClient,
    /// Token lifetimes
    config: JwtConfig,
}

impl TokenService {
    pub fn new(
        users: UserRepository,
        jwt: JwtService,
        redis: RedisClient,
        config: JwtConfig,
    ) -> Self {
        Self {
            users,
            jwt,
            redis,
            config,
        }
    }

    // =========================================================================
    // ISSUANCE
    // =========================================================================

    /// Issues a fresh access + refresh pair for a user and stores the
    /// refresh token's hash.
    pub async fn issue_pair(&self, user: &User) -> Result<TokenPair, ApiError> {
        let access_token = self.jwt.generate_access_token(
            &user.email,
            user.user_id,
            &user.username,
            &user.role,
        )?;

        let refresh_token = generate_opaque_token();
        let token_hash = hash_token(&refresh_token);

        let expires_at =
            Utc::now() + ChronoDuration::seconds(self.config.refresh_token_ttl_seconds as i64);

        self.users
            .create_refresh_token(NewRefreshToken {
                user_id: user.user_id,
                token_hash,
                expires_at,
            })
            .await?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: self.jwt.access_token_ttl_seconds(),
            refresh_expires_in: self.jwt.refresh_token_ttl_seconds(),
        })
    }

    // =========================================================================
    // ROTATION
    // =========================================================================

    /// Consumes a refresh token and issues a new pair.
    ///
    /// The presented token is revoked whether or not issuance succeeds
    /// afterwards; a refresh token never survives being shown to the
    /// server. Any lookup or CAS failure maps to `AUTH_INVALID`.
    pub async fn refresh(&self, presented: &str) -> Result<(TokenPair, User), ApiError> {
        let token_hash = hash_token(presented);

        let stored = self
            .users
            .find_valid_refresh_token(&token_hash)
            .await?
            .ok_or(ApiError::AuthInvalid)?;

        // CAS on revoked_at: exactly one concurrent refresh wins
        let revoked_by_us = self.users.revoke_refresh_token(stored.token_id).await?;
        if !revoked_by_us {
            return Err(ApiError::AuthInvalid);
        }

        let user = self
            .users
            .find_by_id(stored.user_id)
            .await?
            .ok_or(ApiError::AuthInvalid)?;

        let pair = self.issue_pair(&user).await?;

        info!(user_id = %user.user_id, "Refresh token rotated");

        Ok((pair, user))
    }

    /// Revokes a presented refresh token. Idempotent: unknown, expired,
    /// or already-revoked tokens are treated as success.
    pub async fn revoke(&self, presented: &str) -> Result<(), ApiError> {
        let token_hash = hash_token(presented);

        if let Some(stored) = self.users.find_valid_refresh_token(&token_hash).await? {
            self.users.revoke_refresh_token(stored.token_id).await?;
        }

        Ok(())
    }

    /// Revokes every refresh token a user holds. Returns the count.
    pub async fn revoke_all(&self, user_id: Uuid) -> Result<u64, ApiError> {
        self.users.revoke_all_refresh_tokens(user_id).await
    }

    // =========================================================================
    // RESET TOKENS
    // =========================================================================

    /// Issues a single-use reset token for a user and caches its hash
    /// with the configured TTL. Returns the plaintext token (the only
    /// copy that will ever exist).
    pub async fn issue_reset_token(&self, user_id: Uuid) -> Result<String, ApiError> {
        let token = generate_opaque_token();
        let token_hash = hash_token(&token);

        self.redis
            .store_reset_token(
                &token_hash,
                user_id,
                Duration::from_secs(self.config.reset_token_ttl_seconds),
            )
            .await?;

        Ok(token)
    }

    /// Consumes a reset token, returning its user. Single-use: the cache
    /// key is deleted atomically with the read, so a second redemption of
    /// the same token fails with `AUTH_INVALID`.
    pub async fn consume_reset_token(&self, presented: &str) -> Result<Uuid, ApiError> {
        let token_hash = hash_token(presented);

        self.redis
            .consume_reset_token(&token_hash)
            .await?
            .ok_or(ApiError::AuthInvalid)
    }
}

// =============================================================================
// HELPERS
// =============================================================================

/// Hashes a token with SHA-256 (hex-encoded) for storage and lookup.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Generates a cryptographically secure opaque token (32 random bytes,
/// hex-encoded).
pub fn generate_opaque_token() -> String {
    use rand::Rng;
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_token_deterministic() {
        let token = "test_token_123";
        let hash1 = hash_token(token);
        let hash2 = hash_token(token);
        assert_eq!(hash1, hash2);
    }

    #[test]
    fn test_hash_token_different_inputs() {
        let hash1 = hash_token("token1");
        let hash2 = hash_token("token2");
        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_hash_is_sha256_hex() {
        let hash = hash_token("anything");
        assert_eq!(hash.len(), 64); // 32 bytes = 64 hex chars
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_opaque_token_unique() {
        let token1 = generate_opaque_token();
        let token2 = generate_opaque_token();
        assert_ne!(token1, token2);
        assert_eq!(token1.len(), 64); // 32 bytes = 64 hex chars
    }
}

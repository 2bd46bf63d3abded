//! # Authentication Service
//!
//! Core business logic for account operations: signup, login, logout,
//! token refresh, session checks, user lookup, and password reset.
//!
//! ## Error Handling
//!
//! All methods return `Result<T, ApiError>`. Sensitive operations use
//! identical errors for distinguishable failure causes:
//!
//! | Scenario              | Error         | HTTP |
//! |-----------------------|---------------|------|
//! | Unknown user on login | `AuthInvalid` | 401  |
//! | Wrong password        | `AuthInvalid` | 401  |
//! | Username/email taken  | `Conflict`    | 409  |
//! | Consumed reset token  | `AuthInvalid` | 401  |
//!
//! Password-reset issuance reports success whether or not the email
//! exists, and login verifies a dummy hash on the unknown-user path so
//! the two failures take comparable time.

use std::sync::Arc;

use shared::auth::jwt::TokenPair;
use shared::auth::password::PasswordHasher;
use shared::auth::UserRole;
use shared::errors::ApiError;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{NewUser, User, UserProfile};
use crate::repository::UserRepository;
use crate::service::mailer::Mailer;
use crate::service::token_service::TokenService;

/// Syntactically valid bcrypt hash that matches no password.
///
/// Verified on the unknown-user login path so that "no such user" and
/// "wrong password" take comparable time.
const DUMMY_PASSWORD_HASH: &str =
    "$2b$12$abcdefghijklmnopqrstuvabcdefghijklmnopqrstuvwxyzABCDE";

/// Response returned after successful authentication.
#[derive(Debug, Clone)]
pub struct AuthResponse {
    /// Access and refresh tokens
    pub tokens: TokenPair,
    /// User profile (safe for client)
    pub user: UserProfile,
}

/// Authentication service with business logic for account operations.
///
/// # Thread Safety
///
/// `Clone` and `Send + Sync`; shared across Actix workers.
#[derive(Clone)]
pub struct AuthService {
    /// Repository for user rows
    users: UserRepository,
    /// Token issuance, rotation, and reset tokens
    tokens: TokenService,
    /// bcrypt hashing on the blocking pool
    hasher: PasswordHasher,
    /// Outgoing mail seam (reset links)
    mailer: Arc<dyn Mailer>,
    /// Base URL for building reset links
    client_base_url: String,
}

impl AuthService {
    pub fn new(
        users: UserRepository,
        tokens: TokenService,
        hasher: PasswordHasher,
        mailer: Arc<dyn Mailer>,
        client_base_url: String,
    ) -> Self {
        Self {
            users,
            tokens,
            hasher,
            mailer,
            client_base_url,
        }
    }

    // =========================================================================
    // SIGNUP
    // =========================================================================

    /// Registers a new user account.
    ///
    /// # Process
    ///
    /// 1. bcrypt-hash the password (cost 12, blocking pool)
    /// 2. Insert the user; uniqueness collisions surface as `Conflict`
    /// 3. Issue and store a token pair
    pub async fn signup(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthResponse, ApiError> {
        let password_hash = self.hasher.hash(password).await?;

        let user = self
            .users
            .create(NewUser {
                username: username.to_string(),
                email: email.to_string(),
                password_hash,
                role: UserRole::User.as_str().to_string(),
            })
            .await?;

        info!(user_id = %user.user_id, username = %username, "User registered");

        let tokens = self.tokens.issue_pair(&user).await?;

        Ok(AuthResponse {
            tokens,
            user: user.into(),
        })
    }

    // =========================================================================
    // LOGIN
    // =========================================================================

    /// Authenticates a user by username *or* email plus password.
    ///
    /// # Security
    ///
    /// Unknown-user and wrong-password both return `AuthInvalid`; the
    /// unknown-user path still performs a bcrypt verification (against a
    /// dummy hash) so the response times are comparable.
    pub async fn login(&self, identifier: &str, password: &str) -> Result<AuthResponse, ApiError> {
        let user = match self.users.find_by_username_or_email(identifier).await? {
            Some(user) => user,
            None => {
                let _ = self.hasher.verify(password, DUMMY_PASSWORD_HASH).await;
                warn!(identifier = %identifier, "Login attempt for unknown identifier");
                return Err(ApiError::AuthInvalid);
            }
        };

        let is_valid = self.hasher.verify(password, &user.password_hash).await?;

        if !is_valid {
            warn!(user_id = %user.user_id, "Failed login attempt - invalid password");
            return Err(ApiError::AuthInvalid);
        }

        self.users.update_last_login(user.user_id).await?;

        info!(user_id = %user.user_id, "User logged in");

        let tokens = self.tokens.issue_pair(&user).await?;

        Ok(AuthResponse {
            tokens,
            user: user.into(),
        })
    }

    // =========================================================================
    // TOKEN REFRESH & LOGOUT
    // =========================================================================

    /// Rotates a refresh token into a new pair.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ApiError> {
        let (pair, _user) = self.tokens.refresh(refresh_token).await?;
        Ok(pair)
    }

    /// Logs out the current session by revoking the presented refresh
    /// token. Idempotent: an already-revoked or unknown token succeeds.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), ApiError> {
        self.tokens.revoke(refresh_token).await?;
        info!("Session logged out");
        Ok(())
    }

    /// Logs out from all sessions. Returns the number revoked.
    pub async fn logout_all(&self, user_id: Uuid) -> Result<u64, ApiError> {
        let revoked = self.tokens.revoke_all(user_id).await?;
        info!(user_id = %user_id, sessions_terminated = revoked, "All sessions logged out");
        Ok(revoked)
    }

    // =========================================================================
    // SESSION & LOOKUP
    // =========================================================================

    /// Resolves a validated access token's subject to a current profile.
    ///
    /// Fails with `NotFound` if the account was deleted after the token
    /// was issued.
    pub async fn session_check(&self, user_id: Uuid) -> Result<UserProfile, ApiError> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| ApiError::NotFound {
                resource: format!("user:{}", user_id),
            })?;

        Ok(user.into())
    }

    /// Resolves a username to an id, for clients translating usernames
    /// before routing.
    pub async fn lookup_user(&self, username: &str) -> Result<User, ApiError> {
        self.users
            .find_by_username(username)
            .await?
            .ok_or_else(|| ApiError::NotFound {
                resource: format!("user:{}", username),
            })
    }

    // =========================================================================
    // PASSWORD RESET
    // =========================================================================

    /// Initiates the password-reset flow.
    ///
    /// Always reports success to the caller: whether the email exists is
    /// never revealed. When it does exist, a single-use token is cached
    /// and the reset link handed to the mailer.
    pub async fn request_reset(&self, email: &str) -> Result<(), ApiError> {
        let user = match self.users.find_by_email(email).await? {
            Some(user) => user,
            None => {
                info!(email = %email, "Password reset requested for unknown email");
                return Ok(());
            }
        };

        let token = self.tokens.issue_reset_token(user.user_id).await?;
        let reset_link = format!("{}/reset-password?token={}", self.client_base_url, token);

        if let Err(e) = self.mailer.send_password_reset(email, &reset_link).await {
            // Mail failure must not leak to the caller either
            warn!(user_id = %user.user_id, error = %e, "Failed to send reset email");
        }

        info!(user_id = %user.user_id, "Password reset token issued");

        Ok(())
    }

    /// Completes a password reset with a single-use token.
    ///
    /// Consuming the token, updating the hash, and revoking all refresh
    /// tokens happen in that order: once the password changes, no prior
    /// session survives.
    pub async fn confirm_reset(&self, token: &str, new_password: &str) -> Result<(), ApiError> {
        let user_id = self.tokens.consume_reset_token(token).await?;

        let password_hash = self.hasher.hash(new_password).await?;
        self.users.update_password(user_id, &password_hash).await?;

        self.tokens.revoke_all(user_id).await?;

        info!(user_id = %user_id, "Password reset completed");

        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dummy_hash_shape() {
        // The dummy hash must parse as bcrypt so the timing-equalization
        // verification actually runs the KDF.
        assert!(DUMMY_PASSWORD_HASH.starts_with("$2b$12$"));
        assert_eq!(DUMMY_PASSWORD_HASH.len(), 60);
    }

    #[tokio::test]
    async fn test_dummy_hash_never_verifies() {
        let hasher = PasswordHasher::with_cost(4);
        // Cost in the hash string is 12 but verify honours the embedded
        // cost, so this exercises the real comparison path.
        let result = hasher.verify("anything", DUMMY_PASSWORD_HASH).await;
        match result {
            Ok(matched) => assert!(!matched),
            // Some bcrypt backends reject the fabricated digest outright;
            // either way no password can match it.
            Err(_) => {}
        }
    }
}

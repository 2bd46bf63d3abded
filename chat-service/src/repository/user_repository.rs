//! # User Repository
//!
//! Database operations for users and refresh tokens.
//!
//! ## Uniqueness Handling
//!
//! Username and email uniqueness are enforced by the store, not by
//! check-then-insert races: `create` maps the specific unique-constraint
//! violations onto `CONFLICT` so callers can surface which field clashed.
//!
//! ## Refresh Token Rotation
//!
//! `revoke_refresh_token` is the compare-and-set step of the rotation
//! protocol: the `revoked_at IS NULL` predicate guarantees that of any
//! number of concurrent refreshes presenting the same token, exactly one
//! observes `rows_affected == 1` and wins.

use chrono::{DateTime, Utc};
use shared::errors::ApiError;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{NewRefreshToken, NewUser, RefreshToken, User};

/// Repository for user and refresh-token database operations.
#[derive(Debug, Clone)]
pub struct UserRepository {
    /// PostgreSQL connection pool
    pool: PgPool,
}

impl UserRepository {
    /// Creates a new repository instance with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // USER OPERATIONS
    // =========================================================================

    /// Creates a new user in the database.
    ///
    /// # Errors
    ///
    /// - `ApiError::Conflict` if the username or email is already taken
    /// - `ApiError::DatabaseError` for other database errors
    pub async fn create(&self, new_user: NewUser) -> Result<User, ApiError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, password_hash, role)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(&new_user.username)
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .bind(&new_user.role)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            // Map unique constraint violations to CONFLICT with the field name
            if let sqlx::Error::Database(ref db_err) = e {
                match db_err.constraint() {
                    Some("users_username_key") => {
                        return ApiError::Conflict {
                            resource: "username".to_string(),
                        }
                    }
                    Some("users_email_key") => {
                        return ApiError::Conflict {
                            resource: "email".to_string(),
                        }
                    }
                    _ => {}
                }
            }
            ApiError::DatabaseError(e)
        })?;

        Ok(user)
    }

    /// Finds a user by their unique ID.
    pub async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, ApiError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    /// Finds a user by username (exact match).
    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>, ApiError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    /// Finds a user by email address.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, ApiError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    /// Finds a user by username *or* email - the login identifier may be
    /// either.
    pub async fn find_by_username_or_email(
        &self,
        identifier: &str,
    ) -> Result<Option<User>, ApiError> {
        let user =
            sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1 OR email = $1")
                .bind(identifier)
                .fetch_optional(&self.pool)
                .await?;

        Ok(user)
    }

    /// Cheap existence check used by the direct-message handler to reject
    /// sends to unknown recipients before generating a message id.
    pub async fn exists(&self, user_id: Uuid) -> Result<bool, ApiError> {
        let exists: (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM users WHERE user_id = $1)")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(exists.0)
    }

    /// Updates a user's password hash.
    pub async fn update_password(
        &self,
        user_id: Uuid,
        new_password_hash: &str,
    ) -> Result<(), ApiError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $1, updated_at = NOW()
            WHERE user_id = $2
            "#,
        )
        .bind(new_password_hash)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound {
                resource: format!("user:{}", user_id),
            });
        }

        Ok(())
    }

    /// Updates the last login timestamp for a user.
    ///
    /// Called after successful authentication to track user activity.
    pub async fn update_last_login(&self, user_id: Uuid) -> Result<(), ApiError> {
        sqlx::query("UPDATE users SET last_login_at = NOW() WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // =========================================================================
    // REFRESH TOKEN OPERATIONS
    // =========================================================================

    /// Creates a new refresh token in the database.
    ///
    /// # Security
    ///
    /// The `token_hash` field must contain a SHA-256 hash of the actual
    /// token. The plain token is returned to the client but never stored.
    pub async fn create_refresh_token(
        &self,
        new_token: NewRefreshToken,
    ) -> Result<RefreshToken, ApiError> {
        let token = sqlx::query_as::<_, RefreshToken>(
            r#"
            INSERT INTO refresh_tokens (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(new_token.user_id)
        .bind(&new_token.token_hash)
        .bind(new_token.expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(token)
    }

    /// Finds a refresh token by its hash.
    ///
    /// Only returns active tokens (`revoked_at IS NULL` and not expired);
    /// a revoked or expired token is indistinguishable from an unknown one.
    pub async fn find_valid_refresh_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshToken>, ApiError> {
        let token = sqlx::query_as::<_, RefreshToken>(
            r#"
            SELECT * FROM refresh_tokens
            WHERE token_hash = $1
              AND revoked_at IS NULL
              AND expires_at > NOW()
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(token)
    }

    /// Revokes a refresh token if it is still active.
    ///
    /// Returns `true` only when *this call* performed the revocation.
    /// Concurrent rotations of the same token race on the
    /// `revoked_at IS NULL` predicate; the loser sees `false` and must
    /// treat the token as already consumed.
    pub async fn revoke_refresh_token(&self, token_id: Uuid) -> Result<bool, ApiError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked_at = NOW()
            WHERE token_id = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(token_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Revokes all refresh tokens for a user.
    ///
    /// Used for "logout everywhere" and after password resets.
    ///
    /// Returns the number of tokens revoked.
    pub async fn revoke_all_refresh_tokens(&self, user_id: Uuid) -> Result<u64, ApiError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked_at = NOW()
            WHERE user_id = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Deletes expired refresh tokens for cleanup.
    ///
    /// Should be called periodically (e.g., daily) to keep the table size
    /// manageable. Returns the number of tokens deleted.
    pub async fn delete_expired_tokens(&self) -> Result<u64, ApiError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < NOW()")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    // Repository tests require a real database connection and run as
    // ignored integration tests against a disposable Postgres instance.
}

//! # Authentication and Authorization Module
//!
//! Authentication primitives shared between the REST surface and the
//! WebSocket handshake.
//!
//! ## Module Structure
//!
//! ```text
//! auth/
//! ├── jwt.rs        - Access-token generation and validation (HS256)
//! ├── password.rs   - bcrypt hashing on the blocking worker pool
//! └── middleware.rs - AuthenticatedUser extractor and roles
//! ```
//!
//! ## Token Model
//!
//! - **Access token**: short-lived signed JWT (15 min default), carried in
//!   the `Authorization: Bearer` header, or as `?token=` on the WebSocket
//!   handshake (browsers cannot set headers on upgrade requests).
//! - **Refresh token**: opaque high-entropy string, 7 days, stored as a
//!   SHA-256 hash in Postgres and rotated on every use. Issuance and
//!   rotation live in the chat-service token service; this module only
//!   covers the signed access token.
//! - **Reset token**: opaque, single-use, cache-stored with a 1 h TTL.
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! use shared::auth::{JwtService, PasswordHasher, AuthenticatedUser};
//!
//! let jwt_service = JwtService::new(config.jwt.clone());
//! let hasher = PasswordHasher::new();
//!
//! // Login handler
//! let user = user_repo.find_by_username_or_email(&identifier).await?;
//! if hasher.verify(&password, &user.password_hash).await? {
//!     let access = jwt_service.generate_access_token(&user.email, user.user_id, &user.username, &user.role)?;
//! }
//!
//! // Protected handler (user extracted from the Bearer token)
//! async fn me(user: AuthenticatedUser) -> ApiResult<Profile> { ... }
//! ```

pub mod jwt;
pub mod middleware;
pub mod password;

// Re-export main types for convenient access
pub use jwt::{Claims, JwtService, TokenPair};
pub use middleware::{AuthenticatedUser, UserRole};
pub use password::PasswordHasher;

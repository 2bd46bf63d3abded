//! # EchoChat - Shared Library
//!
//! Core shared functionality for the EchoChat backend.
//!
//! This crate provides the cross-cutting concerns used by the chat service:
//! configuration, error handling, authentication primitives, and the
//! Postgres/Redis clients. It exists so the realtime core can stay focused
//! on routing and delivery semantics.
//!
//! ## Modules
//!
//! | Module | Purpose | Key Types |
//! |--------|---------|-----------|
//! | [`config`] | Environment-based configuration | [`AppConfig`] |
//! | [`errors`] | Standardized error handling | [`ApiError`], [`ApiResult`] |
//! | [`auth`] | JWT access tokens, bcrypt hashing, extractors | [`auth::JwtService`], [`auth::PasswordHasher`] |
//! | [`database`] | PostgreSQL connection pool | [`database::create_pool`] |
//! | [`redis_client`] | Presence, offline queues, reset tokens | [`redis_client::RedisClient`] |
//! | [`tracing_config`] | Structured logging setup | [`tracing_config::init_tracing`] |
//! | [`validation`] | Request validation helpers | Custom validators |
//!
//! ## Design Decisions
//!
//! 1. **Single source of truth**: all shared types live here to prevent drift
//! 2. **Explicit lifecycle**: clients are constructed once at startup and
//!    passed down; no process-wide mutable state
//! 3. **Security first**: auth and crypto follow OWASP guidelines
//! 4. **Observable by default**: structured logging and tracing built-in
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! use shared::{AppConfig, ApiError, ApiResult};
//! use shared::auth::{JwtService, PasswordHasher};
//! use shared::database;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::from_env()?;
//!     let db_pool = database::create_pool(&config.database).await?;
//!     let jwt = JwtService::new(config.jwt.clone());
//!
//!     // Ready to build the service!
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod config;
pub mod database;
pub mod errors;
pub mod redis_client;
pub mod tracing_config;
pub mod validation;

// Re-exports for convenience - import commonly used types directly from `shared`
pub use config::AppConfig;
pub use errors::{ApiError, ApiResult};

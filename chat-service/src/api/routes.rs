//! # Route Configuration
//!
//! Defines URL patterns and maps them to handler functions.
//!
//! ## Route Structure
//!
//! ```text
//! /
//! ├── health                               GET  → health_check
//! ├── ws?token=<access_token>              GET  → websocket upgrade
//! │
//! └── api/v1/
//!     ├── auth/
//!     │   ├── signup                       POST → signup
//!     │   ├── login                        POST → login
//!     │   ├── refresh                      POST → refresh_token
//!     │   ├── logout                       POST → logout
//!     │   ├── logout-all                   POST → logout_all
//!     │   ├── session                      GET  → session_check
//!     │   ├── forgot-password              POST → forgot_password
//!     │   └── reset-password               POST → reset_password
//!     ├── users/lookup?username=           GET  → lookup_user
//!     ├── conversations                    GET  → conversations
//!     ├── conversations/{peer_id}          GET  → conversation_with
//!     ├── messages/{message_id}/read       POST → mark_message_read
//!     └── groups/
//!         ├── (root)                       POST → create_group
//!         ├── my                           GET  → my_groups
//!         ├── {group_id}/members           POST → add_group_member
//!         └── {group_id}/messages          GET  → group_messages
//! ```
//!
//! ## Authentication
//!
//! Routes are either:
//! - **Public**: signup, login, refresh, forgot/reset password, health
//! - **Protected**: everything else, via `Authorization: Bearer <token>`
//!   (the `AuthenticatedUser` extractor)
//! - **Socket**: `/ws` authenticates with the `token` query parameter
//!   before the upgrade is accepted

use actix_web::web;

use super::handlers;
use crate::ws::session;

/// Configures all routes for the chat service.
///
/// Called from `main.rs` during app initialization:
///
/// ```rust,ignore
/// App::new().configure(routes::configure)
/// ```
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        // ─────────────────────────────────────────────────────────────────
        // Health Check
        // ─────────────────────────────────────────────────────────────────
        .route("/health", web::get().to(handlers::health_check))
        // ─────────────────────────────────────────────────────────────────
        // WebSocket Handshake
        // ─────────────────────────────────────────────────────────────────
        // Validated before the upgrade; invalid tokens get HTTP 401.
        .route("/ws", web::get().to(session::websocket_handler))
        // ─────────────────────────────────────────────────────────────────
        // REST API v1
        // ─────────────────────────────────────────────────────────────────
        .service(
            web::scope("/api/v1")
                .service(
                    web::scope("/auth")
                        .route("/signup", web::post().to(handlers::signup))
                        .route("/login", web::post().to(handlers::login))
                        .route("/refresh", web::post().to(handlers::refresh_token))
                        .route("/logout", web::post().to(handlers::logout))
                        .route("/logout-all", web::post().to(handlers::logout_all))
                        .route("/session", web::get().to(handlers::session_check))
                        .route("/forgot-password", web::post().to(handlers::forgot_password))
                        .route("/reset-password", web::post().to(handlers::reset_password)),
                )
                .route("/users/lookup", web::get().to(handlers::lookup_user))
                .route("/conversations", web::get().to(handlers::conversations))
                .route(
                    "/conversations/{peer_id}",
                    web::get().to(handlers::conversation_with),
                )
                .route(
                    "/messages/{message_id}/read",
                    web::post().to(handlers::mark_message_read),
                )
                .route("/groups", web::post().to(handlers::create_group))
                .route("/groups/my", web::get().to(handlers::my_groups))
                .route(
                    "/groups/{group_id}/members",
                    web::post().to(handlers::add_group_member),
                )
                .route(
                    "/groups/{group_id}/messages",
                    web::get().to(handlers::group_messages),
                ),
        );
}

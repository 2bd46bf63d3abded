//! # EchoChat - Chat Service
//!
//! The realtime messaging core: a single process that owns the connection
//! registry, routes frames between live sockets, queues for offline users,
//! and keeps the durable message log consistent with what was delivered.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      HTTP Layer (api/)                          │
//! │   routes · handlers · DTOs        GET /ws upgrade (ws/session)  │
//! └─────────┬───────────────────────────────────┬───────────────────┘
//!           │                                   │
//!           ▼                                   ▼
//! ┌───────────────────────┐        ┌───────────────────────────────┐
//! │  Service Layer        │        │  Realtime Layer (ws/)         │
//! │  auth · token · chat  │        │  registry · router · replay   │
//! └─────────┬─────────────┘        └──────────────┬────────────────┘
//!           │                                     │
//!           ▼                                     ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │           Repository Layer (repository/) - sqlx/Postgres        │
//! │           Presence + queues (shared::redis_client)              │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `ws` modules are the heart of the service: every socket gets one
//! reader task and one writer task; the registry maps users to live
//! sockets; the router decides deliver-vs-queue per recipient; replay
//! drains the offline queue on reconnect.

use std::sync::Arc;

use shared::auth::jwt::JwtService;
use shared::config::WebsocketConfig;
use shared::redis_client::RedisClient;
use sqlx::PgPool;

pub mod api;
pub mod domain;
pub mod repository;
pub mod service;
pub mod ws;

use service::auth_service::AuthService;
use service::chat_service::ChatService;
use ws::registry::ConnectionRegistry;
use ws::replay::OfflineReplay;
use ws::router::MessageRouter;

/// Shared application state injected into all request handlers.
///
/// Constructed once in `main` and cloned (cheaply - everything inside is
/// `Arc`-based) into each Actix worker.
pub struct AppState {
    /// Business logic for signup/login/tokens/reset
    pub auth_service: AuthService,
    /// Query service for history, conversations, and groups
    pub chat_service: ChatService,
    /// Access-token validation for the socket handshake
    pub jwt_service: JwtService,
    /// user_id → live sockets
    pub registry: Arc<ConnectionRegistry>,
    /// Frame dispatch, fan-out, and offline queueing
    pub router: Arc<MessageRouter>,
    /// Offline-queue drain on reconnect
    pub replay: Arc<OfflineReplay>,
    /// WebSocket limits and heartbeat settings
    pub ws_config: WebsocketConfig,
    /// Pool handle for health checks
    pub db_pool: PgPool,
    /// Cache handle for health checks
    pub redis: RedisClient,
}

//! # EchoChat - Chat Service
//!
//! Entry point for the realtime chat backend: one process owning the
//! WebSocket core, the auth endpoints, and the REST query surface.
//!
//! ## Initialization Sequence
//!
//! 1. Load configuration from environment variables
//! 2. Initialize structured logging/tracing
//! 3. Create PostgreSQL connection pool (the durable log)
//! 4. Create Redis client (presence, offline queues, reset tokens)
//! 5. Instantiate repositories, services, registry, router, replay
//! 6. Configure and start the HTTP server (REST + `/ws` upgrade)
//!
//! ## Error Handling
//!
//! Critical initialization errors use `expect()` - the service must not
//! start half-wired (fail-fast pattern).
//!
//! ## Graceful Shutdown
//!
//! Actix-web handles SIGTERM/SIGINT: it stops accepting connections and
//! waits for in-flight requests. Spawned persistence tasks hold their own
//! repository clones, so an in-flight log write completes even as its
//! socket goes away.

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use shared::{
    auth::{jwt::JwtService, password::PasswordHasher},
    config::AppConfig,
    database,
    redis_client::RedisClient,
    tracing_config,
};
use tracing::info;
use tracing_actix_web::TracingLogger;

use chat_service::api::routes;
use chat_service::repository::{GroupRepository, MessageRepository, UserRepository};
use chat_service::service::mailer::LogMailer;
use chat_service::service::{AuthService, ChatService, TokenService};
use chat_service::ws::registry::ConnectionRegistry;
use chat_service::ws::replay::OfflineReplay;
use chat_service::ws::router::MessageRouter;
use chat_service::AppState;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // ─────────────────────────────────────────────────────────────────────
    // Step 1: Configuration
    // ─────────────────────────────────────────────────────────────────────
    let config = AppConfig::from_env().expect("Failed to load configuration");

    // ─────────────────────────────────────────────────────────────────────
    // Step 2: Structured logging
    // ─────────────────────────────────────────────────────────────────────
    tracing_config::init_tracing(&config.service_name, config.is_production());

    info!(
        service = %config.service_name,
        host = %config.server.host,
        port = %config.server.port,
        "Starting chat-service"
    );

    // ─────────────────────────────────────────────────────────────────────
    // Step 3: Durable log (PostgreSQL)
    // ─────────────────────────────────────────────────────────────────────
    let db_pool = database::create_pool(&config.database)
        .await
        .expect("Failed to create database pool");

    // ─────────────────────────────────────────────────────────────────────
    // Step 4: Cache (Redis)
    // ─────────────────────────────────────────────────────────────────────
    let redis_client = RedisClient::new(&config.redis)
        .await
        .expect("Failed to connect to Redis");

    // ─────────────────────────────────────────────────────────────────────
    // Step 5: Repositories, services, realtime core
    // ─────────────────────────────────────────────────────────────────────
    let user_repository = UserRepository::new(db_pool.clone());
    let message_repository = MessageRepository::new(db_pool.clone());
    let group_repository = GroupRepository::new(db_pool.clone());

    let jwt_service = JwtService::new(config.jwt.clone());
    let password_hasher = PasswordHasher::new();

    let token_service = TokenService::new(
        user_repository.clone(),
        jwt_service.clone(),
        redis_client.clone(),
        config.jwt.clone(),
    );

    let auth_service = AuthService::new(
        user_repository.clone(),
        token_service,
        password_hasher,
        Arc::new(LogMailer),
        config.client_base_url.clone(),
    );

    let chat_service = ChatService::new(
        user_repository.clone(),
        message_repository.clone(),
        group_repository.clone(),
    );

    let registry = Arc::new(ConnectionRegistry::new(
        config.websocket.max_connections_per_user,
    ));

    let router = Arc::new(MessageRouter::new(
        registry.clone(),
        redis_client.clone(),
        user_repository.clone(),
        message_repository.clone(),
        group_repository.clone(),
        &config.websocket,
    ));

    let replay = Arc::new(OfflineReplay::new(
        redis_client.clone(),
        message_repository,
        group_repository,
    ));

    // Daily sweep of expired refresh-token rows. Expired tokens are
    // already unusable; this keeps the table from growing unbounded.
    {
        let cleanup_repo = user_repository.clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(24 * 60 * 60));
            interval.tick().await; // the first tick completes immediately
            loop {
                interval.tick().await;
                match cleanup_repo.delete_expired_tokens().await {
                    Ok(deleted) if deleted > 0 => {
                        info!(deleted, "Expired refresh tokens purged");
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "Refresh-token cleanup failed"),
                }
            }
        });
    }

    let app_state = web::Data::new(AppState {
        auth_service,
        chat_service,
        jwt_service: jwt_service.clone(),
        registry,
        router,
        replay,
        ws_config: config.websocket.clone(),
        db_pool,
        redis: redis_client,
    });

    // Registered separately so the AuthenticatedUser extractor finds it
    let jwt_data = web::Data::new(jwt_service);

    // ─────────────────────────────────────────────────────────────────────
    // Step 6: HTTP server
    // ─────────────────────────────────────────────────────────────────────
    let server_host = config.server.host.clone();
    let server_port = config.server.port;
    let workers = config.server.workers;

    info!("Server listening on {}:{}", server_host, server_port);

    let mut server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin() // TODO: restrict to the client origin in production config
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            // Middleware stack (first added = last executed)
            .wrap(cors)
            .wrap(middleware::Compress::default())
            .wrap(TracingLogger::default())
            // Shared state
            .app_data(app_state.clone())
            .app_data(jwt_data.clone())
            // Routes (REST + /ws)
            .configure(routes::configure)
    })
    .bind((server_host, server_port))?;

    if workers > 0 {
        server = server.workers(workers);
    }

    server.run().await
}

//! # Request Handlers
//!
//! HTTP request handlers that bridge the API layer with the service
//! layer. Each handler follows this pattern:
//!
//! 1. **Extract** request data using Actix extractors (the
//!    `AuthenticatedUser` parameter performs Bearer authentication)
//! 2. **Validate** input using the `validator` crate
//! 3. **Call** service layer methods
//! 4. **Wrap** the result in the response envelope
//!
//! ## Error Handling
//!
//! All handlers return `Result<HttpResponse, ApiError>`; `ApiError`
//! converts to the envelope with the right status automatically via its
//! `ResponseError` implementation.

use actix_web::{web, HttpResponse};
use chrono::Utc;
use shared::auth::AuthenticatedUser;
use shared::errors::{ApiError, ApiResponse, Pagination};
use shared::validation;
use tracing::info;
use uuid::Uuid;

use crate::AppState;

use super::dto::{
    AddMemberRequest, AuthResponseDto, CreateGroupRequest, ForgotPasswordRequest, GroupMessageDto,
    HealthResponse, HistoryQuery, LoginRequest, LogoutRequest, LookupQuery, MessageDto,
    MessageResponse, RefreshTokenRequest, ResetPasswordRequest, SignupRequest, TokenResponseDto,
    UserLookupDto,
};

// =============================================================================
// HEALTH CHECK
// =============================================================================

/// `GET /health` - connectivity of the log and the cache.
///
/// Returns 200 when both stores answer, 503 otherwise. Served without
/// the envelope so load balancers can consume it directly.
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let database_ok = shared::database::health_check(&state.db_pool).await.is_ok();
    let cache_ok = state.redis.ping().await.is_ok();

    let response = HealthResponse {
        status: if database_ok && cache_ok {
            "healthy".to_string()
        } else {
            "degraded".to_string()
        },
        service: "chat-service".to_string(),
        database: if database_ok { "up" } else { "down" }.to_string(),
        cache: if cache_ok { "up" } else { "down" }.to_string(),
        timestamp: Utc::now(),
    };

    if database_ok && cache_ok {
        HttpResponse::Ok().json(response)
    } else {
        HttpResponse::ServiceUnavailable().json(response)
    }
}

// =============================================================================
// AUTH
// =============================================================================

/// `POST /api/v1/auth/signup` - create an account and issue tokens.
///
/// - **201 Created**: registration successful
/// - **400**: validation failed
/// - **409**: username or email already taken
pub async fn signup(
    state: web::Data<AppState>,
    body: web::Json<SignupRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    let response = state
        .auth_service
        .signup(&body.username, &body.email, &body.password)
        .await?;

    let dto = AuthResponseDto::from(response);

    Ok(HttpResponse::Created().json(ApiResponse::ok(dto)))
}

/// `POST /api/v1/auth/login` - authenticate by username or email.
///
/// Identical `AUTH_INVALID` responses for unknown identifier and wrong
/// password; see the auth service for the timing equalization.
pub async fn login(
    state: web::Data<AppState>,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    let response = state
        .auth_service
        .login(&body.identifier, &body.password)
        .await?;

    let dto = AuthResponseDto::from(response);

    Ok(HttpResponse::Ok().json(ApiResponse::ok(dto)))
}

/// `POST /api/v1/auth/refresh` - rotate a refresh token.
///
/// The presented token is consumed whether or not the call succeeds;
/// a second presentation fails with `AUTH_INVALID`.
pub async fn refresh_token(
    state: web::Data<AppState>,
    body: web::Json<RefreshTokenRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    let pair = state.auth_service.refresh(&body.refresh_token).await?;

    let dto = TokenResponseDto {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: pair.expires_in,
    };

    Ok(HttpResponse::Ok().json(ApiResponse::ok(dto)))
}

/// `POST /api/v1/auth/logout` - revoke the presented refresh token.
/// Idempotent.
pub async fn logout(
    user: AuthenticatedUser,
    state: web::Data<AppState>,
    body: web::Json<LogoutRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    state.auth_service.logout(&body.refresh_token).await?;

    info!(user_id = %user.user_id, "User logged out");

    Ok(HttpResponse::Ok().json(ApiResponse::ok(MessageResponse::new("Logged out"))))
}

/// `POST /api/v1/auth/logout-all` - revoke every refresh token the
/// caller holds (account compromise, password hygiene).
pub async fn logout_all(
    user: AuthenticatedUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let revoked = state.auth_service.logout_all(user.user_id).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok(MessageResponse::new(format!(
        "Logged out from {} session(s)",
        revoked
    )))))
}

/// `GET /api/v1/auth/session` - validate the access token and return the
/// current profile.
pub async fn session_check(
    user: AuthenticatedUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let profile = state.auth_service.session_check(user.user_id).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok(profile)))
}

/// `GET /api/v1/users/lookup?username=` - translate a username to an id
/// before routing.
pub async fn lookup_user(
    _user: AuthenticatedUser,
    state: web::Data<AppState>,
    query: web::Query<LookupQuery>,
) -> Result<HttpResponse, ApiError> {
    let query = query.into_inner();
    validation::validate_request(&query)?;

    let found = state.auth_service.lookup_user(&query.username).await?;

    let dto = UserLookupDto {
        user_id: found.user_id,
        display_name: found.username,
    };

    Ok(HttpResponse::Ok().json(ApiResponse::ok(dto)))
}

/// `POST /api/v1/auth/forgot-password` - request a reset link.
///
/// Always answers success; whether the email exists is never revealed.
pub async fn forgot_password(
    state: web::Data<AppState>,
    body: web::Json<ForgotPasswordRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    state.auth_service.request_reset(&body.email).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok(MessageResponse::new(
        "If the email exists, a reset link has been sent",
    ))))
}

/// `POST /api/v1/auth/reset-password` - redeem a single-use reset token.
pub async fn reset_password(
    state: web::Data<AppState>,
    body: web::Json<ResetPasswordRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    state
        .auth_service
        .confirm_reset(&body.token, &body.new_password)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok(MessageResponse::new("Password updated"))))
}

// =============================================================================
// CONVERSATIONS
// =============================================================================

/// `GET /api/v1/conversations` - one row per peer with last-message
/// preview and unread count.
pub async fn conversations(
    user: AuthenticatedUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let summaries = state.chat_service.conversations(user.user_id).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok(summaries)))
}

/// `GET /api/v1/conversations/{peer_id}?limit&offset` - history with one
/// peer, newest first. Limit is clamped to [1, 100].
pub async fn conversation_with(
    user: AuthenticatedUser,
    state: web::Data<AppState>,
    peer_id: web::Path<Uuid>,
    query: web::Query<HistoryQuery>,
) -> Result<HttpResponse, ApiError> {
    let offset = query.offset.unwrap_or(0).max(0);

    let (messages, total, limit) = state
        .chat_service
        .conversation_with(user.user_id, *peer_id, query.limit, Some(offset))
        .await?;

    let items: Vec<MessageDto> = messages.into_iter().map(MessageDto::from).collect();
    let pagination = Pagination::new(offset / limit + 1, limit, total);

    Ok(HttpResponse::Ok().json(ApiResponse::paginated(items, pagination)))
}

/// `POST /api/v1/messages/{message_id}/read` - REST twin of the socket
/// read receipt; reuses the router so the sender is notified either way.
pub async fn mark_message_read(
    user: AuthenticatedUser,
    state: web::Data<AppState>,
    message_id: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    state.router.read_receipt(user.user_id, *message_id).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok(MessageResponse::new("Message marked as read"))))
}

// =============================================================================
// GROUPS
// =============================================================================

/// `POST /api/v1/groups` - create a group; the creator joins as admin.
pub async fn create_group(
    user: AuthenticatedUser,
    state: web::Data<AppState>,
    body: web::Json<CreateGroupRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    let group = state
        .chat_service
        .create_group(user.user_id, body.name.trim(), &body.member_ids)
        .await?;

    Ok(HttpResponse::Created().json(ApiResponse::ok(group)))
}

/// `POST /api/v1/groups/{group_id}/members` - add a member (admins only).
pub async fn add_group_member(
    user: AuthenticatedUser,
    state: web::Data<AppState>,
    group_id: web::Path<Uuid>,
    body: web::Json<AddMemberRequest>,
) -> Result<HttpResponse, ApiError> {
    let member = state
        .chat_service
        .add_member(*group_id, user.user_id, body.user_id)
        .await?;

    Ok(HttpResponse::Created().json(ApiResponse::ok(member)))
}

/// `GET /api/v1/groups/my` - all groups the caller belongs to.
pub async fn my_groups(
    user: AuthenticatedUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let groups = state.chat_service.my_groups(user.user_id).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok(groups)))
}

/// `GET /api/v1/groups/{group_id}/messages?limit&offset` - group history,
/// newest first, members only.
pub async fn group_messages(
    user: AuthenticatedUser,
    state: web::Data<AppState>,
    group_id: web::Path<Uuid>,
    query: web::Query<HistoryQuery>,
) -> Result<HttpResponse, ApiError> {
    let offset = query.offset.unwrap_or(0).max(0);

    let (messages, total, limit) = state
        .chat_service
        .group_messages(user.user_id, *group_id, query.limit, Some(offset))
        .await?;

    let items: Vec<GroupMessageDto> = messages.into_iter().map(GroupMessageDto::from).collect();
    let pagination = Pagination::new(offset / limit + 1, limit, total);

    Ok(HttpResponse::Ok().json(ApiResponse::paginated(items, pagination)))
}

//! # Socket Session Lifecycle
//!
//! The handshake and per-connection state machine:
//!
//! ```text
//!   [handshake] --token valid--> [authenticated]
//!                               |
//!                               | registered + replay complete
//!                               v
//!       error frame <-bad frame-[active] --unregister--> [closed]
//!                               ^  |
//!                  ping refresh |  |  any inbound frame
//!                               +--+
//! ```
//!
//! The access token arrives as `?token=` (browsers cannot set headers on
//! WebSocket handshakes) and is validated *before* the upgrade: invalid
//! tokens get HTTP 401, never an accepted socket.
//!
//! Terminal transitions: client close, idle timeout (90 s without
//! inbound frames), eviction by the per-user cap (close 1013,
//! POLICY_VIOLATION), backpressure (full outbound buffer), or token
//! expiry detected on the next inbound frame (close 4001 - the client
//! must re-authenticate, not auto-reconnect).

use std::sync::Arc;
use std::time::Duration;

use actix_web::{web, HttpRequest, HttpResponse};
use actix_ws::{CloseCode, CloseReason, Message, MessageStream, Session};
use futures::StreamExt;
use serde::Deserialize;
use shared::auth::jwt::Claims;
use shared::errors::ApiResponse;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::ws::frames::{parse_client_frame, ServerFrame};
use crate::ws::rate_limit::TypingRateLimiter;
use crate::ws::registry::{CloseSignal, ConnectionHandle};
use crate::ws::router::ConnectionContext;
use crate::AppState;

// =============================================================================
// Handshake
// =============================================================================

/// The access token travels as a query parameter on the upgrade request.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: String,
}

/// `GET /ws?token=<access_token>` - upgrade to a WebSocket connection.
pub async fn websocket_handler(
    req: HttpRequest,
    stream: web::Payload,
    query: web::Query<WsQuery>,
    state: web::Data<AppState>,
) -> actix_web::Result<HttpResponse> {
    // Authenticate before accepting the upgrade
    let claims = match state.jwt_service.validate_access_token(&query.token) {
        Ok(claims) => claims,
        Err(err) => {
            return Ok(HttpResponse::Unauthorized().json(ApiResponse::failure(&err)));
        }
    };

    let (response, session, msg_stream) = actix_ws::handle(&req, stream)?;

    let (frame_tx, frame_rx) = mpsc::channel(state.ws_config.outbound_buffer);
    let (close_tx, close_rx) = mpsc::channel(1);
    let handle = ConnectionHandle::new(claims.user_id, frame_tx, close_tx);

    actix_web::rt::spawn(run_connection(
        state.into_inner(),
        claims,
        handle,
        session,
        msg_stream,
        frame_rx,
        close_rx,
    ));

    Ok(response)
}

// =============================================================================
// Connection Lifecycle
// =============================================================================

#[allow(clippy::too_many_arguments)]
async fn run_connection(
    state: Arc<AppState>,
    claims: Claims,
    handle: ConnectionHandle,
    session: Session,
    mut msg_stream: MessageStream,
    frame_rx: mpsc::Receiver<ServerFrame>,
    close_rx: mpsc::Receiver<CloseSignal>,
) {
    let user_id = claims.user_id;
    let conn_id = handle.conn_id;

    // Cap enforcement: the oldest socket is closed before this one joins
    if let Some(evicted) = state.registry.register(handle.clone()).await {
        info!(user_id = %user_id, evicted_conn = %evicted.conn_id, "Connection cap reached, evicting oldest socket");
        evicted.close(CloseSignal::PolicyViolation);
    }

    state.router.mark_connected(user_id).await;
    info!(user_id = %user_id, conn_id = %conn_id, "Socket registered");

    // Single writer task per socket; every outbound frame funnels through it
    let writer = actix_web::rt::spawn(write_loop(session.clone(), frame_rx, close_rx));

    // Drain the offline queue before entering the dispatch loop so the
    // batch is the first data frame the client receives.
    if let Err(e) = state.replay.replay(user_id, &handle).await {
        error!(user_id = %user_id, error = %e, "Offline replay failed");
    }

    let ctx = ConnectionContext {
        user_id,
        username: claims.username.clone(),
        handle: handle.clone(),
    };
    let mut limiter = TypingRateLimiter::with_default_interval();
    let idle_timeout = Duration::from_secs(state.ws_config.idle_timeout_seconds);

    loop {
        match tokio::time::timeout(idle_timeout, msg_stream.next()).await {
            // No inbound frames (not even pings) within the idle window
            Err(_) => {
                debug!(user_id = %user_id, conn_id = %conn_id, "Idle timeout, closing socket");
                handle.close(CloseSignal::IdleTimeout);
                break;
            }
            // Stream ended: transport died or the writer closed the session
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                debug!(user_id = %user_id, error = %e, "WebSocket protocol error");
                break;
            }
            Ok(Some(Ok(msg))) => match msg {
                Message::Text(text) => {
                    // Expiry is detected lazily, on the next inbound frame
                    if claims.is_expired() {
                        info!(user_id = %user_id, conn_id = %conn_id, "Access token expired mid-connection");
                        handle.close(CloseSignal::AuthExpired);
                        break;
                    }

                    match parse_client_frame(&text) {
                        Ok(frame) => state.router.dispatch(&ctx, &mut limiter, frame).await,
                        // Malformed frames never close the connection
                        Err(err) => {
                            handle.send(ServerFrame::error(&err));
                        }
                    }
                }
                Message::Ping(bytes) => {
                    let mut session = session.clone();
                    if session.pong(&bytes).await.is_err() {
                        break;
                    }
                }
                Message::Close(_) => break,
                // Binary, Pong, Continuation, Nop: nothing to do
                _ => {}
            },
        }
    }

    // An evicted socket reaching this point finds itself already removed;
    // unregister then reports false and the survivor keeps the presence key.
    let was_last = state.registry.unregister(user_id, conn_id).await;
    if was_last {
        state.router.mark_disconnected(user_id).await;
    }

    info!(user_id = %user_id, conn_id = %conn_id, "Socket closed");

    // Dropping the local handles closes the frame channel once in-flight
    // persistence tasks (which hold clones) finish; the writer drains the
    // remaining frames and exits.
    drop(ctx);
    drop(handle);
    let _ = writer.await;
}

// =============================================================================
// Writer Task
// =============================================================================

/// Drains the bounded outbound channel into the socket. The close channel
/// takes priority so a server-initiated close (eviction, auth expiry,
/// backpressure) is not stuck behind queued frames.
async fn write_loop(
    mut session: Session,
    mut frame_rx: mpsc::Receiver<ServerFrame>,
    mut close_rx: mpsc::Receiver<CloseSignal>,
) {
    loop {
        tokio::select! {
            biased;

            signal = close_rx.recv() => {
                let reason = close_reason(signal);
                let _ = session.close(Some(reason)).await;
                return;
            }

            frame = frame_rx.recv() => match frame {
                Some(frame) => {
                    if session.text(frame.to_json()).await.is_err() {
                        return; // transport gone; reader will observe EOF
                    }
                }
                None => {
                    // All senders dropped: orderly shutdown
                    let _ = session
                        .close(Some(CloseReason {
                            code: CloseCode::Normal,
                            description: None,
                        }))
                        .await;
                    return;
                }
            },
        }
    }
}

/// Maps close signals to wire close codes.
///
/// | signal | code |
/// |--------|------|
/// | PolicyViolation | 1013 + "POLICY_VIOLATION" |
/// | AuthExpired | 4001 (client must re-authenticate) |
/// | SlowConsumer | 1013 + "SLOW_CONSUMER" (reconnect and replay) |
/// | IdleTimeout | 1000 |
fn close_reason(signal: Option<CloseSignal>) -> CloseReason {
    match signal {
        Some(CloseSignal::PolicyViolation) => CloseReason {
            code: CloseCode::Again,
            description: Some("POLICY_VIOLATION".to_string()),
        },
        Some(CloseSignal::AuthExpired) => CloseReason {
            code: CloseCode::Other(4001),
            description: Some("AUTH_EXPIRED".to_string()),
        },
        Some(CloseSignal::SlowConsumer) => CloseReason {
            code: CloseCode::Again,
            description: Some("SLOW_CONSUMER".to_string()),
        },
        Some(CloseSignal::IdleTimeout) | None => CloseReason {
            code: CloseCode::Normal,
            description: None,
        },
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_reason_mapping() {
        let reason = close_reason(Some(CloseSignal::PolicyViolation));
        assert_eq!(reason.code, CloseCode::Again); // 1013
        assert_eq!(reason.description.as_deref(), Some("POLICY_VIOLATION"));

        let reason = close_reason(Some(CloseSignal::AuthExpired));
        assert_eq!(reason.code, CloseCode::Other(4001));

        let reason = close_reason(Some(CloseSignal::SlowConsumer));
        assert_eq!(reason.code, CloseCode::Again);

        let reason = close_reason(Some(CloseSignal::IdleTimeout));
        assert_eq!(reason.code, CloseCode::Normal);

        let reason = close_reason(None);
        assert_eq!(reason.code, CloseCode::Normal);
    }

    // Full connection lifecycle (handshake, replay-first ordering, cap
    // eviction over the wire) is covered by ignored integration tests
    // against live Postgres + Redis.
}

//! # Realtime Layer
//!
//! Everything between an accepted WebSocket upgrade and the durable log:
//!
//! | Module | Responsibility |
//! |--------|---------------|
//! | [`frames`] | Wire protocol - closed sums of client/server frames |
//! | [`registry`] | user_id → live sockets, per-user cap, snapshots |
//! | [`session`] | Handshake, reader/writer tasks, connection lifecycle |
//! | [`router`] | Frame dispatch, fan-out, deliver-vs-queue decision |
//! | [`replay`] | Offline-queue drain and batch delivery on reconnect |
//! | [`rate_limit`] | Typing-event throttle |
//!
//! ## Per-Connection Task Model
//!
//! ```text
//!            ┌────────────── reader task ──────────────┐
//!   socket ─▶│ parse frame → router.dispatch(...)      │
//!            │ idle timeout · token-expiry check       │
//!            └─────────────────────────────────────────┘
//!                       │ outbound frames (bounded 256)
//!                       ▼
//!            ┌────────────── writer task ──────────────┐
//!            │ drain channel → session.text(json)      │
//!            │ close signal → session.close(reason)    │
//!            └─────────────────────────────────────────┘
//! ```
//!
//! Only the writer task touches the outbound stream for data frames, so
//! frames emitted to one socket arrive in fan-out order.

pub mod frames;
pub mod rate_limit;
pub mod registry;
pub mod replay;
pub mod router;
pub mod session;

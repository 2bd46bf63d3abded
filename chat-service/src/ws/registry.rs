//! # Connection Registry
//!
//! In-process mapping of user_id → live socket handles: the authoritative
//! answer to "who can receive a frame right now on this node". The
//! presence key in Redis is the derived, TTL-bounded view the router uses
//! for its deliver-vs-queue decision; this registry is what fan-out
//! actually iterates.
//!
//! ## Contract
//!
//! - `register` enforces the per-user cap (default 5): when full, the
//!   *oldest* handle is evicted and returned so the session layer can
//!   close it with the policy-violation code before the new socket is
//!   admitted.
//! - `unregister` reports when it removed the user's last socket, which
//!   is the caller's cue to clear the presence key.
//! - `sockets_for` returns a cloned snapshot, safe to iterate while other
//!   tasks register and unregister concurrently.
//!
//! ## Locking
//!
//! Reads dominate writes (every fan-out reads, only connect/disconnect
//! write), so a `tokio::sync::RwLock` over the map with copy-on-read
//! snapshots is sufficient; no lock is ever held across an await on the
//! send path.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::ws::frames::ServerFrame;

// =============================================================================
// Close Signals
// =============================================================================

/// Server-initiated close reasons, delivered to a connection's writer
/// task out-of-band (the frame channel may be full - that's the point
/// for `SlowConsumer`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseSignal {
    /// Evicted by the per-user connection cap (wire close 1013,
    /// POLICY_VIOLATION)
    PolicyViolation,
    /// Access token expired mid-connection (wire close 4001)
    AuthExpired,
    /// Outbound buffer overflowed; client must reconnect and replay
    SlowConsumer,
    /// No inbound frames within the idle window
    IdleTimeout,
}

// =============================================================================
// Connection Handle
// =============================================================================

/// A live socket as the rest of the system sees it: two channel senders
/// and identity. Cloned freely into snapshots and spawned tasks.
#[derive(Clone)]
pub struct ConnectionHandle {
    /// Unique per socket (a user may hold several)
    pub conn_id: Uuid,
    pub user_id: Uuid,
    /// Registration time; eviction removes the oldest
    pub connected_at: DateTime<Utc>,
    /// Bounded outbound frame channel, drained by the writer task
    frame_tx: mpsc::Sender<ServerFrame>,
    /// Out-of-band close signal (capacity 1; extra signals are dropped)
    close_tx: mpsc::Sender<CloseSignal>,
}

impl ConnectionHandle {
    pub fn new(
        user_id: Uuid,
        frame_tx: mpsc::Sender<ServerFrame>,
        close_tx: mpsc::Sender<CloseSignal>,
    ) -> Self {
        Self {
            conn_id: Uuid::new_v4(),
            user_id,
            connected_at: Utc::now(),
            frame_tx,
            close_tx,
        }
    }

    /// Enqueues a frame for this socket without blocking.
    ///
    /// Returns `false` if the frame was not enqueued. A full buffer means
    /// the client is too slow to keep up; per the backpressure contract
    /// the socket is closed (it will reconnect and replay) rather than
    /// letting one consumer stall the router.
    pub fn send(&self, frame: ServerFrame) -> bool {
        match self.frame_tx.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(conn_id = %self.conn_id, user_id = %self.user_id, "Outbound buffer full, closing slow consumer");
                self.close(CloseSignal::SlowConsumer);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Signals the writer task to close this socket. Idempotent: only the
    /// first signal is acted on.
    pub fn close(&self, signal: CloseSignal) {
        let _ = self.close_tx.try_send(signal);
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("conn_id", &self.conn_id)
            .field("user_id", &self.user_id)
            .field("connected_at", &self.connected_at)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Registry
// =============================================================================

/// user_id → live sockets, with the per-user cap.
pub struct ConnectionRegistry {
    inner: RwLock<HashMap<Uuid, Vec<ConnectionHandle>>>,
    max_per_user: usize,
}

impl ConnectionRegistry {
    pub fn new(max_per_user: usize) -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            max_per_user: max_per_user.max(1),
        }
    }

    /// Admits a new handle, evicting the user's oldest socket if the cap
    /// is reached. The evicted handle is returned so the caller can close
    /// it; the new socket is admitted regardless.
    pub async fn register(&self, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        let mut map = self.inner.write().await;
        let handles = map.entry(handle.user_id).or_default();

        // Vec order is registration order, so index 0 is the oldest.
        let evicted = if handles.len() >= self.max_per_user {
            Some(handles.remove(0))
        } else {
            None
        };

        handles.push(handle);
        evicted
    }

    /// Removes a handle by connection id.
    ///
    /// Returns `true` only when this call removed the user's *last*
    /// socket - the cue to clear the presence key. An already-evicted
    /// connection unregistering itself later returns `false` and leaves
    /// the survivors untouched.
    pub async fn unregister(&self, user_id: Uuid, conn_id: Uuid) -> bool {
        let mut map = self.inner.write().await;

        let Some(handles) = map.get_mut(&user_id) else {
            return false;
        };

        let before = handles.len();
        handles.retain(|h| h.conn_id != conn_id);
        let removed = handles.len() < before;

        if handles.is_empty() {
            map.remove(&user_id);
            removed
        } else {
            false
        }
    }

    /// Cloned snapshot of a user's live sockets; safe to iterate while
    /// the registry keeps changing.
    pub async fn sockets_for(&self, user_id: Uuid) -> Vec<ConnectionHandle> {
        let map = self.inner.read().await;
        map.get(&user_id).cloned().unwrap_or_default()
    }

    /// Cheap membership test.
    pub async fn is_locally_online(&self, user_id: Uuid) -> bool {
        let map = self.inner.read().await;
        map.get(&user_id).is_some_and(|h| !h.is_empty())
    }

    /// Number of live sockets for a user.
    pub async fn connection_count(&self, user_id: Uuid) -> usize {
        let map = self.inner.read().await;
        map.get(&user_id).map_or(0, Vec::len)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::frames::ServerFrame;
    use chrono::Utc;

    fn test_handle(
        user_id: Uuid,
        buffer: usize,
    ) -> (
        ConnectionHandle,
        mpsc::Receiver<ServerFrame>,
        mpsc::Receiver<CloseSignal>,
    ) {
        let (frame_tx, frame_rx) = mpsc::channel(buffer);
        let (close_tx, close_rx) = mpsc::channel(1);
        (
            ConnectionHandle::new(user_id, frame_tx, close_tx),
            frame_rx,
            close_rx,
        )
    }

    fn pong() -> ServerFrame {
        ServerFrame::Pong {
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_register_and_lookup() {
        let registry = ConnectionRegistry::new(5);
        let user = Uuid::new_v4();
        let (handle, _frx, _crx) = test_handle(user, 8);

        assert!(!registry.is_locally_online(user).await);

        let evicted = registry.register(handle).await;
        assert!(evicted.is_none());
        assert!(registry.is_locally_online(user).await);
        assert_eq!(registry.connection_count(user).await, 1);
        assert_eq!(registry.sockets_for(user).await.len(), 1);
    }

    #[tokio::test]
    async fn test_cap_evicts_oldest() {
        let registry = ConnectionRegistry::new(5);
        let user = Uuid::new_v4();

        let mut channels = Vec::new();
        let mut conn_ids = Vec::new();

        // Connect 6 sockets in sequence with MAX=5
        for i in 0..6 {
            let (handle, frx, crx) = test_handle(user, 8);
            conn_ids.push(handle.conn_id);
            let evicted = registry.register(handle).await;

            if i < 5 {
                assert!(evicted.is_none(), "no eviction below the cap");
            } else {
                // Socket #1 is the one evicted
                let evicted = evicted.expect("cap reached, oldest evicted");
                assert_eq!(evicted.conn_id, conn_ids[0]);
            }
            channels.push((frx, crx));
        }

        // Cap holds: never more than 5 registered
        assert_eq!(registry.connection_count(user).await, 5);

        // The survivors are #2..#6
        let live: Vec<Uuid> = registry
            .sockets_for(user)
            .await
            .iter()
            .map(|h| h.conn_id)
            .collect();
        assert_eq!(live, conn_ids[1..].to_vec());
    }

    #[tokio::test]
    async fn test_unregister_reports_last_socket() {
        let registry = ConnectionRegistry::new(5);
        let user = Uuid::new_v4();

        let (h1, _f1, _c1) = test_handle(user, 8);
        let (h2, _f2, _c2) = test_handle(user, 8);
        let (id1, id2) = (h1.conn_id, h2.conn_id);

        registry.register(h1).await;
        registry.register(h2).await;

        // Removing one of two sockets: user still online
        assert!(!registry.unregister(user, id1).await);
        assert!(registry.is_locally_online(user).await);

        // Removing the last: offline
        assert!(registry.unregister(user, id2).await);
        assert!(!registry.is_locally_online(user).await);
    }

    #[tokio::test]
    async fn test_unregister_unknown_conn_is_noop() {
        let registry = ConnectionRegistry::new(5);
        let user = Uuid::new_v4();

        let (h1, _f1, _c1) = test_handle(user, 8);
        registry.register(h1).await;

        // An evicted connection cleaning up later must not clear presence
        // for the survivor.
        assert!(!registry.unregister(user, Uuid::new_v4()).await);
        assert!(registry.is_locally_online(user).await);

        // Unknown user entirely
        assert!(!registry.unregister(Uuid::new_v4(), Uuid::new_v4()).await);
    }

    #[tokio::test]
    async fn test_send_enqueues_frames() {
        let user = Uuid::new_v4();
        let (handle, mut frx, _crx) = test_handle(user, 8);

        assert!(handle.send(pong()));
        assert!(frx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_full_buffer_closes_slow_consumer() {
        let user = Uuid::new_v4();
        let (handle, _frx, mut crx) = test_handle(user, 1);

        // First frame fills the buffer (nobody drains _frx)
        assert!(handle.send(pong()));
        // Second frame overflows: dropped, and a close signal is raised
        assert!(!handle.send(pong()));

        assert_eq!(crx.recv().await, Some(CloseSignal::SlowConsumer));
    }

    #[tokio::test]
    async fn test_snapshot_is_independent_of_mutation() {
        let registry = ConnectionRegistry::new(5);
        let user = Uuid::new_v4();

        let (h1, _f1, _c1) = test_handle(user, 8);
        let id1 = h1.conn_id;
        registry.register(h1).await;

        let snapshot = registry.sockets_for(user).await;

        // Mutate after taking the snapshot
        registry.unregister(user, id1).await;

        // Snapshot still usable
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].conn_id, id1);
        assert_eq!(registry.connection_count(user).await, 0);
    }
}

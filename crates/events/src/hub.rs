//! Notification Hub: identity → live connections, with broadcast publish.
//!
//! The hub is constructed once at process start and shared by cloning (it is
//! a handle over an `Arc`). Each live connection owns a bounded queue; publish
//! never awaits, so a slow or stalled connection can only lose its own
//! messages and never holds up the publisher or its siblings.
//!
//! Delivery is at-most-once and best-effort: an identity with no live
//! connection simply does not receive the event. There is no queue, retry, or
//! persistence of undelivered events.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};

use orderflow_core::UserId;

use crate::event::Event;

/// Outbound buffer per connection unless configured otherwise.
pub const DEFAULT_CONNECTION_BUFFER: usize = 32;

/// Process-unique identifier of one live connection.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl core::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HubError {
    /// Connect attempted without an authenticated identity.
    #[error("connection rejected: unauthenticated")]
    Unauthenticated,
}

/// Outcome of one publish call (for logging and tests only).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub dropped: usize,
}

struct Registry<M> {
    groups: DashMap<UserId, HashMap<ConnectionId, mpsc::Sender<M>>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl<M> Registry<M> {
    fn remove(&self, identity: UserId, id: ConnectionId) -> bool {
        let removed = match self.groups.get_mut(&identity) {
            Some(mut group) => group.remove(&id).is_some(),
            None => false,
        };

        // The shard guard above is released before this call.
        self.groups.remove_if(&identity, |_, group| group.is_empty());
        removed
    }
}

/// Concurrent-safe registry of live connections grouped by identity.
pub struct NotificationHub<M> {
    registry: Arc<Registry<M>>,
}

impl<M> Clone for NotificationHub<M> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
        }
    }
}

impl<M> Default for NotificationHub<M> {
    fn default() -> Self {
        Self::with_buffer(DEFAULT_CONNECTION_BUFFER)
    }
}

impl<M> NotificationHub<M> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            registry: Arc::new(Registry {
                groups: DashMap::new(),
                next_id: AtomicU64::new(1),
                buffer: buffer.max(1),
            }),
        }
    }

    /// Register a new connection for `identity`.
    ///
    /// A missing identity is rejected and nothing is registered. The returned
    /// [`Connection`] deregisters itself when dropped.
    pub fn connect(&self, identity: Option<UserId>) -> Result<Connection<M>, HubError> {
        let identity = identity.ok_or(HubError::Unauthenticated)?;

        let (tx, rx) = mpsc::channel(self.registry.buffer);
        let id = ConnectionId(self.registry.next_id.fetch_add(1, Ordering::Relaxed));

        self.registry
            .groups
            .entry(identity)
            .or_default()
            .insert(id, tx);

        tracing::debug!(user_id = %identity, connection = %id, "connection registered");

        Ok(Connection {
            id,
            identity,
            receiver: rx,
            registry: self.registry.clone(),
        })
    }

    /// Remove a connection. No-op (returns `false`) if it is already gone.
    pub fn disconnect(&self, identity: UserId, id: ConnectionId) -> bool {
        let removed = self.registry.remove(identity, id);
        if removed {
            tracing::debug!(user_id = %identity, connection = %id, "connection removed");
        }
        removed
    }

    /// Number of live connections for `identity`.
    pub fn connection_count(&self, identity: UserId) -> usize {
        self.registry
            .groups
            .get(&identity)
            .map(|group| group.len())
            .unwrap_or(0)
    }

    /// Number of identities with at least one live connection.
    pub fn identity_count(&self) -> usize {
        self.registry.groups.len()
    }
}

impl<M: Event> NotificationHub<M> {
    /// Broadcast `event` to every live connection of its recipient.
    ///
    /// Never blocks. A full connection queue drops the event for that
    /// connection only; a closed one is pruned from the registry.
    pub fn publish(&self, event: M) -> Delivery {
        let target = event.recipient();
        let mut delivery = Delivery::default();
        let mut closed = Vec::new();

        {
            let Some(group) = self.registry.groups.get(&target) else {
                tracing::debug!(
                    user_id = %target,
                    event_type = event.event_type(),
                    occurred_at = %event.occurred_at(),
                    "no live connection; event dropped"
                );
                return delivery;
            };

            for (id, tx) in group.iter() {
                match tx.try_send(event.clone()) {
                    Ok(()) => delivery.delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        delivery.dropped += 1;
                        tracing::warn!(
                            user_id = %target,
                            connection = %id,
                            event_type = event.event_type(),
                            occurred_at = %event.occurred_at(),
                            "connection queue full; event dropped for this connection"
                        );
                    }
                    Err(TrySendError::Closed(_)) => {
                        delivery.dropped += 1;
                        tracing::debug!(user_id = %target, connection = %id, "connection closed; pruning");
                        closed.push(*id);
                    }
                }
            }
        }

        for id in closed {
            self.disconnect(target, id);
        }

        delivery
    }
}

/// One live connection's receiving end.
///
/// Owned by the task that drives the connection. Dropping it (on any exit
/// path of that task) removes the registry entry.
pub struct Connection<M> {
    id: ConnectionId,
    identity: UserId,
    receiver: mpsc::Receiver<M>,
    registry: Arc<Registry<M>>,
}

impl<M> Connection<M> {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn identity(&self) -> UserId {
        self.identity
    }

    /// Wait for the next event addressed to this connection.
    ///
    /// Returns `None` once the connection has been evicted from the hub.
    pub async fn recv(&mut self) -> Option<M> {
        self.receiver.recv().await
    }

    /// Take an already-queued event without waiting.
    pub fn try_recv(&mut self) -> Option<M> {
        self.receiver.try_recv().ok()
    }
}

impl<M> core::fmt::Debug for Connection<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("identity", &self.identity)
            .finish()
    }
}

impl<M> Drop for Connection<M> {
    fn drop(&mut self) {
        if self.registry.remove(self.identity, self.id) {
            tracing::debug!(user_id = %self.identity, connection = %self.id, "connection dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    #[derive(Debug, Clone, PartialEq)]
    struct Ping {
        to: UserId,
        seq: u32,
    }

    impl Event for Ping {
        fn event_type(&self) -> &'static str {
            "ping"
        }

        fn recipient(&self) -> UserId {
            self.to
        }

        fn occurred_at(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    #[test]
    fn unauthenticated_connect_is_rejected_without_registry_entry() {
        let hub: NotificationHub<Ping> = NotificationHub::new();
        let err = hub.connect(None).unwrap_err();
        assert_eq!(err, HubError::Unauthenticated);
        assert_eq!(hub.identity_count(), 0);
    }

    #[test]
    fn every_connection_of_an_identity_receives_the_same_event() {
        let hub = NotificationHub::new();
        let user = UserId::new();
        let mut a = hub.connect(Some(user)).unwrap();
        let mut b = hub.connect(Some(user)).unwrap();
        let mut other = hub.connect(Some(UserId::new())).unwrap();

        let event = Ping { to: user, seq: 7 };
        let delivery = hub.publish(event.clone());

        assert_eq!(delivery, Delivery { delivered: 2, dropped: 0 });
        assert_eq!(a.try_recv(), Some(event.clone()));
        assert_eq!(b.try_recv(), Some(event));
        assert_eq!(other.try_recv(), None);
    }

    #[test]
    fn publish_to_identity_without_connections_is_silently_dropped() {
        let hub = NotificationHub::new();
        let delivery = hub.publish(Ping { to: UserId::new(), seq: 1 });
        assert_eq!(delivery, Delivery::default());
    }

    #[test]
    fn dropping_a_connection_deregisters_it() {
        let hub: NotificationHub<Ping> = NotificationHub::new();
        let user = UserId::new();
        let a = hub.connect(Some(user)).unwrap();
        let b = hub.connect(Some(user)).unwrap();
        assert_eq!(hub.connection_count(user), 2);

        drop(a);
        assert_eq!(hub.connection_count(user), 1);

        drop(b);
        assert_eq!(hub.connection_count(user), 0);
        assert_eq!(hub.identity_count(), 0);
    }

    #[test]
    fn explicit_disconnect_is_idempotent() {
        let hub: NotificationHub<Ping> = NotificationHub::new();
        let user = UserId::new();
        let conn = hub.connect(Some(user)).unwrap();

        assert!(hub.disconnect(user, conn.id()));
        assert!(!hub.disconnect(user, conn.id()));
        drop(conn);
        assert_eq!(hub.identity_count(), 0);
    }

    #[test]
    fn full_queue_drops_only_for_the_slow_connection() {
        let hub = NotificationHub::with_buffer(1);
        let user = UserId::new();
        let mut slow = hub.connect(Some(user)).unwrap();
        let mut fast = hub.connect(Some(user)).unwrap();

        hub.publish(Ping { to: user, seq: 1 });
        assert_eq!(fast.try_recv().map(|p| p.seq), Some(1));

        let delivery = hub.publish(Ping { to: user, seq: 2 });
        assert_eq!(delivery, Delivery { delivered: 1, dropped: 1 });
        assert_eq!(fast.try_recv().map(|p| p.seq), Some(2));

        assert_eq!(slow.try_recv().map(|p| p.seq), Some(1));
        assert_eq!(slow.try_recv(), None);
        assert_eq!(hub.connection_count(user), 2);
    }

    #[test]
    fn publish_prunes_a_connection_whose_receiver_is_gone() {
        let hub = NotificationHub::new();
        let user = UserId::new();
        let mut live = hub.connect(Some(user)).unwrap();

        // A sender left behind by a receiver that went away without deregistering.
        let (orphan_tx, orphan_rx) = mpsc::channel(1);
        drop(orphan_rx);
        let orphan = ConnectionId(u64::MAX);
        hub.registry.groups.entry(user).or_default().insert(orphan, orphan_tx);
        assert_eq!(hub.connection_count(user), 2);

        let delivery = hub.publish(Ping { to: user, seq: 3 });

        assert_eq!(delivery, Delivery { delivered: 1, dropped: 1 });
        assert_eq!(live.try_recv().map(|p| p.seq), Some(3));
        assert_eq!(hub.connection_count(user), 1);
        assert!(!hub.disconnect(user, orphan));

        drop(live);
        assert_eq!(hub.identity_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_connect_publish_disconnect_leaves_no_entries() {
        let hub: NotificationHub<Ping> = NotificationHub::new();
        let users: Vec<UserId> = (0..8).map(|_| UserId::new()).collect();

        let mut tasks = Vec::new();
        for i in 0..64u32 {
            let hub = hub.clone();
            let user = users[i as usize % users.len()];
            tasks.push(tokio::spawn(async move {
                let mut conn = hub.connect(Some(user)).unwrap();
                hub.publish(Ping { to: user, seq: i });
                tokio::task::yield_now().await;
                let _ = conn.try_recv();
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }

        assert_eq!(hub.identity_count(), 0);
    }

    #[tokio::test]
    async fn recv_waits_for_published_event() {
        let hub = NotificationHub::new();
        let user = UserId::new();
        let mut conn = hub.connect(Some(user)).unwrap();

        let publisher = hub.clone();
        tokio::spawn(async move {
            publisher.publish(Ping { to: user, seq: 42 });
        });

        let got = conn.recv().await.unwrap();
        assert_eq!(got.seq, 42);
    }
}

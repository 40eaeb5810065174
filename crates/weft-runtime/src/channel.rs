//! Federation of managers across threads.
//!
//! A [`CommunicationChannel`] is a registry of manager queues keyed by
//! manager id. Broadcasting enqueues a fresh event on every *other* peer's
//! queue: fire-and-forget, no back-channel, no cross-peer fault
//! propagation. The channel holds weak references — it never keeps a
//! manager alive, and a peer torn down mid-broadcast is simply skipped.
//!
//! ```text
//!   thread 1                 thread 2                 thread 3
//! ┌───────────┐            ┌───────────┐            ┌───────────┐
//! │ manager A │            │ manager B │            │ manager C │
//! └─────┬─────┘            └─────▲─────┘            └─────▲─────┘
//!       │     broadcast_quit     │  push Quit             │  push Quit
//!       └──────────► CommunicationChannel ────────────────┘
//! ```

use crate::event::{self, EventPayload};
use crate::queue::EventQueue;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use weft_event::UserEvent;
use weft_types::{ManagerId, Priority, ServiceId, INTERNAL_PRIORITY};

/// Broadcast fabric linking managers on different threads.
///
/// `Clone` shares the same peer table. Thread-safe.
#[derive(Clone, Default)]
pub struct CommunicationChannel {
    peers: Arc<RwLock<HashMap<ManagerId, Weak<EventQueue>>>>,
}

impl CommunicationChannel {
    /// Creates an empty channel.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a manager with the channel. Idempotent per manager id.
    ///
    /// The manager keeps a back-reference so services can reach the channel
    /// through their context.
    pub fn register(&self, manager: &crate::ManagerRef) {
        let handle = manager.queue_handle();
        self.peers
            .write()
            .insert(manager.id(), Arc::downgrade(&handle.queue));
        manager.set_channel(Some(self.clone()));
        tracing::debug!(manager = %manager.id(), "registered with communication channel");
    }

    /// Removes a manager from the channel. Broadcasts already in flight may
    /// still deliver to it.
    pub fn unregister(&self, manager: &crate::ManagerRef) {
        self.peers.write().remove(&manager.id());
        manager.set_channel(None);
    }

    /// Number of registered peers (dead peers included until pruned).
    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.peers.read().len()
    }

    /// Enqueues a quit event on every peer except `sender`.
    pub fn broadcast_quit(&self, sender: ManagerId, origin: ServiceId) {
        self.for_each_peer(sender, |queue| {
            queue.push(
                origin,
                INTERNAL_PRIORITY,
                event::quit_event(),
                EventPayload::Quit,
                false,
            );
        });
    }

    /// Enqueues a clone of `payload` on every peer except `sender`,
    /// preserving the origin id.
    pub fn broadcast_event<E: UserEvent + Clone>(
        &self,
        sender: ManagerId,
        origin: ServiceId,
        payload: E,
    ) {
        self.broadcast_prioritised_event(sender, origin, INTERNAL_PRIORITY, payload);
    }

    /// [`broadcast_event`](Self::broadcast_event) at an explicit priority.
    pub fn broadcast_prioritised_event<E: UserEvent + Clone>(
        &self,
        sender: ManagerId,
        origin: ServiceId,
        priority: Priority,
        payload: E,
    ) {
        self.for_each_peer(sender, |queue| {
            queue.push(
                origin,
                priority,
                E::event_type(),
                EventPayload::User(Box::new(payload.clone())),
                false,
            );
        });
    }

    fn for_each_peer(&self, sender: ManagerId, f: impl Fn(&EventQueue)) {
        // Snapshot under the read lock; pushes happen outside it so a slow
        // peer queue never blocks the table.
        let peers: Vec<Arc<EventQueue>> = self
            .peers
            .read()
            .iter()
            .filter(|(id, _)| **id != sender)
            .filter_map(|(_, queue)| queue.upgrade())
            .collect();
        for queue in peers {
            f(&queue);
        }
    }
}

impl std::fmt::Debug for CommunicationChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommunicationChannel")
            .field("peers", &self.peer_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DependencyManager;

    #[test]
    fn register_is_idempotent() {
        let channel = CommunicationChannel::new();
        let dm = DependencyManager::new();
        channel.register(&dm);
        channel.register(&dm);
        assert_eq!(channel.peer_count(), 1);
        assert!(dm.communication_channel().is_some());
    }

    #[test]
    fn unregister_clears_back_reference() {
        let channel = CommunicationChannel::new();
        let dm = DependencyManager::new();
        channel.register(&dm);
        channel.unregister(&dm);
        assert_eq!(channel.peer_count(), 0);
        assert!(dm.communication_channel().is_none());
    }

    #[test]
    fn broadcast_skips_sender() {
        let channel = CommunicationChannel::new();
        let a = DependencyManager::new();
        let b = DependencyManager::new();
        channel.register(&a);
        channel.register(&b);

        channel.broadcast_quit(a.id(), ServiceId::NONE);

        // Only B received the quit.
        assert_eq!(a.queue_handle().queue.len(), 0);
        assert_eq!(b.queue_handle().queue.len(), 1);
    }
}

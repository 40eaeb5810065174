//! The per-manager prioritized event queue.
//!
//! A multimap keyed by `(priority, event id)`: numerically smaller
//! priorities pop first, and because event ids are issued in push order,
//! equal priorities pop FIFO. Push is thread-safe and cheap (the mutex is
//! held for the map insert only); popping is single-consumer — the owning
//! manager's loop thread.
//!
//! The queue is the only point of mandatory cross-thread synchronization on
//! the hot path. It also carries the bookkeeping behind
//! `wait_for_empty_queue`: a queue counts as busy while an event is being
//! dispatched or any generator is suspended, not merely while the map is
//! non-empty.

use crate::event::{Event, EventPayload};
use parking_lot::{Condvar, Mutex};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use weft_event::{EventMeta, ResumeScheduler, ResumeToken};
use weft_types::{EventId, EventTypeId, Priority, ServiceId};

struct QueueInner {
    events: BTreeMap<(Priority, u64), Event>,
    /// An event has been popped and is being dispatched.
    dispatching: bool,
    /// Generators parked awaiting a resumption.
    suspended: usize,
}

impl QueueInner {
    fn is_idle(&self) -> bool {
        self.events.is_empty() && !self.dispatching && self.suspended == 0
    }
}

/// Thread-safe prioritized multimap of pending events.
///
/// One mutex, two condition variables: `pop_cond` wakes the single consumer
/// (push wakes at most one waiter), `idle_cond` wakes `wait_for_empty`
/// observers on busy→idle transitions.
pub struct EventQueue {
    inner: Mutex<QueueInner>,
    pop_cond: Condvar,
    idle_cond: Condvar,
    next_event_id: AtomicU64,
    /// Set on Quit: public pushes are accepted silently and dropped.
    closed: AtomicBool,
    /// Set at manager teardown: pops return the terminal sentinel.
    shut_down: AtomicBool,
}

impl EventQueue {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(QueueInner {
                events: BTreeMap::new(),
                dispatching: false,
                suspended: 0,
            }),
            pop_cond: Condvar::new(),
            idle_cond: Condvar::new(),
            next_event_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
        })
    }

    /// Pushes an event, assigning its id.
    ///
    /// Returns [`EventId::NONE`] without enqueueing when the queue is closed
    /// and the push is not framework-internal.
    pub(crate) fn push(
        &self,
        origin: ServiceId,
        priority: Priority,
        event_type: EventTypeId,
        payload: EventPayload,
        internal: bool,
    ) -> EventId {
        if !internal && self.closed.load(Ordering::Acquire) {
            tracing::trace!(%origin, %event_type, "push after quit, dropping");
            return EventId::NONE;
        }

        let raw = self.next_event_id.fetch_add(1, Ordering::AcqRel);
        let id = EventId::from_raw(raw);
        let meta = EventMeta {
            id,
            event_type,
            origin,
            priority,
        };

        let mut inner = self.inner.lock();
        inner.events.insert((priority, raw), Event { meta, payload });
        drop(inner);
        self.pop_cond.notify_one();
        id
    }

    /// Blocking single-consumer pop. Returns `None` once
    /// [`shutdown`](Self::shutdown) was called and is observed.
    ///
    /// The popped event counts as "dispatching" until
    /// [`dispatch_done`](Self::dispatch_done).
    pub(crate) fn pop_highest(&self) -> Option<Event> {
        let mut inner = self.inner.lock();
        loop {
            if self.shut_down.load(Ordering::Acquire) {
                return None;
            }
            if let Some(entry) = inner.events.pop_first() {
                inner.dispatching = true;
                return Some(entry.1);
            }
            if inner.is_idle() {
                self.idle_cond.notify_all();
            }
            self.pop_cond.wait(&mut inner);
        }
    }

    /// Non-blocking pop used while draining after Quit.
    pub(crate) fn try_pop(&self) -> Option<Event> {
        let mut inner = self.inner.lock();
        let event = inner.events.pop_first().map(|e| e.1);
        if event.is_some() {
            inner.dispatching = true;
        }
        event
    }

    /// Marks the popped event fully processed.
    pub(crate) fn dispatch_done(&self) {
        let mut inner = self.inner.lock();
        inner.dispatching = false;
        if inner.is_idle() {
            self.idle_cond.notify_all();
        }
    }

    /// Records a generator parking / resuming.
    pub(crate) fn add_suspended(&self) {
        self.inner.lock().suspended += 1;
    }

    pub(crate) fn remove_suspended(&self) {
        let mut inner = self.inner.lock();
        inner.suspended = inner.suspended.saturating_sub(1);
        if inner.is_idle() {
            self.idle_cond.notify_all();
        }
    }

    /// Stops accepting public pushes (Quit semantics).
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Wakes every waiter; subsequent pops return the terminal sentinel.
    pub(crate) fn shutdown(&self) {
        self.shut_down.store(true, Ordering::Release);
        let _inner = self.inner.lock();
        self.pop_cond.notify_all();
        self.idle_cond.notify_all();
    }

    /// Blocks until no events are queued, none is being dispatched, and no
    /// generator is suspended — or until shutdown.
    pub(crate) fn wait_for_empty(&self) {
        let mut inner = self.inner.lock();
        while !inner.is_idle() && !self.shut_down.load(Ordering::Acquire) {
            self.idle_cond.wait(&mut inner);
        }
    }

    /// Number of queued events. Diagnostic only.
    pub(crate) fn len(&self) -> usize {
        self.inner.lock().events.len()
    }
}

impl ResumeScheduler for EventQueue {
    fn schedule_resume(&self, token: ResumeToken, priority: Priority) {
        // Resumptions are framework-internal: they must land even while the
        // queue drains after Quit, or suspended handlers could never finish.
        self.push(
            ServiceId::NONE,
            priority,
            crate::event::continuable_event(),
            EventPayload::Continuable(token),
            true,
        );
    }
}

/// Cross-thread surface of one manager's queue.
///
/// `Send + Sync + Clone`; the only supported way for other threads to talk
/// to a manager. All registry access stays confined to the owning thread.
#[derive(Clone)]
pub struct QueueHandle {
    pub(crate) queue: Arc<EventQueue>,
}

impl QueueHandle {
    /// Pushes a user event at the default priority.
    ///
    /// Returns [`EventId::NONE`] if the target manager is quitting.
    pub fn push_event<E: weft_event::UserEvent>(&self, origin: ServiceId, payload: E) -> EventId {
        self.push_prioritised_event(origin, weft_types::INTERNAL_PRIORITY, payload)
    }

    /// Pushes a user event at an explicit priority.
    pub fn push_prioritised_event<E: weft_event::UserEvent>(
        &self,
        origin: ServiceId,
        priority: Priority,
        payload: E,
    ) -> EventId {
        self.queue.push(
            origin,
            priority,
            E::event_type(),
            EventPayload::User(Box::new(payload)),
            false,
        )
    }

    /// Pushes the quit event, asking the manager to drain and stop.
    pub fn push_quit(&self, origin: ServiceId) -> EventId {
        self.queue.push(
            origin,
            weft_types::INTERNAL_PRIORITY,
            crate::event::quit_event(),
            EventPayload::Quit,
            false,
        )
    }

    /// Blocks until the target manager has no queued events, no running
    /// dispatch and no suspended generators.
    pub fn wait_for_empty_queue(&self) {
        self.queue.wait_for_empty();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_types::INTERNAL_PRIORITY;

    fn push_marker(queue: &EventQueue, priority: Priority) -> EventId {
        queue.push(
            ServiceId::NONE,
            priority,
            crate::event::quit_event(),
            EventPayload::Quit,
            false,
        )
    }

    #[test]
    fn lower_priority_value_pops_first() {
        let queue = EventQueue::new();
        push_marker(&queue, 20);
        push_marker(&queue, 10);
        // Pushed later but numerically smaller: must pop first.
        let first = queue.pop_highest().unwrap();
        assert_eq!(first.meta.priority, 10);
        queue.dispatch_done();
        let second = queue.pop_highest().unwrap();
        assert_eq!(second.meta.priority, 20);
        queue.dispatch_done();
    }

    #[test]
    fn fifo_within_priority() {
        let queue = EventQueue::new();
        let a = push_marker(&queue, INTERNAL_PRIORITY);
        let b = push_marker(&queue, INTERNAL_PRIORITY);
        assert!(a < b);
        assert_eq!(queue.pop_highest().unwrap().meta.id, a);
        queue.dispatch_done();
        assert_eq!(queue.pop_highest().unwrap().meta.id, b);
        queue.dispatch_done();
    }

    #[test]
    fn event_ids_strictly_increase_across_priorities() {
        let queue = EventQueue::new();
        let ids: Vec<_> = [5u64, 1, 3].iter().map(|p| push_marker(&queue, *p)).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn closed_queue_rejects_public_pushes_silently() {
        let queue = EventQueue::new();
        queue.close();
        assert_eq!(push_marker(&queue, 1), EventId::NONE);
        assert_eq!(queue.len(), 0);

        // Internal pushes still land (needed to drain after Quit).
        let id = queue.push(
            ServiceId::NONE,
            1,
            crate::event::quit_event(),
            EventPayload::Quit,
            true,
        );
        assert!(!id.is_none());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn shutdown_wakes_blocked_consumer() {
        let queue = EventQueue::new();
        let q2 = queue.clone();
        let consumer = std::thread::spawn(move || q2.pop_highest());
        std::thread::sleep(std::time::Duration::from_millis(20));
        queue.shutdown();
        assert!(consumer.join().unwrap().is_none());
    }

    #[test]
    fn wait_for_empty_tracks_dispatch_and_suspension() {
        let queue = EventQueue::new();
        push_marker(&queue, 1);

        let event = queue.pop_highest().unwrap();
        drop(event);
        queue.add_suspended();
        queue.dispatch_done();

        // Still busy: one suspended generator.
        let q2 = queue.clone();
        let waiter = std::thread::spawn(move || q2.wait_for_empty());
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(!waiter.is_finished());

        queue.remove_suspended();
        waiter.join().unwrap();
    }

    #[test]
    fn cross_thread_push() {
        let queue = EventQueue::new();
        let handle = QueueHandle {
            queue: queue.clone(),
        };

        struct Poke;
        impl weft_event::EventKind for Poke {}

        let pusher = std::thread::spawn(move || {
            handle.push_event(ServiceId::from_raw(1), Poke);
        });
        pusher.join().unwrap();

        let event = queue.pop_highest().unwrap();
        assert_eq!(event.meta.event_type, <Poke as weft_event::EventKind>::event_type());
        queue.dispatch_done();
    }
}

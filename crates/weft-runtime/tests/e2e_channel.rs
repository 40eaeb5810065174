//! Multi-manager tests: broadcasts, cross-thread pushes, and thread
//! affinity of dispatch.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread::ThreadId;
use weft_event::{AsyncGenerator, EventKind, EventMeta};
use weft_runtime::{CommunicationChannel, DependencyManager, ServiceSpec};
use weft_service::{EventHandler, Service, StartBehaviour};
use weft_types::ServiceId;

/// Records which thread ran the service's stop callback.
struct ThreadProbe {
    index: usize,
    stops: Arc<Mutex<Vec<(usize, ThreadId)>>>,
}

impl Service for ThreadProbe {
    fn start(&mut self) -> StartBehaviour {
        StartBehaviour::Succeeded
    }

    fn stop(&mut self) -> StartBehaviour {
        self.stops
            .lock()
            .unwrap()
            .push((self.index, std::thread::current().id()));
        StartBehaviour::Succeeded
    }
}

/// Seed case: two managers on two threads linked by a channel; one
/// broadcasts quit. Both loops terminate, and each manager runs its own
/// services' stop callbacks on its own thread.
#[test]
fn broadcast_quit_stops_both_managers() {
    let channel = CommunicationChannel::new();
    let barrier = Arc::new(Barrier::new(2));
    let stops: Arc<Mutex<Vec<(usize, ThreadId)>>> = Arc::new(Mutex::new(Vec::new()));

    let mut workers = Vec::new();
    for index in 0..2 {
        let channel = channel.clone();
        let barrier = barrier.clone();
        let stops = stops.clone();
        workers.push(std::thread::spawn(move || {
            let dm = DependencyManager::new();
            channel.register(&dm);
            let stops2 = stops.clone();
            dm.create_service(ServiceSpec::new(move |_reg, _props, _ctx| ThreadProbe {
                index,
                stops: stops2,
            }))
            .unwrap();

            // Both peers must be registered before anyone broadcasts.
            barrier.wait();
            if index == 0 {
                channel.broadcast_quit(dm.id(), ServiceId::NONE);
                dm.push_quit(ServiceId::NONE);
            }
            dm.start();
            std::thread::current().id()
        }));
    }

    let loop_threads: Vec<ThreadId> = workers
        .into_iter()
        .map(|w| w.join().expect("manager thread panicked"))
        .collect();

    let stops = stops.lock().unwrap();
    assert_eq!(stops.len(), 2, "both services must stop: {stops:?}");
    for (index, thread) in stops.iter() {
        // Thread affinity: each stop ran on its own manager's loop thread.
        assert_eq!(*thread, loop_threads[*index]);
    }
}

#[derive(Clone)]
struct Notice(u32);
impl EventKind for Notice {}

/// Broadcast user events reach every peer but never the sender, with the
/// origin id preserved.
#[test]
fn broadcast_event_skips_sender_and_preserves_origin() {
    struct Listens {
        received: Arc<AtomicUsize>,
        origin_seen: Arc<Mutex<Option<ServiceId>>>,
    }

    impl Service for Listens {
        fn start(&mut self) -> StartBehaviour {
            StartBehaviour::Succeeded
        }
        fn stop(&mut self) -> StartBehaviour {
            StartBehaviour::Succeeded
        }
    }

    impl EventHandler<Notice> for Listens {
        fn handle_event(&mut self, event: &Notice, meta: &EventMeta) -> AsyncGenerator<()> {
            assert_eq!(event.0, 42);
            self.received.fetch_add(1, Ordering::SeqCst);
            *self.origin_seen.lock().unwrap() = Some(meta.origin);
            AsyncGenerator::ready()
        }
    }

    let channel = CommunicationChannel::new();
    let received = Arc::new(AtomicUsize::new(0));
    let origin_seen: Arc<Mutex<Option<ServiceId>>> = Arc::new(Mutex::new(None));
    let origin = ServiceId::from_raw(123_456);
    let barrier = Arc::new(Barrier::new(2));

    let receiver = {
        let channel = channel.clone();
        let received = received.clone();
        let origin_seen = origin_seen.clone();
        let barrier = barrier.clone();
        std::thread::spawn(move || {
            let dm = DependencyManager::new();
            channel.register(&dm);
            let r2 = received.clone();
            let o2 = origin_seen.clone();
            let id = dm
                .create_service(ServiceSpec::new(move |_reg, _props, _ctx| Listens {
                    received: r2,
                    origin_seen: o2,
                }))
                .unwrap();
            let _r = dm.register_event_handler::<Notice, Listens>(id, None).unwrap();
            barrier.wait();
            dm.start();
        })
    };

    let sender = {
        let channel = channel.clone();
        std::thread::spawn(move || {
            let dm = DependencyManager::new();
            channel.register(&dm);
            barrier.wait();
            channel.broadcast_event(dm.id(), origin, Notice(42));
            channel.broadcast_quit(dm.id(), ServiceId::NONE);
            dm.push_quit(ServiceId::NONE);
            dm.start();
        })
    };

    receiver.join().unwrap();
    sender.join().unwrap();

    // Exactly one delivery (the sender never receives its own broadcast).
    assert_eq!(received.load(Ordering::SeqCst), 1);
    assert_eq!(*origin_seen.lock().unwrap(), Some(origin));
}

/// Cross-thread producers only ever touch the queue handle; events execute
/// on the owning manager's thread.
#[test]
fn queue_handle_push_executes_on_loop_thread() {
    let dm = DependencyManager::new();
    let handle = dm.queue_handle();
    let seen_on: Arc<Mutex<Option<ThreadId>>> = Arc::new(Mutex::new(None));

    let seen = seen_on.clone();
    let producer = std::thread::spawn(move || {
        handle.push_event(ServiceId::NONE, Notice(42));
        handle.push_quit(ServiceId::NONE);
    });
    producer.join().unwrap();

    let seen2 = seen.clone();
    dm.run_function(ServiceId::NONE, move |_m| {
        AsyncGenerator::new(move |_y| async move {
            *seen2.lock().unwrap() = Some(std::thread::current().id());
            Ok(())
        })
    });

    dm.start();
    assert_eq!(*seen_on.lock().unwrap(), Some(std::thread::current().id()));
}

//! Dependency-tracker tests, driven through the logger admin: on-demand
//! provider creation, per-requestor filtering, request properties, and
//! undo teardown.

mod common;

use common::Recorder;
use std::cell::RefCell;
use std::rc::Rc;
use weft_runtime::{DependencyManager, Logger, LoggerAdmin, ServiceSpec, TracingLogger};
use weft_service::{DependencyRegister, Injected, Service, StartBehaviour};
use weft_types::{keys, LogLevel, Properties, PropertyValue, ServiceId};

/// A service that requires a logger, records which provider it got, and
/// writes one debug line through it at injection time.
struct NeedsLogger {
    recorder: Recorder,
    label: &'static str,
    logger: Option<Injected<dyn Logger>>,
}

impl NeedsLogger {
    fn spec(
        recorder: Recorder,
        label: &'static str,
        request_properties: Option<Properties>,
    ) -> ServiceSpec<Self> {
        ServiceSpec::new(move |reg: &mut DependencyRegister<Self>, _props, _ctx| {
            let inject_rec = recorder.clone();
            let remove_rec = recorder.clone();
            reg.register_with::<dyn Logger, _, _>(
                true,
                request_properties,
                move |me: &mut Self, logger: Injected<dyn Logger>, provider| {
                    inject_rec.push(format!("{}.got-logger({provider})", me.label));
                    logger.borrow_mut().log(LogLevel::Debug, "wired");
                    me.logger = Some(logger);
                },
                move |me: &mut Self, provider| {
                    remove_rec.push(format!("{}.lost-logger({provider})", me.label));
                    me.logger = None;
                },
            );
            Self {
                recorder,
                label,
                logger: None,
            }
        })
    }
}

impl Service for NeedsLogger {
    fn start(&mut self) -> StartBehaviour {
        self.recorder.push(format!("{}.start", self.label));
        StartBehaviour::Succeeded
    }

    fn stop(&mut self) -> StartBehaviour {
        self.recorder.push(format!("{}.stop", self.label));
        StartBehaviour::Succeeded
    }
}

/// Logger back-end recording every line that passes its threshold.
struct RecordingLogger {
    level: LogLevel,
    target: Option<ServiceId>,
    sink: Rc<RefCell<Vec<(ServiceId, LogLevel)>>>,
}

impl Service for RecordingLogger {
    fn start(&mut self) -> StartBehaviour {
        StartBehaviour::Succeeded
    }
    fn stop(&mut self) -> StartBehaviour {
        StartBehaviour::Succeeded
    }
}

impl Logger for RecordingLogger {
    fn log_level(&self) -> LogLevel {
        self.level
    }
    fn set_log_level(&mut self, level: LogLevel) {
        self.level = level;
    }
    fn log(&mut self, level: LogLevel, _message: &str) {
        if self.enabled(level) {
            if let Some(target) = self.target {
                self.sink.borrow_mut().push((target, level));
            }
        }
    }
}

/// The admin materializes one logger per requestor, and the filter keeps
/// each logger wired to its own requestor only.
#[test]
fn one_logger_per_requestor() {
    common::init_tracing();
    let recorder = Recorder::new();
    let dm = DependencyManager::new();

    dm.create_service(LoggerAdmin::spec(TracingLogger::from_properties))
        .unwrap();
    dm.create_service(NeedsLogger::spec(recorder.clone(), "x", None))
        .unwrap();
    dm.create_service(NeedsLogger::spec(recorder.clone(), "y", None))
        .unwrap();
    dm.push_quit(ServiceId::NONE);

    dm.start();

    let entries = recorder.entries();
    let x_got: Vec<&String> = entries.iter().filter(|e| e.starts_with("x.got-logger")).collect();
    let y_got: Vec<&String> = entries.iter().filter(|e| e.starts_with("y.got-logger")).collect();
    assert_eq!(x_got.len(), 1, "{entries:?}");
    assert_eq!(y_got.len(), 1, "{entries:?}");
    // Distinct providers: each logger is scoped to its own requestor.
    let y_as_x = y_got[0].replace("y.", "x.");
    assert_ne!(*x_got[0], y_as_x, "{entries:?}");

    // Both consumers reached active and stopped at quit.
    assert_eq!(recorder.count_of("x.stop"), 1);
    assert_eq!(recorder.count_of("y.stop"), 1);
}

/// A consumer registered before the admin still gets a logger: tracker
/// registration replays existing unfulfilled requests.
#[test]
fn tracker_replays_existing_requests() {
    let recorder = Recorder::new();
    let dm = DependencyManager::new();

    dm.create_service(NeedsLogger::spec(recorder.clone(), "early", None))
        .unwrap();
    dm.create_service(LoggerAdmin::spec(TracingLogger::from_properties))
        .unwrap();
    dm.push_quit(ServiceId::NONE);

    dm.start();

    let entries = recorder.entries();
    assert_eq!(
        entries.iter().filter(|e| e.starts_with("early.got-logger")).count(),
        1,
        "{entries:?}"
    );
    assert_eq!(recorder.count_of("early.stop"), 1);
}

/// Request properties reach the created provider: the requested level is
/// honored, including its threshold.
#[test]
fn request_properties_thread_through() {
    let sink: Rc<RefCell<Vec<(ServiceId, LogLevel)>>> = Rc::new(RefCell::new(Vec::new()));
    let recorder = Recorder::new();
    let dm = DependencyManager::new();

    let sink2 = sink.clone();
    dm.create_service(LoggerAdmin::spec(move |props: &Properties| RecordingLogger {
        level: props.get_log_level(keys::LOG_LEVEL).unwrap_or_default(),
        target: props.target_service_id(),
        sink: sink2.clone(),
    }))
    .unwrap();

    // "verbose" asks for Debug: its wiring line is recorded. "quiet" asks
    // for Error: the Debug wiring line is below its threshold.
    let verbose = dm
        .create_service(NeedsLogger::spec(
            recorder.clone(),
            "verbose",
            Some(Properties::new().with(keys::LOG_LEVEL, PropertyValue::LogLevel(LogLevel::Debug))),
        ))
        .unwrap();
    let _quiet = dm
        .create_service(NeedsLogger::spec(
            recorder.clone(),
            "quiet",
            Some(Properties::new().with(keys::LOG_LEVEL, PropertyValue::LogLevel(LogLevel::Error))),
        ))
        .unwrap();
    dm.push_quit(ServiceId::NONE);

    dm.start();

    assert_eq!(*sink.borrow(), vec![(verbose, LogLevel::Debug)]);
}

/// Removing a requestor triggers the undo request and the admin tears the
/// materialized logger down with it.
#[test]
fn undo_request_tears_logger_down() {
    let recorder = Recorder::new();
    let dm = DependencyManager::new();

    dm.create_service(LoggerAdmin::spec(TracingLogger::from_properties))
        .unwrap();
    let consumer = dm
        .create_service(NeedsLogger::spec(recorder.clone(), "c", None))
        .unwrap();

    // Defer the removal past the wiring, and the quit past the undo, so the
    // admin is still live when the undo request arrives.
    dm.run_function(ServiceId::NONE, move |mgr| {
        mgr.remove_service(ServiceId::NONE, consumer);
        mgr.run_function(ServiceId::NONE, |inner| {
            inner.run_function(ServiceId::NONE, |innermost| {
                innermost.push_quit(ServiceId::NONE);
                weft_event::AsyncGenerator::ready()
            });
            weft_event::AsyncGenerator::ready()
        });
        weft_event::AsyncGenerator::ready()
    });

    dm.start();

    let entries = recorder.entries();
    assert_eq!(
        entries.iter().filter(|e| e.starts_with("c.got-logger")).count(),
        1,
        "{entries:?}"
    );
    assert_eq!(recorder.count_of("c.stop"), 1);
    // Removed, never reinstalled.
    assert!(dm.service_state(consumer).is_none());
}

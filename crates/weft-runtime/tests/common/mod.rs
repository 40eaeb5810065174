#![allow(dead_code)]
//! Shared helpers for the runtime integration suites.
//!
//! Tests observe the framework through a [`Recorder`]: services append
//! labelled entries at every lifecycle callback, and assertions compare the
//! full sequence. The recorder is `Rc`-shared — every test drives a single
//! manager on the test thread, so no synchronization is needed.

use std::cell::RefCell;
use std::rc::Rc;
use weft_runtime::{ServiceContext, ServiceSpec};
use weft_service::{DependencyRegister, Injected, Service, StartBehaviour};

/// Installs a fmt subscriber when `WEFT_TEST_LOG` is set, so a failing run
/// can be re-driven with full framework tracing.
pub fn init_tracing() {
    if std::env::var_os("WEFT_TEST_LOG").is_some() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
}

/// Shared, ordered log of observed callbacks.
#[derive(Clone, Default)]
pub struct Recorder {
    entries: Rc<RefCell<Vec<String>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.entries.borrow_mut().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.borrow().clone()
    }

    pub fn count_of(&self, entry: &str) -> usize {
        self.entries.borrow().iter().filter(|e| *e == entry).count()
    }

    /// Index of the first occurrence, panicking with the full log if absent.
    pub fn index_of(&self, entry: &str) -> usize {
        let entries = self.entries.borrow();
        entries
            .iter()
            .position(|e| e == entry)
            .unwrap_or_else(|| panic!("'{entry}' not recorded; log: {entries:?}"))
    }

    /// Asserts `earlier` was recorded before `later`.
    pub fn assert_order(&self, earlier: &str, later: &str) {
        assert!(
            self.index_of(earlier) < self.index_of(later),
            "expected '{earlier}' before '{later}'; log: {:?}",
            self.entries()
        );
    }
}

/// Marker interface used by the dependency-wiring tests.
pub trait Useless {
    fn poke(&self) -> &'static str;
}

/// Provider of [`Useless`] that records its lifecycle.
pub struct UselessService {
    recorder: Recorder,
    label: &'static str,
}

impl UselessService {
    /// Spec exposing [`Useless`], recording as `<label>.start` / `<label>.stop`.
    pub fn spec(recorder: Recorder, label: &'static str) -> ServiceSpec<Self> {
        ServiceSpec::new(move |_reg, _props, _ctx| Self { recorder, label })
            .exposes::<dyn Useless, _>(|s| s)
    }
}

impl Service for UselessService {
    fn start(&mut self) -> StartBehaviour {
        self.recorder.push(format!("{}.start", self.label));
        StartBehaviour::Succeeded
    }

    fn stop(&mut self) -> StartBehaviour {
        self.recorder.push(format!("{}.stop", self.label));
        StartBehaviour::Succeeded
    }
}

impl Useless for UselessService {
    fn poke(&self) -> &'static str {
        self.label
    }
}

/// Consumer of [`Useless`] that records injection and lifecycle.
pub struct DependentService {
    pub ctx: ServiceContext,
    recorder: Recorder,
    label: &'static str,
    pub peer: Option<Injected<dyn Useless>>,
}

impl DependentService {
    pub fn spec(recorder: Recorder, label: &'static str, required: bool) -> ServiceSpec<Self> {
        ServiceSpec::new(move |reg: &mut DependencyRegister<Self>, _props, ctx| {
            let inject_rec = recorder.clone();
            let remove_rec = recorder.clone();
            let inject = move |me: &mut Self, peer: Injected<dyn Useless>, provider| {
                inject_rec.push(format!("{}.inject({provider})", me.label));
                me.peer = Some(peer);
            };
            let remove = move |me: &mut Self, provider| {
                remove_rec.push(format!("{}.remove({provider})", me.label));
                me.peer = None;
            };
            if required {
                reg.register_required::<dyn Useless, _, _>(inject, remove);
            } else {
                reg.register_optional::<dyn Useless, _, _>(inject, remove);
            }
            Self {
                ctx: ctx.clone(),
                recorder,
                label,
                peer: None,
            }
        })
    }
}

impl Service for DependentService {
    fn start(&mut self) -> StartBehaviour {
        self.recorder.push(format!("{}.start", self.label));
        StartBehaviour::Succeeded
    }

    fn stop(&mut self) -> StartBehaviour {
        self.recorder.push(format!("{}.stop", self.label));
        StartBehaviour::Succeeded
    }
}

//! Shared test fixtures: a scriptable feature, an event recorder and a
//! releasable resource.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use plugboard::{
    ActivationContext, Bus, Event, EventKind, Feature, FeatureError, FeatureState, Resource,
    Scope, Subscription,
};

pub const ALL_KINDS: [EventKind; 10] = [
    EventKind::StateChanged,
    EventKind::FeatureError,
    EventKind::FeatureFallback,
    EventKind::ManagerInitialized,
    EventKind::FeaturesActivated,
    EventKind::FeaturesDeactivated,
    EventKind::HealthCheck,
    EventKind::FeatureDisabled,
    EventKind::ManagerFallback,
    EventKind::EmergencyStop,
];

pub fn ctx(url: &str) -> ActivationContext {
    ActivationContext::new(url, "tests")
}

#[derive(Default)]
pub struct Calls {
    pub init: AtomicUsize,
    pub start: AtomicUsize,
    pub stop: AtomicUsize,
    pub destroy: AtomicUsize,
}

/// Feature whose per-phase outcomes are programmed up front: each phase
/// fails its first N calls, then succeeds. Optionally appends
/// `"name:phase"` markers to a shared log so tests can assert global order.
pub struct Scripted {
    name: String,
    init_failures: u32,
    start_failures: u32,
    stop_failures: u32,
    destroy_failures: u32,
    log: Option<Arc<Mutex<Vec<String>>>>,
    pub calls: Calls,
}

impl Scripted {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            init_failures: 0,
            start_failures: 0,
            stop_failures: 0,
            destroy_failures: 0,
            log: None,
            calls: Calls::default(),
        }
    }

    pub fn with_init_failures(mut self, n: u32) -> Self {
        self.init_failures = n;
        self
    }

    pub fn with_start_failures(mut self, n: u32) -> Self {
        self.start_failures = n;
        self
    }

    pub fn with_stop_failures(mut self, n: u32) -> Self {
        self.stop_failures = n;
        self
    }

    pub fn with_destroy_failures(mut self, n: u32) -> Self {
        self.destroy_failures = n;
        self
    }

    pub fn with_log(mut self, log: Arc<Mutex<Vec<String>>>) -> Self {
        self.log = Some(log);
        self
    }

    fn run(&self, phase: &str, counter: &AtomicUsize, budget: u32) -> Result<(), FeatureError> {
        if let Some(log) = &self.log {
            log.lock().unwrap().push(format!("{}:{phase}", self.name));
        }
        let call = counter.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= budget as usize {
            Err(FeatureError::Hook {
                error: format!("{} {phase} failure #{call}", self.name),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Feature for Scripted {
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_init(
        &self,
        _ctx: &ActivationContext,
        _scope: &Scope,
    ) -> Result<(), FeatureError> {
        self.run("init", &self.calls.init, self.init_failures)
    }

    async fn on_start(
        &self,
        _ctx: &ActivationContext,
        _scope: &Scope,
    ) -> Result<(), FeatureError> {
        self.run("start", &self.calls.start, self.start_failures)
    }

    async fn on_stop(&self) -> Result<(), FeatureError> {
        self.run("stop", &self.calls.stop, self.stop_failures)
    }

    async fn on_destroy(&self) -> Result<(), FeatureError> {
        self.run("destroy", &self.calls.destroy, self.destroy_failures)
    }
}

/// Captures every published event (synchronous dispatch keeps the order).
pub struct Recorder {
    events: Arc<Mutex<Vec<Event>>>,
    _subs: Vec<Subscription>,
}

impl Recorder {
    pub fn attach(bus: &Bus) -> Self {
        Self::attach_kinds(bus, &ALL_KINDS)
    }

    pub fn attach_kinds(bus: &Bus, kinds: &[EventKind]) -> Self {
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut subs = Vec::with_capacity(kinds.len());
        for kind in kinds {
            let sink = Arc::clone(&events);
            subs.push(bus.on(*kind, move |ev| sink.lock().unwrap().push(ev.clone())));
        }
        Self {
            events,
            _subs: subs,
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn of_kind(&self, kind: EventKind) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|ev| ev.kind == kind)
            .collect()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.of_kind(kind).len()
    }

    /// `(from, to)` pairs for one feature, in publish order.
    pub fn transitions_for(&self, feature: &str) -> Vec<(FeatureState, FeatureState)> {
        self.of_kind(EventKind::StateChanged)
            .into_iter()
            .filter(|ev| ev.feature.as_deref() == Some(feature))
            .filter_map(|ev| ev.from.zip(ev.to))
            .collect()
    }

    /// Retry counts carried by `feature:error` events for one feature.
    pub fn attempts_for(&self, feature: &str) -> Vec<u32> {
        self.of_kind(EventKind::FeatureError)
            .into_iter()
            .filter(|ev| ev.feature.as_deref() == Some(feature))
            .filter_map(|ev| ev.attempt)
            .collect()
    }
}

/// Resource that counts how many times it was released.
pub struct FlagResource {
    label: String,
    released: Arc<AtomicUsize>,
}

impl FlagResource {
    pub fn new(label: &str) -> (Arc<Self>, Arc<AtomicUsize>) {
        let released = Arc::new(AtomicUsize::new(0));
        let resource = Arc::new(Self {
            label: label.to_string(),
            released: Arc::clone(&released),
        });
        (resource, released)
    }
}

impl Resource for FlagResource {
    fn label(&self) -> &str {
        &self.label
    }

    fn release(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

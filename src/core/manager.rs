//! # Manager: orchestrates feature units through their lifecycle.
//!
//! The [`Manager`] owns the event bus, the [`Registry`] and the global
//! configuration. It validates the dependency graph, drives units through
//! `init`/`start`/`stop`/`destroy` in dependency order, and keeps the
//! bookkeeping (error history, health sweep) running in the background.
//!
//! ## Key responsibilities
//! - register pending specs and **validate the graph** before anything runs
//! - activate matching units in dependency order, contain per-unit failures
//! - deactivate running units in exact **reverse activation order**
//! - rescue retry-eligible errored units via the periodic health sweep
//! - publish manager events so embedders can observe every pass
//!
//! ## High-level architecture
//! ```text
//! Inputs:
//!   Vec<FeatureSpec> ──► ManagerBuilder ──► Manager
//!
//! initialize():
//!   - drain pending specs → FeatureCell::with_defaults(spec, bus, recovery)
//!   - registry.validate() → invalid graph is fatal, nothing has run yet
//!   - capture ActivationContext from the ContextSource
//!   - subscribe bookkeeping listeners (history, disabled/fallback re-emits)
//!   - spawn HealthSweep (cancellable)
//!   - publish manager:initialized
//!
//! activate_features():
//!   registry.sorted() ──► skip (terminal / exhausted / no match / running)
//!                     └─► cell.init(ctx) → cell.start(ctx)   (per-unit containment)
//!   └─► record activation order, publish manager:features-activated
//!
//! deactivate_features():
//!   recorded order, reversed ──► cell.stop() → cell.destroy()
//!   └─► publish manager:features-deactivated
//!
//! Event flow:
//!   FeatureCell ── publish ──► Bus ──► manager bookkeeping listeners
//!                                  └─► embedder listeners (bus() handle)
//! ```
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use plugboard::{
//!     ActivationContext, Feature, FeatureError, FeatureSpec, Manager, Scope,
//!     StaticContext,
//! };
//!
//! struct Greeter;
//!
//! #[async_trait]
//! impl Feature for Greeter {
//!     fn name(&self) -> &str {
//!         "greeter"
//!     }
//!
//!     async fn on_start(
//!         &self,
//!         ctx: &ActivationContext,
//!         _scope: &Scope,
//!     ) -> Result<(), FeatureError> {
//!         println!("hello from {}", ctx.url);
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = Manager::builder()
//!         .with_context_source(StaticContext::new("https://shop.example/cart", "demo"))
//!         .with_feature(FeatureSpec::from_feature(Arc::new(Greeter)))
//!         .build();
//!
//!     manager.initialize()?;
//!     let outcome = manager.activate_features().await?;
//!     assert_eq!(outcome.succeeded, 1);
//!
//!     manager.deactivate_features().await;
//!     Ok(())
//! }
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::context::{ActivationContext, ContextSource};
use crate::core::config::ManagerConfig;
use crate::core::registry::Registry;
use crate::core::status::StatusSnapshot;
use crate::core::sweep::{HealthSweep, health_snapshot};
use crate::error::{FeatureError, RuntimeError};
use crate::events::{BatchOutcome, Bus, Event, EventKind, Subscription};
use crate::features::{FeatureCell, FeatureSpec, FeatureState};

fn locked<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // No hook runs under these locks, so poisoning is unreachable.
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Coordinates feature cells, graph validation, batch passes and the sweep.
pub struct Manager {
    config: ManagerConfig,
    bus: Bus,
    registry: Arc<Registry>,
    source: Arc<dyn ContextSource>,
    pending: Mutex<Vec<FeatureSpec>>,
    initialized: AtomicBool,
    context: Mutex<Option<ActivationContext>>,
    activation_order: Mutex<Vec<String>>,
    errors: Arc<AtomicUsize>,
    sweep: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl Manager {
    /// Starts building a manager with the default configuration.
    pub fn builder() -> crate::core::builder::ManagerBuilder {
        crate::core::builder::ManagerBuilder::new(ManagerConfig::default())
    }

    pub(crate) fn from_parts(
        config: ManagerConfig,
        source: Arc<dyn ContextSource>,
        specs: Vec<FeatureSpec>,
    ) -> Self {
        Self {
            config,
            bus: Bus::new(),
            registry: Arc::new(Registry::new()),
            source,
            pending: Mutex::new(specs),
            initialized: AtomicBool::new(false),
            context: Mutex::new(None),
            activation_order: Mutex::new(Vec::new()),
            errors: Arc::new(AtomicUsize::new(0)),
            sweep: Mutex::new(None),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// The shared event bus; subscribe here to observe the runtime.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// The feature registry (lookups, ordering, error history).
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// The global configuration.
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// True once [`initialize`](Self::initialize) has completed (and no
    /// emergency stop happened since).
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// The most recently captured activation context.
    pub fn context(&self) -> Option<ActivationContext> {
        locked(&self.context).clone()
    }

    /// Failures observed since initialize (or the last reload/clear).
    pub fn error_count(&self) -> usize {
        self.errors.load(Ordering::Relaxed)
    }

    /// Queues a spec for registration, or registers it immediately when the
    /// manager is already initialized.
    pub fn add_feature(&self, spec: FeatureSpec) {
        if self.is_initialized() {
            self.register_cell(spec);
        } else {
            locked(&self.pending).push(spec);
        }
    }

    /// Brings the manager up: registers pending specs, validates the
    /// dependency graph, captures the context, wires bookkeeping listeners
    /// and spawns the health sweep.
    ///
    /// Idempotent: a second call warns and returns `Ok`. An invalid graph is
    /// fatal and nothing is activated. Must run inside a tokio runtime (the
    /// sweep is a spawned task).
    pub fn initialize(&self) -> Result<(), RuntimeError> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            warn!("manager already initialized, ignoring");
            return Ok(());
        }

        let pending: Vec<FeatureSpec> = locked(&self.pending).drain(..).collect();
        for spec in pending {
            self.register_cell(spec);
        }

        let report = self.registry.validate();
        if !report.valid {
            self.initialized.store(false, Ordering::SeqCst);
            return Err(RuntimeError::InvalidGraph {
                errors: report.errors,
            });
        }

        *locked(&self.context) = Some(self.source.capture());
        self.subscribe_bookkeeping();
        self.spawn_sweep();

        info!(features = self.registry.len(), "manager initialized");
        self.bus.publish(
            Event::new(EventKind::ManagerInitialized).with_health(health_snapshot(&self.registry)),
        );
        Ok(())
    }

    /// Activates every unit that matches a freshly captured context, in
    /// dependency order, and reports the pass as a [`BatchOutcome`].
    ///
    /// Per-unit failures are contained: they increment `failed`, the pass
    /// continues. Skips (terminal state, exhausted retries, non-matching
    /// rules, already running) are logged with their reason.
    pub async fn activate_features(&self) -> Result<BatchOutcome, RuntimeError> {
        if !self.is_initialized() {
            return Err(RuntimeError::NotInitialized);
        }

        let ctx = self.source.capture();
        *locked(&self.context) = Some(ctx.clone());

        let mut outcome = BatchOutcome::default();
        let mut activated: Vec<String> = Vec::new();

        for cell in self.registry.sorted() {
            outcome.total += 1;
            if let Some(reason) = Self::skip_reason(&cell, &ctx) {
                debug!(feature = cell.name(), reason, "skipping activation");
                outcome.skipped += 1;
                continue;
            }
            match Self::bring_up(&cell, &ctx).await {
                Ok(()) => {
                    outcome.succeeded += 1;
                    activated.push(cell.name().to_string());
                }
                Err(err) => {
                    outcome.failed += 1;
                    warn!(feature = cell.name(), "activation failed: {err}");
                }
            }
        }

        // First activation wins the position, so deactivation order stays
        // correct across repeated passes.
        {
            let mut order = locked(&self.activation_order);
            for name in activated {
                if !order.iter().any(|n| n == &name) {
                    order.push(name);
                }
            }
        }

        info!(
            succeeded = outcome.succeeded,
            skipped = outcome.skipped,
            failed = outcome.failed,
            "activation pass complete"
        );
        self.bus
            .publish(Event::new(EventKind::FeaturesActivated).with_outcome(outcome));
        Ok(outcome)
    }

    /// Deactivates currently running units in exact reverse activation
    /// order (`stop`, then `destroy`). One failure never stops the rest.
    pub async fn deactivate_features(&self) -> BatchOutcome {
        let order: Vec<String> = std::mem::take(&mut *locked(&self.activation_order));

        let mut outcome = BatchOutcome::default();
        for name in order.iter().rev() {
            let Some(cell) = self.registry.get(name) else {
                continue;
            };
            outcome.total += 1;
            if cell.state() != FeatureState::Running {
                debug!(feature = name.as_str(), "not running, nothing to deactivate");
                outcome.skipped += 1;
                continue;
            }
            let stopped = cell.stop().await;
            let destroyed = cell.destroy().await;
            match stopped.and(destroyed) {
                Ok(()) => outcome.succeeded += 1,
                Err(err) => {
                    outcome.failed += 1;
                    warn!(feature = name.as_str(), "deactivation failed: {err}");
                }
            }
        }

        info!(
            succeeded = outcome.succeeded,
            skipped = outcome.skipped,
            failed = outcome.failed,
            "deactivation pass complete"
        );
        self.bus
            .publish(Event::new(EventKind::FeaturesDeactivated).with_outcome(outcome));
        outcome
    }

    /// Full reload: deactivate everything, reset the error counter, then
    /// activate against a freshly captured context.
    pub async fn reload_features(&self) -> Result<BatchOutcome, RuntimeError> {
        if !self.is_initialized() {
            return Err(RuntimeError::NotInitialized);
        }
        info!("reloading all features");
        self.deactivate_features().await;
        self.errors.store(0, Ordering::Relaxed);
        self.activate_features().await
    }

    /// Reloads a single unit: destroy (stopping first when running), reset,
    /// then re-activate only if it matches the current context.
    ///
    /// Hook failures during the reload stay contained in the unit's state
    /// machine; only an unknown name or an uninitialized manager is an error.
    pub async fn reload_feature(&self, name: &str) -> Result<(), RuntimeError> {
        if !self.is_initialized() {
            return Err(RuntimeError::NotInitialized);
        }
        let cell = self
            .registry
            .get(name)
            .ok_or_else(|| RuntimeError::UnknownFeature {
                name: name.to_string(),
            })?;

        info!(feature = name, "reloading feature");
        if let Err(err) = cell.destroy().await {
            warn!(feature = name, "destroy during reload failed: {err}");
        }
        cell.reset();

        let ctx = self.source.capture();
        *locked(&self.context) = Some(ctx.clone());

        if !cell.should_activate(&ctx) {
            debug!(feature = name, "rules do not match current context");
            self.remove_from_order(name);
            return Ok(());
        }

        match Self::bring_up(&cell, &ctx).await {
            Ok(()) => {
                let mut order = locked(&self.activation_order);
                if !order.iter().any(|n| n == name) {
                    order.push(name.to_string());
                }
            }
            Err(err) => {
                warn!(feature = name, "reload activation failed: {err}");
                self.remove_from_order(name);
            }
        }
        Ok(())
    }

    /// Best-effort teardown: deactivate, cancel the sweep, drop bookkeeping
    /// listeners, publish `manager:emergency-stop` and mark the manager
    /// uninitialized (a later [`initialize`](Self::initialize) starts over).
    pub async fn emergency_stop(&self, reason: &str) {
        warn!(reason, "emergency stop requested");
        self.deactivate_features().await;
        self.cancel_sweep();
        for sub in locked(&self.subscriptions).drain(..) {
            sub.unsubscribe();
        }
        self.initialized.store(false, Ordering::SeqCst);
        self.bus
            .publish(Event::new(EventKind::EmergencyStop).with_reason(reason.to_string()));
    }

    /// Read-only snapshot of the whole runtime.
    pub fn status(&self) -> StatusSnapshot {
        let mut by_state: HashMap<FeatureState, usize> = HashMap::new();
        for cell in self.registry.all() {
            *by_state.entry(cell.state()).or_default() += 1;
        }
        StatusSnapshot {
            initialized: self.is_initialized(),
            features: self.registry.len(),
            by_state,
            errors: self.registry.error_stats(),
            error_count: self.error_count(),
            context: self.context(),
            at: SystemTime::now(),
        }
    }

    /// Clears the registry error history and the manager error counter.
    pub fn clear_all_errors(&self) {
        self.registry.clear_errors();
        self.errors.store(0, Ordering::Relaxed);
        debug!("error history cleared");
    }

    fn register_cell(&self, spec: FeatureSpec) {
        let cell = Arc::new(FeatureCell::with_defaults(
            spec,
            self.bus.clone(),
            self.config.recovery,
        ));
        self.registry.register(cell);
    }

    fn skip_reason(cell: &FeatureCell, ctx: &ActivationContext) -> Option<&'static str> {
        match cell.state() {
            FeatureState::Disabled => Some("disabled"),
            FeatureState::Fallback => Some("fallback active"),
            FeatureState::Error if !cell.can_retry() => Some("retry budget exhausted"),
            FeatureState::Running => Some("already running"),
            _ if !cell.should_activate(ctx) => Some("rules do not match context"),
            _ => None,
        }
    }

    async fn bring_up(cell: &Arc<FeatureCell>, ctx: &ActivationContext) -> Result<(), FeatureError> {
        cell.init(ctx).await?;
        cell.start(ctx).await
    }

    fn remove_from_order(&self, name: &str) {
        locked(&self.activation_order).retain(|n| n != name);
    }

    /// Wires the listeners that keep manager bookkeeping in sync with what
    /// the cells publish.
    fn subscribe_bookkeeping(&self) {
        let mut subs = Vec::with_capacity(3);

        // Failures: append to the bounded history, bump the counter.
        let registry = Arc::clone(&self.registry);
        let errors = Arc::clone(&self.errors);
        subs.push(self.bus.on(EventKind::FeatureError, move |ev| {
            if let Some(record) = &ev.record {
                registry.record_error(record.clone());
            }
            errors.fetch_add(1, Ordering::Relaxed);
        }));

        // Fallback entries are acknowledged at the manager level.
        let bus = self.bus.clone();
        subs.push(self.bus.on(EventKind::FeatureFallback, move |ev| {
            let mut out = Event::new(EventKind::ManagerFallback);
            if let Some(feature) = &ev.feature {
                out = out.with_feature(Arc::clone(feature));
            }
            if let Some(reason) = &ev.reason {
                out = out.with_reason(Arc::clone(reason));
            }
            bus.publish(out);
        }));

        // Terminal disables get their own manager event.
        let bus = self.bus.clone();
        subs.push(self.bus.on(EventKind::StateChanged, move |ev| {
            if ev.to == Some(FeatureState::Disabled) {
                let mut out = Event::new(EventKind::FeatureDisabled)
                    .with_reason("retry budget exhausted");
                if let Some(feature) = &ev.feature {
                    out = out.with_feature(Arc::clone(feature));
                }
                if let Some(error) = &ev.error {
                    out = out.with_error(Arc::clone(error));
                }
                bus.publish(out);
            }
        }));

        *locked(&self.subscriptions) = subs;
    }

    fn spawn_sweep(&self) {
        let token = CancellationToken::new();
        let sweep = HealthSweep::new(
            Arc::clone(&self.registry),
            self.bus.clone(),
            self.config.sweep_interval,
        );
        let handle = sweep.spawn(token.clone());
        *locked(&self.sweep) = Some((token, handle));
    }

    fn cancel_sweep(&self) {
        if let Some((token, handle)) = locked(&self.sweep).take() {
            token.cancel();
            handle.abort();
        }
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        self.cancel_sweep();
        // Subscriptions do not detach on drop; unhook the bookkeeping
        // listeners so surviving bus handles are not left holding them.
        for sub in locked(&self.subscriptions).drain(..) {
            sub.unsubscribe();
        }
    }
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("initialized", &self.is_initialized())
            .field("features", &self.registry.len())
            .field("error_count", &self.error_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::features::Feature;

    struct Noop(&'static str);

    #[async_trait]
    impl Feature for Noop {
        fn name(&self) -> &str {
            self.0
        }
    }

    fn spec(name: &'static str) -> FeatureSpec {
        FeatureSpec::from_feature(Arc::new(Noop(name)))
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let manager = Manager::builder().with_feature(spec("a")).build();
        manager.initialize().unwrap();
        manager.initialize().unwrap();
        assert_eq!(manager.registry().len(), 1);
        assert!(manager.is_initialized());
    }

    #[tokio::test]
    async fn test_activate_requires_initialize() {
        let manager = Manager::builder().with_feature(spec("a")).build();
        let err = manager.activate_features().await.unwrap_err();
        assert!(matches!(err, RuntimeError::NotInitialized));
    }

    #[tokio::test]
    async fn test_invalid_graph_is_fatal() {
        let missing = FeatureSpec::builder(Arc::new(Noop("a")))
            .depends_on("ghost")
            .build();
        let manager = Manager::builder().with_feature(missing).build();

        let err = manager.initialize().unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidGraph { .. }));
        assert!(!manager.is_initialized());
    }

    #[tokio::test]
    async fn test_add_feature_before_and_after_initialize() {
        let manager = Manager::builder().build();
        manager.add_feature(spec("early"));
        assert_eq!(manager.registry().len(), 0);

        manager.initialize().unwrap();
        assert_eq!(manager.registry().len(), 1);

        manager.add_feature(spec("late"));
        assert_eq!(manager.registry().len(), 2);
    }

    #[tokio::test]
    async fn test_drop_detaches_bookkeeping_listeners() {
        let manager = Manager::builder().with_feature(spec("a")).build();
        manager.initialize().unwrap();

        let bus = manager.bus().clone();
        assert_eq!(bus.listener_count(EventKind::FeatureError), 1);
        assert_eq!(bus.listener_count(EventKind::FeatureFallback), 1);
        assert_eq!(bus.listener_count(EventKind::StateChanged), 1);

        drop(manager);

        assert_eq!(bus.listener_count(EventKind::FeatureError), 0);
        assert_eq!(bus.listener_count(EventKind::FeatureFallback), 0);
        assert_eq!(bus.listener_count(EventKind::StateChanged), 0);
    }
}

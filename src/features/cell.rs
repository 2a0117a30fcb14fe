//! # FeatureCell: single-unit state machine.
//!
//! Drives one [`Feature`](crate::Feature) through its lifecycle with:
//! - entry guards per phase (invalid transitions are warn-level no-ops),
//! - retries per [`RecoveryPolicy`] with linear, cancellable backoff,
//! - terminal routing (`Disabled`, or `Fallback` when the policy allows),
//! - panic containment around every hook,
//! - event publishing for every observable step.
//!
//! ## Event flow
//! For each phase, the cell publishes:
//! ```text
//! feature:state-changed (→ transitional) → [hook] → feature:state-changed (→ success)
//!                                                 → feature:error (failure)
//!
//! If retry budget remains:
//!   → [sleep retry_delay × n] → (phase re-entered)
//! If exhausted:
//!   → feature:state-changed (→ disabled)
//!   → or scope sweep + feature:state-changed (→ fallback) + feature:fallback
//! ```
//!
//! ## Architecture
//! ```text
//! FeatureSpec ──► Manager ──► FeatureCell::init/start/stop/destroy
//!
//! loop {
//!   ├─► check entry guard (no-op + warn if the state refuses the phase)
//!   ├─► announce transitional state
//!   ├─► run hook under catch_unwind
//!   │     ├─► Ok  → reset retries (init/start), sweep scope (stop/destroy),
//!   │     │         land on success state, return
//!   │     └─► Err → record error, bump retry count, enter Error,
//!   │               publish feature:error
//!   └─► if retries remain:
//!        └─► cancellable sleep(retry_delay × count), re-enter phase
//!       else: go terminal (Disabled / Fallback), return the error
//! }
//! ```
//!
//! ## Rules
//! - Phases settle **in place**: `init`/`start` return only once the unit is
//!   on its success state or terminal (or the wait was interrupted).
//! - `stop`/`destroy` **trip any in-flight backoff**; the interrupted phase
//!   parks in `Error`, where `reset()` or the health sweep can rescue it.
//! - The retry counter resets only when `init` or `start` succeeds.
//! - Attempts run **sequentially**; the cell never runs two hooks at once.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::FutureExt;
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::context::ActivationContext;
use crate::error::{ErrorRecord, FeatureError, panic_text};
use crate::events::{Bus, Event, EventKind};
use crate::features::spec::{FeatureConfig, FeatureSpec};
use crate::features::state::{FeatureState, Phase};
use crate::features::scope::Scope;
use crate::policies::RecoveryPolicy;

/// Phase plus the borrowed context it needs.
enum Hook<'a> {
    Init(&'a ActivationContext),
    Start(&'a ActivationContext),
    Stop,
    Destroy,
}

impl Hook<'_> {
    fn phase(&self) -> Phase {
        match self {
            Hook::Init(_) => Phase::Init,
            Hook::Start(_) => Phase::Start,
            Hook::Stop => Phase::Stop,
            Hook::Destroy => Phase::Destroy,
        }
    }

    fn url(&self) -> Option<&str> {
        match self {
            Hook::Init(ctx) | Hook::Start(ctx) => Some(&ctx.url),
            Hook::Stop | Hook::Destroy => None,
        }
    }
}

fn locked<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // Hooks never run under these locks, so poisoning is unreachable.
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Managed lifecycle cell around a single feature.
///
/// ### Responsibilities
/// - **State machine**: guarded transitions, transitional and success states
/// - **Recovery**: linear backoff retries, terminal routing on exhaustion
/// - **Containment**: hook errors and panics never escape the cell
/// - **Scope**: sweeps timers/resources/cleanups on stop, destroy, fallback
/// - **Observability**: publishes every step on the bus
///
/// ### Rules
/// - The per-feature recovery overrides are resolved against the defaults
///   once, here, at construction.
/// - Activation gating (`should_activate`) never touches hook state; it only
///   reads rules, the enabled flag and the terminal states.
pub struct FeatureCell {
    spec: FeatureSpec,
    name: Arc<str>,
    recovery: RecoveryPolicy,
    state: Mutex<FeatureState>,
    last_error: Mutex<Option<ErrorRecord>>,
    retry_count: AtomicU32,
    scope: Scope,
    bus: Bus,
    interrupt: Mutex<CancellationToken>,
}

impl FeatureCell {
    /// Creates a cell resolving recovery overrides against
    /// [`RecoveryPolicy::default`].
    pub fn new(spec: FeatureSpec, bus: Bus) -> Self {
        Self::with_defaults(spec, bus, RecoveryPolicy::default())
    }

    /// Creates a cell resolving recovery overrides against the given
    /// manager-wide defaults.
    pub fn with_defaults(spec: FeatureSpec, bus: Bus, defaults: RecoveryPolicy) -> Self {
        let name: Arc<str> = Arc::from(spec.name());
        let recovery = RecoveryPolicy::merge(defaults, spec.config().recovery);
        Self {
            name: Arc::clone(&name),
            scope: Scope::new(name),
            recovery,
            spec,
            state: Mutex::new(FeatureState::Idle),
            last_error: Mutex::new(None),
            retry_count: AtomicU32::new(0),
            bus,
            interrupt: Mutex::new(CancellationToken::new()),
        }
    }

    /// Feature name (the registry key).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The specification this cell was built from.
    pub fn spec(&self) -> &FeatureSpec {
        &self.spec
    }

    /// Configuration shorthand.
    pub fn config(&self) -> &FeatureConfig {
        self.spec.config()
    }

    /// The resolved recovery policy.
    pub fn recovery(&self) -> RecoveryPolicy {
        self.recovery
    }

    /// Current lifecycle state.
    pub fn state(&self) -> FeatureState {
        *locked(&self.state)
    }

    /// Most recent failure, if any.
    pub fn last_error(&self) -> Option<ErrorRecord> {
        locked(&self.last_error).clone()
    }

    /// Failures since the last successful init/start (or reset).
    pub fn retry_count(&self) -> u32 {
        self.retry_count.load(AtomicOrdering::Relaxed)
    }

    /// Whether the retry budget still has room.
    pub fn can_retry(&self) -> bool {
        self.retry_count() <= self.recovery.max_retries
    }

    /// The unit's resource scope.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Decides whether this unit applies to the given context.
    ///
    /// Order: terminal states and the `enabled` flag veto first; a custom
    /// predicate (when set) replaces rule evaluation; an empty rule list
    /// activates everywhere; otherwise first matching rule wins.
    pub fn should_activate(&self, ctx: &ActivationContext) -> bool {
        if self.state().is_terminal() {
            return false;
        }
        let cfg = self.config();
        if !cfg.enabled {
            return false;
        }
        if let Some(pred) = &cfg.activate_when {
            return catch_unwind(AssertUnwindSafe(|| pred(ctx))).unwrap_or_else(|payload| {
                warn!(
                    feature = %self.name,
                    "activation predicate panicked, treating as non-match: {}",
                    panic_text(payload.as_ref())
                );
                false
            });
        }
        if cfg.matches.is_empty() {
            return true;
        }
        cfg.matches.iter().any(|rule| rule.matches(ctx))
    }

    /// Runs `on_init`, settling in place (retries included).
    pub async fn init(&self, ctx: &ActivationContext) -> Result<(), FeatureError> {
        self.drive(Hook::Init(ctx)).await
    }

    /// Runs `on_start`, settling in place (retries included).
    pub async fn start(&self, ctx: &ActivationContext) -> Result<(), FeatureError> {
        self.drive(Hook::Start(ctx)).await
    }

    /// Runs `on_stop`; success sweeps the scope. Trips in-flight backoff.
    pub async fn stop(&self) -> Result<(), FeatureError> {
        self.trip_interrupt();
        self.drive(Hook::Stop).await
    }

    /// Runs `on_destroy` from any state, stopping first when running.
    /// Success sweeps the scope and returns the unit to `Idle`.
    pub async fn destroy(&self) -> Result<(), FeatureError> {
        self.trip_interrupt();
        if self.state() == FeatureState::Running {
            if let Err(err) = self.drive(Hook::Stop).await {
                warn!(feature = %self.name, "stop before destroy failed: {err}");
            }
        }
        self.drive(Hook::Destroy).await
    }

    /// Rescues an errored unit back to `Idle`, clearing the retry counter
    /// and the recorded error. Any other state is left untouched.
    pub fn reset(&self) {
        let state = self.state();
        if state != FeatureState::Error {
            debug!(
                feature = %self.name,
                state = state.as_label(),
                "reset ignored, unit not in error"
            );
            return;
        }
        self.retry_count.store(0, AtomicOrdering::Relaxed);
        *locked(&self.last_error) = None;
        self.set_state(FeatureState::Idle);
    }

    async fn drive(&self, hook: Hook<'_>) -> Result<(), FeatureError> {
        let phase = hook.phase();
        loop {
            let from = self.state();
            if !phase.permits(from) {
                warn!(
                    feature = %self.name,
                    phase = phase.as_label(),
                    state = from.as_label(),
                    "transition not allowed, ignoring"
                );
                return Ok(());
            }
            if let Some(active) = phase.active_state() {
                self.set_state(active);
            }

            let err = match self.safe_execute(&hook).await {
                Ok(()) => {
                    match phase {
                        Phase::Init | Phase::Start => {
                            self.retry_count.store(0, AtomicOrdering::Relaxed);
                        }
                        Phase::Stop => self.scope.sweep(),
                        // A destroyed unit is reusable: clean slate.
                        Phase::Destroy => {
                            self.scope.sweep();
                            self.retry_count.store(0, AtomicOrdering::Relaxed);
                            *locked(&self.last_error) = None;
                        }
                    }
                    self.set_state(phase.success_state());
                    return Ok(());
                }
                Err(err) => err,
            };

            let record = ErrorRecord::new(&self.name, phase, &err, hook.url());
            *locked(&self.last_error) = Some(record.clone());
            let attempt = self.retry_count.fetch_add(1, AtomicOrdering::Relaxed) + 1;
            self.set_state(FeatureState::Error);

            let can_retry = attempt <= self.recovery.max_retries;
            warn!(
                feature = %self.name,
                phase = phase.as_label(),
                attempt,
                can_retry,
                "hook failed: {err}"
            );
            self.bus.publish(
                Event::new(EventKind::FeatureError)
                    .with_feature(Arc::clone(&self.name))
                    .with_error(err.to_string())
                    .with_attempt(attempt)
                    .with_can_retry(can_retry)
                    .with_record(record),
            );

            if can_retry {
                let delay = self.recovery.delay_for(attempt);
                debug!(
                    feature = %self.name,
                    phase = phase.as_label(),
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retrying after backoff"
                );
                let token = self.interrupt_handle();
                let sleep = time::sleep(delay);
                tokio::pin!(sleep);
                select! {
                    _ = &mut sleep => {}
                    _ = token.cancelled() => {
                        debug!(
                            feature = %self.name,
                            phase = phase.as_label(),
                            "backoff interrupted, parking in error"
                        );
                        return Err(FeatureError::Interrupted);
                    }
                }
                continue;
            }

            if self.recovery.fallback {
                self.scope.sweep();
                self.set_state(FeatureState::Fallback);
                self.bus.publish(
                    Event::new(EventKind::FeatureFallback)
                        .with_feature(Arc::clone(&self.name))
                        .with_reason(format!("{phase} retries exhausted")),
                );
            } else {
                self.set_state(FeatureState::Disabled);
            }
            return Err(err);
        }
    }

    async fn safe_execute(&self, hook: &Hook<'_>) -> Result<(), FeatureError> {
        let feature = self.spec.feature();
        let fut = match hook {
            Hook::Init(ctx) => feature.on_init(ctx, &self.scope),
            Hook::Start(ctx) => feature.on_start(ctx, &self.scope),
            Hook::Stop => feature.on_stop(),
            Hook::Destroy => feature.on_destroy(),
        };
        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(res) => res,
            Err(payload) => Err(FeatureError::from_panic(payload.as_ref())),
        }
    }

    fn set_state(&self, to: FeatureState) {
        let from = {
            let mut guard = locked(&self.state);
            let from = *guard;
            if from == to {
                return;
            }
            *guard = to;
            from
        };
        debug!(
            feature = %self.name,
            from = from.as_label(),
            to = to.as_label(),
            "state changed"
        );
        let mut ev = Event::new(EventKind::StateChanged)
            .with_feature(Arc::clone(&self.name))
            .with_states(from, to)
            .with_attempt(self.retry_count());
        if let Some(record) = locked(&self.last_error).as_ref() {
            ev = ev.with_error(record.error.clone());
        }
        self.bus.publish(ev);
    }

    fn interrupt_handle(&self) -> CancellationToken {
        locked(&self.interrupt).clone()
    }

    /// Cancels any backoff wait in flight and re-arms for the next one.
    fn trip_interrupt(&self) {
        let old = std::mem::replace(&mut *locked(&self.interrupt), CancellationToken::new());
        old.cancel();
    }
}

impl std::fmt::Debug for FeatureCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureCell")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("retry_count", &self.retry_count())
            .field("recovery", &self.recovery)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::features::Feature;
    use crate::policies::RecoveryOverrides;

    #[derive(Default)]
    struct Counting {
        init_failures: u32,
        init_calls: AtomicUsize,
        start_calls: AtomicUsize,
        stop_calls: AtomicUsize,
        destroy_calls: AtomicUsize,
    }

    #[async_trait]
    impl Feature for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        async fn on_init(
            &self,
            _ctx: &ActivationContext,
            _scope: &Scope,
        ) -> Result<(), FeatureError> {
            let call = self.init_calls.fetch_add(1, AtomicOrdering::SeqCst) + 1;
            if call <= self.init_failures as usize {
                return Err(FeatureError::Hook {
                    error: format!("init failure #{call}"),
                });
            }
            Ok(())
        }

        async fn on_start(
            &self,
            _ctx: &ActivationContext,
            _scope: &Scope,
        ) -> Result<(), FeatureError> {
            self.start_calls.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(())
        }

        async fn on_stop(&self) -> Result<(), FeatureError> {
            self.stop_calls.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(())
        }

        async fn on_destroy(&self) -> Result<(), FeatureError> {
            self.destroy_calls.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(())
        }
    }

    fn cell_with(feature: Arc<Counting>, overrides: RecoveryOverrides) -> FeatureCell {
        let spec = FeatureSpec::builder(feature).recovery(overrides).build();
        FeatureCell::new(spec, Bus::new())
    }

    fn ctx() -> ActivationContext {
        ActivationContext::new("https://example.com", "tests")
    }

    #[tokio::test]
    async fn test_init_success_lands_on_initialized() {
        let cell = cell_with(Arc::new(Counting::default()), RecoveryOverrides::new());
        cell.init(&ctx()).await.unwrap();
        assert_eq!(cell.state(), FeatureState::Initialized);
        assert_eq!(cell.retry_count(), 0);
        assert!(cell.last_error().is_none());
    }

    #[tokio::test]
    async fn test_invalid_transition_is_noop() {
        let cell = cell_with(Arc::new(Counting::default()), RecoveryOverrides::new());
        // Start from Idle is not permitted; nothing should run or change.
        cell.start(&ctx()).await.unwrap();
        assert_eq!(cell.state(), FeatureState::Idle);
        assert!(cell.last_error().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_succeeds() {
        let feature = Arc::new(Counting {
            init_failures: 2,
            ..Counting::default()
        });
        let cell = cell_with(
            Arc::clone(&feature),
            RecoveryOverrides::new()
                .max_retries(2)
                .retry_delay(Duration::from_millis(100)),
        );

        cell.init(&ctx()).await.unwrap();
        assert_eq!(feature.init_calls.load(AtomicOrdering::SeqCst), 3);
        assert_eq!(cell.state(), FeatureState::Initialized);
        // Counter resets on success.
        assert_eq!(cell.retry_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_without_fallback_disables() {
        let feature = Arc::new(Counting {
            init_failures: u32::MAX,
            ..Counting::default()
        });
        let cell = cell_with(
            Arc::clone(&feature),
            RecoveryOverrides::new()
                .max_retries(1)
                .retry_delay(Duration::from_millis(10)),
        );

        let err = cell.init(&ctx()).await.unwrap_err();
        assert!(matches!(err, FeatureError::Hook { .. }));
        assert_eq!(cell.state(), FeatureState::Disabled);
        // Initial attempt plus one retry.
        assert_eq!(feature.init_calls.load(AtomicOrdering::SeqCst), 2);
        assert_eq!(cell.retry_count(), 2);
        assert!(!cell.can_retry());
        assert!(cell.last_error().is_some());
    }

    #[tokio::test]
    async fn test_zero_budget_goes_terminal_on_first_failure() {
        let feature = Arc::new(Counting {
            init_failures: u32::MAX,
            ..Counting::default()
        });
        let cell = cell_with(Arc::clone(&feature), RecoveryOverrides::new().max_retries(0));

        cell.init(&ctx()).await.unwrap_err();
        assert_eq!(feature.init_calls.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(cell.state(), FeatureState::Disabled);
    }

    #[tokio::test]
    async fn test_destroy_from_running_stops_first() {
        let feature = Arc::new(Counting::default());
        let cell = cell_with(Arc::clone(&feature), RecoveryOverrides::new());

        cell.init(&ctx()).await.unwrap();
        cell.start(&ctx()).await.unwrap();
        assert_eq!(cell.state(), FeatureState::Running);

        cell.destroy().await.unwrap();
        assert_eq!(feature.stop_calls.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(feature.destroy_calls.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(cell.state(), FeatureState::Idle);
    }

    #[tokio::test]
    async fn test_reset_only_rescues_error() {
        let feature = Arc::new(Counting {
            init_failures: u32::MAX,
            ..Counting::default()
        });
        let cell = cell_with(Arc::clone(&feature), RecoveryOverrides::new().max_retries(0));

        cell.init(&ctx()).await.unwrap_err();
        assert_eq!(cell.state(), FeatureState::Disabled);
        cell.reset();
        // Disabled is terminal; reset must not touch it.
        assert_eq!(cell.state(), FeatureState::Disabled);

        let healthy = cell_with(Arc::new(Counting::default()), RecoveryOverrides::new());
        healthy.reset();
        assert_eq!(healthy.state(), FeatureState::Idle);
    }

    struct Panicking;

    #[async_trait]
    impl Feature for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }

        async fn on_init(
            &self,
            _ctx: &ActivationContext,
            _scope: &Scope,
        ) -> Result<(), FeatureError> {
            panic!("hook exploded");
        }
    }

    #[tokio::test]
    async fn test_panicking_hook_is_contained() {
        let spec = FeatureSpec::builder(Arc::new(Panicking))
            .recovery(RecoveryOverrides::new().max_retries(0))
            .build();
        let cell = FeatureCell::new(spec, Bus::new());

        let err = cell.init(&ctx()).await.unwrap_err();
        assert!(matches!(err, FeatureError::Panicked { .. }));
        assert_eq!(cell.state(), FeatureState::Disabled);
        let record = cell.last_error().unwrap();
        assert!(record.error.contains("hook exploded"));
    }

    #[tokio::test]
    async fn test_should_activate_respects_rules_and_state() {
        use crate::policies::MatchRule;

        let spec = FeatureSpec::builder(Arc::new(Counting::default()))
            .match_rule(MatchRule::glob("https://shop.example/*"))
            .build();
        let cell = FeatureCell::new(spec, Bus::new());

        let on = ActivationContext::new("https://shop.example/cart", "tests");
        let off = ActivationContext::new("https://blog.example/post", "tests");
        assert!(cell.should_activate(&on));
        assert!(!cell.should_activate(&off));

        let disabled = FeatureSpec::builder(Arc::new(Counting::default()))
            .enabled(false)
            .build();
        let cell = FeatureCell::new(disabled, Bus::new());
        assert!(!cell.should_activate(&on));
    }
}

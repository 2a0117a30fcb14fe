//! # Runtime events emitted by feature cells and the manager.
//!
//! The [`EventKind`] enum classifies event types across two categories:
//! - **Feature events**: per-unit lifecycle flow (state changes, errors, fallback)
//! - **Manager events**: orchestration milestones (initialized, batch activation,
//!   health sweeps, terminal unit outcomes, emergency stop)
//!
//! The [`Event`] struct carries additional metadata such as timestamps, the
//! feature name, state transitions, retry counts and aggregated outcomes.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically. Dispatch itself is synchronous and ordered, so `seq` mostly
//! matters when listeners buffer events for later inspection.
//!
//! ## Example
//! ```rust
//! use plugboard::{Event, EventKind, FeatureState};
//!
//! let ev = Event::new(EventKind::StateChanged)
//!     .with_feature("analytics")
//!     .with_states(FeatureState::Idle, FeatureState::Initializing)
//!     .with_attempt(0);
//!
//! assert_eq!(ev.kind, EventKind::StateChanged);
//! assert_eq!(ev.feature.as_deref(), Some("analytics"));
//! assert_eq!(ev.to, Some(FeatureState::Initializing));
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::error::ErrorRecord;
use crate::features::FeatureState;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // === Feature events ===
    /// A unit moved to a new lifecycle state.
    ///
    /// Sets:
    /// - `feature`: unit name
    /// - `from` / `to`: previous and new state
    /// - `attempt`: current retry count
    /// - `error`: last error text, when one is recorded
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    StateChanged,

    /// A lifecycle hook failed (the unit entered `Error`).
    ///
    /// Sets:
    /// - `feature`: unit name
    /// - `error`: failure message
    /// - `attempt`: retry count after this failure
    /// - `can_retry`: whether the unit still has retry budget
    /// - `record`: full error record (phase, timestamp, context URL)
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    FeatureError,

    /// A unit exhausted its retries and entered degraded fallback mode.
    ///
    /// Sets:
    /// - `feature`: unit name
    /// - `reason`: phase that exhausted the budget
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    FeatureFallback,

    // === Manager events ===
    /// The manager finished initialization (graph validated, sweep running).
    ///
    /// Sets:
    /// - `health`: registry counts at startup
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    ManagerInitialized,

    /// A batch activation pass completed.
    ///
    /// Sets:
    /// - `outcome`: succeeded/skipped/failed/total counts
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    FeaturesActivated,

    /// A batch deactivation pass completed.
    ///
    /// Sets:
    /// - `outcome`: succeeded/skipped/failed/total counts
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    FeaturesDeactivated,

    /// Periodic health sweep ran.
    ///
    /// Sets:
    /// - `health`: current health snapshot (taken before rescues)
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    HealthCheck,

    /// A unit was disabled after exhausting its retries without fallback.
    ///
    /// Sets:
    /// - `feature`: unit name
    /// - `reason`: why the unit went terminal
    /// - `error`: last error text, when one is recorded
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    FeatureDisabled,

    /// The manager acknowledged a unit's switch to fallback mode.
    ///
    /// Sets:
    /// - `feature`: unit name
    /// - `reason`: phase that exhausted the budget
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    ManagerFallback,

    /// Emergency stop was requested; everything was torn down best-effort.
    ///
    /// Sets:
    /// - `reason`: caller-provided reason
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    EmergencyStop,
}

impl EventKind {
    /// Returns the embedder-facing event name.
    ///
    /// # Example
    /// ```
    /// use plugboard::EventKind;
    ///
    /// assert_eq!(EventKind::StateChanged.as_label(), "feature:state-changed");
    /// assert_eq!(EventKind::HealthCheck.as_label(), "manager:health-check");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            EventKind::StateChanged => "feature:state-changed",
            EventKind::FeatureError => "feature:error",
            EventKind::FeatureFallback => "feature:fallback",
            EventKind::ManagerInitialized => "manager:initialized",
            EventKind::FeaturesActivated => "manager:features-activated",
            EventKind::FeaturesDeactivated => "manager:features-deactivated",
            EventKind::HealthCheck => "manager:health-check",
            EventKind::FeatureDisabled => "manager:feature-disabled",
            EventKind::ManagerFallback => "manager:feature-fallback",
            EventKind::EmergencyStop => "manager:emergency-stop",
        }
    }
}

/// Aggregated result of a batch activation or deactivation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Units that completed the pass.
    pub succeeded: usize,
    /// Units skipped before any hook ran (terminal state, no matching rule).
    pub skipped: usize,
    /// Units whose hooks failed during the pass.
    pub failed: usize,
    /// Units considered by the pass.
    pub total: usize,
}

/// Registry health counts carried by `manager:health-check` and
/// `manager:initialized`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthSnapshot {
    /// Registered units.
    pub features: usize,
    /// Units in a healthy state.
    pub healthy: usize,
    /// Units in `Error`, `Disabled` or `Fallback`.
    pub problematic: usize,
    /// Errors currently held in the bounded history.
    pub total_errors: usize,
    /// History entries younger than the recent window.
    pub recent_errors: usize,
    /// Error count per feature name.
    pub errors_by_feature: HashMap<String, usize>,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Debug, Clone)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Name of the feature, if applicable.
    pub feature: Option<Arc<str>>,
    /// Human-readable reason (skip cause, emergency reason, etc.).
    pub reason: Option<Arc<str>>,
    /// Error text, if the event reports a failure.
    pub error: Option<Arc<str>>,
    /// Previous state, for transitions.
    pub from: Option<FeatureState>,
    /// New state, for transitions.
    pub to: Option<FeatureState>,
    /// Retry count at emission time.
    pub attempt: Option<u32>,
    /// Whether retry budget remains after a failure.
    pub can_retry: Option<bool>,
    /// Batch pass counts.
    pub outcome: Option<BatchOutcome>,
    /// Health sweep counts.
    pub health: Option<HealthSnapshot>,
    /// Full failure record (set on `feature:error`).
    pub record: Option<ErrorRecord>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next
    /// sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            feature: None,
            reason: None,
            error: None,
            from: None,
            to: None,
            attempt: None,
            can_retry: None,
            outcome: None,
            health: None,
            record: None,
        }
    }

    /// Attaches a feature name.
    #[inline]
    pub fn with_feature(mut self, feature: impl Into<Arc<str>>) -> Self {
        self.feature = Some(feature.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches an error text.
    #[inline]
    pub fn with_error(mut self, error: impl Into<Arc<str>>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Attaches a state transition.
    #[inline]
    pub fn with_states(mut self, from: FeatureState, to: FeatureState) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    /// Attaches a retry count.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches the remaining-retry-budget flag.
    #[inline]
    pub fn with_can_retry(mut self, can_retry: bool) -> Self {
        self.can_retry = Some(can_retry);
        self
    }

    /// Attaches batch pass counts.
    #[inline]
    pub fn with_outcome(mut self, outcome: BatchOutcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    /// Attaches a health snapshot.
    #[inline]
    pub fn with_health(mut self, health: HealthSnapshot) -> Self {
        self.health = Some(health);
        self
    }

    /// Attaches the full failure record.
    #[inline]
    pub fn with_record(mut self, record: ErrorRecord) -> Self {
        self.record = Some(record);
        self
    }
}

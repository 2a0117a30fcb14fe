//! Lifecycle states and phases of a managed feature unit.
//!
//! Every transition goes through a phase ([`Phase`]) whose entry guard
//! ([`Phase::permits`]) decides whether the current state may enter it.
//! Invalid transitions are warn-level no-ops, never errors.

use std::fmt;

/// State of a managed feature unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureState {
    /// Registered but untouched (also the landing state after destroy).
    Idle,

    /// `on_init` is running.
    Initializing,

    /// `on_init` completed.
    Initialized,

    /// `on_start` is running.
    Starting,

    /// `on_start` completed; the unit is live.
    Running,

    /// `on_stop` is running.
    Stopping,

    /// `on_stop` completed.
    Stopped,

    /// Last hook failed; the unit may still retry or be rescued.
    Error,

    /// Retry budget exhausted without a fallback; terminal until destroyed.
    Disabled,

    /// Retry budget exhausted with fallback enabled; degraded, terminal
    /// until destroyed.
    Fallback,
}

impl FeatureState {
    /// All states, in declaration order. Handy for status aggregation.
    pub const ALL: [FeatureState; 10] = [
        FeatureState::Idle,
        FeatureState::Initializing,
        FeatureState::Initialized,
        FeatureState::Starting,
        FeatureState::Running,
        FeatureState::Stopping,
        FeatureState::Stopped,
        FeatureState::Error,
        FeatureState::Disabled,
        FeatureState::Fallback,
    ];

    /// Returns a short stable label (kebab-case) for logs and events.
    pub fn as_label(&self) -> &'static str {
        match self {
            FeatureState::Idle => "idle",
            FeatureState::Initializing => "initializing",
            FeatureState::Initialized => "initialized",
            FeatureState::Starting => "starting",
            FeatureState::Running => "running",
            FeatureState::Stopping => "stopping",
            FeatureState::Stopped => "stopped",
            FeatureState::Error => "error",
            FeatureState::Disabled => "disabled",
            FeatureState::Fallback => "fallback",
        }
    }

    /// `true` for every state except `Error`, `Disabled` and `Fallback`.
    pub fn is_healthy(&self) -> bool {
        !matches!(
            self,
            FeatureState::Error | FeatureState::Disabled | FeatureState::Fallback
        )
    }

    /// `true` for states that only `destroy` can leave (`Disabled`,
    /// `Fallback`).
    pub fn is_terminal(&self) -> bool {
        matches!(self, FeatureState::Disabled | FeatureState::Fallback)
    }
}

impl fmt::Display for FeatureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Lifecycle phase a unit is driven through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// One-time setup (`on_init`).
    Init,

    /// Bring-up (`on_start`).
    Start,

    /// Graceful stop (`on_stop`).
    Stop,

    /// Teardown (`on_destroy`); sweeps the unit's scope.
    Destroy,
}

impl Phase {
    /// Returns a short stable label for logs and error records.
    pub fn as_label(&self) -> &'static str {
        match self {
            Phase::Init => "init",
            Phase::Start => "start",
            Phase::Stop => "stop",
            Phase::Destroy => "destroy",
        }
    }

    /// Entry guard: may a unit in `from` enter this phase?
    ///
    /// `Init` accepts `Idle`/`Error`, `Start` accepts
    /// `Initialized`/`Stopped`/`Error`, `Stop` accepts `Running`/`Error`,
    /// and `Destroy` accepts any state.
    pub fn permits(&self, from: FeatureState) -> bool {
        match self {
            Phase::Init => matches!(from, FeatureState::Idle | FeatureState::Error),
            Phase::Start => matches!(
                from,
                FeatureState::Initialized | FeatureState::Stopped | FeatureState::Error
            ),
            Phase::Stop => matches!(from, FeatureState::Running | FeatureState::Error),
            Phase::Destroy => true,
        }
    }

    /// Transitional state announced while the hook runs.
    ///
    /// `Destroy` has none; the unit keeps its current state until teardown
    /// settles.
    pub fn active_state(&self) -> Option<FeatureState> {
        match self {
            Phase::Init => Some(FeatureState::Initializing),
            Phase::Start => Some(FeatureState::Starting),
            Phase::Stop => Some(FeatureState::Stopping),
            Phase::Destroy => None,
        }
    }

    /// State the unit lands on when the hook succeeds.
    pub fn success_state(&self) -> FeatureState {
        match self {
            Phase::Init => FeatureState::Initialized,
            Phase::Start => FeatureState::Running,
            Phase::Stop => FeatureState::Stopped,
            Phase::Destroy => FeatureState::Idle,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

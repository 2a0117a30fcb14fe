//! # Status snapshot: read-only view of the runtime.

use std::collections::HashMap;
use std::time::SystemTime;

use crate::context::ActivationContext;
use crate::core::registry::ErrorStats;
use crate::features::FeatureState;

/// Point-in-time view of the manager and its units.
///
/// Produced by [`Manager::status`](crate::Manager::status); purely
/// observational, taking it never mutates anything.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    /// Whether the manager is initialized (and not emergency-stopped).
    pub initialized: bool,
    /// Number of registered units.
    pub features: usize,
    /// Unit counts per lifecycle state; absent states have zero units.
    pub by_state: HashMap<FeatureState, usize>,
    /// Error-history aggregates from the registry.
    pub errors: ErrorStats,
    /// Failures observed since initialize (or the last reload/clear).
    pub error_count: usize,
    /// The most recently captured activation context.
    pub context: Option<ActivationContext>,
    /// When this snapshot was taken.
    pub at: SystemTime,
}

impl StatusSnapshot {
    /// Units currently in a healthy state.
    pub fn healthy(&self) -> usize {
        self.by_state
            .iter()
            .filter(|(state, _)| state.is_healthy())
            .map(|(_, count)| count)
            .sum()
    }

    /// Units in error, disabled or fallback state.
    pub fn problematic(&self) -> usize {
        self.features.saturating_sub(self.healthy())
    }
}

//! # Global manager configuration.
//!
//! Provides [`ManagerConfig`], the settings shared by every unit the manager
//! drives.
//!
//! Config is used in two ways:
//! 1. **Manager creation**: `ManagerBuilder::new(config)`
//! 2. **Recovery defaults**: merged into each feature's overrides when its
//!    cell is built (`RecoveryPolicy::merge`)

use std::time::Duration;

use crate::policies::RecoveryPolicy;

/// Global configuration for the manager runtime.
///
/// ## Field semantics
/// - `sweep_interval`: period of the health sweep that rescues retry-eligible
///   errored units and publishes `manager:health-check`
/// - `recovery`: defaults for every feature; a spec's own overrides win
///   field by field
#[derive(Clone, Debug)]
pub struct ManagerConfig {
    /// Interval between health sweep passes.
    pub sweep_interval: Duration,

    /// Recovery defaults applied to features without explicit overrides.
    pub recovery: RecoveryPolicy,
}

impl Default for ManagerConfig {
    /// Default configuration:
    ///
    /// - `sweep_interval = 60s`
    /// - `recovery = RecoveryPolicy::default()` (3 retries, 1s linear backoff,
    ///   no fallback)
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(60),
            recovery: RecoveryPolicy::default(),
        }
    }
}

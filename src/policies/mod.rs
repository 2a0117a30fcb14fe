//! Recovery and activation policies.
//!
//! This module groups the knobs that control **which** units activate for a
//! given context and **how** a failing unit recovers.
//!
//! ## Contents
//! - [`MatchRule`] when a unit applies (exact / glob / regex / predicate)
//! - [`RecoveryPolicy`] retry budget, linear delay, fallback-on-exhaustion
//! - [`RecoveryOverrides`] per-feature partial policy, merged with defaults
//!
//! ## Quick wiring
//! ```text
//! FeatureConfig { matches: Vec<MatchRule>, recovery: RecoveryOverrides, .. }
//!      └─► features::cell::FeatureCell uses:
//!           - matches (+ predicate) in should_activate()
//!           - RecoveryPolicy::merge(manager defaults, overrides) once, at build
//!           - recovery.delay_for(retry_count) between attempts
//! ```
//!
//! ## Defaults
//! - `RecoveryPolicy::default()` → max_retries=3, retry_delay=1s, fallback=false.
//! - No match rules and no predicate → the unit activates everywhere.

mod matcher;
mod recovery;

pub use matcher::{ContextPredicate, MatchRule};
pub use recovery::{RecoveryOverrides, RecoveryPolicy};

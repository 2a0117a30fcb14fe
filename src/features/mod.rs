//! # Feature abstractions and lifecycle.
//!
//! This module provides the feature-related types:
//! - [`Feature`] - trait for implementing async lifecycle hooks
//! - [`FeatureRef`] - shared reference to a feature (`Arc<dyn Feature>`)
//! - [`FeatureSpec`] / [`FeatureSpecBuilder`] - feature bundled with its configuration
//! - [`FeatureConfig`] - activation rules, dependencies, priority, recovery overrides
//! - [`FeatureCell`] - per-unit state machine with retries and fallback
//! - [`FeatureState`] / [`Phase`] - lifecycle vocabulary
//! - [`Scope`] / [`Resource`] - per-unit timers, resources and cleanups

mod cell;
mod feature;
mod scope;
mod spec;
mod spec_builder;
mod state;

pub use cell::FeatureCell;
pub use feature::{Feature, FeatureRef};
pub use scope::{Resource, Scope};
pub use spec::{FeatureConfig, FeatureSpec};
pub use spec_builder::FeatureSpecBuilder;
pub use state::{FeatureState, Phase};

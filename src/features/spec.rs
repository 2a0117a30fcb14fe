//! # Feature specification for managed lifecycle.
//!
//! Defines [`FeatureConfig`], the plain-data knobs attached to a feature
//! (activation rules, dependencies, priority, recovery overrides, opaque
//! settings), and [`FeatureSpec`], the bundle of a [`FeatureRef`] with its
//! config that gets handed to the manager.
//!
//! A spec can be created:
//! - **Explicitly** with [`FeatureSpec::new`] (full control)
//! - **Fluently** with [`FeatureSpec::builder`]
//!
//! ## Rules
//! - `config.recovery` stays partial here; it is merged with the manager
//!   defaults exactly once, when the managed cell is built.
//! - An empty rule list with no predicate means "activate everywhere".

use std::fmt;

use serde_json::Value;

use crate::features::feature::FeatureRef;
use crate::policies::{ContextPredicate, MatchRule, RecoveryOverrides};

/// Plain-data configuration of a single feature.
///
/// All fields are public; [`FeatureConfig::default`] gives a feature that is
/// enabled, matches everywhere, depends on nothing and inherits the manager's
/// recovery defaults.
#[derive(Clone)]
pub struct FeatureConfig {
    /// Activation rules, evaluated first-match-wins against the context URL.
    pub matches: Vec<MatchRule>,
    /// Names of features that must activate before this one.
    pub depends_on: Vec<String>,
    /// Higher activates earlier among independent features.
    pub priority: i32,
    /// Custom activation predicate; when set it replaces `matches` entirely.
    pub activate_when: Option<ContextPredicate>,
    /// Disabled features are registered but never activated.
    pub enabled: bool,
    /// Partial recovery policy, merged with manager defaults at build time.
    pub recovery: RecoveryOverrides,
    /// Opaque feature-specific settings, passed through untouched.
    pub settings: Value,
}

impl FeatureConfig {
    /// Creates the default config (enabled, matches everywhere).
    pub fn new() -> Self {
        Self {
            matches: Vec::new(),
            depends_on: Vec::new(),
            priority: 0,
            activate_when: None,
            enabled: true,
            recovery: RecoveryOverrides::default(),
            settings: Value::Null,
        }
    }
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FeatureConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureConfig")
            .field("matches", &self.matches)
            .field("depends_on", &self.depends_on)
            .field("priority", &self.priority)
            .field("activate_when", &self.activate_when.is_some())
            .field("enabled", &self.enabled)
            .field("recovery", &self.recovery)
            .field("settings", &self.settings)
            .finish()
    }
}

/// Specification binding a feature implementation to its configuration.
///
/// ## Example
/// ```rust
/// use std::sync::Arc;
/// use plugboard::{Feature, FeatureSpec, RecoveryOverrides};
///
/// struct Overlay;
///
/// impl Feature for Overlay {
///     fn name(&self) -> &str { "overlay" }
/// }
///
/// let spec = FeatureSpec::builder(Arc::new(Overlay))
///     .match_glob("https://shop.example.com/*")
///     .depends_on("session")
///     .priority(10)
///     .recovery(RecoveryOverrides::new().max_retries(1).fallback(true))
///     .build();
///
/// assert_eq!(spec.name(), "overlay");
/// assert_eq!(spec.config().depends_on, vec!["session".to_string()]);
/// ```
#[derive(Clone)]
pub struct FeatureSpec {
    feature: FeatureRef,
    config: FeatureConfig,
}

impl FeatureSpec {
    /// Creates a specification with explicit configuration.
    pub fn new(feature: FeatureRef, config: FeatureConfig) -> Self {
        Self { feature, config }
    }

    /// Creates a specification with the default configuration.
    pub fn from_feature(feature: FeatureRef) -> Self {
        Self::new(feature, FeatureConfig::new())
    }

    /// Returns a reference to the feature implementation.
    pub fn feature(&self) -> &FeatureRef {
        &self.feature
    }

    /// Convenience: returns the feature name.
    pub fn name(&self) -> &str {
        self.feature.name()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }
}

impl fmt::Debug for FeatureSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureSpec")
            .field("name", &self.name())
            .field("config", &self.config)
            .finish()
    }
}

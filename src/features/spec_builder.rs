use std::sync::Arc;

use serde_json::Value;

use crate::context::ActivationContext;
use crate::features::feature::FeatureRef;
use crate::features::spec::{FeatureConfig, FeatureSpec};
use crate::policies::{MatchRule, RecoveryOverrides};

/// Builder for [`FeatureSpec`] with a fluent API.
#[derive(Clone)]
pub struct FeatureSpecBuilder {
    feature: FeatureRef,
    config: FeatureConfig,
}

impl FeatureSpecBuilder {
    /// Creates a builder around a feature implementation.
    pub fn new(feature: FeatureRef) -> Self {
        Self {
            feature,
            config: FeatureConfig::new(),
        }
    }

    /// Adds an exact-URL activation rule.
    #[inline]
    pub fn match_exact(mut self, url: impl Into<String>) -> Self {
        self.config.matches.push(MatchRule::exact(url));
        self
    }

    /// Adds a `*` wildcard activation rule.
    #[inline]
    pub fn match_glob(mut self, pattern: impl Into<String>) -> Self {
        self.config.matches.push(MatchRule::glob(pattern));
        self
    }

    /// Adds a prebuilt activation rule (regex or predicate variants).
    #[inline]
    pub fn match_rule(mut self, rule: MatchRule) -> Self {
        self.config.matches.push(rule);
        self
    }

    /// Replaces rule evaluation with a custom predicate.
    #[inline]
    pub fn activate_when(
        mut self,
        f: impl Fn(&ActivationContext) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.config.activate_when = Some(Arc::new(f));
        self
    }

    /// Declares a dependency; may be called repeatedly.
    #[inline]
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.config.depends_on.push(name.into());
        self
    }

    /// Sets the activation priority (higher activates earlier).
    #[inline]
    pub fn priority(mut self, priority: i32) -> Self {
        self.config.priority = priority;
        self
    }

    /// Enables or disables the feature without unregistering it.
    #[inline]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    /// Sets the recovery overrides (a full [`RecoveryPolicy`] also works).
    ///
    /// [`RecoveryPolicy`]: crate::policies::RecoveryPolicy
    #[inline]
    pub fn recovery(mut self, recovery: impl Into<RecoveryOverrides>) -> Self {
        self.config.recovery = recovery.into();
        self
    }

    /// Attaches opaque feature settings.
    #[inline]
    pub fn settings(mut self, settings: Value) -> Self {
        self.config.settings = settings;
        self
    }

    /// Finalizes the specification.
    pub fn build(self) -> FeatureSpec {
        FeatureSpec::new(self.feature, self.config)
    }
}

impl FeatureSpec {
    /// Creates a builder for constructing a spec with a fluent API.
    pub fn builder(feature: FeatureRef) -> FeatureSpecBuilder {
        FeatureSpecBuilder::new(feature)
    }
}

use std::sync::Arc;

use crate::context::{ContextSource, StaticContext};
use crate::core::config::ManagerConfig;
use crate::core::manager::Manager;
use crate::features::FeatureSpec;

/// Builder for constructing a [`Manager`].
pub struct ManagerBuilder {
    config: ManagerConfig,
    source: Arc<dyn ContextSource>,
    specs: Vec<FeatureSpec>,
}

impl ManagerBuilder {
    /// Creates a new builder with the given configuration.
    ///
    /// Without an explicit context source, activations run against a fixed
    /// `about:blank` context.
    pub fn new(config: ManagerConfig) -> Self {
        Self {
            config,
            source: Arc::new(StaticContext::new("about:blank", "local")),
            specs: Vec::new(),
        }
    }

    /// Sets the context source captured at initialize, activation and
    /// reload time.
    ///
    /// Closures work too: any `Fn() -> ActivationContext` is a source.
    pub fn with_context_source(mut self, source: impl ContextSource) -> Self {
        self.source = Arc::new(source);
        self
    }

    /// Adds one feature specification.
    pub fn with_feature(mut self, spec: FeatureSpec) -> Self {
        self.specs.push(spec);
        self
    }

    /// Adds a batch of feature specifications.
    pub fn with_features(mut self, specs: impl IntoIterator<Item = FeatureSpec>) -> Self {
        self.specs.extend(specs);
        self
    }

    /// Builds the manager.
    ///
    /// This only assembles the runtime components (bus, registry, pending
    /// specs); nothing runs until `initialize()`.
    pub fn build(self) -> Manager {
        Manager::from_parts(self.config, self.source, self.specs)
    }
}

impl Default for ManagerBuilder {
    fn default() -> Self {
        Self::new(ManagerConfig::default())
    }
}

//! # Feature abstraction.
//!
//! This module defines the [`Feature`] trait and the common handle type
//! [`FeatureRef`], an `Arc<dyn Feature>` suitable for sharing across the
//! runtime.
//!
//! A feature exposes up to four async lifecycle hooks; all of them default to
//! success, so an implementation only writes the phases it cares about. Hooks
//! are always driven by the runtime's state machine, never called directly by
//! embedders.

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::ActivationContext;
use crate::error::FeatureError;
use crate::features::scope::Scope;

/// Shared reference to a feature (`Arc<dyn Feature>`).
pub type FeatureRef = Arc<dyn Feature>;

/// # Pluggable unit of behavior.
///
/// A `Feature` has a stable [`name`](Feature::name) and optional async hooks
/// for each lifecycle phase. `on_init` and `on_start` receive the current
/// [`ActivationContext`] plus the unit's [`Scope`] for registering timers,
/// resources and cleanup callbacks; everything registered there is released
/// automatically when the unit stops, falls back or is destroyed.
///
/// Hooks report failures by returning [`FeatureError`]; panics are caught by
/// the runtime and treated as failures of the same attempt.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use plugboard::{ActivationContext, Feature, FeatureError, Scope};
///
/// struct Banner;
///
/// #[async_trait]
/// impl Feature for Banner {
///     fn name(&self) -> &str { "banner" }
///
///     async fn on_start(
///         &self,
///         ctx: &ActivationContext,
///         _scope: &Scope,
///     ) -> Result<(), FeatureError> {
///         if ctx.url.is_empty() {
///             return Err(FeatureError::Hook { error: "no location".into() });
///         }
///         // render...
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Feature: Send + Sync + 'static {
    /// Returns a stable, human-readable feature name (the registry key).
    fn name(&self) -> &str;

    /// One-time setup before the first start (allocate, fetch, wire).
    async fn on_init(&self, ctx: &ActivationContext, scope: &Scope) -> Result<(), FeatureError> {
        let _ = (ctx, scope);
        Ok(())
    }

    /// Bring-up; the unit is live once this succeeds.
    async fn on_start(&self, ctx: &ActivationContext, scope: &Scope) -> Result<(), FeatureError> {
        let _ = (ctx, scope);
        Ok(())
    }

    /// Graceful stop. The unit's scope is swept right after this succeeds.
    async fn on_stop(&self) -> Result<(), FeatureError> {
        Ok(())
    }

    /// Final teardown before the unit returns to `Idle`.
    async fn on_destroy(&self) -> Result<(), FeatureError> {
        Ok(())
    }
}

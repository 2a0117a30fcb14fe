//! # plugboard
//!
//! **Plugboard** is a lightweight plugin-orchestration library for Rust.
//!
//! It provides primitives to define, activate, and recover pluggable feature
//! units with configurable policies. The crate is designed as a building
//! block for host applications that switch functionality on and off per
//! context (per URL, per client, per environment).
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌───────────────┐   ┌───────────────┐   ┌───────────────┐
//!     │  FeatureSpec  │   │  FeatureSpec  │   │  FeatureSpec  │
//!     │ (unit + rules)│   │ (unit + rules)│   │ (unit + rules)│
//!     └──────┬────────┘   └──────┬────────┘   └──────┬────────┘
//!            ▼                   ▼                   ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  Manager (runtime orchestrator)                                 │
//! │  - Bus (synchronous fan-out to listeners)                       │
//! │  - Registry (feature table, dependency order, error history)    │
//! │  - HealthSweep (periodic rescue of retry-eligible units)        │
//! └──────┬──────────────────┬──────────────────┬────────────────────┘
//!        ▼                  ▼                  ▼
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │ FeatureCell  │   │ FeatureCell  │   │ FeatureCell  │
//!     │(state machine│   │(state machine│   │(state machine│
//!     │ + retry loop)│   │ + retry loop)│   │ + retry loop)│
//!     └┬─────────────┘   └┬─────────────┘   └┬─────────────┘
//!      │ publishes        │ publishes        │ publishes
//!      │ feature:*        │ feature:*        │ feature:*
//!      ▼                  ▼                  ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Bus (listener table)                       │
//! └───────────────┬─────────────────────────────┬───────────────────┘
//!                 ▼                             ▼
//!      manager bookkeeping listeners     embedder listeners
//!      (error history, disabled and      (bus().on(kind, f))
//!       fallback re-emits, counters)
//! ```
//!
//! ### Lifecycle
//! ```text
//! FeatureSpec ──► Manager ──► Registry.sorted() ──► FeatureCell phases
//!
//! init/start/stop/destroy:
//!   ├─► entry guard (disallowed transition = warn-logged no-op)
//!   ├─► set transitional state ─► publish feature:state-changed
//!   ├─► run hook (catch_unwind)
//!   │     ├─ Ok  ──► success state (init/start reset retry_count;
//!   │     │          stop/destroy sweep the unit's Scope)
//!   │     └─ Err ──► record error, retry_count += 1, enter Error
//!   │                publish feature:error{ attempt, can_retry }
//!   │                ├─ can_retry ─► sleep(retry_delay × count,
//!   │                │               cancellable) ─► re-enter phase
//!   │                ├─ fallback  ─► sweep Scope ─► Fallback
//!   │                │               publish feature:fallback
//!   │                └─ else      ─► Disabled
//!   └─ exit: unit settled (success state, terminal state, or parked
//!      in Error when a stop/destroy interrupted the backoff wait)
//! ```
//!
//! ## Features
//! | Area              | Description                                                             | Key types / traits                          |
//! |-------------------|-------------------------------------------------------------------------|---------------------------------------------|
//! | **Events**        | Observe every lifecycle step on the synchronous bus.                    | [`Bus`], [`Event`], [`EventKind`]           |
//! | **Policies**      | Configure retry/fallback recovery and activation match rules.           | [`RecoveryPolicy`], [`MatchRule`]           |
//! | **Orchestration** | Validate the dependency graph, drive batch passes, sweep for recovery.  | [`Manager`], [`Registry`]                   |
//! | **Errors**        | Typed errors for orchestration and lifecycle hooks.                     | [`FeatureError`], [`RuntimeError`]          |
//! | **Units**         | Define features with async hooks, rules and dependencies.               | [`Feature`], [`FeatureSpec`], [`FeatureCell`] |
//! | **Configuration** | Centralize runtime settings.                                            | [`ManagerConfig`]                           |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use plugboard::{
//!     ActivationContext, EventKind, Feature, FeatureError, FeatureSpec, Manager,
//!     Scope, StaticContext,
//! };
//!
//! struct Tracker;
//!
//! #[async_trait]
//! impl Feature for Tracker {
//!     fn name(&self) -> &str {
//!         "tracker"
//!     }
//!
//!     async fn on_start(
//!         &self,
//!         ctx: &ActivationContext,
//!         _scope: &Scope,
//!     ) -> Result<(), FeatureError> {
//!         println!("tracking {}", ctx.url);
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = Manager::builder()
//!         .with_context_source(StaticContext::new("https://shop.example/cart", "demo"))
//!         .with_feature(
//!             FeatureSpec::builder(Arc::new(Tracker))
//!                 .match_glob("https://shop.example/*")
//!                 .build(),
//!         )
//!         .build();
//!
//!     // Observe state changes as they happen.
//!     let _sub = manager.bus().on(EventKind::StateChanged, |ev| {
//!         if let (Some(feature), Some(to)) = (&ev.feature, ev.to) {
//!             println!("{feature} -> {to}");
//!         }
//!     });
//!
//!     manager.initialize()?;
//!     let outcome = manager.activate_features().await?;
//!     assert_eq!(outcome.succeeded, 1);
//!
//!     manager.deactivate_features().await;
//!     Ok(())
//! }
//! ```

mod context;
mod core;
mod error;
mod events;
mod features;
mod policies;

// ---- Public re-exports ----

pub use context::{ActivationContext, ContextSource, StaticContext};
pub use crate::core::{
    ERROR_HISTORY_CAP, ErrorStats, GraphReport, Manager, ManagerBuilder, ManagerConfig, Registry,
    StatusSnapshot,
};
pub use error::{ErrorRecord, FeatureError, RuntimeError};
pub use events::{BatchOutcome, Bus, Event, EventKind, HealthSnapshot, Subscription};
pub use features::{
    Feature, FeatureCell, FeatureConfig, FeatureRef, FeatureSpec, FeatureSpecBuilder,
    FeatureState, Phase, Resource, Scope,
};
pub use policies::{ContextPredicate, MatchRule, RecoveryOverrides, RecoveryPolicy};

//! Runtime events: types and synchronous bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to runtime events emitted by feature cells, the health
//! sweep and the manager.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`BatchOutcome`], [`HealthSnapshot`] aggregate payloads
//! - [`Bus`], [`Subscription`] synchronous per-kind fan-out
//!
//! ## Quick reference
//! - **Publishers**: `FeatureCell` (state changes, errors, fallback),
//!   the health sweep (`manager:health-check`), and `Manager` (initialized,
//!   batch outcomes, terminal unit acknowledgements, emergency stop).
//! - **Consumers**: the manager's bookkeeping listeners (error history,
//!   terminal re-emits) and whatever the embedder registers.
//!
//! See the [crate-level docs](crate) for the system-level wiring diagram.

mod bus;
mod event;

pub use bus::{Bus, Subscription};
pub use event::{BatchOutcome, Event, EventKind, HealthSnapshot};

//! # Event bus for synchronous fan-out of runtime events.
//!
//! [`Bus`] dispatches each published event to every listener registered for
//! that exact kind, inline on the publisher's call stack.
//!
//! ## Architecture
//! ```text
//! Publishers (many):                     Listeners (per kind):
//!   FeatureCell ──┐                       ┌──► listener 1
//!   Sweep       ──┼──► Bus::publish ──────┼──► listener 2
//!   Manager     ──┘    (snapshot, then    └──► listener N
//!                       same call stack)
//! ```
//!
//! ## Rules
//! - **Synchronous**: every listener has run by the time `publish()` returns.
//! - **Snapshot dispatch**: the listener list is captured when `publish()`
//!   starts. Listeners added during dispatch see only later events; listeners
//!   removed during dispatch still receive the current one.
//! - **Isolation**: a panicking listener is caught and logged; the remaining
//!   listeners still run.
//! - **Per-kind ordering**: listeners run in registration order.
//! - **No persistence**: publishing with zero listeners is a no-op.
//!
//! Dropping a [`Subscription`] does **not** remove the listener; call
//! [`Subscription::unsubscribe`] (or [`Bus::off`]) explicitly.

use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tracing::warn;

use crate::error::panic_text;

use super::event::{Event, EventKind};

type Listener = dyn Fn(&Event) + Send + Sync;

struct Entry {
    id: u64,
    once: bool,
    f: Arc<Listener>,
}

struct Shared {
    listeners: Mutex<HashMap<EventKind, Vec<Entry>>>,
    next_id: AtomicU64,
}

impl Shared {
    fn table(&self) -> MutexGuard<'_, HashMap<EventKind, Vec<Entry>>> {
        // Listeners never run under the lock, so poisoning is unreachable;
        // recover instead of propagating a panic.
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn remove(&self, kind: EventKind, id: u64) {
        let mut table = self.table();
        if let Some(entries) = table.get_mut(&kind) {
            entries.retain(|e| e.id != id);
            if entries.is_empty() {
                table.remove(&kind);
            }
        }
    }
}

/// Synchronous event bus.
///
/// Listeners are plain `Fn(&Event)` closures keyed by [`EventKind`].
/// Registration returns a [`Subscription`] handle used for removal.
///
/// ### Properties
/// - **Cloneable**: cheap to clone (internally holds an `Arc`-backed table).
/// - **Reentrant**: listeners may publish, subscribe and unsubscribe; the
///   table lock is never held while listeners run.
/// - **Fire-and-forget**: no delivery or durability guarantees beyond the
///   current process.
pub struct Bus {
    shared: Arc<Shared>,
}

impl Bus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                listeners: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Registers a listener for the given kind.
    ///
    /// The listener runs on every matching publish until unsubscribed.
    pub fn on(&self, kind: EventKind, f: impl Fn(&Event) + Send + Sync + 'static) -> Subscription {
        self.register(kind, false, Arc::new(f))
    }

    /// Registers a listener that fires at most once.
    ///
    /// The entry leaves the table before dispatch, so a reentrant publish
    /// from inside the listener cannot trigger it a second time.
    pub fn once(
        &self,
        kind: EventKind,
        f: impl Fn(&Event) + Send + Sync + 'static,
    ) -> Subscription {
        self.register(kind, true, Arc::new(f))
    }

    /// Removes the listener behind a subscription. Idempotent.
    pub fn off(&self, sub: &Subscription) {
        sub.unsubscribe();
    }

    /// Publishes an event to all listeners registered for its kind.
    ///
    /// Every listener runs before this returns; a panicking listener is
    /// logged and skipped. With zero listeners this is a cheap no-op.
    pub fn publish(&self, ev: Event) {
        let snapshot: Vec<Arc<Listener>> = {
            let mut table = self.shared.table();
            let Some(entries) = table.get_mut(&ev.kind) else {
                return;
            };
            let snapshot = entries.iter().map(|e| Arc::clone(&e.f)).collect();
            entries.retain(|e| !e.once);
            if entries.is_empty() {
                table.remove(&ev.kind);
            }
            snapshot
        };

        for listener in snapshot {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| listener(&ev))) {
                warn!(
                    event = ev.kind.as_label(),
                    "listener panicked during dispatch: {}",
                    panic_text(payload.as_ref())
                );
            }
        }
    }

    /// Number of listeners currently registered for the kind.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.shared.table().get(&kind).map_or(0, Vec::len)
    }

    fn register(&self, kind: EventKind, once: bool, f: Arc<Listener>) -> Subscription {
        let id = self.shared.next_id.fetch_add(1, AtomicOrdering::Relaxed);
        self.shared
            .table()
            .entry(kind)
            .or_default()
            .push(Entry { id, once, f });
        Subscription {
            kind,
            id,
            shared: Arc::downgrade(&self.shared),
        }
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Bus {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl fmt::Debug for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total: usize = self.shared.table().values().map(Vec::len).sum();
        f.debug_struct("Bus").field("listeners", &total).finish()
    }
}

/// Handle to a registered listener.
///
/// Holds a weak reference to the bus, so it never keeps the listener table
/// alive on its own.
pub struct Subscription {
    kind: EventKind,
    id: u64,
    shared: Weak<Shared>,
}

impl Subscription {
    /// Kind this subscription listens for.
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Removes the listener from the bus. Safe to call repeatedly; calls
    /// after the first (or after the bus is gone) are no-ops.
    pub fn unsubscribe(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.remove(self.kind, self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .finish()
    }
}

//! # Per-unit resource scope.
//!
//! Everything a feature acquires while active is registered on its [`Scope`]
//! so the runtime can release it deterministically:
//!
//! - one-shot timers ([`Scope::schedule`]) and periodic timers
//!   ([`Scope::every`]), both cancellable;
//! - owned [`Resource`] handles ([`Scope::own`]);
//! - ad-hoc cleanup callbacks ([`Scope::defer`]).
//!
//! A sweep runs when the unit stops, is destroyed, or drops into fallback
//! mode. It drains the scope: timers are cancelled, resources released,
//! cleanups run, each step isolated with `catch_unwind` so one panicking
//! handler cannot block the rest. Draining makes the sweep idempotent; a
//! second sweep finds nothing to do.
//!
//! ## Rules
//! - Timer registration spawns onto the ambient Tokio runtime; hooks always
//!   run inside one.
//! - Timer callbacks are synchronous and should be short; cancellation takes
//!   effect at the next await point, so a sleeping timer dies immediately.
//! - Sweeps never run user code under a lock.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::panic_text;

type CleanupFn = Box<dyn FnOnce() + Send>;

struct TimerEntry {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// # Externally-owned resource tied to a unit's lifetime.
///
/// Registered with [`Scope::own`]; [`release`](Resource::release) is called
/// exactly once when the scope is swept.
pub trait Resource: Send + Sync + 'static {
    /// Short label for logs.
    fn label(&self) -> &str;

    /// Releases the resource. Must be safe to call from a sweep at any
    /// lifecycle point after registration.
    fn release(&self);
}

/// Holder for a unit's timers, resources and cleanup callbacks.
///
/// Hooks receive `&Scope` and register what they acquire; the runtime sweeps
/// it on stop, destroy and fallback.
pub struct Scope {
    name: Arc<str>,
    timers: Mutex<Vec<TimerEntry>>,
    resources: Mutex<Vec<Arc<dyn Resource>>>,
    cleanups: Mutex<Vec<CleanupFn>>,
}

fn locked<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // User code never runs under these locks, so poisoning is unreachable.
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl Scope {
    pub(crate) fn new(name: Arc<str>) -> Self {
        Self {
            name,
            timers: Mutex::new(Vec::new()),
            resources: Mutex::new(Vec::new()),
            cleanups: Mutex::new(Vec::new()),
        }
    }

    /// Runs `f` once after `delay`, unless the scope is swept first.
    pub fn schedule(&self, delay: Duration, f: impl FnOnce() + Send + 'static) {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let name = Arc::clone(&self.name);

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {}
                _ = time::sleep(delay) => {
                    if let Err(payload) = catch_unwind(AssertUnwindSafe(f)) {
                        warn!(
                            feature = %name,
                            "scheduled callback panicked: {}",
                            panic_text(payload.as_ref())
                        );
                    }
                }
            }
        });
        locked(&self.timers).push(TimerEntry { token, handle });
    }

    /// Runs `f` every `period` (first run after one full period) until the
    /// scope is swept.
    pub fn every(&self, period: Duration, mut f: impl FnMut() + Send + 'static) {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let name = Arc::clone(&self.name);

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| f())) {
                            warn!(
                                feature = %name,
                                "periodic callback panicked: {}",
                                panic_text(payload.as_ref())
                            );
                        }
                    }
                }
            }
        });
        locked(&self.timers).push(TimerEntry { token, handle });
    }

    /// Ties a resource to the unit's lifetime; released on the next sweep.
    pub fn own(&self, resource: Arc<dyn Resource>) {
        locked(&self.resources).push(resource);
    }

    /// Registers an ad-hoc cleanup callback; runs once on the next sweep.
    pub fn defer(&self, f: impl FnOnce() + Send + 'static) {
        locked(&self.cleanups).push(Box::new(f));
    }

    /// Timers currently tracked (fired one-shots stay until the sweep).
    pub fn timer_count(&self) -> usize {
        locked(&self.timers).len()
    }

    /// Resources awaiting release.
    pub fn resource_count(&self) -> usize {
        locked(&self.resources).len()
    }

    /// Cleanup callbacks awaiting the sweep.
    pub fn cleanup_count(&self) -> usize {
        locked(&self.cleanups).len()
    }

    /// Drains the scope: cancels timers, releases resources, runs cleanups.
    ///
    /// Each resource and cleanup is isolated with `catch_unwind`; a panic is
    /// logged and the sweep continues. Idempotent.
    pub(crate) fn sweep(&self) {
        let timers = std::mem::take(&mut *locked(&self.timers));
        let resources = std::mem::take(&mut *locked(&self.resources));
        let cleanups = std::mem::take(&mut *locked(&self.cleanups));

        if timers.is_empty() && resources.is_empty() && cleanups.is_empty() {
            return;
        }
        debug!(
            feature = %self.name,
            timers = timers.len(),
            resources = resources.len(),
            cleanups = cleanups.len(),
            "sweeping scope"
        );

        for timer in &timers {
            timer.token.cancel();
            timer.handle.abort();
        }

        for resource in resources {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| resource.release())) {
                warn!(
                    feature = %self.name,
                    resource = resource.label(),
                    "resource release panicked: {}",
                    panic_text(payload.as_ref())
                );
            }
        }

        for cleanup in cleanups {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(move || cleanup())) {
                warn!(
                    feature = %self.name,
                    "cleanup callback panicked: {}",
                    panic_text(payload.as_ref())
                );
            }
        }
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("feature", &self.name)
            .field("timers", &self.timer_count())
            .field("resources", &self.resource_count())
            .field("cleanups", &self.cleanup_count())
            .finish()
    }
}

//! # Health sweep: periodic rescue of retry-eligible errored units.
//!
//! Every `sweep_interval` the sweep takes a health snapshot, resets units
//! parked in `Error` that still have retry budget (back to `Idle`, where the
//! next activation pass picks them up), and publishes `manager:health-check`
//! with the snapshot taken **before** the rescues, so the event reports what
//! the sweep observed. Terminal units (`Disabled`, `Fallback`) are never
//! touched.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::core::registry::Registry;
use crate::events::{Bus, Event, EventKind, HealthSnapshot};
use crate::features::FeatureState;

/// Builds the health counts carried by `manager:health-check` and
/// `manager:initialized`.
pub(crate) fn health_snapshot(registry: &Registry) -> HealthSnapshot {
    let stats = registry.error_stats();
    HealthSnapshot {
        features: registry.len(),
        healthy: registry.healthy().len(),
        problematic: registry.problematic().len(),
        total_errors: stats.total,
        recent_errors: stats.recent,
        errors_by_feature: stats.by_feature,
    }
}

pub(crate) struct HealthSweep {
    registry: Arc<Registry>,
    bus: Bus,
    interval: Duration,
}

impl HealthSweep {
    pub(crate) fn new(registry: Arc<Registry>, bus: Bus, interval: Duration) -> Self {
        Self {
            registry,
            bus,
            interval,
        }
    }

    /// Spawns the periodic sweep task; stops when the token is cancelled.
    ///
    /// The first pass runs one full interval after the spawn.
    pub(crate) fn spawn(self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let start = time::Instant::now() + self.interval;
            let mut ticker = time::interval_at(start, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => self.run_once(),
                }
            }
            debug!("health sweep stopped");
        })
    }

    /// One pass: snapshot, rescue, report.
    fn run_once(&self) {
        let snapshot = health_snapshot(&self.registry);

        let mut rescued = 0usize;
        for cell in self.registry.by_state(FeatureState::Error) {
            if cell.can_retry() {
                cell.reset();
                rescued += 1;
            }
        }
        if rescued > 0 {
            info!(rescued, "health sweep rescued errored units");
        }

        self.bus
            .publish(Event::new(EventKind::HealthCheck).with_health(snapshot));
    }
}

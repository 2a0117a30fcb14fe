//! # Example: retry_fallback
//!
//! Two misbehaving units side by side:
//! - `flaky` fails `on_start` twice, then succeeds on the third attempt
//!   (linear backoff between tries).
//! - `doomed` never comes up; with `fallback(true)` it lands in degraded
//!   mode instead of being disabled, and everything it registered gets
//!   released exactly once.
//!
//! ## Flow
//! ```text
//! activate_features()
//!   ├─► flaky:  start #1 → Err → feature:error (attempt=1) → wait 200ms
//!   │           start #2 → Err → feature:error (attempt=2) → wait 400ms
//!   │           start #3 → Ok  → running
//!   └─► doomed: start #1 → Err → feature:error (attempt=1) → wait 100ms
//!               start #2 → Err → budget exhausted
//!                 └─► scope swept → feature:fallback → manager:fallback
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example retry_fallback
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use plugboard::{
    ActivationContext, EventKind, Feature, FeatureError, FeatureSpec, Manager, RecoveryOverrides,
    Scope, StaticContext,
};

static FLAKY_CALLS: AtomicU32 = AtomicU32::new(0);

struct Flaky;

#[async_trait]
impl Feature for Flaky {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn on_start(
        &self,
        _ctx: &ActivationContext,
        _scope: &Scope,
    ) -> Result<(), FeatureError> {
        let attempt = FLAKY_CALLS.fetch_add(1, Ordering::Relaxed) + 1;
        if attempt <= 2 {
            println!("[flaky] simulated failure #{attempt}");
            return Err(FeatureError::Hook {
                error: format!("boom #{attempt}"),
            });
        }
        println!("[flaky] success on attempt {attempt}");
        Ok(())
    }
}

struct Doomed;

#[async_trait]
impl Feature for Doomed {
    fn name(&self) -> &str {
        "doomed"
    }

    async fn on_init(&self, _ctx: &ActivationContext, scope: &Scope) -> Result<(), FeatureError> {
        // Registered work is released when the unit degrades.
        scope.every(Duration::from_secs(1), || println!("[doomed] poll"));
        scope.defer(|| println!("[doomed] cleanup ran"));
        Ok(())
    }

    async fn on_start(
        &self,
        _ctx: &ActivationContext,
        _scope: &Scope,
    ) -> Result<(), FeatureError> {
        Err(FeatureError::Hook {
            error: "refuses to start".into(),
        })
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1) flaky gets three attempts; doomed gets two, then degrades
    let manager = Manager::builder()
        .with_context_source(StaticContext::new("https://app.example/", "demo"))
        .with_feature(
            FeatureSpec::builder(Arc::new(Flaky))
                .recovery(
                    RecoveryOverrides::new()
                        .max_retries(2)
                        .retry_delay(Duration::from_millis(200)),
                )
                .build(),
        )
        .with_feature(
            FeatureSpec::builder(Arc::new(Doomed))
                .recovery(
                    RecoveryOverrides::new()
                        .max_retries(1)
                        .retry_delay(Duration::from_millis(100))
                        .fallback(true),
                )
                .build(),
        )
        .build();

    // 2) Watch the recovery machinery at work
    manager.bus().on(EventKind::FeatureError, |ev| {
        println!(
            "[bus] error in {} (attempt {}, retrying: {})",
            ev.feature.as_deref().unwrap_or("?"),
            ev.attempt.unwrap_or(0),
            ev.can_retry.unwrap_or(false),
        );
    });
    manager.bus().on(EventKind::FeatureFallback, |ev| {
        println!(
            "[bus] {} degraded to fallback",
            ev.feature.as_deref().unwrap_or("?")
        );
    });

    // 3) One activation pass covers the whole story
    manager.initialize()?;
    let outcome = manager.activate_features().await?;
    println!(
        "[main] succeeded={} failed={} of {}",
        outcome.succeeded, outcome.failed, outcome.total
    );

    // 4) Where did everyone end up?
    for cell in manager.registry().all() {
        println!("[main] {} -> {}", cell.name(), cell.state());
    }

    manager.deactivate_features().await;
    Ok(())
}

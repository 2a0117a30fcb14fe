//! # Example: basic
//!
//! Smallest useful setup: two units with a dependency between them,
//! activated against a static context and torn down in reverse order.
//!
//! Demonstrates how to:
//! - Implement [`Feature`] hooks (`on_init`, `on_start`, `on_stop`).
//! - Declare a dependency so activation order is resolved for you.
//! - Watch lifecycle traffic by subscribing to the bus.
//!
//! ## Flow
//! ```text
//! main()
//!   ├─► Manager::builder() ... build()
//!   ├─► bus().on(StateChanged) → println
//!   ├─► initialize()           → graph validated → manager:initialized
//!   ├─► activate_features()    → store init/start → dashboard init/start
//!   ├─► status()               → 2 units healthy
//!   └─► deactivate_features()  → dashboard stop/destroy → store stop/destroy
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=info cargo run --example basic
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use plugboard::{
    ActivationContext, EventKind, Feature, FeatureError, FeatureSpec, Manager, Scope,
    StaticContext,
};

struct Store;

#[async_trait]
impl Feature for Store {
    fn name(&self) -> &str {
        "store"
    }

    async fn on_init(&self, ctx: &ActivationContext, _scope: &Scope) -> Result<(), FeatureError> {
        println!("[store] opening for {}", ctx.url);
        Ok(())
    }

    async fn on_stop(&self) -> Result<(), FeatureError> {
        println!("[store] flushed");
        Ok(())
    }
}

struct Dashboard;

#[async_trait]
impl Feature for Dashboard {
    fn name(&self) -> &str {
        "dashboard"
    }

    async fn on_start(&self, ctx: &ActivationContext, scope: &Scope) -> Result<(), FeatureError> {
        println!("[dashboard] rendering for client '{}'", ctx.client);
        scope.defer(|| println!("[dashboard] widgets dropped"));
        Ok(())
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1) Make the runtime's own tracing visible (RUST_LOG controls it)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // 2) Two units: the dashboard renders only after the store is up
    let manager = Manager::builder()
        .with_context_source(StaticContext::new("https://app.example/home", "demo"))
        .with_feature(FeatureSpec::from_feature(Arc::new(Store)))
        .with_feature(
            FeatureSpec::builder(Arc::new(Dashboard))
                .depends_on("store")
                .build(),
        )
        .build();

    // 3) Print every state transition the runtime publishes
    manager.bus().on(EventKind::StateChanged, |ev| {
        println!(
            "[bus] {} {} -> {}",
            ev.feature.as_deref().unwrap_or("?"),
            ev.from.map_or_else(|| "?".to_string(), |s| s.to_string()),
            ev.to.map_or_else(|| "?".to_string(), |s| s.to_string()),
        );
    });

    // 4) Validate the graph, capture the context, start the health sweep
    manager.initialize()?;

    // 5) Bring everything up in dependency order
    let outcome = manager.activate_features().await?;
    println!(
        "[main] activated {}/{} units",
        outcome.succeeded, outcome.total
    );

    let status = manager.status();
    println!(
        "[main] healthy={} problematic={}",
        status.healthy(),
        status.problematic()
    );

    // 6) Tear down in reverse activation order
    manager.deactivate_features().await;
    println!("[main] done.");
    Ok(())
}

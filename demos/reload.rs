//! # Example: reload
//!
//! Context-driven activation across navigation: units declare URL match
//! rules, a closure source reports wherever the app currently is, and
//! reload passes reconcile the running set.
//!
//! Demonstrates how to:
//! - Drive activation from a [`ContextSource`] closure.
//! - Scope a unit to part of the app with `match_glob`.
//! - Reconcile after navigation with `reload_features` / `reload_feature`.
//!
//! ## Flow
//! ```text
//! /shop/cart  activate_features()        → analytics ✓   checkout ✓
//! /blog/post  reload_features()          → analytics ✓   checkout idle
//! /shop/pay   reload_feature("checkout") → checkout ✓ again
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example reload
//! ```

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use plugboard::{ActivationContext, Feature, FeatureError, FeatureSpec, Manager, Scope};

struct Analytics;

#[async_trait]
impl Feature for Analytics {
    fn name(&self) -> &str {
        "analytics"
    }

    async fn on_start(&self, ctx: &ActivationContext, _scope: &Scope) -> Result<(), FeatureError> {
        println!("[analytics] tracking {}", ctx.url);
        Ok(())
    }
}

struct Checkout;

#[async_trait]
impl Feature for Checkout {
    fn name(&self) -> &str {
        "checkout"
    }

    async fn on_start(&self, ctx: &ActivationContext, _scope: &Scope) -> Result<(), FeatureError> {
        println!("[checkout] payment widget on {}", ctx.url);
        Ok(())
    }

    async fn on_destroy(&self) -> Result<(), FeatureError> {
        println!("[checkout] widget removed");
        Ok(())
    }
}

fn print_states(manager: &Manager) {
    for cell in manager.registry().all() {
        println!("        {} -> {}", cell.name(), cell.state());
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1) The "location bar": reload passes re-capture it through this source
    let location = Arc::new(Mutex::new(String::from("https://shop.example/cart")));
    let source = {
        let location = Arc::clone(&location);
        move || ActivationContext::new(location.lock().unwrap().as_str(), "demo")
    };

    // 2) analytics runs everywhere; checkout only under the shop
    let manager = Manager::builder()
        .with_context_source(source)
        .with_feature(FeatureSpec::from_feature(Arc::new(Analytics)))
        .with_feature(
            FeatureSpec::builder(Arc::new(Checkout))
                .match_glob("https://shop.example/*")
                .build(),
        )
        .build();

    manager.initialize()?;

    // 3) First visit: both match
    println!("[nav] https://shop.example/cart");
    manager.activate_features().await?;
    print_states(&manager);

    // 4) Navigate away: the full reload leaves checkout behind
    *location.lock().unwrap() = String::from("https://blog.example/post");
    println!("[nav] https://blog.example/post");
    manager.reload_features().await?;
    print_states(&manager);

    // 5) Back in the shop: reload just the one unit
    *location.lock().unwrap() = String::from("https://shop.example/pay");
    println!("[nav] https://shop.example/pay");
    manager.reload_feature("checkout").await?;
    print_states(&manager);

    manager.deactivate_features().await;
    println!("[main] done.");
    Ok(())
}

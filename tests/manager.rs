//! Manager orchestration: graph validation, activation passes, reloads,
//! the health sweep and emergency teardown.

mod support;

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use plugboard::{
    ActivationContext, EventKind, FeatureSpec, FeatureState, Manager, ManagerBuilder,
    ManagerConfig, RecoveryOverrides, RecoveryPolicy, RuntimeError, StaticContext,
};

use support::{Recorder, Scripted};

const URL: &str = "https://app.example/dash";

fn static_source() -> StaticContext {
    StaticContext::new(URL, "web")
}

#[tokio::test]
async fn test_invalid_graph_is_fatal() {
    let manager = Manager::builder()
        .with_context_source(static_source())
        .with_feature(
            FeatureSpec::builder(Arc::new(Scripted::new("a")))
                .depends_on("ghost")
                .build(),
        )
        .with_feature(
            FeatureSpec::builder(Arc::new(Scripted::new("b")))
                .depends_on("c")
                .build(),
        )
        .with_feature(
            FeatureSpec::builder(Arc::new(Scripted::new("c")))
                .depends_on("b")
                .build(),
        )
        .build();

    match manager.initialize().unwrap_err() {
        RuntimeError::InvalidGraph { errors } => {
            assert_eq!(errors.len(), 2);
            assert!(errors.iter().any(|e| e.contains("ghost")));
            assert!(errors.iter().any(|e| e.contains("cycle")));
        }
        other => panic!("expected InvalidGraph, got {other:?}"),
    }
    assert!(!manager.is_initialized());
    assert!(matches!(
        manager.activate_features().await,
        Err(RuntimeError::NotInitialized)
    ));
}

#[tokio::test]
async fn test_activation_pass_counts_skips() {
    let db = Arc::new(Scripted::new("db"));
    let api = Arc::new(Scripted::new("api"));
    let ads = Arc::new(Scripted::new("ads"));
    let off = Arc::new(Scripted::new("off"));

    let manager = Manager::builder()
        .with_context_source(static_source())
        .with_feature(FeatureSpec::from_feature(db.clone()))
        .with_feature(FeatureSpec::builder(api.clone()).depends_on("db").build())
        .with_feature(
            FeatureSpec::builder(ads.clone())
                .match_exact("https://other.example/")
                .build(),
        )
        .with_feature(FeatureSpec::builder(off.clone()).enabled(false).build())
        .build();

    manager.initialize().unwrap();
    let outcome = manager.activate_features().await.unwrap();
    assert_eq!(outcome.total, 4);
    assert_eq!(outcome.succeeded, 2);
    assert_eq!(outcome.skipped, 2);
    assert_eq!(outcome.failed, 0);

    let registry = manager.registry();
    assert_eq!(registry.get("db").unwrap().state(), FeatureState::Running);
    assert_eq!(registry.get("api").unwrap().state(), FeatureState::Running);
    assert_eq!(registry.get("ads").unwrap().state(), FeatureState::Idle);
    assert_eq!(registry.get("off").unwrap().state(), FeatureState::Idle);

    // A second pass finds the survivors already running and touches nothing.
    let again = manager.activate_features().await.unwrap();
    assert_eq!(again.succeeded, 0);
    assert_eq!(again.skipped, 4);
    assert_eq!(db.calls.init.load(Ordering::SeqCst), 1);
    assert_eq!(db.calls.start.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_exhausted_unit_is_disabled_and_reported() {
    let brittle = Arc::new(Scripted::new("brittle").with_init_failures(10));
    let manager = Manager::builder()
        .with_context_source(static_source())
        .with_feature(
            FeatureSpec::builder(brittle.clone())
                .recovery(RecoveryOverrides::new().max_retries(0))
                .build(),
        )
        .build();
    let recorder = Recorder::attach(manager.bus());

    manager.initialize().unwrap();
    let outcome = manager.activate_features().await.unwrap();
    assert_eq!(outcome.failed, 1);

    let cell = manager.registry().get("brittle").unwrap();
    assert_eq!(cell.state(), FeatureState::Disabled);
    assert_eq!(brittle.calls.init.load(Ordering::SeqCst), 1);
    assert_eq!(brittle.calls.start.load(Ordering::SeqCst), 0);

    assert_eq!(recorder.count(EventKind::FeatureError), 1);
    let disabled = recorder.of_kind(EventKind::FeatureDisabled);
    assert_eq!(disabled.len(), 1);
    assert_eq!(disabled[0].feature.as_deref(), Some("brittle"));
    assert_eq!(disabled[0].reason.as_deref(), Some("retry budget exhausted"));

    assert_eq!(manager.error_count(), 1);
    let status = manager.status();
    assert_eq!(status.errors.total, 1);
    assert_eq!(status.by_state.get(&FeatureState::Disabled), Some(&1));

    // Later passes skip it without touching the hook again.
    let again = manager.activate_features().await.unwrap();
    assert_eq!(again.skipped, 1);
    assert_eq!(brittle.calls.init.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_fallback_entry_is_acknowledged() {
    let degraded = Arc::new(Scripted::new("degraded").with_start_failures(10));
    let manager = Manager::builder()
        .with_context_source(static_source())
        .with_feature(
            FeatureSpec::builder(degraded.clone())
                .recovery(RecoveryOverrides::new().max_retries(0).fallback(true))
                .build(),
        )
        .build();
    let recorder = Recorder::attach(manager.bus());

    manager.initialize().unwrap();
    let outcome = manager.activate_features().await.unwrap();
    assert_eq!(outcome.failed, 1);
    assert_eq!(
        manager.registry().get("degraded").unwrap().state(),
        FeatureState::Fallback
    );

    assert_eq!(recorder.count(EventKind::FeatureFallback), 1);
    let acks = recorder.of_kind(EventKind::ManagerFallback);
    assert_eq!(acks.len(), 1);
    assert_eq!(acks[0].feature.as_deref(), Some("degraded"));

    // Skipped, not retried, on the next pass.
    let again = manager.activate_features().await.unwrap();
    assert_eq!(again.skipped, 1);
    assert_eq!(degraded.calls.start.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_deactivation_runs_in_reverse_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let a = Arc::new(Scripted::new("a").with_log(Arc::clone(&log)));
    let b = Arc::new(Scripted::new("b").with_log(Arc::clone(&log)));

    let manager = Manager::builder()
        .with_context_source(static_source())
        .with_feature(FeatureSpec::builder(a).depends_on("b").build())
        .with_feature(FeatureSpec::from_feature(b))
        .build();

    manager.initialize().unwrap();
    manager.activate_features().await.unwrap();
    assert_eq!(
        *log.lock().unwrap(),
        vec!["b:init", "b:start", "a:init", "a:start"]
    );

    let outcome = manager.deactivate_features().await;
    assert_eq!(outcome.succeeded, 2);
    assert_eq!(
        log.lock().unwrap()[4..],
        ["a:stop", "a:destroy", "b:stop", "b:destroy"]
    );
    assert_eq!(
        manager.registry().get("a").unwrap().state(),
        FeatureState::Idle
    );
    assert_eq!(
        manager.registry().get("b").unwrap().state(),
        FeatureState::Idle
    );

    // The order list is consumed: nothing left for a second pass.
    let empty = manager.deactivate_features().await;
    assert_eq!(empty.total, 0);
}

#[tokio::test(start_paused = true)]
async fn test_sweep_rescues_parked_error() {
    let wobbly = Arc::new(Scripted::new("wobbly").with_init_failures(1));
    let config = ManagerConfig {
        sweep_interval: Duration::from_secs(5),
        ..ManagerConfig::default()
    };
    let manager = Arc::new(
        ManagerBuilder::new(config)
            .with_context_source(static_source())
            .with_feature(
                FeatureSpec::builder(wobbly.clone())
                    .recovery(
                        RecoveryOverrides::new()
                            .max_retries(3)
                            .retry_delay(Duration::from_secs(3600)),
                    )
                    .build(),
            )
            .build(),
    );
    let recorder = Recorder::attach(manager.bus());
    manager.initialize().unwrap();

    // The pass parks in a long backoff wait after the first failure;
    // abandoning it leaves the unit in `Error` with budget to spare.
    let pass = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.activate_features().await })
    };
    let cell = manager.registry().get("wobbly").unwrap();
    while cell.state() != FeatureState::Error {
        tokio::task::yield_now().await;
    }
    pass.abort();
    assert!(pass.await.unwrap_err().is_cancelled());
    assert!(cell.can_retry());

    // The next sweep tick resets it for another try.
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(cell.state(), FeatureState::Idle);
    assert_eq!(cell.retry_count(), 0);
    assert!(recorder.count(EventKind::HealthCheck) >= 1);

    let outcome = manager.activate_features().await.unwrap();
    assert_eq!(outcome.succeeded, 1);
    assert_eq!(cell.state(), FeatureState::Running);
    assert_eq!(wobbly.calls.init.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_sweep_leaves_disabled_units_alone() {
    let brittle = Arc::new(Scripted::new("brittle").with_init_failures(10));
    let config = ManagerConfig {
        sweep_interval: Duration::from_secs(5),
        ..ManagerConfig::default()
    };
    let manager = ManagerBuilder::new(config)
        .with_context_source(static_source())
        .with_feature(
            FeatureSpec::builder(brittle.clone())
                .recovery(RecoveryOverrides::new().max_retries(0))
                .build(),
        )
        .build();

    manager.initialize().unwrap();
    let outcome = manager.activate_features().await.unwrap();
    assert_eq!(outcome.failed, 1);

    let cell = manager.registry().get("brittle").unwrap();
    assert_eq!(cell.state(), FeatureState::Disabled);
    assert_eq!(cell.retry_count(), 1);

    // Attached after the failure, so any sweep touch would show as a transition.
    let recorder = Recorder::attach(manager.bus());
    tokio::time::sleep(Duration::from_secs(12)).await;

    // Two ticks fired, and the terminal unit came through them untouched.
    assert!(recorder.count(EventKind::HealthCheck) >= 2);
    assert_eq!(cell.state(), FeatureState::Disabled);
    assert_eq!(cell.retry_count(), 1);
    assert!(recorder.transitions_for("brittle").is_empty());
    assert_eq!(brittle.calls.init.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_emergency_stop_halts_everything() {
    let svc = Arc::new(Scripted::new("svc"));
    let config = ManagerConfig {
        sweep_interval: Duration::from_secs(5),
        ..ManagerConfig::default()
    };
    let manager = ManagerBuilder::new(config)
        .with_context_source(static_source())
        .with_feature(FeatureSpec::from_feature(svc.clone()))
        .build();
    let recorder = Recorder::attach(manager.bus());

    manager.initialize().unwrap();
    manager.activate_features().await.unwrap();
    assert_eq!(
        manager.registry().get("svc").unwrap().state(),
        FeatureState::Running
    );

    manager.emergency_stop("maintenance window").await;

    assert!(!manager.is_initialized());
    assert_eq!(
        manager.registry().get("svc").unwrap().state(),
        FeatureState::Idle
    );
    assert_eq!(svc.calls.stop.load(Ordering::SeqCst), 1);
    assert_eq!(svc.calls.destroy.load(Ordering::SeqCst), 1);

    let stops = recorder.of_kind(EventKind::EmergencyStop);
    assert_eq!(stops.len(), 1);
    assert_eq!(stops[0].reason.as_deref(), Some("maintenance window"));
    assert!(matches!(
        manager.activate_features().await,
        Err(RuntimeError::NotInitialized)
    ));

    // The sweep is gone: no health traffic however long we wait.
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(recorder.count(EventKind::HealthCheck), 0);

    // Starting over works.
    manager.initialize().unwrap();
    let outcome = manager.activate_features().await.unwrap();
    assert_eq!(outcome.succeeded, 1);
    assert_eq!(
        manager.registry().get("svc").unwrap().state(),
        FeatureState::Running
    );
    assert_eq!(recorder.count(EventKind::ManagerInitialized), 2);
}

#[tokio::test]
async fn test_reload_feature_restarts_a_running_unit() {
    let svc = Arc::new(Scripted::new("svc"));
    let manager = Manager::builder()
        .with_context_source(static_source())
        .with_feature(FeatureSpec::from_feature(svc.clone()))
        .build();

    manager.initialize().unwrap();
    assert!(matches!(
        manager.reload_feature("nope").await,
        Err(RuntimeError::UnknownFeature { name }) if name == "nope"
    ));

    manager.activate_features().await.unwrap();
    manager.reload_feature("svc").await.unwrap();

    assert_eq!(
        manager.registry().get("svc").unwrap().state(),
        FeatureState::Running
    );
    assert_eq!(svc.calls.stop.load(Ordering::SeqCst), 1);
    assert_eq!(svc.calls.destroy.load(Ordering::SeqCst), 1);
    assert_eq!(svc.calls.init.load(Ordering::SeqCst), 2);
    assert_eq!(svc.calls.start.load(Ordering::SeqCst), 2);

    // Still tracked exactly once for deactivation.
    let outcome = manager.deactivate_features().await;
    assert_eq!(outcome.total, 1);
    assert_eq!(outcome.succeeded, 1);
}

#[tokio::test]
async fn test_reload_feature_honors_context_change() {
    let url = Arc::new(Mutex::new(String::from("https://shop.example/cart")));
    let source = {
        let url = Arc::clone(&url);
        move || ActivationContext::new(url.lock().unwrap().as_str(), "web")
    };

    let checkout = Arc::new(Scripted::new("checkout"));
    let manager = Manager::builder()
        .with_context_source(source)
        .with_feature(
            FeatureSpec::builder(checkout.clone())
                .match_glob("https://shop.example/*")
                .build(),
        )
        .build();

    manager.initialize().unwrap();
    manager.activate_features().await.unwrap();
    assert_eq!(
        manager.registry().get("checkout").unwrap().state(),
        FeatureState::Running
    );

    *url.lock().unwrap() = String::from("https://blog.example/post");
    manager.reload_feature("checkout").await.unwrap();

    // Destroyed but not reactivated: the new context does not match.
    let cell = manager.registry().get("checkout").unwrap();
    assert_eq!(cell.state(), FeatureState::Idle);
    assert_eq!(checkout.calls.destroy.load(Ordering::SeqCst), 1);
    assert_eq!(checkout.calls.init.load(Ordering::SeqCst), 1);
    assert_eq!(
        manager.context().unwrap().url.as_ref(),
        "https://blog.example/post"
    );

    let outcome = manager.deactivate_features().await;
    assert_eq!(outcome.total, 0);
}

#[tokio::test]
async fn test_reload_features_resets_error_counter() {
    let ok = Arc::new(Scripted::new("ok"));
    let brittle = Arc::new(Scripted::new("brittle").with_init_failures(1));
    let manager = Manager::builder()
        .with_context_source(static_source())
        .with_feature(FeatureSpec::from_feature(ok.clone()))
        .with_feature(
            FeatureSpec::builder(brittle.clone())
                .recovery(RecoveryOverrides::new().max_retries(0))
                .build(),
        )
        .build();

    manager.initialize().unwrap();
    let first = manager.activate_features().await.unwrap();
    assert_eq!(first.succeeded, 1);
    assert_eq!(first.failed, 1);
    assert_eq!(manager.error_count(), 1);

    let outcome = manager.reload_features().await.unwrap();
    assert_eq!(manager.error_count(), 0);
    assert_eq!(outcome.succeeded, 1);
    assert_eq!(outcome.skipped, 1);
    assert_eq!(ok.calls.init.load(Ordering::SeqCst), 2);
    assert_eq!(
        manager.registry().get("brittle").unwrap().state(),
        FeatureState::Disabled
    );
}

#[tokio::test]
async fn test_config_recovery_defaults_apply() {
    let frail = Arc::new(Scripted::new("frail").with_init_failures(1));
    let config = ManagerConfig {
        recovery: RecoveryPolicy {
            max_retries: 0,
            retry_delay: Duration::from_millis(10),
            fallback: false,
        },
        ..ManagerConfig::default()
    };
    let manager = ManagerBuilder::new(config)
        .with_context_source(static_source())
        .with_feature(FeatureSpec::from_feature(frail.clone()))
        .build();

    manager.initialize().unwrap();
    let outcome = manager.activate_features().await.unwrap();
    assert_eq!(outcome.failed, 1);

    // No per-feature override, so the manager default (zero retries) applied.
    assert_eq!(frail.calls.init.load(Ordering::SeqCst), 1);
    assert_eq!(
        manager.registry().get("frail").unwrap().state(),
        FeatureState::Disabled
    );
}

#[tokio::test]
async fn test_status_and_clear_all_errors() {
    let ok = Arc::new(Scripted::new("ok"));
    let brittle = Arc::new(Scripted::new("brittle").with_init_failures(1));
    let manager = Manager::builder()
        .with_context_source(static_source())
        .with_feature(FeatureSpec::from_feature(ok))
        .with_feature(
            FeatureSpec::builder(brittle)
                .recovery(RecoveryOverrides::new().max_retries(0))
                .build(),
        )
        .build();

    manager.initialize().unwrap();
    manager.activate_features().await.unwrap();

    let status = manager.status();
    assert!(status.initialized);
    assert_eq!(status.features, 2);
    assert_eq!(status.by_state.get(&FeatureState::Running), Some(&1));
    assert_eq!(status.by_state.get(&FeatureState::Disabled), Some(&1));
    assert_eq!(status.error_count, 1);
    assert_eq!(status.errors.total, 1);
    assert_eq!(status.errors.by_feature.get("brittle"), Some(&1));
    assert_eq!(status.context.as_ref().map(|c| c.url.as_ref()), Some(URL));
    assert_eq!(status.healthy(), 1);
    assert_eq!(status.problematic(), 1);

    manager.clear_all_errors();
    let after = manager.status();
    assert_eq!(after.error_count, 0);
    assert_eq!(after.errors.total, 0);
}

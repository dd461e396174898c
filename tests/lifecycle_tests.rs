//! Lifecycle tests: install, activate and fetch against in-memory storage.

mod common;

use std::time::Duration;

use asset_cache_agent::cache::entry::{AssetRequest, AssetResponse};
use asset_cache_agent::cache::store::{CacheStorage, CacheStore, MemoryCacheStorage};
use asset_cache_agent::lifecycle::agent::{AgentError, Phase};
use asset_cache_agent::lifecycle::collector::GenerationCollector;
use asset_cache_agent::lifecycle::host::run_startup;
use asset_cache_agent::lifecycle::interceptor::{FetchInterceptor, ResponseSource};
use asset_cache_agent::lifecycle::manifest::AssetManifest;
use asset_cache_agent::lifecycle::prepopulator::{
    AssetFetchFailure, CacheEntryOutcome, InstallError, Prepopulator,
};
use asset_cache_agent::network::static_routes::StaticNetwork;
use asset_cache_agent::network::NetworkError;

use common::{agent, generation, key, scope, serving, url, FlakyStorage, GatedNetwork};

fn abc() -> AssetManifest {
    AssetManifest::new(["./a.js", "./b.css", "./c.png"])
}

#[tokio::test]
async fn test_partial_failure_tolerated() {
    let storage = MemoryCacheStorage::new();
    let net = serving(&abc());
    net.fail(url("./b.css"), "connection reset");

    let scope = scope();
    let gen = generation("1.0.0");
    let report = Prepopulator::new(&storage, &net, &scope)
        .populate(gen.key(), &abc())
        .await
        .unwrap();

    assert_eq!(report.stored(), 2);
    assert_eq!(report.failed(), 1);
    let (failed, reason) = report.failures().next().unwrap();
    assert_eq!(failed.index, 1);
    assert_eq!(failed.url, "./b.css");
    assert!(matches!(reason, AssetFetchFailure::Network(_)));

    let store = storage.open(gen.key().as_str()).await.unwrap();
    let keys = store.keys().await.unwrap();
    assert!(keys.contains(&key("./a.js")));
    assert!(keys.contains(&key("./c.png")));
    assert!(!keys.contains(&key("./b.css")));
}

#[tokio::test]
async fn test_attempts_run_concurrently_and_all_settle() {
    let storage = MemoryCacheStorage::new();
    // The first entry cannot finish until the last one has started.
    let net = GatedNetwork::new(serving(&abc()), "./a.js", "./c.png");

    let scope = scope();
    let gen = generation("1.0.0");
    let populator = Prepopulator::new(&storage, &net, &scope);
    let entries = abc();
    let populate = populator.populate(gen.key(), &entries);
    let report = tokio::time::timeout(Duration::from_secs(5), populate)
        .await
        .expect("attempts did not overlap")
        .unwrap();

    assert_eq!(net.settled(), 3);
    assert_eq!(report.stored(), 3);
    let store = storage.open(gen.key().as_str()).await.unwrap();
    assert_eq!(store.len().await.unwrap(), 3);
}

#[tokio::test]
async fn test_non_success_status_is_not_stored() {
    let storage = MemoryCacheStorage::new();
    let net = serving(&abc());
    net.route(url("./c.png"), AssetResponse::new(500, "boom"));

    let scope = scope();
    let gen = generation("1.0.0");
    let report = Prepopulator::new(&storage, &net, &scope)
        .populate(gen.key(), &abc())
        .await
        .unwrap();

    let outcome = &report.entries[2].outcome;
    assert!(matches!(
        outcome,
        CacheEntryOutcome::Failed(AssetFetchFailure::BadStatus(500))
    ));
    let (_, reason) = report.failures().next().unwrap();
    assert_eq!(reason.to_string(), "Unexpected status 500");
    let store = storage.open(gen.key().as_str()).await.unwrap();
    assert!(store.match_request(&key("./c.png")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_repeated_install_never_removes_entries() {
    let storage = MemoryCacheStorage::new();
    let net = serving(&abc());
    let scope = scope();
    let gen = generation("1.0.0");
    let prepopulator = Prepopulator::new(&storage, &net, &scope);

    let first = prepopulator.populate(gen.key(), &abc()).await.unwrap();
    assert!(first.is_complete());

    // Second run: one asset now fails, the earlier copy must survive.
    net.fail(url("./a.js"), "timeout");
    let second = prepopulator.populate(gen.key(), &abc()).await.unwrap();
    assert_eq!(second.failed(), 1);

    let store = storage.open(gen.key().as_str()).await.unwrap();
    let hit = store.match_request(&key("./a.js")).await.unwrap().unwrap();
    assert_eq!(hit.body, "body of ./a.js");
    assert_eq!(store.len().await.unwrap(), 3);
}

#[tokio::test]
async fn test_store_open_failure_is_fatal() {
    let mut storage = FlakyStorage::new(MemoryCacheStorage::new());
    storage.fail_open = true;
    let net = serving(&abc());
    let scope = scope();
    let gen = generation("1.0.0");

    let result = Prepopulator::new(&storage, &net, &scope)
        .populate(gen.key(), &abc())
        .await;
    assert!(matches!(result, Err(InstallError::StoreOpen { .. })));
    assert_eq!(net.call_count(), 0);
}

#[tokio::test]
async fn test_collect_garbage_scope() {
    let storage = MemoryCacheStorage::new();
    for name in ["app-v1", "app-v2", "app-v3"] {
        storage.open(name).await.unwrap();
    }

    let current = generation("3");
    let report = GenerationCollector::new(&storage)
        .collect_garbage(&current)
        .await
        .unwrap();

    assert!(report.is_clean());
    assert_eq!(report.deleted.len(), 2);
    assert_eq!(storage.keys().await.unwrap(), vec!["app-v3".to_string()]);
}

#[tokio::test]
async fn test_collect_garbage_noop() {
    let storage = MemoryCacheStorage::new();
    let current = generation("3");
    let report = GenerationCollector::new(&storage)
        .collect_garbage(&current)
        .await
        .unwrap();
    assert!(report.deleted.is_empty());
    assert!(report.is_clean());
}

#[tokio::test]
async fn test_collect_garbage_delete_failure_isolated() {
    let mut storage = FlakyStorage::new(MemoryCacheStorage::new());
    for name in ["app-v1", "app-v2", "app-v3"] {
        storage.inner.open(name).await.unwrap();
    }
    storage.fail_delete.insert("app-v1".to_string());

    let current = generation("3");
    let report = GenerationCollector::new(&storage)
        .collect_garbage(&current)
        .await
        .unwrap();

    assert_eq!(report.deleted, vec!["app-v2".to_string()]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "app-v1");
    assert_eq!(
        storage.inner.keys().await.unwrap(),
        vec!["app-v1".to_string(), "app-v3".to_string()]
    );
}

#[tokio::test]
async fn test_cache_first_no_network() {
    let storage = MemoryCacheStorage::new();
    let gen = generation("1.0.0");
    let store = storage.open(gen.key().as_str()).await.unwrap();
    store
        .put(&key("./a.js"), &AssetResponse::new(200, "cached"))
        .await
        .unwrap();

    let net = StaticNetwork::new();
    net.route(url("./a.js"), AssetResponse::new(200, "fresh"));

    let interceptor = FetchInterceptor::new(&gen, &storage, &net);
    let outcome = interceptor
        .handle(&AssetRequest::with_key(key("./a.js")))
        .await
        .unwrap();

    assert_eq!(outcome.source, ResponseSource::Cache);
    assert_eq!(outcome.response.body, "cached");
    assert_eq!(net.call_count(), 0);
    assert_eq!(store.keys().await.unwrap(), vec![key("./a.js")]);
}

#[tokio::test]
async fn test_miss_fetches_once_and_does_not_store() {
    let storage = MemoryCacheStorage::new();
    let gen = generation("1.0.0");
    let store = storage.open(gen.key().as_str()).await.unwrap();
    store
        .put(&key("./a.js"), &AssetResponse::new(200, "cached"))
        .await
        .unwrap();
    let before = store.keys().await.unwrap();

    let net = StaticNetwork::new();
    net.route(url("./data.json"), AssetResponse::new(200, "{}"));

    let interceptor = FetchInterceptor::new(&gen, &storage, &net);
    let outcome = interceptor
        .handle(&AssetRequest::with_key(key("./data.json")))
        .await
        .unwrap();
    assert_eq!(outcome.source, ResponseSource::Network);
    assert_eq!(outcome.response.body, "{}");
    assert_eq!(net.calls(), vec![key("./data.json")]);

    // A hit leaves the store alone too.
    interceptor
        .handle(&AssetRequest::with_key(key("./a.js")))
        .await
        .unwrap();

    assert_eq!(store.keys().await.unwrap(), before);
    assert_eq!(storage.keys().await.unwrap(), vec![gen.key().to_string()]);
}

#[tokio::test]
async fn test_only_current_generation_consulted() {
    let storage = MemoryCacheStorage::new();
    let old = storage.open("app-v1").await.unwrap();
    old.put(&key("./a.js"), &AssetResponse::new(200, "old"))
        .await
        .unwrap();

    let net = StaticNetwork::new();
    net.route(url("./a.js"), AssetResponse::new(200, "live"));

    let gen = generation("2");
    let outcome = FetchInterceptor::new(&gen, &storage, &net)
        .handle(&AssetRequest::with_key(key("./a.js")))
        .await
        .unwrap();

    assert_eq!(outcome.response.body, "live");
    // The lookup did not create the current store.
    assert_eq!(storage.keys().await.unwrap(), vec!["app-v1".to_string()]);
}

#[tokio::test]
async fn test_non_get_bypasses_cache() {
    let storage = MemoryCacheStorage::new();
    let gen = generation("1");
    let store = storage.open(gen.key().as_str()).await.unwrap();
    let get = key("./api");
    store
        .put(&get, &AssetResponse::new(200, "cached"))
        .await
        .unwrap();

    let net = StaticNetwork::new();
    net.route(url("./api"), AssetResponse::new(201, "created"));

    let mut post = get.clone();
    post.method = "POST".to_string();
    let outcome = FetchInterceptor::new(&gen, &storage, &net)
        .handle(&AssetRequest::with_key(post))
        .await
        .unwrap();

    assert_eq!(outcome.source, ResponseSource::Network);
    assert_eq!(outcome.response.status, 201);
}

#[tokio::test]
async fn test_network_failure_surfaces_unchanged() {
    let storage = MemoryCacheStorage::new();
    let gen = generation("1");
    let net = StaticNetwork::new();
    net.set_offline(true);

    let result = FetchInterceptor::new(&gen, &storage, &net)
        .handle(&AssetRequest::with_key(key("./missing.js")))
        .await;

    match result {
        Err(NetworkError::Unavailable(reason)) => assert_eq!(reason, "offline"),
        other => panic!("expected network error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_cache_read_error_falls_back_to_network() {
    let mut storage = FlakyStorage::new(MemoryCacheStorage::new());
    storage.fail_lookup = true;
    let gen = generation("1");
    let net = StaticNetwork::new();
    net.route(url("./a.js"), AssetResponse::new(200, "live"));

    let outcome = FetchInterceptor::new(&gen, &storage, &net)
        .handle(&AssetRequest::with_key(key("./a.js")))
        .await
        .unwrap();
    assert_eq!(outcome.source, ResponseSource::Network);
}

#[tokio::test]
async fn test_activation_leaves_only_current_generation() {
    let storage = MemoryCacheStorage::new();
    storage.open("app-v0.9.0").await.unwrap();
    storage.open("legacy-cache").await.unwrap();

    let manifest = abc();
    let net = serving(&manifest);
    let agent = agent("1.0.0", manifest, storage.clone(), net);

    let report = run_startup(&agent).await.unwrap();
    assert!(report.install.is_complete());
    assert_eq!(report.collection.unwrap().deleted.len(), 2);
    assert_eq!(agent.phase(), Phase::Activated);
    assert_eq!(storage.keys().await.unwrap(), vec!["app-v1.0.0".to_string()]);
}

#[tokio::test]
async fn test_activate_requires_install() {
    let manifest = abc();
    let net = serving(&manifest);
    let agent = agent("1.0.0", manifest, MemoryCacheStorage::new(), net);

    let result = agent.on_activate().await;
    assert!(matches!(
        result,
        Err(AgentError::PhaseOrder {
            phase: Phase::Parsed,
            ..
        })
    ));
}

#[tokio::test]
async fn test_failed_install_keeps_previous_generation() {
    let inner = MemoryCacheStorage::new();
    let previous = inner.open("app-v1").await.unwrap();
    previous
        .put(&common::key("./a.js"), &AssetResponse::new(200, "v1"))
        .await
        .unwrap();

    let mut storage = FlakyStorage::new(inner.clone());
    storage.fail_open = true;
    let manifest = abc();
    let net = serving(&manifest);
    let agent = agent("2", manifest, storage, net);

    let result = run_startup(&agent).await;
    assert!(matches!(result, Err(AgentError::Install(_))));
    assert_eq!(agent.phase(), Phase::Redundant);
    assert_eq!(inner.keys().await.unwrap(), vec!["app-v1".to_string()]);
}

#[tokio::test]
async fn test_listing_failure_still_activates() {
    let mut storage = FlakyStorage::new(MemoryCacheStorage::new());
    storage.fail_keys = true;
    let manifest = abc();
    let net = serving(&manifest);
    let agent = agent("1", manifest, storage, net);

    agent.on_install().await.unwrap();
    let collection = agent.on_activate().await.unwrap();
    assert!(collection.is_none());
    assert_eq!(agent.phase(), Phase::Activated);
}

#[tokio::test]
async fn test_phase_watch_and_metrics() {
    let manifest = abc();
    let net = serving(&manifest);
    net.fail(url("./b.css"), "reset");
    let agent = agent("1", manifest, MemoryCacheStorage::new(), net.clone());
    let mut phases = agent.subscribe();

    agent.on_install().await.unwrap();
    assert!(phases.has_changed().unwrap());
    assert_eq!(*phases.borrow_and_update(), Phase::Installed);

    agent.on_activate().await.unwrap();
    assert_eq!(*phases.borrow_and_update(), Phase::Activated);

    agent
        .on_fetch(&AssetRequest::with_key(key("./a.js")))
        .await
        .unwrap();
    agent
        .on_fetch(&AssetRequest::with_key(key("./b.css")))
        .await
        .unwrap_err();

    let metrics = agent.metrics();
    assert_eq!(metrics.assets_stored.get(), 2);
    assert_eq!(metrics.assets_failed.get(), 1);
    assert_eq!(metrics.cache_hits.get(), 1);
    assert_eq!(metrics.cache_misses.get(), 1);
    assert_eq!(metrics.network_failures.get(), 1);
}

#[tokio::test]
async fn test_status_snapshot() {
    let manifest = abc();
    let net = serving(&manifest);
    let agent = agent("1", manifest, MemoryCacheStorage::new(), net);
    run_startup(&agent).await.unwrap();

    let status = agent.status().await.unwrap();
    assert_eq!(status.version, "1");
    assert_eq!(status.cache_key, "app-v1");
    assert_eq!(status.phase, Phase::Activated);
    assert_eq!(status.stores, vec!["app-v1".to_string()]);
    assert_eq!(status.current_entries, 3);
}

//! Local cache tests: session identity and feed snapshots.

use livefeed::{
    DocPath, FeedConfig, FeedError, FeedSnapshot, FeedState, FeedView, FileCache,
    LocalKeyValueCache, MemoryCache, MemoryDocumentStore, RemoteDocumentStore, Session,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tempfile::TempDir;

fn obj(v: Value) -> Map<String, Value> {
    v.as_object().cloned().unwrap_or_default()
}

fn seeded(parent: &str, count: i64) -> Arc<MemoryDocumentStore> {
    let remote = Arc::new(MemoryDocumentStore::new());
    for i in 0..count {
        let id = format!("{}-b{:02}", parent, i);
        remote
            .set(
                &DocPath::new("booking_details", &id),
                obj(json!({"name": format!("Provider {}", i)})),
            )
            .unwrap();
        remote
            .set(
                &DocPath::new("bookings", &id),
                obj(json!({"consumer_id": parent, "created_at": 1_000 + i})),
            )
            .unwrap();
    }
    remote
}

fn view(
    remote: &Arc<MemoryDocumentStore>,
    cache: Arc<dyn LocalKeyValueCache>,
    config: FeedConfig,
    parent: &str,
) -> FeedView {
    FeedView::new(remote.clone(), config, parent)
        .unwrap()
        .with_cache(cache)
}

#[test]
fn test_snapshot_saved_on_load_and_hydrated() {
    let remote = seeded("u1", 3);
    let cache: Arc<dyn LocalKeyValueCache> = Arc::new(MemoryCache::new());

    let mut first = view(&remote, cache.clone(), FeedConfig::default(), "u1");
    first.load_initial().unwrap();
    let saved = FeedSnapshot::load(cache.as_ref(), "u1").unwrap().unwrap();
    assert_eq!(saved.items, first.items());
    drop(first);

    let mut second = view(&remote, cache.clone(), FeedConfig::default(), "u1");
    assert_eq!(second.hydrate_from_cache().unwrap(), 3);
    assert_eq!(second.state(), FeedState::Idle);
    assert_eq!(second.items()[0].id.as_str(), "u1-b02");
    assert!(second.registry().is_empty());

    // Loading replaces the hydrated contents with live ones.
    assert_eq!(second.load_initial().unwrap(), 3);
    assert_eq!(second.registry().len(), 3);
}

#[test]
fn test_snapshot_follows_live_patches() {
    let remote = seeded("u1", 2);
    let cache: Arc<dyn LocalKeyValueCache> = Arc::new(MemoryCache::new());
    let mut view = view(&remote, cache.clone(), FeedConfig::default(), "u1");
    view.load_initial().unwrap();
    view.process_events();

    remote
        .set(&DocPath::new("reviews", "u1-b00"), obj(json!({"rating": 4})))
        .unwrap();
    view.process_events();

    let saved = FeedSnapshot::load(cache.as_ref(), "u1").unwrap().unwrap();
    let b00 = saved
        .items
        .iter()
        .find(|i| i.id.as_str() == "u1-b00")
        .unwrap();
    assert_eq!(b00.status.rating, Some(4.0));
}

#[test]
fn test_hydrate_requires_idle() {
    let remote = seeded("u1", 1);
    let cache: Arc<dyn LocalKeyValueCache> = Arc::new(MemoryCache::new());
    let mut view = view(&remote, cache, FeedConfig::default(), "u1");
    view.load_initial().unwrap();

    assert!(matches!(
        view.hydrate_from_cache(),
        Err(FeedError::InvalidState { .. })
    ));
}

#[test]
fn test_hydrate_without_snapshot_restores_nothing() {
    let remote = seeded("u1", 1);
    let cache: Arc<dyn LocalKeyValueCache> = Arc::new(MemoryCache::new());
    cache.set(&FeedSnapshot::key("u1"), "garbage").unwrap();

    let mut view = view(&remote, cache, FeedConfig::default(), "u1");
    assert_eq!(view.hydrate_from_cache().unwrap(), 0);
    assert!(view.items().is_empty());
}

#[test]
fn test_persistence_can_be_disabled() {
    let remote = seeded("u1", 2);
    let cache: Arc<dyn LocalKeyValueCache> = Arc::new(MemoryCache::new());
    let config = FeedConfig {
        persist_snapshots: false,
        ..Default::default()
    };
    let mut view = view(&remote, cache.clone(), config, "u1");
    view.load_initial().unwrap();

    assert!(cache.get(&FeedSnapshot::key("u1")).unwrap().is_none());
}

#[test]
fn test_file_cache_survives_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("feed-cache.json");
    let remote = seeded("u7", 4);

    {
        let cache = Arc::new(FileCache::open(&path).unwrap());
        Session::store_user_id(cache.as_ref(), "u7").unwrap();
        let mut view = view(&remote, cache, FeedConfig::default(), "u7");
        view.load_initial().unwrap();
    }

    let cache = Arc::new(FileCache::open(&path).unwrap());
    let parent = Session::load_user_id(cache.as_ref()).unwrap().unwrap();
    assert_eq!(parent, "u7");

    let mut view = view(&remote, cache, FeedConfig::default(), &parent);
    assert_eq!(view.hydrate_from_cache().unwrap(), 4);
    assert_eq!(view.parent(), "u7");
}

#[test]
fn test_snapshots_are_per_parent() {
    let remote = seeded("u1", 2);
    let cache: Arc<dyn LocalKeyValueCache> = Arc::new(MemoryCache::new());
    let mut view_u1 = view(&remote, cache.clone(), FeedConfig::default(), "u1");
    view_u1.load_initial().unwrap();

    let mut view_u2 = view(&remote, cache.clone(), FeedConfig::default(), "u2");
    assert_eq!(view_u2.hydrate_from_cache().unwrap(), 0);
}

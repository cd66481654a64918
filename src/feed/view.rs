//! The feed view: pagination, live updates and teardown for one parent.

use crate::cache::{FeedSnapshot, LocalKeyValueCache};
use crate::config::FeedConfig;
use crate::error::{FeedError, Result};
use crate::filter::{self, FilterState, SortState};
use crate::remote::RemoteDocumentStore;
use crate::types::{Document, FeedItem, ItemId, Timestamp};
use crossbeam_channel::Select;
use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::join::join_item;
use super::pager::{Page, PageFetcher};
use super::registry::{SubscriptionRegistry, WatchPair};
use super::store::FeedStore;
use super::watcher::{PrimaryCollectionWatcher, SubResourceKind, SubResourceWatcher};

/// Lifecycle of a feed view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeedState {
    Idle,
    /// Initial page in flight.
    Loading,
    /// First page loaded and the newest-item watch is live.
    Ready,
    /// Next page in flight.
    LoadingMore,
    /// Torn down; no further use.
    Closed,
}

impl fmt::Display for FeedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FeedState::Idle => "idle",
            FeedState::Loading => "loading",
            FeedState::Ready => "ready",
            FeedState::LoadingMore => "loading_more",
            FeedState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// A live, paginated feed of one parent's items.
///
/// The view is driven by its owner: live changes are buffered on channels
/// and applied by [`process_events`](FeedView::process_events) or
/// [`wait_for_events`](FeedView::wait_for_events). Dropping the view cancels
/// every subscription it holds.
pub struct FeedView {
    remote: Arc<dyn RemoteDocumentStore>,
    config: FeedConfig,
    parent: String,
    state: FeedState,
    store: FeedStore,
    registry: SubscriptionRegistry,
    fetcher: PageFetcher,
    primary: Option<PrimaryCollectionWatcher>,
    cache: Option<Arc<dyn LocalKeyValueCache>>,
    filter: FilterState,
    sort: SortState,
}

impl FeedView {
    pub fn new(
        remote: Arc<dyn RemoteDocumentStore>,
        config: FeedConfig,
        parent: impl Into<String>,
    ) -> Result<Self> {
        config.validate()?;
        let parent = parent.into();
        if parent.is_empty() {
            return Err(FeedError::InvalidArgument("parent id is empty".into()));
        }
        let fetcher = PageFetcher::new(
            Arc::clone(&remote),
            config.layout.clone(),
            config.join_concurrency,
        );
        Ok(Self {
            registry: SubscriptionRegistry::new(config.unsubscribe_before_overwrite),
            remote,
            config,
            parent,
            state: FeedState::Idle,
            store: FeedStore::new(),
            fetcher,
            primary: None,
            cache: None,
            filter: FilterState::default(),
            sort: SortState::default(),
        })
    }

    /// Attach a local cache for snapshots.
    pub fn with_cache(mut self, cache: Arc<dyn LocalKeyValueCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn state(&self) -> FeedState {
        self.state
    }

    pub fn parent(&self) -> &str {
        &self.parent
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    pub fn store(&self) -> &FeedStore {
        &self.store
    }

    pub fn items(&self) -> &[FeedItem] {
        self.store.items()
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub fn has_more(&self) -> bool {
        !self.store.end_reached()
    }

    fn expect_state(&self, expected: &[FeedState]) -> Result<()> {
        if expected.contains(&self.state) {
            return Ok(());
        }
        let expected = expected
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" or ");
        Err(FeedError::InvalidState {
            expected,
            got: self.state.to_string(),
        })
    }

    // --- Loading ---

    /// Reset, load the first page and start watching for new items.
    ///
    /// On failure the view is left `Idle` and empty.
    pub fn load_initial(&mut self) -> Result<usize> {
        self.expect_state(&[FeedState::Idle, FeedState::Ready])?;
        self.reset();
        self.state = FeedState::Loading;
        tracing::info!(parent = %self.parent, "loading feed");

        let page = match self
            .fetcher
            .fetch_page(&self.parent, None, self.config.page_size)
        {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!(parent = %self.parent, error = %e, "initial page failed");
                self.state = FeedState::Idle;
                return Err(e);
            }
        };
        let admitted = self.admit_page(page);

        match PrimaryCollectionWatcher::start(self.remote.as_ref(), &self.config.layout, &self.parent) {
            Ok(primary) => self.primary = Some(primary),
            Err(e) => {
                tracing::warn!(parent = %self.parent, error = %e, "newest-item watch failed");
                self.reset();
                return Err(e);
            }
        }

        self.state = FeedState::Ready;
        self.persist_snapshot();
        Ok(admitted)
    }

    /// Full reload; same as [`load_initial`](FeedView::load_initial).
    pub fn reload(&mut self) -> Result<usize> {
        self.load_initial()
    }

    /// Fetch the next page after the cursor. Returns the number of items
    /// admitted; 0 once the end was reached.
    ///
    /// On failure the cursor and items are unchanged and the view stays
    /// `Ready`.
    pub fn load_more(&mut self) -> Result<usize> {
        self.expect_state(&[FeedState::Ready])?;
        if self.store.end_reached() {
            return Ok(0);
        }
        self.state = FeedState::LoadingMore;

        let result = self.fetcher.fetch_page(
            &self.parent,
            self.store.cursor(),
            self.config.page_size,
        );
        self.state = FeedState::Ready;

        let page = result.map_err(|e| {
            tracing::warn!(parent = %self.parent, error = %e, "next page failed");
            e
        })?;
        let admitted = self.admit_page(page);
        self.persist_snapshot();
        Ok(admitted)
    }

    /// Append a fetched page, watch its new items and advance pagination.
    fn admit_page(&mut self, page: Page) -> usize {
        let Page {
            items,
            cursor,
            has_more,
            ..
        } = page;

        let admitted = self.store.append_page(items);
        for id in &admitted {
            if let Err(e) = self.watch_item(id) {
                tracing::warn!(item = %id, error = %e, "could not watch sub-resources");
            }
        }

        if let Some(cursor) = cursor {
            self.store.advance_cursor(cursor);
        }
        if !has_more {
            self.store.mark_end_reached();
        }
        admitted.len()
    }

    /// Open both sub-resource watchers for `id` and register them.
    fn watch_item(&mut self, id: &ItemId) -> Result<()> {
        let remote = self.remote.as_ref();
        let layout = &self.config.layout;
        let detail = SubResourceWatcher::watch(remote, layout, SubResourceKind::Detail, id)?;
        let status = match SubResourceWatcher::watch(remote, layout, SubResourceKind::Status, id) {
            Ok(status) => status,
            Err(e) => {
                detail.cancel();
                return Err(e);
            }
        };
        self.registry.register(id.clone(), WatchPair { detail, status });
        Ok(())
    }

    /// Join a newly added document and prepend it. A missing detail drops
    /// the event; read errors are logged and dropped.
    fn admit_added(&mut self, doc: Document) -> bool {
        let item = match join_item(self.remote.as_ref(), &self.config.layout, &doc) {
            Ok(Some(item)) => item,
            Ok(None) => {
                tracing::debug!(item = %doc.id, "discarding new item without detail");
                return false;
            }
            Err(e) => {
                tracing::warn!(item = %doc.id, error = %e, "could not join new item");
                return false;
            }
        };

        if let Err(e) = self.watch_item(&item.id) {
            tracing::warn!(item = %item.id, error = %e, "could not watch sub-resources");
        }
        self.store.prepend_if_absent(item)
    }

    // --- Live updates ---

    /// Apply every buffered live change without blocking. Returns the number
    /// of changes applied (new items plus patches).
    ///
    /// Watches the remote stopped serving are reopened; their fresh initial
    /// snapshots are applied in the same call.
    pub fn process_events(&mut self) -> usize {
        if self.state == FeedState::Closed {
            return 0;
        }

        let mut applied = self.apply_buffered();
        if self.reopen_closed_watches() > 0 {
            applied += self.apply_buffered();
        }

        if applied > 0 {
            self.persist_snapshot();
        }
        applied
    }

    fn apply_buffered(&mut self) -> usize {
        let mut applied = 0;
        let added = self
            .primary
            .as_ref()
            .map(PrimaryCollectionWatcher::poll)
            .unwrap_or_default();
        for doc in added {
            if self.admit_added(doc) {
                applied += 1;
            }
        }

        let store = &mut self.store;
        applied += self.registry.poll(|id, patch| {
            store.patch(id, patch);
        });
        applied
    }

    /// Restart the newest-item watch and every item watch the remote closed.
    /// Returns the number of watches reopened.
    fn reopen_closed_watches(&mut self) -> usize {
        let mut reopened = 0;

        if self.primary.as_ref().is_some_and(PrimaryCollectionWatcher::is_closed) {
            tracing::warn!(parent = %self.parent, "newest-item watch closed by remote, restarting");
            self.primary = None;
            match PrimaryCollectionWatcher::start(self.remote.as_ref(), &self.config.layout, &self.parent) {
                Ok(primary) => {
                    self.primary = Some(primary);
                    reopened += 1;
                }
                Err(e) => {
                    tracing::warn!(parent = %self.parent, error = %e, "could not restart newest-item watch");
                }
            }
        }

        for id in self.registry.remove_closed() {
            if !self.store.contains(&id) {
                continue;
            }
            match self.watch_item(&id) {
                Ok(()) => reopened += 1,
                Err(e) => tracing::warn!(item = %id, error = %e, "could not reopen sub-resource watch"),
            }
        }
        reopened
    }

    /// Block until a live change arrives or `timeout` passes, then apply
    /// everything buffered.
    pub fn wait_for_events(&mut self, timeout: Duration) -> usize {
        if self.state == FeedState::Closed {
            return 0;
        }

        let ready = {
            let mut select = Select::new();
            let mut watched = 0;
            if let Some(primary) = &self.primary {
                select.recv(primary.subscription().receiver());
                watched += 1;
            }
            for watcher in self.registry.watchers() {
                select.recv(watcher.subscription().receiver());
                watched += 1;
            }
            watched > 0 && select.ready_timeout(timeout).is_ok()
        };

        if ready {
            self.process_events()
        } else {
            0
        }
    }

    // --- Teardown ---

    /// Cancel every subscription and clear the feed. Returns the number of
    /// subscriptions cancelled.
    pub fn reset(&mut self) -> usize {
        let mut cancelled = 0;
        if let Some(primary) = self.primary.take() {
            cancelled += usize::from(primary.cancel());
        }
        cancelled += self.registry.unregister_all();
        self.store.reset();
        if self.state != FeedState::Closed {
            self.state = FeedState::Idle;
        }
        tracing::debug!(parent = %self.parent, cancelled, "feed reset");
        cancelled
    }

    /// Tear down for good.
    pub fn close(&mut self) {
        if self.state == FeedState::Closed {
            return;
        }
        self.reset();
        self.state = FeedState::Closed;
    }

    // --- Writes ---

    /// Record a review for an item. The status watcher picks up the change
    /// and patches the item.
    pub fn submit_review(&self, id: &ItemId, rating: f64) -> Result<()> {
        if !rating.is_finite() || !(0.0..=5.0).contains(&rating) {
            return Err(FeedError::InvalidArgument(format!(
                "rating {} outside 0..=5",
                rating
            )));
        }
        if !self.store.contains(id) {
            return Err(FeedError::ItemNotFound(id.clone()));
        }

        let layout = &self.config.layout;
        let mut data = Map::new();
        data.insert(layout.rating_field.clone(), json!(rating));
        data.insert(
            "reviewed_at".into(),
            Value::from(Timestamp::now().as_millis()),
        );
        self.remote.set(&layout.status_path(id), data)
    }

    // --- Projections ---

    pub fn set_filter(&mut self, filter: FilterState) {
        self.filter = filter;
    }

    pub fn set_sort(&mut self, sort: SortState) {
        self.sort = sort;
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    pub fn sort(&self) -> &SortState {
        &self.sort
    }

    /// Items passing the current filter, in the current sort order.
    pub fn visible_items(&self) -> Vec<&FeedItem> {
        filter::apply(self.store.items(), &self.filter, &self.sort)
    }

    // --- Local cache ---

    /// Show the last saved snapshot while idle. Returns the number of items
    /// restored; a missing or unreadable snapshot restores nothing.
    pub fn hydrate_from_cache(&mut self) -> Result<usize> {
        self.expect_state(&[FeedState::Idle])?;
        let Some(cache) = &self.cache else {
            return Ok(0);
        };
        match FeedSnapshot::load(cache.as_ref(), &self.parent)? {
            Some(snapshot) => {
                self.store.replace_all(snapshot.items);
                Ok(self.store.len())
            }
            None => Ok(0),
        }
    }

    fn persist_snapshot(&self) {
        if !self.config.persist_snapshots || self.state != FeedState::Ready {
            return;
        }
        let Some(cache) = &self.cache else {
            return;
        };
        let snapshot = FeedSnapshot::new(self.parent.clone(), self.store.items().to_vec());
        if let Err(e) = snapshot.save(cache.as_ref()) {
            tracing::warn!(parent = %self.parent, error = %e, "could not save feed snapshot");
        }
    }
}

impl Drop for FeedView {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for FeedView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedView")
            .field("parent", &self.parent)
            .field("state", &self.state)
            .field("items", &self.store.len())
            .field("watched", &self.registry.len())
            .finish()
    }
}

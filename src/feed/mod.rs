//! The live, paginated feed.
//!
//! A feed is an ordered list of items for one parent, newest first. Each
//! item merges a primary document with two sub-resources keyed by the same
//! id: a *detail* record (who and where) and a *status* record (review).
//!
//! - [`PageFetcher`] loads pages older than a cursor and joins each item.
//! - [`PrimaryCollectionWatcher`] watches the newest item and admits new
//!   arrivals at the front.
//! - [`SubResourceWatcher`]s keep each item's detail and status live.
//! - [`SubscriptionRegistry`] owns those watchers and tears them down.
//! - [`FeedView`] ties them together behind a small state machine.
//!
//! # Example
//!
//! ```ignore
//! let remote: Arc<dyn RemoteDocumentStore> = Arc::new(MemoryDocumentStore::new());
//! let mut view = FeedView::new(remote, FeedConfig::default(), "consumer-1")?;
//!
//! view.load_initial()?;
//! while view.has_more() {
//!     view.load_more()?;
//! }
//!
//! // Apply live changes as they arrive.
//! view.wait_for_events(Duration::from_millis(500));
//! for item in view.visible_items() {
//!     println!("{} {:?}", item.detail.name, item.status.rating);
//! }
//! ```

mod join;
mod pager;
mod registry;
mod store;
mod view;
mod watcher;

pub use join::{detail_from_data, join_item, status_from_snapshot};
pub use pager::{Page, PageFetcher};
pub use registry::{SubscriptionRegistry, WatchPair};
pub use store::FeedStore;
pub use view::{FeedState, FeedView};
pub use watcher::{PrimaryCollectionWatcher, SubResourceKind, SubResourceWatcher};

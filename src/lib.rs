//! # Live Feed
//!
//! A live, paginated collection view with per-item live sub-resources.
//!
//! ## Core Concepts
//!
//! - **Feed items**: primary documents joined with a detail and a status
//!   sub-resource keyed by the same id
//! - **Pages**: cursor-based, newest first, fetched on demand
//! - **Live updates**: a watch on the newest item plus two watches per item,
//!   delivered over channels with explicit cancellation
//! - **Local cache**: session identity and the last-known feed
//!
//! ## Example
//!
//! ```ignore
//! use livefeed::{FeedConfig, FeedView, MemoryDocumentStore, MemoryCache};
//!
//! let remote = Arc::new(MemoryDocumentStore::new());
//! let mut view = FeedView::new(remote, FeedConfig::default(), "consumer-1")?
//!     .with_cache(Arc::new(MemoryCache::new()));
//!
//! view.hydrate_from_cache()?;
//! view.load_initial()?;
//! view.load_more()?;
//! view.process_events();
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod feed;
pub mod filter;
pub mod format;
pub mod remote;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use cache::{FeedSnapshot, FileCache, LocalKeyValueCache, MemoryCache, Session};
pub use config::{FeedConfig, FeedLayout};
pub use error::{FeedError, Result};
pub use feed::{
    FeedState, FeedStore, FeedView, Page, PageFetcher, PrimaryCollectionWatcher,
    SubResourceKind, SubResourceWatcher, SubscriptionRegistry, WatchPair,
};
pub use filter::{FilterState, ReviewFilter, SortState};
pub use remote::{
    ChangeKind, Direction, DocumentChange, DocumentEvent, DocumentWatch, MemoryDocumentStore,
    Query, QueryEvent, QueryWatch, RemoteDocumentStore,
};
pub use subscriptions::{CancelToken, DropReason, Subscription, SubscriptionId, WatchEvent};
pub use types::*;

//! Channel-based live subscriptions.
//!
//! A watch is delivered as a bounded channel of [`WatchEvent`]s plus a
//! [`CancelToken`]:
//! - the producer checks the token before each send and forgets cancelled
//!   or disconnected consumers
//! - a consumer that falls behind its buffer is dropped with
//!   [`DropReason::BufferOverflow`]
//!
//! # Example
//!
//! ```ignore
//! let watch = remote.watch_document(&DocPath::new("reviews", "b1"))?;
//!
//! loop {
//!     match watch.recv_timeout(Duration::from_secs(1)) {
//!         Ok(WatchEvent::Snapshot(snap)) => println!("exists: {}", snap.exists()),
//!         Ok(WatchEvent::Dropped(reason)) => break,
//!         Err(_) => break,
//!     }
//! }
//! watch.cancel();
//! ```

mod types;

pub use types::{CancelToken, DropReason, Subscription, SubscriptionId, WatchEvent};

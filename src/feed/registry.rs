//! Lifecycle of per-item sub-resource watchers.

use crate::types::{ItemId, ItemPatch};
use std::collections::HashMap;

use super::watcher::SubResourceWatcher;

/// The two live watchers of one feed item.
pub struct WatchPair {
    pub detail: SubResourceWatcher,
    pub status: SubResourceWatcher,
}

impl WatchPair {
    /// Cancel both watchers. Returns how many were still live.
    pub fn cancel(&self) -> usize {
        usize::from(self.detail.cancel()) + usize::from(self.status.cancel())
    }

    fn poll(&self, on_change: &mut impl FnMut(&ItemId, ItemPatch)) -> usize {
        self.detail.poll(&mut *on_change) + self.status.poll(&mut *on_change)
    }

    fn is_closed(&self) -> bool {
        self.detail.is_closed() || self.status.is_closed()
    }
}

/// Tracks the watcher pairs of one feed view.
///
/// Holds ids and watcher handles only; items stay owned by the feed store.
/// One instance per view lifetime, torn down with [`unregister_all`].
///
/// [`unregister_all`]: SubscriptionRegistry::unregister_all
pub struct SubscriptionRegistry {
    handles: HashMap<ItemId, WatchPair>,
    /// Pairs displaced by a second registration of the same id while
    /// `unsubscribe_before_overwrite` is off. Still live until teardown.
    orphans: Vec<(ItemId, WatchPair)>,
    unsubscribe_before_overwrite: bool,
}

impl SubscriptionRegistry {
    pub fn new(unsubscribe_before_overwrite: bool) -> Self {
        Self {
            handles: HashMap::new(),
            orphans: Vec::new(),
            unsubscribe_before_overwrite,
        }
    }

    /// Track `pair` under `id`. An existing pair for the id is displaced:
    /// cancelled when `unsubscribe_before_overwrite` is set, otherwise kept
    /// running as an orphan. Returns true when a pair was displaced.
    pub fn register(&mut self, id: ItemId, pair: WatchPair) -> bool {
        let Some(previous) = self.handles.insert(id.clone(), pair) else {
            return false;
        };
        if self.unsubscribe_before_overwrite {
            previous.cancel();
        } else {
            tracing::debug!(item = %id, "watchers replaced without unsubscribing");
            self.orphans.push((id, previous));
        }
        true
    }

    /// Cancel every tracked watcher, orphans included, and forget them all.
    /// Returns the number of watchers cancelled by this call.
    pub fn unregister_all(&mut self) -> usize {
        let cancelled: usize = self
            .handles
            .drain()
            .chain(self.orphans.drain(..))
            .map(|(_, pair)| pair.cancel())
            .sum();
        tracing::debug!(cancelled, "unregistered all sub-resource watchers");
        cancelled
    }

    /// Deliver buffered changes of every tracked watcher, orphans included.
    pub fn poll(&self, mut on_change: impl FnMut(&ItemId, ItemPatch)) -> usize {
        let mut delivered = 0;
        for pair in self.handles.values() {
            delivered += pair.poll(&mut on_change);
        }
        for (_, pair) in &self.orphans {
            delivered += pair.poll(&mut on_change);
        }
        delivered
    }

    /// Forget every pair the remote stopped serving, cancelling its other
    /// half. Returns the ids whose registered pair was removed; closed
    /// orphans are discarded without being reported.
    pub fn remove_closed(&mut self) -> Vec<ItemId> {
        let closed: Vec<ItemId> = self
            .handles
            .iter()
            .filter(|(_, pair)| pair.is_closed())
            .map(|(id, _)| id.clone())
            .collect();
        for id in &closed {
            if let Some(pair) = self.handles.remove(id) {
                pair.cancel();
                tracing::warn!(item = %id, "sub-resource watch closed by remote");
            }
        }

        self.orphans.retain(|(id, pair)| {
            if !pair.is_closed() {
                return true;
            }
            pair.cancel();
            tracing::debug!(item = %id, "discarding closed orphan watchers");
            false
        });
        closed
    }

    /// Every live watcher, for blocking selection.
    pub fn watchers(&self) -> impl Iterator<Item = &SubResourceWatcher> {
        self.handles
            .values()
            .chain(self.orphans.iter().map(|(_, p)| p))
            .flat_map(|p| [&p.detail, &p.status])
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.handles.contains_key(id)
    }

    pub fn get(&self, id: &ItemId) -> Option<&WatchPair> {
        self.handles.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &ItemId> {
        self.handles.keys()
    }

    /// Number of ids with a registered pair. Orphans are not counted.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// True when no ids are registered. Orphans are not counted.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn orphan_count(&self) -> usize {
        self.orphans.len()
    }

    /// Number of watcher pairs still held, registered and orphaned.
    pub fn pair_count(&self) -> usize {
        self.handles.len() + self.orphans.len()
    }

    pub fn unsubscribes_before_overwrite(&self) -> bool {
        self.unsubscribe_before_overwrite
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new(false)
    }
}

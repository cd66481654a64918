//! Live watchers: the newest-item query and per-item sub-resources.

use crate::config::FeedLayout;
use crate::error::Result;
use crate::remote::{ChangeKind, DocumentWatch, QueryWatch, RemoteDocumentStore};
use crate::subscriptions::WatchEvent;
use crate::types::{DetailPatch, Document, DocumentSnapshot, ItemId, ItemPatch, StatusPatch};

use super::join::{detail_from_data, status_from_snapshot};

/// Watches the single newest item of a parent and reports additions.
pub struct PrimaryCollectionWatcher {
    parent: String,
    watch: QueryWatch,
}

impl PrimaryCollectionWatcher {
    pub fn start(remote: &dyn RemoteDocumentStore, layout: &FeedLayout, parent: &str) -> Result<Self> {
        let watch = remote.watch_query(&layout.newest_query(parent))?;
        tracing::debug!(parent, subscription = watch.id().0, "watching newest item");
        Ok(Self {
            parent: parent.to_string(),
            watch,
        })
    }

    /// Documents added to the watched result since the last poll.
    /// Modifications and removals are ignored.
    pub fn poll(&self) -> Vec<Document> {
        let mut added = Vec::new();
        for event in self.watch.drain() {
            match event {
                WatchEvent::Snapshot(changes) => added.extend(
                    changes
                        .into_iter()
                        .filter(|c| c.kind == ChangeKind::Added)
                        .map(|c| c.document),
                ),
                WatchEvent::Dropped(reason) => {
                    tracing::warn!(parent = %self.parent, ?reason, "newest-item watch dropped");
                }
            }
        }
        added
    }

    pub fn subscription(&self) -> &QueryWatch {
        &self.watch
    }

    pub fn cancel(&self) -> bool {
        self.watch.cancel()
    }

    /// The remote stopped serving this watch; it needs a restart.
    pub fn is_closed(&self) -> bool {
        self.watch.is_closed()
    }
}

/// Which sub-resource a [`SubResourceWatcher`] follows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubResourceKind {
    Detail,
    Status,
}

/// Watches one sub-resource document of one item and turns its snapshots
/// into patches. It never touches the store itself.
pub struct SubResourceWatcher {
    id: ItemId,
    kind: SubResourceKind,
    rating_field: String,
    watch: DocumentWatch,
}

impl SubResourceWatcher {
    pub fn watch(
        remote: &dyn RemoteDocumentStore,
        layout: &FeedLayout,
        kind: SubResourceKind,
        id: &ItemId,
    ) -> Result<Self> {
        let path = match kind {
            SubResourceKind::Detail => layout.detail_path(id),
            SubResourceKind::Status => layout.status_path(id),
        };
        let watch = remote.watch_document(&path)?;
        Ok(Self {
            id: id.clone(),
            kind,
            rating_field: layout.rating_field.clone(),
            watch,
        })
    }

    pub fn item_id(&self) -> &ItemId {
        &self.id
    }

    pub fn kind(&self) -> SubResourceKind {
        self.kind
    }

    pub fn subscription(&self) -> &DocumentWatch {
        &self.watch
    }

    pub fn cancel(&self) -> bool {
        self.watch.cancel()
    }

    pub fn is_cancelled(&self) -> bool {
        self.watch.is_cancelled()
    }

    pub fn is_closed(&self) -> bool {
        self.watch.is_closed()
    }

    /// Convert a snapshot into a patch. Absent documents map to the
    /// per-kind sentinel.
    pub fn patch_for(&self, snapshot: &DocumentSnapshot) -> Option<ItemPatch> {
        match (self.kind, &snapshot.data) {
            (SubResourceKind::Detail, Some(data)) => match detail_from_data(data) {
                Ok(detail) => Some(ItemPatch::Detail(DetailPatch::from(detail))),
                Err(e) => {
                    tracing::warn!(item = %self.id, error = %e, "skipping malformed detail update");
                    None
                }
            },
            (SubResourceKind::Detail, None) => Some(ItemPatch::Detail(DetailPatch::absent())),
            (SubResourceKind::Status, Some(_)) => Some(ItemPatch::Status(StatusPatch::from(
                status_from_snapshot(snapshot, &self.rating_field),
            ))),
            (SubResourceKind::Status, None) => Some(ItemPatch::Status(StatusPatch::absent())),
        }
    }

    /// Deliver every buffered change to `on_change`. Returns how many patches
    /// were delivered.
    pub fn poll(&self, mut on_change: impl FnMut(&ItemId, ItemPatch)) -> usize {
        let mut delivered = 0;
        for event in self.watch.drain() {
            match event {
                WatchEvent::Snapshot(snapshot) => {
                    if let Some(patch) = self.patch_for(&snapshot) {
                        on_change(&self.id, patch);
                        delivered += 1;
                    }
                }
                WatchEvent::Dropped(reason) => {
                    tracing::warn!(item = %self.id, kind = ?self.kind, ?reason, "sub-resource watch dropped");
                }
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryDocumentStore;
    use crate::types::{DocPath, Status};
    use serde_json::{json, Map, Value};

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap_or_default()
    }

    fn collect(watcher: &SubResourceWatcher) -> Vec<ItemPatch> {
        let mut patches = Vec::new();
        watcher.poll(|_, p| patches.push(p));
        patches
    }

    #[test]
    fn test_primary_watcher_only_reports_additions() {
        let remote = MemoryDocumentStore::new();
        let layout = FeedLayout::default();
        let watcher = PrimaryCollectionWatcher::start(&remote, &layout, "u1").unwrap();
        assert!(watcher.poll().is_empty());

        let path = DocPath::new("bookings", "b1");
        remote
            .set(&path, obj(json!({"consumer_id": "u1", "created_at": 5})))
            .unwrap();
        let added = watcher.poll();
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].id, "b1");

        remote
            .update(&path, obj(json!({"note": "gate code 42"})))
            .unwrap();
        assert!(watcher.poll().is_empty());

        // Other parents are invisible.
        remote
            .set(
                &DocPath::new("bookings", "b2"),
                obj(json!({"consumer_id": "u2", "created_at": 9})),
            )
            .unwrap();
        assert!(watcher.poll().is_empty());
    }

    #[test]
    fn test_status_watcher_sentinel_and_updates() {
        let remote = MemoryDocumentStore::new();
        let layout = FeedLayout::default();
        let id = ItemId::new("b1");
        let watcher =
            SubResourceWatcher::watch(&remote, &layout, SubResourceKind::Status, &id).unwrap();

        assert_eq!(collect(&watcher), vec![ItemPatch::Status(StatusPatch::absent())]);

        remote
            .set(&DocPath::new("reviews", "b1"), obj(json!({"rating": 3.0})))
            .unwrap();
        assert_eq!(
            collect(&watcher),
            vec![ItemPatch::Status(StatusPatch::from(Status {
                has_review: true,
                rating: Some(3.0),
            }))]
        );
    }

    #[test]
    fn test_detail_watcher_reports_deletion() {
        let remote = MemoryDocumentStore::new();
        let layout = FeedLayout::default();
        let id = ItemId::new("b1");
        let path = DocPath::new("booking_details", "b1");
        remote.set(&path, obj(json!({"name": "Pipe Pro"}))).unwrap();

        let watcher =
            SubResourceWatcher::watch(&remote, &layout, SubResourceKind::Detail, &id).unwrap();
        let initial = collect(&watcher);
        assert!(matches!(
            &initial[..],
            [ItemPatch::Detail(DetailPatch { name: Some(name), .. })] if name == "Pipe Pro"
        ));

        remote.delete(&path).unwrap();
        assert_eq!(collect(&watcher), vec![ItemPatch::Detail(DetailPatch::absent())]);
    }

    #[test]
    fn test_cancelled_watcher_delivers_nothing() {
        let remote = MemoryDocumentStore::new();
        let layout = FeedLayout::default();
        let id = ItemId::new("b1");
        let watcher =
            SubResourceWatcher::watch(&remote, &layout, SubResourceKind::Status, &id).unwrap();

        assert!(watcher.cancel());
        assert!(!watcher.cancel());
        remote
            .set(&DocPath::new("reviews", "b1"), obj(json!({"rating": 1.0})))
            .unwrap();
        assert!(collect(&watcher).is_empty());
    }
}

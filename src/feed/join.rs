//! Per-item join of a primary document with its detail and status.

use crate::config::FeedLayout;
use crate::error::{FeedError, Result};
use crate::remote::RemoteDocumentStore;
use crate::types::{Detail, Document, DocumentSnapshot, FeedItem, ItemId, Status, Timestamp};
use serde_json::{Map, Value};

/// Decode a detail document.
pub fn detail_from_data(data: &Map<String, Value>) -> Result<Detail> {
    let mut detail: Detail = serde_json::from_value(Value::Object(data.clone()))
        .map_err(|e| FeedError::Deserialization(format!("detail document: {}", e)))?;
    detail.available = true;
    Ok(detail)
}

/// Decode a status snapshot. A missing document means "no review".
pub fn status_from_snapshot(snapshot: &DocumentSnapshot, rating_field: &str) -> Status {
    match &snapshot.data {
        Some(data) => Status {
            has_review: true,
            rating: data.get(rating_field).and_then(Value::as_f64),
        },
        None => Status::no_review(),
    }
}

/// Read detail and status for `doc` and merge them into a [`FeedItem`].
///
/// Returns `Ok(None)` when the detail document does not exist; callers drop
/// such items. A missing status document defaults to "no review".
pub fn join_item(
    remote: &dyn RemoteDocumentStore,
    layout: &FeedLayout,
    doc: &Document,
) -> Result<Option<FeedItem>> {
    let id = ItemId::new(doc.id.clone());

    let detail_snapshot = remote.get(&layout.detail_path(&id))?;
    let status_snapshot = remote.get(&layout.status_path(&id))?;

    let Some(detail_data) = &detail_snapshot.data else {
        return Ok(None);
    };

    Ok(Some(FeedItem {
        created_at: Timestamp(doc.i64_field(&layout.order_field).unwrap_or_default()),
        record: doc.data.clone(),
        detail: detail_from_data(detail_data)?,
        status: status_from_snapshot(&status_snapshot, &layout.rating_field),
        id,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryDocumentStore;
    use crate::types::DocPath;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap_or_default()
    }

    fn seed(remote: &MemoryDocumentStore, id: &str) -> Document {
        let data = obj(json!({"consumer_id": "u1", "created_at": 100, "service": "wiring"}));
        remote.set(&DocPath::new("bookings", id), data.clone()).unwrap();
        Document::new(id, data)
    }

    #[test]
    fn test_join_with_both_sub_resources() {
        let remote = MemoryDocumentStore::new();
        let layout = FeedLayout::default();
        let doc = seed(&remote, "b1");
        remote
            .set(
                &DocPath::new("booking_details", "b1"),
                obj(json!({"name": "Volt Electric", "contact": "555-0100"})),
            )
            .unwrap();
        remote
            .set(&DocPath::new("reviews", "b1"), obj(json!({"rating": 4.5})))
            .unwrap();

        let item = join_item(&remote, &layout, &doc).unwrap().unwrap();
        assert_eq!(item.detail.name, "Volt Electric");
        assert_eq!(item.created_at, Timestamp(100));
        assert_eq!(item.record["service"], "wiring");
        assert!(item.status.has_review);
        assert_eq!(item.status.rating, Some(4.5));
    }

    #[test]
    fn test_missing_status_defaults() {
        let remote = MemoryDocumentStore::new();
        let layout = FeedLayout::default();
        let doc = seed(&remote, "b1");
        remote
            .set(&DocPath::new("booking_details", "b1"), obj(json!({"name": "Pipe Pro"})))
            .unwrap();

        let item = join_item(&remote, &layout, &doc).unwrap().unwrap();
        assert!(!item.status.has_review);
        assert_eq!(item.status.rating, None);
    }

    #[test]
    fn test_missing_detail_excludes() {
        let remote = MemoryDocumentStore::new();
        let layout = FeedLayout::default();
        let doc = seed(&remote, "b1");

        assert!(join_item(&remote, &layout, &doc).unwrap().is_none());
    }

    #[test]
    fn test_read_error_propagates() {
        let remote = MemoryDocumentStore::new();
        let layout = FeedLayout::default();
        let doc = seed(&remote, "b1");
        remote.fail_next_reads(1);

        let result = join_item(&remote, &layout, &doc);
        assert!(matches!(result, Err(FeedError::TransientRead(_))));
    }

    #[test]
    fn test_malformed_detail_is_error() {
        let data = obj(json!({"name": 42}));
        assert!(matches!(
            detail_from_data(&data),
            Err(FeedError::Deserialization(_))
        ));
    }
}

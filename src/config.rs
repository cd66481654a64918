//! Feed configuration.

use crate::error::{FeedError, Result};
use crate::remote::{Direction, Query};
use crate::types::{DocPath, ItemId, PageCursor};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Where the feed's documents live and which fields it reads.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedLayout {
    /// Primary collection (one document per feed item).
    pub collection: String,

    /// Field of a primary document holding the owning parent's id.
    pub parent_field: String,

    /// Integer creation-time field used for ordering and cursors.
    pub order_field: String,

    /// Collection of detail sub-resources, keyed by item id.
    pub detail_collection: String,

    /// Collection of status sub-resources, keyed by item id.
    pub status_collection: String,

    /// Numeric field of a status document holding the rating.
    pub rating_field: String,
}

impl Default for FeedLayout {
    fn default() -> Self {
        Self {
            collection: "bookings".into(),
            parent_field: "consumer_id".into(),
            order_field: "created_at".into(),
            detail_collection: "booking_details".into(),
            status_collection: "reviews".into(),
            rating_field: "rating".into(),
        }
    }
}

impl FeedLayout {
    pub fn detail_path(&self, id: &ItemId) -> DocPath {
        DocPath::new(self.detail_collection.clone(), id.as_str())
    }

    pub fn status_path(&self, id: &ItemId) -> DocPath {
        DocPath::new(self.status_collection.clone(), id.as_str())
    }

    /// Newest item of `parent`, for the live watcher.
    pub fn newest_query(&self, parent: &str) -> Query {
        Query::collection(self.collection.clone())
            .where_eq(self.parent_field.clone(), parent)
            .order_by(self.order_field.clone(), Direction::Descending)
            .limit(1)
    }

    /// Up to `page_size` items of `parent` older than `cursor`.
    pub fn page_query(&self, parent: &str, cursor: Option<&PageCursor>, page_size: usize) -> Query {
        Query::collection(self.collection.clone())
            .where_eq(self.parent_field.clone(), parent)
            .order_by(self.order_field.clone(), Direction::Descending)
            .limit(page_size)
            .start_after(cursor.cloned())
    }
}

/// Feed view configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub layout: FeedLayout,

    /// Items requested per page.
    /// Default: 10
    pub page_size: usize,

    /// Concurrent per-item joins during a page fetch (1 = sequential).
    /// Default: 4
    pub join_concurrency: usize,

    /// Cancel the displaced watcher pair when an id is registered twice.
    /// When false the displaced pair stays live until the next reset.
    /// Default: false
    pub unsubscribe_before_overwrite: bool,

    /// Save the feed to the local cache after each successful load.
    /// Default: true
    pub persist_snapshots: bool,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            layout: FeedLayout::default(),
            page_size: 10,
            join_concurrency: 4,
            unsubscribe_before_overwrite: false,
            persist_snapshots: true,
        }
    }
}

impl FeedConfig {
    /// Parse a JSON configuration; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: FeedConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(FeedError::InvalidConfig("page_size must be positive".into()));
        }
        if self.join_concurrency == 0 {
            return Err(FeedError::InvalidConfig(
                "join_concurrency must be positive".into(),
            ));
        }
        let layout = &self.layout;
        for (name, value) in [
            ("collection", &layout.collection),
            ("parent_field", &layout.parent_field),
            ("order_field", &layout.order_field),
            ("detail_collection", &layout.detail_collection),
            ("status_collection", &layout.status_collection),
            ("rating_field", &layout.rating_field),
        ] {
            if value.is_empty() || value.contains('/') {
                return Err(FeedError::InvalidConfig(format!(
                    "layout.{} must be a non-empty name without '/'",
                    name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        FeedConfig::default().validate().unwrap();
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = FeedConfig::from_json_str(
            r#"{"page_size": 4, "layout": {"status_collection": "ratings"}}"#,
        )
        .unwrap();
        assert_eq!(config.page_size, 4);
        assert_eq!(config.layout.status_collection, "ratings");
        assert_eq!(config.layout.collection, "bookings");
        assert!(!config.unsubscribe_before_overwrite);
    }

    #[test]
    fn test_rejects_zero_page_size() {
        let result = FeedConfig::from_json_str(r#"{"page_size": 0}"#);
        assert!(matches!(result, Err(FeedError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_bad_collection_name() {
        let mut config = FeedConfig::default();
        config.layout.detail_collection = "a/b".into();
        assert!(config.validate().is_err());
    }
}

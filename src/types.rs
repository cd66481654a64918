//! Core types for the feed.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::FeedError;

/// Identity of a feed item, shared by its primary record and both
/// sub-resources.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        ItemId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ItemId({})", self.0)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        ItemId(s.to_string())
    }
}

/// Milliseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        Timestamp(chrono::Utc::now().timestamp_millis())
    }

    pub fn as_millis(self) -> i64 {
        self.0
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Location of a document: `collection/id`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocPath {
    pub collection: String,
    pub id: String,
}

impl DocPath {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }
}

impl fmt::Debug for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocPath({}/{})", self.collection, self.id)
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

impl FromStr for DocPath {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((collection, id))
                if !collection.is_empty() && !id.is_empty() && !id.contains('/') =>
            {
                Ok(DocPath::new(collection, id))
            }
            _ => Err(FeedError::InvalidPath(s.to_string())),
        }
    }
}

/// A stored document: id within its collection plus its fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub data: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    /// Read an integer field (used for ordering keys).
    pub fn i64_field(&self, field: &str) -> Option<i64> {
        self.data.get(field).and_then(Value::as_i64)
    }

    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.data.get(field).and_then(Value::as_str)
    }
}

/// Result of a one-shot read; `data` is `None` when the document does not
/// exist.
#[derive(Clone, Debug, PartialEq)]
pub struct DocumentSnapshot {
    pub path: DocPath,
    pub data: Option<Map<String, Value>>,
}

impl DocumentSnapshot {
    pub fn exists(&self) -> bool {
        self.data.is_some()
    }
}

/// WGS84 coordinate in degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    #[serde(alias = "lon")]
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

fn default_true() -> bool {
    true
}

/// Joined detail record (who the item is with and where).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Detail {
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "phone")]
    pub contact: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub location: Option<GeoPoint>,
    /// False once the detail document has been deleted under a live item.
    #[serde(default = "default_true")]
    pub available: bool,
}

/// Joined status record (review state).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub has_review: bool,
    pub rating: Option<f64>,
}

impl Status {
    /// Status used when the status document does not exist.
    pub fn no_review() -> Self {
        Self::default()
    }
}

/// Shallow patch for [`Detail`]; `Some` fields overwrite.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetailPatch {
    pub name: Option<String>,
    pub contact: Option<Option<String>>,
    pub image: Option<Option<String>>,
    pub address: Option<Option<String>>,
    pub location: Option<Option<GeoPoint>>,
    pub available: Option<bool>,
}

impl DetailPatch {
    /// Sentinel emitted when the detail document is absent.
    pub fn absent() -> Self {
        Self {
            available: Some(false),
            ..Default::default()
        }
    }

    pub fn apply(self, detail: &mut Detail) {
        if let Some(name) = self.name {
            detail.name = name;
        }
        if let Some(contact) = self.contact {
            detail.contact = contact;
        }
        if let Some(image) = self.image {
            detail.image = image;
        }
        if let Some(address) = self.address {
            detail.address = address;
        }
        if let Some(location) = self.location {
            detail.location = location;
        }
        if let Some(available) = self.available {
            detail.available = available;
        }
    }
}

impl From<Detail> for DetailPatch {
    fn from(d: Detail) -> Self {
        Self {
            name: Some(d.name),
            contact: Some(d.contact),
            image: Some(d.image),
            address: Some(d.address),
            location: Some(d.location),
            available: Some(d.available),
        }
    }
}

/// Shallow patch for [`Status`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StatusPatch {
    pub has_review: Option<bool>,
    pub rating: Option<Option<f64>>,
}

impl StatusPatch {
    /// Sentinel emitted when the status document is absent.
    pub fn absent() -> Self {
        Self {
            has_review: Some(false),
            rating: Some(None),
        }
    }

    pub fn apply(self, status: &mut Status) {
        if let Some(has_review) = self.has_review {
            status.has_review = has_review;
        }
        if let Some(rating) = self.rating {
            status.rating = rating;
        }
    }
}

impl From<Status> for StatusPatch {
    fn from(s: Status) -> Self {
        Self {
            has_review: Some(s.has_review),
            rating: Some(s.rating),
        }
    }
}

/// A change to one nested record of an item.
#[derive(Clone, Debug, PartialEq)]
pub enum ItemPatch {
    Detail(DetailPatch),
    Status(StatusPatch),
}

/// One row of the feed: primary record merged with its detail and status.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    pub id: ItemId,
    pub created_at: Timestamp,
    /// Fields of the primary record as stored remotely.
    pub record: Map<String, Value>,
    pub detail: Detail,
    pub status: Status,
}

impl FeedItem {
    pub fn apply(&mut self, patch: ItemPatch) {
        match patch {
            ItemPatch::Detail(p) => p.apply(&mut self.detail),
            ItemPatch::Status(p) => p.apply(&mut self.status),
        }
    }

    pub fn cursor(&self) -> PageCursor {
        PageCursor {
            created_at: self.created_at,
            id: self.id.clone(),
        }
    }
}

/// Position marker into the ordered collection: the last raw item of the
/// most recent page. Opaque to callers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCursor {
    pub(crate) created_at: Timestamp,
    pub(crate) id: ItemId,
}

impl PageCursor {
    /// Cursor pointing at a raw document of the primary collection.
    pub fn from_document(doc: &Document, order_field: &str) -> Self {
        Self {
            created_at: Timestamp(doc.i64_field(order_field).unwrap_or_default()),
            id: ItemId::new(doc.id.clone()),
        }
    }

    /// Whether `self` lies strictly after `other` in descending feed order.
    pub fn is_after(&self, other: &PageCursor) -> bool {
        (self.created_at, &self.id) < (other.created_at, &other.id)
    }
}

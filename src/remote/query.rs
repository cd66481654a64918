//! Query descriptors and change records.

use crate::types::{Document, PageCursor};
use serde_json::Value;
use std::cmp::Ordering;

/// Sort direction of a query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Equality filter on a top-level field.
#[derive(Clone, Debug, PartialEq)]
pub struct Filter {
    pub field: String,
    pub value: Value,
}

/// Composable query over one collection.
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<Filter>,
    /// Integer field to order by; ties break on document id.
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
    /// Only documents strictly after this position in query order.
    pub start_after: Option<PageCursor>,
}

impl Query {
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
            start_after: None,
        }
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn start_after(mut self, cursor: Option<PageCursor>) -> Self {
        self.start_after = cursor;
        self
    }

    /// Whether a document passes every equality filter.
    pub fn matches(&self, doc: &Document) -> bool {
        self.filters
            .iter()
            .all(|f| doc.data.get(&f.field) == Some(&f.value))
    }

    /// Compare two documents in query order.
    pub fn compare(&self, a: &Document, b: &Document) -> Ordering {
        let Some((field, direction)) = &self.order_by else {
            return a.id.cmp(&b.id);
        };
        let ka = (a.i64_field(field).unwrap_or_default(), a.id.as_str());
        let kb = (b.i64_field(field).unwrap_or_default(), b.id.as_str());
        match direction {
            Direction::Ascending => ka.cmp(&kb),
            Direction::Descending => kb.cmp(&ka),
        }
    }

    /// Whether a document lies strictly after the `start_after` cursor.
    pub fn is_past_cursor(&self, doc: &Document) -> bool {
        let (Some(cursor), Some((field, direction))) = (&self.start_after, &self.order_by) else {
            return true;
        };
        let key = (doc.i64_field(field).unwrap_or_default(), doc.id.as_str());
        let at = (cursor.created_at.0, cursor.id.as_str());
        match direction {
            Direction::Ascending => key > at,
            Direction::Descending => key < at,
        }
    }

    /// Apply filters, ordering, cursor and limit to a set of documents.
    pub fn evaluate<'a>(&self, docs: impl IntoIterator<Item = &'a Document>) -> Vec<Document> {
        let mut matched: Vec<&Document> = docs
            .into_iter()
            .filter(|d| self.matches(d) && self.is_past_cursor(d))
            .collect();
        matched.sort_by(|a, b| self.compare(a, b));
        if let Some(limit) = self.limit {
            matched.truncate(limit);
        }
        matched.into_iter().cloned().collect()
    }
}

/// Kind of change reported by a query watch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// One document entering, changing within, or leaving a watched result set.
#[derive(Clone, Debug, PartialEq)]
pub struct DocumentChange {
    pub kind: ChangeKind,
    pub document: Document,
}

/// Changes turning result set `old` into `new`.
pub(crate) fn diff(old: &[Document], new: &[Document]) -> Vec<DocumentChange> {
    let mut changes = Vec::new();
    for doc in new {
        match old.iter().find(|o| o.id == doc.id) {
            None => changes.push(DocumentChange {
                kind: ChangeKind::Added,
                document: doc.clone(),
            }),
            Some(prev) if prev.data != doc.data => changes.push(DocumentChange {
                kind: ChangeKind::Modified,
                document: doc.clone(),
            }),
            Some(_) => {}
        }
    }
    for doc in old {
        if !new.iter().any(|n| n.id == doc.id) {
            changes.push(DocumentChange {
                kind: ChangeKind::Removed,
                document: doc.clone(),
            });
        }
    }
    changes
}

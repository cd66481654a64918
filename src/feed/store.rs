//! In-memory ordered item list.

use crate::types::{FeedItem, ItemId, ItemPatch, PageCursor};
use std::collections::HashSet;

/// Owns the items of one feed, newest first, with its pagination position.
///
/// Ids are unique: both insertion paths skip ids already present.
#[derive(Debug, Default)]
pub struct FeedStore {
    items: Vec<FeedItem>,
    cursor: Option<PageCursor>,
    end_reached: bool,
}

impl FeedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every item and rewind pagination.
    pub fn reset(&mut self) {
        self.items.clear();
        self.cursor = None;
        self.end_reached = false;
    }

    /// Insert at the front unless the id already exists.
    pub fn prepend_if_absent(&mut self, item: FeedItem) -> bool {
        if self.contains(&item.id) {
            return false;
        }
        self.items.insert(0, item);
        true
    }

    /// Append a page, dropping ids already present. Returns the admitted ids
    /// in page order.
    pub fn append_page(&mut self, items: Vec<FeedItem>) -> Vec<ItemId> {
        let mut seen: HashSet<ItemId> = self.items.iter().map(|i| i.id.clone()).collect();
        let mut admitted = Vec::new();
        for item in items {
            if !seen.insert(item.id.clone()) {
                continue;
            }
            admitted.push(item.id.clone());
            self.items.push(item);
        }
        admitted
    }

    /// Merge a patch into the item with this id. Returns false when the id is
    /// not present (the item was reset away under a live watcher).
    pub fn patch(&mut self, id: &ItemId, patch: ItemPatch) -> bool {
        match self.items.iter_mut().find(|i| &i.id == id) {
            Some(item) => {
                item.apply(patch);
                true
            }
            None => {
                tracing::trace!(item = %id, "ignoring patch for absent item");
                false
            }
        }
    }

    /// Replace contents wholesale (cache hydration). Duplicate ids keep their
    /// first occurrence.
    pub fn replace_all(&mut self, items: Vec<FeedItem>) {
        self.reset();
        self.append_page(items);
    }

    /// Move the cursor forward. A cursor that does not lie after the current
    /// one is ignored.
    pub fn advance_cursor(&mut self, cursor: PageCursor) -> bool {
        match &self.cursor {
            Some(current) if !cursor.is_after(current) => false,
            _ => {
                self.cursor = Some(cursor);
                true
            }
        }
    }

    pub fn cursor(&self) -> Option<&PageCursor> {
        self.cursor.as_ref()
    }

    pub fn mark_end_reached(&mut self) {
        self.end_reached = true;
    }

    pub fn end_reached(&self) -> bool {
        self.end_reached
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.items.iter().any(|i| &i.id == id)
    }

    pub fn get(&self, id: &ItemId) -> Option<&FeedItem> {
        self.items.iter().find(|i| &i.id == id)
    }

    pub fn items(&self) -> &[FeedItem] {
        &self.items
    }

    pub fn ids(&self) -> impl Iterator<Item = &ItemId> {
        self.items.iter().map(|i| &i.id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

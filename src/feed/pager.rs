//! One-shot page fetches with per-item joins.

use crate::config::FeedLayout;
use crate::error::{FeedError, Result};
use crate::remote::RemoteDocumentStore;
use crate::types::{Document, FeedItem, PageCursor};
use crossbeam_channel::unbounded;
use std::sync::Arc;
use std::thread;

use super::join::join_item;

/// One fetched page.
#[derive(Clone, Debug)]
pub struct Page {
    /// Joined items in feed order; items without a detail are absent.
    pub items: Vec<FeedItem>,
    /// Last raw document of this page, or the request cursor if the page was
    /// empty.
    pub cursor: Option<PageCursor>,
    /// True when the raw page was full, so more items likely exist.
    pub has_more: bool,
    /// Raw documents returned by the query before joining.
    pub raw_count: usize,
}

/// Fetches pages of the primary collection, oldest-after-cursor first.
pub struct PageFetcher {
    remote: Arc<dyn RemoteDocumentStore>,
    layout: FeedLayout,
    join_concurrency: usize,
}

impl PageFetcher {
    pub fn new(remote: Arc<dyn RemoteDocumentStore>, layout: FeedLayout, join_concurrency: usize) -> Self {
        Self {
            remote,
            layout,
            join_concurrency: join_concurrency.max(1),
        }
    }

    /// Fetch up to `page_size` items of `parent` strictly older than
    /// `cursor`.
    ///
    /// Fails as a whole on the first read error; nothing is returned for a
    /// partially joined page.
    pub fn fetch_page(
        &self,
        parent: &str,
        cursor: Option<&PageCursor>,
        page_size: usize,
    ) -> Result<Page> {
        if page_size == 0 {
            return Err(FeedError::InvalidConfig("page_size must be positive".into()));
        }

        let query = self.layout.page_query(parent, cursor, page_size);
        let raw = self.remote.query(&query)?;
        let raw_count = raw.len();

        let next_cursor = match raw.last() {
            Some(doc) => Some(PageCursor::from_document(doc, &self.layout.order_field)),
            None => cursor.cloned(),
        };

        let joined = self.join_all(&raw)?;
        let items: Vec<FeedItem> = joined.into_iter().flatten().collect();

        if items.len() < raw_count {
            tracing::debug!(
                parent,
                excluded = raw_count - items.len(),
                "excluded items without detail from page"
            );
        }

        Ok(Page {
            items,
            cursor: next_cursor,
            has_more: raw_count == page_size,
            raw_count,
        })
    }

    /// Join every document, keeping input order. Runs on up to
    /// `join_concurrency` scoped worker threads.
    fn join_all(&self, docs: &[Document]) -> Result<Vec<Option<FeedItem>>> {
        let workers = self.join_concurrency.min(docs.len());
        if workers <= 1 {
            return docs
                .iter()
                .map(|doc| join_item(self.remote.as_ref(), &self.layout, doc))
                .collect();
        }

        let (job_tx, job_rx) = unbounded::<usize>();
        for index in 0..docs.len() {
            let _ = job_tx.send(index);
        }
        drop(job_tx);

        let (result_tx, result_rx) = unbounded();
        let remote = self.remote.as_ref();
        let layout = &self.layout;

        thread::scope(|scope| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                scope.spawn(move || {
                    for index in job_rx.iter() {
                        let joined = join_item(remote, layout, &docs[index]);
                        let failed = joined.is_err();
                        if result_tx.send((index, joined)).is_err() || failed {
                            break;
                        }
                    }
                });
            }
        });
        drop(result_tx);

        let mut joined: Vec<Option<FeedItem>> = vec![None; docs.len()];
        for (index, result) in result_rx.try_iter() {
            joined[index] = result?;
        }
        Ok(joined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryDocumentStore;
    use crate::types::DocPath;
    use serde_json::{json, Map, Value};

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap_or_default()
    }

    fn seeded(count: i64) -> Arc<MemoryDocumentStore> {
        let remote = Arc::new(MemoryDocumentStore::new());
        for i in 0..count {
            let id = format!("b{:02}", i);
            remote
                .set(
                    &DocPath::new("bookings", &id),
                    obj(json!({"consumer_id": "u1", "created_at": 1000 + i})),
                )
                .unwrap();
            remote
                .set(
                    &DocPath::new("booking_details", &id),
                    obj(json!({"name": format!("provider {}", i)})),
                )
                .unwrap();
        }
        remote
    }

    fn ids(page: &Page) -> Vec<String> {
        page.items.iter().map(|i| i.id.to_string()).collect()
    }

    #[test]
    fn test_pages_are_newest_first() {
        let remote = seeded(5);
        let fetcher = PageFetcher::new(remote, FeedLayout::default(), 1);

        let page = fetcher.fetch_page("u1", None, 3).unwrap();
        assert_eq!(ids(&page), vec!["b04", "b03", "b02"]);
        assert!(page.has_more);

        let page = fetcher.fetch_page("u1", page.cursor.as_ref(), 3).unwrap();
        assert_eq!(ids(&page), vec!["b01", "b00"]);
        assert!(!page.has_more);
    }

    #[test]
    fn test_concurrent_joins_keep_order() {
        let remote = seeded(9);
        let sequential = PageFetcher::new(remote.clone(), FeedLayout::default(), 1);
        let concurrent = PageFetcher::new(remote, FeedLayout::default(), 4);

        let a = sequential.fetch_page("u1", None, 9).unwrap();
        let b = concurrent.fetch_page("u1", None, 9).unwrap();
        assert_eq!(ids(&a), ids(&b));
        assert_eq!(a.cursor, b.cursor);
    }

    #[test]
    fn test_empty_page_keeps_cursor() {
        let remote = seeded(2);
        let fetcher = PageFetcher::new(remote, FeedLayout::default(), 2);

        let first = fetcher.fetch_page("u1", None, 2).unwrap();
        let second = fetcher.fetch_page("u1", first.cursor.as_ref(), 2).unwrap();
        assert!(second.items.is_empty());
        assert_eq!(second.cursor, first.cursor);
        assert!(!second.has_more);
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let fetcher = PageFetcher::new(seeded(1), FeedLayout::default(), 1);
        assert!(matches!(
            fetcher.fetch_page("u1", None, 0),
            Err(FeedError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_join_failure_fails_page() {
        let remote = seeded(4);
        let fetcher = PageFetcher::new(remote.clone(), FeedLayout::default(), 3);
        remote.fail_collection_reads(Some("reviews"));

        let result = fetcher.fetch_page("u1", None, 4);
        assert!(matches!(result, Err(FeedError::TransientRead(_))));
    }
}

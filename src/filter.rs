//! Transient filter and sort projections over the current feed contents.

use crate::format::distance_km;
use crate::types::{FeedItem, GeoPoint};
use std::cmp::Ordering;

/// Review-state filter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReviewFilter {
    #[default]
    All,
    Reviewed,
    Unreviewed,
}

/// Which items are visible. Applied in memory; never triggers a fetch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FilterState {
    pub review: ReviewFilter,
    /// Minimum rating; unrated items fail this check.
    pub min_rating: Option<f64>,
    /// Case-insensitive substring of the detail name or address.
    pub search: Option<String>,
}

impl FilterState {
    pub fn matches(&self, item: &FeedItem) -> bool {
        let review_ok = match self.review {
            ReviewFilter::All => true,
            ReviewFilter::Reviewed => item.status.has_review,
            ReviewFilter::Unreviewed => !item.status.has_review,
        };
        if !review_ok {
            return false;
        }

        if let Some(min) = self.min_rating {
            match item.status.rating {
                Some(rating) if rating >= min => {}
                _ => return false,
            }
        }

        match self.search.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(needle) => {
                let needle = needle.to_lowercase();
                item.detail.name.to_lowercase().contains(&needle)
                    || item
                        .detail
                        .address
                        .as_deref()
                        .is_some_and(|a| a.to_lowercase().contains(&needle))
            }
        }
    }
}

/// Order of visible items.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum SortState {
    /// Feed order (creation time, newest first).
    #[default]
    Newest,
    Oldest,
    /// Highest rating first; unrated last.
    RatingHighFirst,
    /// Closest to the point first; items without a location last.
    Nearest(GeoPoint),
}

impl SortState {
    fn compare(&self, a: &FeedItem, b: &FeedItem) -> Ordering {
        match self {
            SortState::Newest => b.created_at.cmp(&a.created_at),
            SortState::Oldest => a.created_at.cmp(&b.created_at),
            SortState::RatingHighFirst => cmp_missing_last(b.status.rating, a.status.rating, true),
            SortState::Nearest(origin) => cmp_missing_last(
                a.detail.location.map(|p| distance_km(*origin, p)),
                b.detail.location.map(|p| distance_km(*origin, p)),
                false,
            ),
        }
    }
}

/// Compare optional floats with `None` sorting last. `reversed` means the
/// arguments were passed swapped for a descending sort.
fn cmp_missing_last(a: Option<f64>, b: Option<f64>, reversed: bool) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (None, None) => Ordering::Equal,
        (Some(_), None) if reversed => Ordering::Greater,
        (None, Some(_)) if reversed => Ordering::Less,
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
    }
}

/// Visible items of `items` under `filter`, ordered by `sort`. Stable: ties
/// keep feed order.
pub fn apply<'a>(items: &'a [FeedItem], filter: &FilterState, sort: &SortState) -> Vec<&'a FeedItem> {
    let mut visible: Vec<&FeedItem> = items.iter().filter(|i| filter.matches(i)).collect();
    if *sort != SortState::Newest {
        visible.sort_by(|a, b| sort.compare(a, b));
    }
    visible
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Detail, ItemId, Status, Timestamp};
    use serde_json::Map;

    fn item(id: &str, created: i64, rating: Option<f64>, location: Option<GeoPoint>) -> FeedItem {
        FeedItem {
            id: ItemId::new(id),
            created_at: Timestamp(created),
            record: Map::new(),
            detail: Detail {
                name: format!("{} Services", id.to_uppercase()),
                address: Some("12 Harbour Rd".into()),
                location,
                available: true,
                ..Default::default()
            },
            status: Status {
                has_review: rating.is_some(),
                rating,
            },
        }
    }

    fn ids(items: Vec<&FeedItem>) -> Vec<&str> {
        items.into_iter().map(|i| i.id.as_str()).collect()
    }

    fn sample() -> Vec<FeedItem> {
        vec![
            item("c", 30, None, Some(GeoPoint::new(0.0, 0.3))),
            item("b", 20, Some(3.0), None),
            item("a", 10, Some(5.0), Some(GeoPoint::new(0.0, 0.1))),
        ]
    }

    #[test]
    fn test_default_is_identity() {
        let items = sample();
        let visible = apply(&items, &FilterState::default(), &SortState::default());
        assert_eq!(ids(visible), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_review_filters() {
        let items = sample();
        let reviewed = FilterState {
            review: ReviewFilter::Reviewed,
            ..Default::default()
        };
        assert_eq!(ids(apply(&items, &reviewed, &SortState::Newest)), vec!["b", "a"]);

        let unreviewed = FilterState {
            review: ReviewFilter::Unreviewed,
            ..Default::default()
        };
        assert_eq!(ids(apply(&items, &unreviewed, &SortState::Newest)), vec!["c"]);

        let good = FilterState {
            min_rating: Some(4.0),
            ..Default::default()
        };
        assert_eq!(ids(apply(&items, &good, &SortState::Newest)), vec!["a"]);
    }

    #[test]
    fn test_search_matches_name_and_address() {
        let items = sample();
        let by_name = FilterState {
            search: Some("  b serv ".into()),
            ..Default::default()
        };
        assert_eq!(ids(apply(&items, &by_name, &SortState::Newest)), vec!["b"]);

        let by_address = FilterState {
            search: Some("harbour".into()),
            ..Default::default()
        };
        assert_eq!(apply(&items, &by_address, &SortState::Newest).len(), 3);
    }

    #[test]
    fn test_sorts() {
        let items = sample();
        let none = FilterState::default();
        assert_eq!(ids(apply(&items, &none, &SortState::Oldest)), vec!["a", "b", "c"]);
        assert_eq!(
            ids(apply(&items, &none, &SortState::RatingHighFirst)),
            vec!["a", "b", "c"]
        );
        assert_eq!(
            ids(apply(&items, &none, &SortState::Nearest(GeoPoint::new(0.0, 0.0)))),
            vec!["a", "c", "b"]
        );
    }
}

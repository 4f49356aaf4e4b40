//! skip/take pagination over already-entitled collections

use chrono::{DateTime, Utc};

/// Pagination window requested by a client.
#[derive(Debug, Clone, Copy, Default)]
pub struct PageRequest {
    pub skip: usize,
    pub take: Option<usize>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

/// One page of a collection together with the counts advertised in the
/// `X-Total-Count`, `X-Filtered-Count` and `X-Limit` headers.
#[derive(Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Everything the caller is entitled to see.
    pub total: usize,
    /// What remains after the date window.
    pub filtered: usize,
    /// Effective page size.
    pub limit: usize,
}

impl<T> Page<T> {
    /// Apply the date window on `last_updated`, then skip/take.
    /// `take` is capped at `max_limit`; a missing `take` means `max_limit`.
    pub fn paginate(
        entries: Vec<T>,
        request: &PageRequest,
        max_limit: usize,
        last_updated: impl Fn(&T) -> DateTime<Utc>,
    ) -> Self {
        let total = entries.len();
        let windowed: Vec<T> = entries
            .into_iter()
            .filter(|entry| {
                let ts = last_updated(entry);
                request.date_from.map_or(true, |from| ts >= from)
                    && request.date_to.map_or(true, |to| ts < to)
            })
            .collect();
        let filtered = windowed.len();
        let limit = request.take.unwrap_or(max_limit).min(max_limit);
        let items = windowed.into_iter().skip(request.skip).take(limit).collect();
        Self {
            items,
            total,
            filtered,
            limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn stamps(n: i64) -> Vec<DateTime<Utc>> {
        let base = Utc::now();
        (0..n).map(|i| base + Duration::seconds(i)).collect()
    }

    #[test]
    fn skip_and_take_slice_the_collection() {
        let entries = stamps(10);
        let request = PageRequest {
            skip: 3,
            take: Some(4),
            ..Default::default()
        };
        let page = Page::paginate(entries.clone(), &request, 100, |t| *t);
        assert_eq!(page.items, entries[3..7].to_vec());
        assert_eq!(page.total, 10);
        assert_eq!(page.filtered, 10);
        assert_eq!(page.limit, 4);
    }

    #[test]
    fn take_is_capped_by_max_limit() {
        let request = PageRequest {
            take: Some(500),
            ..Default::default()
        };
        let page = Page::paginate(stamps(20), &request, 5, |t| *t);
        assert_eq!(page.items.len(), 5);
        assert_eq!(page.limit, 5);
    }

    #[test]
    fn date_window_reduces_filtered_count_only() {
        let entries = stamps(10);
        let request = PageRequest {
            date_from: Some(entries[2]),
            date_to: Some(entries[5]),
            ..Default::default()
        };
        let page = Page::paginate(entries, &request, 100, |t| *t);
        assert_eq!(page.total, 10);
        assert_eq!(page.filtered, 3);
        assert_eq!(page.items.len(), 3);
    }
}

//! Cursor-following collection fetcher and bounded fan-out helper.
//!
//! Pages are requested strictly one after another: the next page is only
//! asked for once the previous one has resolved.

use std::future::Future;

use futures::future::join_all;
use tracing::debug;

use crate::metrics::UPSTREAM_PAGES_FETCHED;
use crate::upstream::{FilmSort, Page, PageRequest};

/// Upstream page size used for every catalog collection.
pub const DEFAULT_PER_PAGE: u32 = 100;

/// Safety bound on how much of a collection is fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimit {
    /// Maximum number of pages requested before stopping.
    pub max_pages: u32,
    /// Items requested per page.
    pub per_page: u32,
}

impl PageLimit {
    pub const fn pages(max_pages: u32) -> Self {
        Self {
            max_pages,
            per_page: DEFAULT_PER_PAGE,
        }
    }

    /// Upper bound on the number of items a fetch can return.
    pub fn max_items(&self) -> usize {
        self.max_pages as usize * self.per_page as usize
    }
}

/// Fetch every page of a collection, starting with no cursor and following
/// `next` until the upstream stops supplying one or `limit.max_pages` pages
/// have been read.
///
/// Hitting the page cap is not an error: the items gathered so far are
/// returned. Any page failure is returned as-is and the partial result is
/// discarded.
pub async fn fetch_all_pages<T, E, F, Fut>(
    resource: &str,
    limit: PageLimit,
    sort: Option<FilmSort>,
    mut fetch: F,
) -> Result<Vec<T>, E>
where
    F: FnMut(PageRequest) -> Fut,
    Fut: Future<Output = Result<Page<T>, E>>,
{
    let mut items = Vec::new();
    let mut cursor: Option<String> = None;

    for page_number in 1..=limit.max_pages {
        let page = fetch(PageRequest {
            cursor: cursor.take(),
            per_page: limit.per_page,
            sort,
        })
        .await?;
        UPSTREAM_PAGES_FETCHED.with_label_values(&[resource]).inc();

        items.extend(page.items);

        match page.next {
            Some(next) if !next.is_empty() => {
                if page_number == limit.max_pages {
                    debug!(
                        resource,
                        pages = page_number,
                        items = items.len(),
                        "Page limit reached, returning partial collection"
                    );
                }
                cursor = Some(next);
            }
            _ => break,
        }
    }

    Ok(items)
}

/// Run `f` over `items` with at most `chunk_size` futures in flight.
///
/// Chunks run one after another; the futures within a chunk run
/// concurrently. Results come back in input order.
pub async fn run_chunked<I, T, F, Fut>(items: I, chunk_size: usize, mut f: F) -> Vec<T>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = T>,
{
    let chunk_size = chunk_size.max(1);
    let mut results = Vec::new();
    let mut pending = Vec::with_capacity(chunk_size);

    for item in items {
        pending.push(f(item));
        if pending.len() == chunk_size {
            results.extend(join_all(pending.drain(..)).await);
        }
    }
    if !pending.is_empty() {
        results.extend(join_all(pending).await);
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Serves `total` numbered items in pages of `per_page`, using the item
    /// offset as cursor.
    fn numbered_page(req: &PageRequest, total: usize) -> Page<usize> {
        let start: usize = req.cursor.as_deref().map_or(0, |c| c.parse().unwrap());
        let end = (start + req.per_page as usize).min(total);
        let next = (end < total).then(|| end.to_string());
        Page::new((start..end).collect(), next)
    }

    #[tokio::test]
    async fn test_follows_cursor_until_exhausted() {
        let calls = AtomicUsize::new(0);
        let limit = PageLimit {
            max_pages: 10,
            per_page: 3,
        };

        let items: Vec<usize> = fetch_all_pages("test", limit, None, |req| {
            calls.fetch_add(1, Ordering::SeqCst);
            let page = numbered_page(&req, 7);
            async move { Ok::<_, ()>(page) }
        })
        .await
        .unwrap();

        assert_eq!(items, (0..7).collect::<Vec<_>>());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_endless_cursor_stops_at_page_cap() {
        let calls = AtomicUsize::new(0);
        let limit = PageLimit::pages(10);

        let items: Vec<u32> = fetch_all_pages("test", limit, None, |req| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(req.per_page, 100);
            async move {
                Ok::<_, ()>(Page::new(vec![0; 100], Some(format!("page-{}", n + 1))))
            }
        })
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 10);
        assert!(items.len() <= limit.max_items());
        assert_eq!(items.len(), 1000);
    }

    #[tokio::test]
    async fn test_empty_next_cursor_terminates() {
        let items: Vec<u8> = fetch_all_pages("test", PageLimit::pages(5), None, |_| async {
            Ok::<_, ()>(Page::new(vec![1, 2], Some(String::new())))
        })
        .await
        .unwrap();

        assert_eq!(items, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_error_propagates_and_discards_partial_result() {
        let calls = AtomicUsize::new(0);

        let result: Result<Vec<u8>, &str> =
            fetch_all_pages("test", PageLimit::pages(5), None, |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Ok(Page::new(vec![1], Some("next".to_string())))
                    } else {
                        Err("boom")
                    }
                }
            })
            .await;

        assert_eq!(result, Err("boom"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_sort_and_cursor_are_forwarded() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let recorder = seen.clone();

        let _: Vec<usize> = fetch_all_pages(
            "test",
            PageLimit {
                max_pages: 5,
                per_page: 2,
            },
            Some(FilmSort::Added),
            move |req| {
                recorder.lock().unwrap().push(req.clone());
                let page = numbered_page(&req, 4);
                async move { Ok::<_, ()>(page) }
            },
        )
        .await
        .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].cursor, None);
        assert_eq!(seen[1].cursor.as_deref(), Some("2"));
        assert!(seen.iter().all(|r| r.sort == Some(FilmSort::Added)));
    }

    #[tokio::test]
    async fn test_run_chunked_bounds_concurrency_and_keeps_order() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let results = run_chunked(0..12, 5, |n| {
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::task::yield_now().await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                n * 2
            }
        })
        .await;

        assert_eq!(results, (0..12).map(|n| n * 2).collect::<Vec<_>>());
        assert!(peak.load(Ordering::SeqCst) <= 5);
    }

    #[tokio::test]
    async fn test_run_chunked_empty_input() {
        let results: Vec<u8> = run_chunked(Vec::<u8>::new(), 3, |n| async move { n }).await;
        assert!(results.is_empty());
    }
}

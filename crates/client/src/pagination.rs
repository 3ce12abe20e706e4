//! Walking every page of a list endpoint

use crate::error::ClientError;
use apimart_core::{ListQuery, Page};
use futures::stream::{self, Stream, TryStreamExt};
use std::future::Future;

/// Stream every item of a paginated collection, fetching pages on demand.
///
/// Starts at `query.page` (or 1) and stops after a page that is empty or
/// reports no next page.
///
/// ```ignore
/// let all: Vec<ApiListing> = paginate(ListQuery::new(), |q| {
///     let apis = client.apis();
///     async move { apis.list(&q).await }
/// })
/// .try_collect()
/// .await?;
/// ```
pub fn paginate<T, F, Fut>(query: ListQuery, fetch: F) -> impl Stream<Item = Result<T, ClientError>>
where
    F: FnMut(ListQuery) -> Fut,
    Fut: Future<Output = Result<Page<T>, ClientError>>,
{
    let start = query.page.unwrap_or(1);
    stream::try_unfold(
        (Some(start), query, fetch),
        |(page, query, mut fetch)| async move {
            let Some(page) = page else {
                return Ok::<_, ClientError>(None);
            };
            let result = fetch(query.clone().page(page)).await?;
            let next = if result.is_empty() {
                None
            } else {
                result.pagination.next_page()
            };
            Ok(Some((result.items, (next, query, fetch))))
        },
    )
    .map_ok(|items| stream::iter(items.into_iter().map(Ok)))
    .try_flatten()
}

#[cfg(test)]
mod tests {
    use super::*;
    use apimart_core::Pagination;
    use futures::StreamExt;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn page(items: Vec<u32>, page: u32, total_pages: u32) -> Page<u32> {
        Page {
            pagination: Pagination {
                page,
                page_size: 2,
                total: 5,
                total_pages,
                has_next: page < total_pages,
                has_prev: page > 1,
            },
            items,
        }
    }

    #[tokio::test]
    async fn walks_all_pages_in_order() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let items: Vec<u32> = paginate(ListQuery::new().page_size(2), move |q| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move {
                Ok(match q.page {
                    Some(1) => page(vec![1, 2], 1, 3),
                    Some(2) => page(vec![3, 4], 2, 3),
                    _ => page(vec![5], 3, 3),
                })
            }
        })
        .try_collect()
        .await
        .unwrap();

        assert_eq!(items, vec![1, 2, 3, 4, 5]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_on_error() {
        let results: Vec<Result<u32, ClientError>> = paginate(ListQuery::new(), |q| async move {
            match q.page {
                Some(1) => Ok(page(vec![1], 1, 2)),
                _ => Err(ClientError::Timeout),
            }
        })
        .collect()
        .await;

        assert_eq!(results.len(), 2);
        assert!(matches!(results[0], Ok(1)));
        assert!(matches!(results[1], Err(ClientError::Timeout)));
    }

    #[tokio::test]
    async fn empty_page_ends_stream() {
        let items: Vec<u32> = paginate(ListQuery::new(), |_| async move {
            let mut empty = page(vec![], 1, 9);
            empty.pagination.has_next = true;
            Ok(empty)
        })
        .try_collect()
        .await
        .unwrap();
        assert!(items.is_empty());
    }
}

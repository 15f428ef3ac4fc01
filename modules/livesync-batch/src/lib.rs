//! Paged loading with an asynchronous per-item filter.
//!
//! Pages are fetched one at a time through a continuation token until enough
//! items pass the filter or the source runs dry.

use std::future::Future;

use anyhow::Result;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// One page of results plus the token that continues after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchPage<T, Tok> {
    pub items: Vec<T>,
    pub token: Tok,
    pub has_more: bool,
}

/// Keep the items for which `predicate` resolves to `true`, in order.
///
/// Predicates run concurrently; the first failure is returned.
pub async fn async_filter<T, P, Fut>(items: Vec<T>, predicate: P) -> Result<Vec<T>>
where
    P: Fn(&T) -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let verdicts = try_join_all(items.iter().map(&predicate)).await?;
    Ok(items
        .into_iter()
        .zip(verdicts)
        .filter_map(|(item, keep)| keep.then_some(item))
        .collect())
}

/// Load up to `limit` items that pass `filter_item`.
///
/// `load_batch(token, limit)` is called sequentially, each call continuing
/// from the token the previous page returned. Loading stops once `limit`
/// valid items are collected or a page reports `has_more == false`. When the
/// last page pushes the total past `limit`, the surplus is dropped and
/// `has_more` is forced to `true`. The returned token is the last page's.
pub async fn filtered_batch_load<T, Tok, L, LFut, P, PFut>(
    mut load_batch: L,
    filter_item: P,
    initial_token: Tok,
    limit: usize,
) -> Result<BatchPage<T, Tok>>
where
    L: FnMut(Tok, usize) -> LFut,
    LFut: Future<Output = Result<BatchPage<T, Tok>>>,
    P: Fn(&T) -> PFut,
    PFut: Future<Output = Result<bool>>,
{
    if limit == 0 {
        return Ok(BatchPage {
            items: Vec::new(),
            token: initial_token,
            has_more: true,
        });
    }

    let mut items: Vec<T> = Vec::with_capacity(limit);
    let mut token = initial_token;
    let mut pages = 0usize;

    loop {
        let page = load_batch(token, limit).await?;
        pages += 1;
        token = page.token;
        let has_more = page.has_more;
        let fetched = page.items.len();

        let mut valid = async_filter(page.items, &filter_item).await?;
        items.append(&mut valid);

        if items.len() >= limit {
            let has_more = has_more || items.len() > limit;
            items.truncate(limit);
            debug!(pages, kept = items.len(), has_more, "Filtered batch load filled");
            return Ok(BatchPage {
                items,
                token,
                has_more,
            });
        }

        if !has_more {
            debug!(pages, kept = items.len(), "Filtered batch load exhausted source");
            return Ok(BatchPage {
                items,
                token,
                has_more: false,
            });
        }

        if fetched == 0 {
            // An empty page that claims more would otherwise spin forever.
            warn!(pages, kept = items.len(), "Empty page reported more results, stopping");
            return Ok(BatchPage {
                items,
                token,
                has_more: true,
            });
        }
    }
}

/// First item that passes `filter_item`, fetching one item per page.
pub async fn find_first<T, Tok, L, LFut, P, PFut>(
    load_batch: L,
    filter_item: P,
    initial_token: Tok,
) -> Result<Option<T>>
where
    L: FnMut(Tok, usize) -> LFut,
    LFut: Future<Output = Result<BatchPage<T, Tok>>>,
    P: Fn(&T) -> PFut,
    PFut: Future<Output = Result<bool>>,
{
    let page = filtered_batch_load(load_batch, filter_item, initial_token, 1).await?;
    Ok(page.items.into_iter().next())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use futures::future;

    #[tokio::test]
    async fn async_filter_keeps_order() {
        let kept = async_filter(vec![5, 2, 8, 3, 6], |n: &i32| future::ready(Ok(n % 2 == 0)))
            .await
            .unwrap();
        assert_eq!(kept, vec![2, 8, 6]);
    }

    #[tokio::test]
    async fn async_filter_propagates_predicate_errors() {
        let err = async_filter(vec![1, 2, 3], |n: &i32| {
            future::ready(if *n == 2 { Err(anyhow!("bad item {n}")) } else { Ok(true) })
        })
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "bad item 2");
    }

    #[test]
    fn page_serializes_in_camel_case() {
        let page = BatchPage {
            items: vec![1],
            token: Some("m9".to_string()),
            has_more: true,
        };
        assert_eq!(
            serde_json::to_value(&page).unwrap(),
            serde_json::json!({"items": [1], "token": "m9", "hasMore": true})
        );
    }
}

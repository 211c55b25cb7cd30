use std::future::Future;

use futures::{StreamExt, stream};
use tracing::warn;

use crate::error::Result;

/// Runs `f` over `items` with at most `limit` in flight and flattens the
/// successes in completion order. Failed items are logged and dropped.
pub async fn catching_flat_map<I, T, F, Fut>(items: I, limit: usize, f: F) -> Vec<T>
where
    I: IntoIterator,
    F: Fn(I::Item) -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
{
    let results: Vec<Result<Vec<T>>> = stream::iter(items)
        .map(f)
        .buffer_unordered(limit.max(1))
        .collect()
        .await;

    results
        .into_iter()
        .filter_map(|result| match result {
            Ok(values) => Some(values),
            Err(err) => {
                warn!(error = %err, "skipping failed item");
                None
            }
        })
        .flatten()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;

    #[tokio::test]
    async fn keeps_successes_and_drops_failures() {
        let mut out = catching_flat_map(1..=5, 2, |n| async move {
            if n % 2 == 0 {
                Err(SourceError::parse(format!("item {n}")))
            } else {
                Ok(vec![n, n * 10])
            }
        })
        .await;
        out.sort();
        assert_eq!(out, vec![1, 3, 5, 10, 30, 50]);
    }

    #[tokio::test]
    async fn zero_limit_still_runs() {
        let out = catching_flat_map(vec!["a"], 0, |s| async move { Ok(vec![s]) }).await;
        assert_eq!(out, vec!["a"]);
    }
}

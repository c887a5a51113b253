//! Bounded, order-preserving fan-out.
//!
//! `run_bounded` runs one worker future per item with at most
//! `max_concurrency` in flight, and returns one result slot per item in the
//! original item order. A failing worker fills its own slot with `None`
//! without cancelling or failing the rest: a search result set should not
//! hard-fail because one blob could not be fetched. Callers inspect slots
//! for absence.

use futures_util::stream::{self, StreamExt};
use std::future::Future;

pub async fn run_bounded<T, R, F, Fut>(
    max_concurrency: usize,
    items: Vec<T>,
    worker: F,
) -> Vec<Option<R>>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = anyhow::Result<R>>,
{
    // `buffered` polls at most N futures at once and yields completions in
    // stream order, which is exactly the slot alignment we need.
    let results: Vec<anyhow::Result<R>> = stream::iter(items)
        .map(|item| worker(item))
        .buffered(max_concurrency.max(1))
        .collect()
        .await;

    results
        .into_iter()
        .map(|result| match result {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("bounded worker failed: {:#}", e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn results_keep_input_order() {
        let items = vec![30u64, 10, 20, 5];
        let results = run_bounded(2, items.clone(), |delay| async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(delay)
        })
        .await;

        let resolved: Vec<u64> = results.into_iter().flatten().collect();
        assert_eq!(resolved, items);
    }

    #[tokio::test]
    async fn one_failure_fills_its_slot_only() {
        let results = run_bounded(3, vec![1u32, 2, 3, 4], |n| async move {
            if n == 3 {
                anyhow::bail!("item {} exploded", n);
            }
            Ok(n * 10)
        })
        .await;

        assert_eq!(results, vec![Some(10), Some(20), None, Some(40)]);
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_limit() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let results = run_bounded(2, (0..8).collect::<Vec<u32>>(), |n| {
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(n)
            }
        })
        .await;

        assert_eq!(results.len(), 8);
        assert!(results.iter().all(Option::is_some));
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn zero_concurrency_is_clamped_to_one() {
        let results = run_bounded(0, vec![1u32, 2], |n| async move { Ok(n) }).await;
        assert_eq!(results, vec![Some(1), Some(2)]);
    }

    #[tokio::test]
    async fn empty_input_completes_immediately() {
        let results: Vec<Option<u32>> =
            run_bounded(4, Vec::<u32>::new(), |n| async move { Ok(n) }).await;
        assert!(results.is_empty());
    }
}

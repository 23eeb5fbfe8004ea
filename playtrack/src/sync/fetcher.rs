use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::Semaphore;

use super::retry::{Attempted, Classify, Outcome, RetryPolicy, retry_call};

/// Batch shape for one upstream endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPlan {
    pub batch_size: usize,
    pub concurrency: usize,
    pub batch_pause: Duration,
}

impl FetchPlan {
    /// Storefront detail lookups are cheap; use a wide pool.
    pub fn details() -> Self {
        Self {
            batch_size: 50,
            concurrency: 10,
            batch_pause: Duration::from_secs(1),
        }
    }

    /// The achievements endpoint throttles aggressively.
    pub fn progress() -> Self {
        Self {
            batch_size: 20,
            concurrency: 4,
            batch_pause: Duration::from_secs(2),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }
}

#[derive(Debug, Clone)]
pub struct ConcurrentFetcher {
    plan: FetchPlan,
    policy: RetryPolicy,
}

impl ConcurrentFetcher {
    pub fn new(plan: FetchPlan, policy: RetryPolicy) -> Self {
        Self { plan, policy }
    }

    pub fn plan(&self) -> FetchPlan {
        self.plan
    }

    /// Fetches one value per id. Batches run strictly one after another with
    /// `batch_pause` between them; inside a batch at most `concurrency`
    /// requests are in flight. Ids whose fetch ends in a terminal error or
    /// runs out of attempts map to `T::default()`.
    pub async fn fetch_all<T, E, F, Fut>(
        &self,
        label: &str,
        ids: &[u32],
        fetch: F,
    ) -> HashMap<u32, T>
    where
        T: Default,
        E: Classify + Display,
        F: Fn(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let batch_size = self.plan.batch_size.max(1);
        let batch_count = ids.len().div_ceil(batch_size);
        let mut results = HashMap::with_capacity(ids.len());

        for (index, batch) in ids.chunks(batch_size).enumerate() {
            if index > 0 && !self.plan.batch_pause.is_zero() {
                tokio::time::sleep(self.plan.batch_pause).await;
            }

            let limit = Semaphore::new(self.plan.concurrency.max(1));
            let tasks = batch.iter().map(|&id| {
                let limit = &limit;
                let fetch = &fetch;
                async move {
                    let _permit = limit.acquire().await.ok();
                    let attempted =
                        retry_call(&self.policy, format!("{label} {id}"), || fetch(id)).await;
                    (id, settle(label, id, attempted))
                }
            });
            results.extend(join_all(tasks).await);

            tracing::info!(
                "{label}: batch {}/{batch_count} done ({} items)",
                index + 1,
                batch.len()
            );
        }

        results
    }
}

fn settle<T: Default, E: Display>(label: &str, id: u32, attempted: Attempted<T, E>) -> T {
    match attempted.outcome {
        Outcome::Success(value) => value,
        Outcome::Terminal(err) => {
            tracing::debug!("{label} {id}: {err}; treating as empty");
            T::default()
        }
        Outcome::Exhausted(err) => {
            tracing::warn!(
                "{label} {id}: giving up after {} attempts: {err}",
                attempted.attempts
            );
            T::default()
        }
    }
}

// Best-effort parallel cache warming.

use std::time::Duration;

use futures::future::join_all;
use thiserror::Error;
use tracing::{debug, warn};

use crate::net::{bounded_get, Fetch, RequestError};

/// Informational only: logged, never returned as an error.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("{failed} of {total} prefetch requests failed")]
pub struct BatchPartialFailure {
    pub failed: usize,
    pub total: usize,
}

#[derive(Debug)]
pub struct PrefetchOutcome {
    pub path: String,
    pub result: Result<u16, RequestError>,
}

/// Settled results of a prefetch batch, in submission order.
#[derive(Debug, Default)]
pub struct PrefetchReport {
    pub outcomes: Vec<PrefetchOutcome>,
}

impl PrefetchReport {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.succeeded()
    }

    pub fn partial_failure(&self) -> Option<BatchPartialFailure> {
        match self.failed() {
            0 => None,
            failed => Some(BatchPartialFailure { failed, total: self.total() }),
        }
    }
}

/// Fire every path concurrently and wait for all of them to settle.
/// Individual failures are recorded in the report, never propagated.
pub async fn prefetch_batch<S: AsRef<str>>(
    fetcher: &dyn Fetch,
    paths: &[S],
    per_request_timeout: Duration,
) -> PrefetchReport {
    let calls = paths.iter().map(|p| async move {
        let path = p.as_ref();
        let result = bounded_get(fetcher, path, per_request_timeout)
            .await
            .map(|res| res.status);
        PrefetchOutcome { path: path.to_string(), result }
    });
    let outcomes = join_all(calls).await;

    for o in &outcomes {
        let outcome = if o.result.is_ok() { "ok" } else { "failed" };
        metrics::counter!("ipl_sync_prefetch_total", "outcome" => outcome).increment(1);
    }

    let report = PrefetchReport { outcomes };
    match report.partial_failure() {
        Some(partial) => warn!(%partial, "prefetch batch settled with failures"),
        None => debug!(total = report.total(), "prefetch batch settled"),
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::mock::{MockFetcher, Scripted};
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_mixed_batch_settles() {
        let f = MockFetcher::new()
            .route("/api/v1/team", Scripted::Ok("[]".into()))
            .route("/api/v1/players", Scripted::Status(500))
            .route("/api/v1/iconic-match", Scripted::Refused);
        let report = prefetch_batch(
            &f,
            &["/api/v1/team", "/api/v1/players", "/api/v1/iconic-match"],
            Duration::from_secs(15),
        )
        .await;

        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 2);
        assert_eq!(
            report.partial_failure(),
            Some(BatchPartialFailure { failed: 2, total: 3 })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_run_in_parallel() {
        let f = MockFetcher::new()
            .route("/slow-a", Scripted::Hang)
            .route("/slow-b", Scripted::Hang)
            .route("/fast", Scripted::Ok(String::new()));
        let started = tokio::time::Instant::now();
        let report = prefetch_batch(&f, &["/slow-a", "/slow-b", "/fast"], Duration::from_secs(15)).await;

        // Two hung calls time out together, not one after the other
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(15));
        assert!(elapsed < Duration::from_secs(16));
        assert_eq!(report.failed(), 2);
        assert!(report.outcomes.iter().filter(|o| o.result.is_err()).all(|o| {
            matches!(&o.result, Err(e) if e.is_timeout())
        }));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let f = MockFetcher::new();
        let report = prefetch_batch::<&str>(&f, &[], Duration::from_secs(1)).await;
        assert_eq!(report.total(), 0);
        assert!(report.partial_failure().is_none());
    }

    proptest! {
        #[test]
        fn prop_k_failures_of_n(fails in proptest::collection::vec(any::<bool>(), 0..12)) {
            let mut f = MockFetcher::new();
            let mut paths = Vec::new();
            for (i, fail) in fails.iter().enumerate() {
                let path = format!("/r/{i}");
                let outcome = if *fail { Scripted::Status(502) } else { Scripted::Ok("{}".into()) };
                f = f.route(&path, outcome);
                paths.push(path);
            }

            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap();
            let report = rt.block_on(prefetch_batch(&f, &paths, Duration::from_secs(1)));

            let k = fails.iter().filter(|x| **x).count();
            prop_assert_eq!(report.total(), fails.len());
            prop_assert_eq!(report.failed(), k);
            prop_assert_eq!(report.succeeded(), fails.len() - k);
            prop_assert_eq!(report.partial_failure().is_some(), k > 0);
        }
    }
}

// Deadline-bounded single call.
//
// The in-flight future is owned by the timeout; when the deadline fires it is
// dropped right there, which releases its socket and timers.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use super::{Fetch, FetchResponse, RequestError, TransportError};

/// Run `fut` to completion or fail with [`RequestError::Timeout`] once
/// `deadline` elapses. The future is cancelled (dropped) on timeout.
pub async fn with_deadline<F, T>(deadline: Duration, fut: F) -> Result<T, RequestError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result.map_err(RequestError::from),
        Err(_) => Err(RequestError::Timeout { after: deadline }),
    }
}

/// Issue exactly one GET for `path` bounded by `deadline`. No retry.
pub async fn bounded_get(
    fetcher: &dyn Fetch,
    path: &str,
    deadline: Duration,
) -> Result<FetchResponse, RequestError> {
    let result = with_deadline(deadline, fetcher.get(path)).await;
    if let Err(e) = &result {
        debug!(url = %fetcher.url_for(path), error = %e, "bounded request failed");
    }
    result
}

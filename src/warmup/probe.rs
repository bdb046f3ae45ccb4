// Wake probe: one cheap call whose side effect is waking a suspended backend.

use std::time::Duration;

use tracing::{debug, info};

use crate::net::{bounded_get, Fetch};

/// Outcome of a wake probe. Callers proceed either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    NotReady,
}

impl Readiness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Readiness::Ready => "ready",
            Readiness::NotReady => "not_ready",
        }
    }
}

pub async fn wake_probe(fetcher: &dyn Fetch, path: &str, timeout: Duration) -> Readiness {
    let readiness = match bounded_get(fetcher, path, timeout).await {
        Ok(res) => {
            debug!(status = res.status, "wake probe answered");
            Readiness::Ready
        }
        Err(e) => {
            // Cold backends routinely time out here
            debug!(error = %e, "wake probe did not succeed");
            Readiness::NotReady
        }
    };

    metrics::counter!("ipl_sync_probe_total", "result" => readiness.as_str()).increment(1);
    info!(url = %fetcher.url_for(path), readiness = readiness.as_str(), "wake probe settled");
    readiness
}

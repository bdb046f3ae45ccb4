// One-shot keep-warm ping with a reportable result, meant to be run from cron.

use std::time::Duration;

use serde::Serialize;
use tracing::info;

use crate::net::http::truncate;
use crate::net::{bounded_get, Fetch, RequestError, TransportError};

const REPORT_BODY_CHARS: usize = 300;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PingReport {
    pub ok: bool,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub async fn keep_warm_ping(fetcher: &dyn Fetch, path: &str, timeout: Duration) -> PingReport {
    let url = fetcher.url_for(path);
    let report = match bounded_get(fetcher, path, timeout).await {
        Ok(res) => PingReport {
            ok: true,
            url,
            status: Some(res.status),
            body: Some(truncate(&res.body, REPORT_BODY_CHARS)),
            error: None,
        },
        Err(RequestError::Transport(TransportError::Status { status, body })) => PingReport {
            ok: false,
            url,
            status: Some(status),
            body: Some(truncate(&body, REPORT_BODY_CHARS)),
            error: None,
        },
        Err(e) => PingReport {
            ok: false,
            url,
            status: None,
            body: None,
            error: Some(e.to_string()),
        },
    };
    info!(ok = report.ok, status = ?report.status, "keep-warm ping");
    report
}

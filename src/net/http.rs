// reqwest-backed Fetch. One client per process, connection pool shared.

use reqwest::header::{CACHE_CONTROL, USER_AGENT};
use reqwest::{Client, Url};

use super::{join_under, Fetch, FetchResponse, TransportError};

const WARMER_AGENT: &str = concat!("ipl-sync/", env!("CARGO_PKG_VERSION"));

// Error bodies are only kept for reports
const MAX_ERROR_BODY: usize = 300;

pub struct ReqwestFetcher {
    client: Client,
    origin: Url,
}

impl ReqwestFetcher {
    pub fn new(origin: &str) -> Result<Self, TransportError> {
        let origin = Url::parse(origin).map_err(|e| TransportError::InvalidUrl(e.to_string()))?;
        Ok(Self { client: Client::new(), origin })
    }

    pub fn with_client(client: Client, origin: Url) -> Self {
        Self { client, origin }
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    fn join(&self, path: &str) -> Result<Url, TransportError> {
        join_under(&self.origin, path).map_err(|e| TransportError::InvalidUrl(format!("{path}: {e}")))
    }
}

#[async_trait::async_trait]
impl Fetch for ReqwestFetcher {
    async fn get(&self, path: &str) -> Result<FetchResponse, TransportError> {
        let url = self.join(path)?;
        let res = self
            .client
            .get(url)
            .header(CACHE_CONTROL, "no-cache")
            .header(USER_AGENT, WARMER_AGENT)
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await?;
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: truncate(&body, MAX_ERROR_BODY),
            });
        }

        Ok(FetchResponse { status: status.as_u16(), body })
    }

    fn url_for(&self, path: &str) -> String {
        self.join(path)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| format!("{}{}", self.origin, path))
    }
}

pub(crate) fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

// Outbound HTTP plumbing shared by warmup and the realtime fallback
pub mod error;   // RequestError / TransportError taxonomy
pub mod http;    // reqwest-backed Fetch implementation
pub mod request; // deadline-bounded single call

#[cfg(test)]
pub(crate) mod mock;

pub use error::{RequestError, TransportError};
pub use http::ReqwestFetcher;
pub use request::{bounded_get, with_deadline};

/// Body kept from a successful call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: String,
}

/// One outbound GET against a path relative to the configured origin.
///
/// Implementations perform exactly one call and never retry. Dropping the
/// returned future must release the underlying connection.
#[async_trait::async_trait]
pub trait Fetch: Send + Sync {
    async fn get(&self, path: &str) -> Result<FetchResponse, TransportError>;

    /// Absolute URL for `path`, used in logs and reports.
    fn url_for(&self, path: &str) -> String;
}

/// Resolve `path` under `base`, keeping any path prefix the base carries.
/// `https://host/backend` + `/api/ping` is `https://host/backend/api/ping`.
pub fn join_under(base: &reqwest::Url, path: &str) -> Result<reqwest::Url, String> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let dir = format!("{}/", base.path());
        base.set_path(&dir);
    }
    base.join(path.trim_start_matches('/')).map_err(|e| e.to_string())
}

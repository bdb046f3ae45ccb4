// Scripted Fetch for unit tests

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::time::Instant;

use super::{Fetch, FetchResponse, TransportError};

#[derive(Debug, Clone)]
pub enum Scripted {
    Ok(String),
    Status(u16),
    Refused,
    Hang,
}

#[derive(Default)]
pub struct MockFetcher {
    routes: Mutex<HashMap<String, Scripted>>,
    calls: Mutex<Vec<(String, Instant)>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, path: &str, outcome: Scripted) -> Self {
        self.routes.lock().insert(path.to_string(), outcome);
        self
    }

    pub fn calls(&self) -> Vec<(String, Instant)> {
        self.calls.lock().clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(p, _)| p.clone()).collect()
    }
}

#[async_trait::async_trait]
impl Fetch for MockFetcher {
    async fn get(&self, path: &str) -> Result<FetchResponse, TransportError> {
        self.calls.lock().push((path.to_string(), Instant::now()));
        let outcome = self
            .routes
            .lock()
            .get(path)
            .cloned()
            .unwrap_or(Scripted::Status(404));

        match outcome {
            Scripted::Ok(body) => Ok(FetchResponse { status: 200, body }),
            Scripted::Status(status) => Err(TransportError::Status {
                status,
                body: String::new(),
            }),
            Scripted::Refused => Err(TransportError::Connection("connection refused".into())),
            Scripted::Hang => {
                std::future::pending::<()>().await;
                Err(TransportError::Closed)
            }
        }
    }

    fn url_for(&self, path: &str) -> String {
        format!("http://mock{path}")
    }
}

// Latest-value payload of the live score feed.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::net::{bounded_get, Fetch};

/// Most recent payload received on a channel. Each message replaces it
/// wholesale; nothing is merged with what came before.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreSnapshot {
    payload: Value,
}

impl ScoreSnapshot {
    pub fn new(payload: Value) -> Self {
        Self { payload }
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text).map(Self::new)
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn into_payload(self) -> Value {
        self.payload
    }

    /// Lenient typed view for display. Unknown fields are ignored and
    /// missing ones stay `None`.
    pub fn live_score(&self) -> Option<LiveScore> {
        LiveScore::deserialize(&self.payload).ok()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LiveScore {
    pub match_desc: Option<String>,
    pub status: Option<String>,
    pub state_title: Option<String>,
    pub team1_name: Option<String>,
    pub team1_runs: Option<u32>,
    pub team1_wickets: Option<u32>,
    pub team1_overs: Option<f64>,
    pub team2_name: Option<String>,
    pub team2_runs: Option<u32>,
    pub team2_wickets: Option<u32>,
    pub team2_overs: Option<f64>,
}

impl LiveScore {
    pub fn is_empty(&self) -> bool {
        *self == LiveScore::default()
    }

    pub fn summary(&self) -> String {
        let side = |name: &Option<String>, runs: Option<u32>, wkts: Option<u32>, overs: Option<f64>| {
            let name = name.as_deref().unwrap_or("?");
            match (runs, wkts, overs) {
                (Some(r), Some(w), Some(o)) => format!("{name} {r}/{w} ({o})"),
                (Some(r), Some(w), None) => format!("{name} {r}/{w}"),
                (Some(r), None, _) => format!("{name} {r}"),
                _ => name.to_string(),
            }
        };
        let mut s = format!(
            "{} vs {}",
            side(&self.team1_name, self.team1_runs, self.team1_wickets, self.team1_overs),
            side(&self.team2_name, self.team2_runs, self.team2_wickets, self.team2_overs),
        );
        if let Some(status) = self.status.as_deref().filter(|s| !s.is_empty()) {
            s.push_str(" - ");
            s.push_str(status);
        }
        s
    }
}

/// Fetch a plain JSON resource to use as a last-known value while no live
/// connection exists. Any failure yields `None`.
pub async fn fetch_snapshot(fetcher: &dyn Fetch, path: &str, timeout: Duration) -> Option<ScoreSnapshot> {
    let res = bounded_get(fetcher, path, timeout).await.ok()?;
    match ScoreSnapshot::from_json(&res.body) {
        Ok(snap) => Some(snap),
        Err(e) => {
            debug!(error = %e, "fallback snapshot is not json");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::mock::{MockFetcher, Scripted};
    use serde_json::json;

    #[test]
    fn test_live_score_view() {
        let snap = ScoreSnapshot::new(json!({
            "matchDesc": "Final",
            "status": "In progress",
            "team1Name": "CSK",
            "team1Runs": 120,
            "team1Wickets": 3,
            "team1Overs": 14.2,
            "team2Name": "MI",
            "extra": [1, 2, 3]
        }));
        let score = snap.live_score().unwrap();
        assert_eq!(score.team1_runs, Some(120));
        assert_eq!(score.team2_runs, None);
        assert_eq!(score.summary(), "CSK 120/3 (14.2) vs MI - In progress");
    }

    #[test]
    fn test_empty_payload_is_empty_score() {
        let snap = ScoreSnapshot::new(json!({}));
        assert!(snap.live_score().unwrap().is_empty());
        assert!(ScoreSnapshot::new(json!("text")).live_score().is_none());
    }

    #[tokio::test]
    async fn test_fetch_snapshot() {
        let f = MockFetcher::new()
            .route("/api/v1/iconic-match", Scripted::Ok(r#"{"team1Runs":90}"#.into()))
            .route("/html", Scripted::Ok("<html>".into()));
        let snap = fetch_snapshot(&f, "/api/v1/iconic-match", Duration::from_secs(1)).await;
        assert_eq!(snap.unwrap().payload(), &json!({"team1Runs": 90}));
        assert!(fetch_snapshot(&f, "/html", Duration::from_secs(1)).await.is_none());
        assert!(fetch_snapshot(&f, "/missing", Duration::from_secs(1)).await.is_none());
    }
}

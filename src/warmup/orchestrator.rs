//! Warmup sequencing.
//!
//! `Idle → Scheduled → Probing → Settling → Prefetching → Done`, run at most
//! once per [`WarmupState`]. No stage can fail the sequence; probe and prefetch
//! errors are absorbed and the machine always reaches `Done`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info};

use super::prefetch::{prefetch_batch, PrefetchReport};
use super::probe::{wake_probe, Readiness};
use super::state::WarmupState;
use crate::config::WarmupSettings;
use crate::net::Fetch;
use crate::sched::{IdleScheduler, ScheduledTask};

pub const WARMUP_TASK_KEY: &str = "warmup";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WarmupStage {
    Idle,
    Scheduled,
    Probing,
    Settling,
    Prefetching,
    Done,
}

/// Timing and targets for one warmup run.
#[derive(Debug, Clone)]
pub struct WarmupPlan {
    pub probe_path: String,
    pub probe_timeout: Duration,
    pub settle_delay: Duration,
    pub prefetch_paths: Vec<String>,
    pub prefetch_timeout: Duration,
    pub max_deferral: Duration,
}

impl Default for WarmupPlan {
    fn default() -> Self {
        Self::from(&WarmupSettings::default())
    }
}

impl From<&WarmupSettings> for WarmupPlan {
    fn from(s: &WarmupSettings) -> Self {
        Self {
            probe_path: s.probe_path.clone(),
            probe_timeout: s.probe_timeout(),
            settle_delay: s.settle_delay(),
            prefetch_paths: s.prefetch_paths.clone(),
            prefetch_timeout: s.prefetch_timeout(),
            max_deferral: s.max_deferral(),
        }
    }
}

#[derive(Debug)]
pub struct WarmupReport {
    pub readiness: Readiness,
    pub prefetch: PrefetchReport,
}

pub struct WarmupOrchestrator {
    fetcher: Arc<dyn Fetch>,
    plan: WarmupPlan,
    state: Arc<WarmupState>,
    stage: Arc<watch::Sender<WarmupStage>>,
}

impl WarmupOrchestrator {
    /// Orchestrator bound to the process-wide run-once guard.
    pub fn new(fetcher: Arc<dyn Fetch>, plan: WarmupPlan) -> Self {
        Self::with_state(fetcher, plan, WarmupState::global())
    }

    pub fn with_state(fetcher: Arc<dyn Fetch>, plan: WarmupPlan, state: Arc<WarmupState>) -> Self {
        let (stage, _) = watch::channel(WarmupStage::Idle);
        Self { fetcher, plan, state, stage: Arc::new(stage) }
    }

    pub fn stage(&self) -> WarmupStage {
        *self.stage.borrow()
    }

    pub fn watch_stage(&self) -> watch::Receiver<WarmupStage> {
        self.stage.subscribe()
    }

    /// Submit the warmup sequence to `scheduler`. Returns `None` when warmup
    /// already started under this orchestrator's guard, or when the scheduler
    /// already holds a pending warmup; the stage then ends at `Done`.
    /// Cancelling the returned task also moves the stage to `Done`.
    pub fn start(&self, scheduler: &IdleScheduler) -> Option<ScheduledTask<WarmupReport>> {
        if !self.state.try_start() {
            debug!("warmup already started, ignoring");
            return None;
        }

        self.stage.send_replace(WarmupStage::Scheduled);
        let fetcher = self.fetcher.clone();
        let plan = self.plan.clone();
        let stage = self.stage.clone();
        let finish = FinishOnDrop(self.stage.clone());

        let task = scheduler.schedule(WARMUP_TASK_KEY, self.plan.max_deferral, move |dispatch| async move {
            let _finish = finish;
            debug!(?dispatch, "warmup dispatched");
            run_sequence(fetcher.as_ref(), &plan, &stage).await
        });
        if task.is_none() {
            debug!("warmup task already queued on this scheduler");
        }
        task
    }
}

// Ends the stage machine if the run is dropped before completing
struct FinishOnDrop(Arc<watch::Sender<WarmupStage>>);

impl Drop for FinishOnDrop {
    fn drop(&mut self) {
        self.0.send_if_modified(|stage| {
            if *stage == WarmupStage::Done {
                return false;
            }
            *stage = WarmupStage::Done;
            true
        });
    }
}

async fn run_sequence(
    fetcher: &dyn Fetch,
    plan: &WarmupPlan,
    stage: &watch::Sender<WarmupStage>,
) -> WarmupReport {
    metrics::counter!("ipl_sync_warmup_runs_total").increment(1);

    stage.send_replace(WarmupStage::Probing);
    let readiness = wake_probe(fetcher, &plan.probe_path, plan.probe_timeout).await;

    // Grace period for a backend that just woke; not a readiness check
    stage.send_replace(WarmupStage::Settling);
    tokio::time::sleep(plan.settle_delay).await;

    stage.send_replace(WarmupStage::Prefetching);
    let prefetch = prefetch_batch(fetcher, &plan.prefetch_paths, plan.prefetch_timeout).await;

    stage.send_replace(WarmupStage::Done);
    info!(
        readiness = readiness.as_str(),
        prefetched = prefetch.succeeded(),
        failed = prefetch.failed(),
        "warmup done"
    );
    WarmupReport { readiness, prefetch }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::mock::{MockFetcher, Scripted};
    use tokio::time::Instant;

    fn plan() -> WarmupPlan {
        WarmupPlan {
            probe_path: "/api/ping".into(),
            probe_timeout: Duration::from_secs(10),
            settle_delay: Duration::from_millis(300),
            prefetch_paths: vec![
                "/api/v1/team".into(),
                "/api/v1/players".into(),
                "/api/v1/iconic-match".into(),
            ],
            prefetch_timeout: Duration::from_secs(15),
            max_deferral: Duration::from_secs(2),
        }
    }

    fn healthy() -> MockFetcher {
        MockFetcher::new()
            .route("/api/ping", Scripted::Ok("{}".into()))
            .route("/api/v1/team", Scripted::Ok("[]".into()))
            .route("/api/v1/players", Scripted::Ok("[]".into()))
            .route("/api/v1/iconic-match", Scripted::Ok("{}".into()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_to_end_sequence() {
        let fetcher = Arc::new(healthy());
        let orch = WarmupOrchestrator::with_state(fetcher.clone(), plan(), Arc::new(WarmupState::new()));
        let (sched, signal) = IdleScheduler::new();

        let task = orch.start(&sched).unwrap();
        assert_eq!(orch.stage(), WarmupStage::Scheduled);
        signal.mark_idle();

        let report = task.wait().await.unwrap();
        assert_eq!(orch.stage(), WarmupStage::Done);
        assert_eq!(report.readiness, Readiness::Ready);
        assert_eq!(report.prefetch.succeeded(), 3);

        let calls = fetcher.calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[0].0, "/api/ping");
        let probe_at = calls[0].1;
        for (path, at) in &calls[1..] {
            assert!(path.starts_with("/api/v1/"));
            assert!(*at - probe_at >= Duration::from_millis(300));
            // all three issued together
            assert_eq!(*at, calls[1].1);
        }

        // nothing more for the rest of the process
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(fetcher.calls().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_is_noop() {
        let fetcher = Arc::new(healthy());
        let state = Arc::new(WarmupState::new());
        let orch = WarmupOrchestrator::with_state(fetcher.clone(), plan(), state.clone());
        let again = WarmupOrchestrator::with_state(fetcher.clone(), plan(), state);
        let (sched, signal) = IdleScheduler::new();

        let first = orch.start(&sched);
        assert!(orch.start(&sched).is_none());
        assert!(again.start(&sched).is_none());
        assert_eq!(again.stage(), WarmupStage::Idle);

        signal.mark_idle();
        first.unwrap().wait().await.unwrap();
        assert_eq!(fetcher.paths().iter().filter(|p| *p == "/api/ping").count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_collision_ends_at_done() {
        let fetcher = Arc::new(healthy());
        let orch = WarmupOrchestrator::with_state(fetcher.clone(), plan(), Arc::new(WarmupState::new()));
        let other = WarmupOrchestrator::with_state(fetcher.clone(), plan(), Arc::new(WarmupState::new()));
        let (sched, signal) = IdleScheduler::new();

        let first = orch.start(&sched).unwrap();
        // separate guard, same pending key
        assert!(other.start(&sched).is_none());
        assert_eq!(other.stage(), WarmupStage::Done);

        signal.mark_idle();
        first.wait().await.unwrap();
        assert_eq!(fetcher.paths().iter().filter(|p| *p == "/api/ping").count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_run_ends_at_done() {
        let fetcher = Arc::new(healthy());
        let orch = WarmupOrchestrator::with_state(fetcher.clone(), plan(), Arc::new(WarmupState::new()));
        let (sched, _signal) = IdleScheduler::new();

        let task = orch.start(&sched).unwrap();
        assert_eq!(orch.stage(), WarmupStage::Scheduled);
        task.cancel();
        assert!(task.wait().await.is_none());

        orch.watch_stage()
            .wait_for(|s| *s == WarmupStage::Done)
            .await
            .unwrap();
        assert!(fetcher.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_still_reach_done() {
        let fetcher = Arc::new(
            MockFetcher::new()
                .route("/api/ping", Scripted::Hang)
                .route("/api/v1/team", Scripted::Status(502))
                .route("/api/v1/players", Scripted::Refused)
                .route("/api/v1/iconic-match", Scripted::Hang),
        );
        let orch = WarmupOrchestrator::with_state(fetcher.clone(), plan(), Arc::new(WarmupState::new()));
        let (sched, _signal) = IdleScheduler::new();
        let started = Instant::now();

        let report = orch.start(&sched).unwrap().wait().await.unwrap();

        assert_eq!(orch.stage(), WarmupStage::Done);
        assert_eq!(report.readiness, Readiness::NotReady);
        assert_eq!(report.prefetch.failed(), 3);
        // deferral + probe timeout + settle + prefetch timeout
        assert!(started.elapsed() >= Duration::from_millis(2_000 + 10_000 + 300 + 15_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stage_watch_sees_ordered_transitions() {
        let fetcher = Arc::new(healthy());
        let orch = WarmupOrchestrator::with_state(fetcher, plan(), Arc::new(WarmupState::new()));
        let mut rx = orch.watch_stage();
        let (sched, signal) = IdleScheduler::new();

        let task = orch.start(&sched).unwrap();
        signal.mark_idle();

        let mut seen = vec![*rx.borrow_and_update()];
        while rx.changed().await.is_ok() {
            let s = *rx.borrow_and_update();
            seen.push(s);
            if s == WarmupStage::Done {
                break;
            }
        }
        task.wait().await;

        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(seen.last(), Some(&WarmupStage::Done));
    }
}

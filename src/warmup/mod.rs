//! Backend warmup: wake a possibly suspended backend, then warm its hot
//! endpoints, once per process.

pub mod keepwarm;     // one-shot cron style ping report
pub mod orchestrator; // probe -> settle -> prefetch state machine
pub mod prefetch;     // best-effort parallel batch
pub mod probe;        // readiness / wake call
pub mod state;        // run-once guard

use std::sync::{Arc, OnceLock};

use tracing::warn;

pub use keepwarm::{keep_warm_ping, PingReport};
pub use orchestrator::{WarmupOrchestrator, WarmupPlan, WarmupReport, WarmupStage};
pub use prefetch::{prefetch_batch, BatchPartialFailure, PrefetchReport};
pub use probe::{wake_probe, Readiness};
pub use state::WarmupState;

use crate::config::SyncConfig;
use crate::net::ReqwestFetcher;
use crate::sched::{IdleScheduler, ScheduledTask};

/// Fire-and-forget warmup using configuration from the environment.
///
/// Safe to call any number of times; only the first call in the process does
/// anything. Must be called from within a tokio runtime.
pub fn start_warmup() {
    if tokio::runtime::Handle::try_current().is_err() {
        warn!("start_warmup called outside a tokio runtime, skipping");
        return;
    }
    if WarmupState::global().started() {
        return;
    }

    let config = SyncConfig::load(None).unwrap_or_else(|e| {
        warn!(error = %e, "falling back to default sync config");
        SyncConfig::default()
    });

    static SCHEDULER: OnceLock<IdleScheduler> = OnceLock::new();
    let scheduler = SCHEDULER.get_or_init(IdleScheduler::without_idle_detection);
    // Dropping the handle detaches the task
    let _ = start_warmup_with(&config, scheduler);
}

/// Start warmup for `config` on `scheduler`, under the process-wide guard.
pub fn start_warmup_with(
    config: &SyncConfig,
    scheduler: &IdleScheduler,
) -> Option<ScheduledTask<WarmupReport>> {
    let fetcher = match ReqwestFetcher::new(config.base_origin()) {
        Ok(f) => f,
        Err(e) => {
            warn!(error = %e, "cannot build warmup client");
            return None;
        }
    };
    let orchestrator = WarmupOrchestrator::new(Arc::new(fetcher), WarmupPlan::from(&config.warmup));
    orchestrator.start(scheduler)
}

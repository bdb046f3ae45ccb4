use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use ipl_sync::config::SyncConfig;
use ipl_sync::net::ReqwestFetcher;
use ipl_sync::realtime::{self, fetch_snapshot, ChannelConfig, ScoreSnapshot, StompTransport};
use ipl_sync::sched::IdleScheduler;
use ipl_sync::telemetry;
use ipl_sync::warmup::{keep_warm_ping, start_warmup_with};

#[derive(Parser)]
#[command(name = "ipl-sync", version, about = "Backend warmup and live score feed for the IPL dashboard")]
struct Cli {
    /// Optional config file (toml, json, yaml...)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Port for the prometheus exporter (metrics-exporter feature only)
    #[arg(long, global = true, default_value_t = 9000)]
    metrics_port: u16,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Wake the backend and prefetch hot endpoints, once
    Warmup,
    /// Probe the readiness endpoint and print a JSON report
    Ping {
        /// Repeat every N seconds instead of exiting
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        every: Option<u64>,
    },
    /// Follow the live score feed until Ctrl-C
    Watch {
        /// Topic to subscribe to instead of the configured one
        #[arg(long)]
        topic: Option<String>,
        /// Skip the background warmup
        #[arg(long)]
        no_warmup: bool,
    },
}

fn print_snapshot(label: &str, snap: &ScoreSnapshot) {
    match snap.live_score().filter(|s| !s.is_empty()) {
        Some(score) => println!("[{label}] {}", score.summary()),
        None => println!("[{label}] {}", snap.payload()),
    }
}

async fn run_warmup(config: &SyncConfig) -> anyhow::Result<()> {
    let (scheduler, idle) = IdleScheduler::new();
    let Some(task) = start_warmup_with(config, &scheduler) else {
        println!("warmup already started in this process");
        return Ok(());
    };
    // Nothing else competes for the host here
    idle.mark_idle();

    let report = task.wait().await.context("warmup task did not complete")?;
    println!("backend: {}", report.readiness.as_str());
    for outcome in &report.prefetch.outcomes {
        match &outcome.result {
            Ok(status) => println!("  {} -> {}", outcome.path, status),
            Err(e) => println!("  {} -> {}", outcome.path, e),
        }
    }
    if let Some(partial) = report.prefetch.partial_failure() {
        println!("{partial}");
    }
    Ok(())
}

async fn run_ping(config: &SyncConfig, every: Option<u64>) -> anyhow::Result<()> {
    let fetcher = ReqwestFetcher::new(config.base_origin())?;
    loop {
        let report = keep_warm_ping(&fetcher, &config.warmup.probe_path, config.warmup.probe_timeout()).await;
        println!("{}", serde_json::to_string(&report)?);

        let Some(secs) = every else {
            if !report.ok {
                bail!("backend not ready at {}", report.url);
            }
            return Ok(());
        };
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}

async fn run_watch(config: &SyncConfig, topic: Option<String>, no_warmup: bool) -> anyhow::Result<()> {
    let (scheduler, idle) = IdleScheduler::new();
    // Keep the handle alive so the warmup finishes in the background
    let _warmup = if no_warmup { None } else { start_warmup_with(config, &scheduler) };

    let url = config.realtime_url()?;
    let transport = StompTransport::new(&url).with_context(|| format!("bad realtime url {url}"))?;
    let topic = topic.unwrap_or_else(|| config.realtime.topic.clone());
    let channel = realtime::open(
        Arc::new(transport),
        &topic,
        ChannelConfig::from(&config.realtime),
        |snap: &ScoreSnapshot| print_snapshot("live", snap),
    );
    idle.mark_idle();

    // Live feed is already connecting; the last known score only fills the gap
    let fetcher = ReqwestFetcher::new(config.base_origin())?;
    let fallback = fetch_snapshot(
        &fetcher,
        &config.realtime.fallback_path,
        config.realtime.fallback_timeout(),
    )
    .await;
    if let (Some(snap), None) = (&fallback, channel.snapshot()) {
        print_snapshot("last known", snap);
    }

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    channel.close().await;
    if channel.snapshot().is_none() && fallback.is_none() {
        println!("no live score received");
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok(); // load .env

    let cli = Cli::parse();
    let config = SyncConfig::load(cli.config.as_deref()).context("loading configuration")?;
    telemetry::init_tracing(&config.log_filter);
    telemetry::init_metrics(cli.metrics_port)?;

    match cli.command {
        Command::Warmup => run_warmup(&config).await,
        Command::Ping { every } => run_ping(&config, every).await,
        Command::Watch { topic, no_warmup } => run_watch(&config, topic, no_warmup).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_interval_must_be_positive() {
        assert!(Cli::try_parse_from(["ipl-sync", "ping", "--every", "0"]).is_err());
        let cli = Cli::try_parse_from(["ipl-sync", "ping", "--every", "30"]).unwrap();
        assert!(matches!(cli.command, Command::Ping { every: Some(30) }));
    }

    #[test]
    fn test_watch_flags() {
        let cli = Cli::try_parse_from(["ipl-sync", "watch", "--topic", "/topic/x", "--no-warmup"]).unwrap();
        match cli.command {
            Command::Watch { topic, no_warmup } => {
                assert_eq!(topic.as_deref(), Some("/topic/x"));
                assert!(no_warmup);
            }
            _ => panic!("expected watch"),
        }
    }
}

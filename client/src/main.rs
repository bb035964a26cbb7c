//! Speedgauge - network speed measurement client
//!
//! Composition root: builds the connectivity monitor, server directory,
//! measurement pipeline and result store, then runs one measurement or a
//! history command.

use anyhow::{Context, Result};
use clap::Parser;
use measure::{DialScale, DisplayUnit};
use speedgauge::config::Config;
use speedgauge::connectivity::{ConnectivityMonitor, SystemProbe};
use speedgauge::directory::ServerDirectory;
use speedgauge::directory::catalog::HttpCatalog;
use speedgauge::network_monitor::SystemNetworkDetails;
use speedgauge::output::{self, ConsoleRenderer};
use speedgauge::results::{ResultAssembler, ResultSink};
use speedgauge::storage::ResultStore;
use speedgauge::testing::{HttpTransport, MeasurementPipeline, PipelineEvent};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "speedgauge")]
#[command(version)]
#[command(about = "Measure ping, jitter, packet loss and throughput against a speed test server", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "speedgauge.conf")]
    config: PathBuf,

    /// List known servers, closest first
    #[arg(long)]
    list_servers: bool,

    /// Search servers by name, city, country or provider
    #[arg(long)]
    search: Option<String>,

    /// Measure against the server with this id instead of the closest one
    #[arg(long)]
    server: Option<String>,

    /// Show the most recent stored results
    #[arg(long, num_args = 0..=1, default_missing_value = "10")]
    history: Option<usize>,

    /// Export stored results as CSV
    #[arg(long)]
    export: Option<PathBuf>,

    /// Delete stored results older than: 30d, 12h, 90m
    #[arg(long)]
    prune: Option<String>,

    /// Display unit: mbit, mbyte, kbyte
    #[arg(long)]
    unit: Option<DisplayUnit>,

    /// Dial scale maximum: 1000, 500, 100
    #[arg(long, value_parser = parse_scale)]
    scale: Option<DialScale>,
}

fn parse_scale(s: &str) -> Result<DialScale, String> {
    let value: u32 = s.trim().parse().map_err(|_| format!("Invalid dial scale '{}'", s))?;
    DialScale::try_from(value)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load_or_default(&args.config)?;

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(
                config
                    .logging
                    .level
                    .parse()
                    .with_context(|| format!("Invalid log level '{}'", config.logging.level))?,
            ),
        )
        .init();

    if args.config.exists() {
        info!("Loaded configuration from {:?}", args.config);
    } else {
        info!("No configuration at {:?}, using defaults", args.config);
    }

    let unit = args.unit.unwrap_or(config.general.display_unit);
    let scale = args.scale.unwrap_or(config.general.dial_scale);

    if args.history.is_some() || args.export.is_some() || args.prune.is_some() {
        return run_history(&config, &args, unit);
    }

    let directory = ServerDirectory::new(Arc::new(HttpCatalog::new(
        &config.catalog.url,
        Duration::from_millis(config.catalog.timeout_ms),
    )?));
    directory.fetch_servers(config.location.coordinates()).await;

    if args.list_servers || args.search.is_some() {
        let servers = directory.search(args.search.as_deref().unwrap_or("")).await;
        let selected = directory.selected().await;
        output::print_servers(&mut std::io::stdout(), &servers, selected.as_ref())?;
        return Ok(());
    }

    let server = match &args.server {
        Some(id) => Some(
            directory
                .select_by_id(id)
                .await
                .with_context(|| format!("Unknown server id '{}'", id))?,
        ),
        None => directory.select_closest().await,
    };

    run_measurement(&config, server, unit, scale).await
}

async fn run_measurement(
    config: &Config,
    server: Option<measure::Server>,
    unit: DisplayUnit,
    scale: DialScale,
) -> Result<()> {
    let (connectivity, _monitor_task) = ConnectivityMonitor::spawn_polling(
        Arc::new(SystemProbe::new()),
        Duration::from_millis(config.connectivity.poll_interval_ms),
    )
    .await;
    let state = connectivity.current();
    info!(
        "Connectivity: connected={} interface={}",
        state.connected,
        state.interface.label()
    );

    let store = ResultStore::new(&config.general.database_path)?;
    store.initialize()?;
    let sink: Arc<dyn ResultSink> = Arc::new(store);

    let details = SystemNetworkDetails::new(&config.connectivity.public_ip_url)?;
    let assembler = ResultAssembler::new(connectivity.clone(), Arc::new(details), Some(sink));
    let pipeline = MeasurementPipeline::new(
        Arc::new(HttpTransport::new()?),
        connectivity,
        assembler,
        config.pipeline.clone(),
    );

    let mut events = pipeline.subscribe();
    let renderer = tokio::spawn(async move {
        let mut console = ConsoleRenderer::new(std::io::stdout(), unit, scale);
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Err(e) = console.render(&event) {
                        warn!("Failed to render progress: {:#}", e);
                    }
                    if matches!(event, PipelineEvent::Completed(_) | PipelineEvent::Failed(_)) {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!("Skipped {} progress events", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let outcome = match pipeline.start(server.as_ref()) {
        Ok(handle) => {
            let cancel = handle.cancel_token();
            tokio::select! {
                outcome = handle.wait() => outcome,
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, cancelling measurement");
                    cancel.cancel();
                    Err(measure::MeasurementError::Aborted)
                }
            }
        }
        Err(e) => Err(e),
    };

    let _ = tokio::time::timeout(Duration::from_secs(1), renderer).await;

    match outcome {
        Ok(_) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn run_history(config: &Config, args: &Args, unit: DisplayUnit) -> Result<()> {
    let store = ResultStore::new(&config.general.database_path)?;
    store.initialize()?;

    if let Some(age) = &args.prune {
        let cutoff = chrono::Utc::now()
            .checked_sub_signed(parse_duration(age)?)
            .with_context(|| format!("Prune age out of range: '{}'", age))?;
        let deleted = store.delete_before(cutoff)?;
        println!("Deleted {} results older than {}", deleted, age);
    }

    if let Some(limit) = args.history {
        let results = store.recent(limit)?;
        info!("Found {} of {} stored results", results.len(), store.count()?);
        output::print_history(&mut std::io::stdout(), &results, unit)?;
    }

    if let Some(path) = &args.export {
        let results = store.recent(store.count()?)?;
        output::export_csv(&results, path)?;
        info!("Exported {} results to {:?}", results.len(), path);
    }

    Ok(())
}

fn parse_duration(s: &str) -> Result<chrono::Duration> {
    let s = s.trim();
    let split = s.char_indices().last().map(|(i, _)| i).unwrap_or(0);
    let (amount, suffix) = s.split_at(split);
    let amount: i64 = amount
        .parse()
        .with_context(|| format!("Invalid duration '{}'", s))?;
    if amount <= 0 {
        anyhow::bail!("Duration must be positive: '{}'", s);
    }
    let duration = match suffix {
        "d" => chrono::Duration::try_days(amount),
        "h" => chrono::Duration::try_hours(amount),
        "m" => chrono::Duration::try_minutes(amount),
        _ => anyhow::bail!("Invalid duration format. Use: 30d, 12h, 90m"),
    };
    duration.with_context(|| format!("Duration out of range: '{}'", s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30d").unwrap(), chrono::Duration::days(30));
        assert_eq!(parse_duration(" 12h ").unwrap(), chrono::Duration::hours(12));
        assert!(parse_duration("5w").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn test_parse_duration_rejects_non_positive_and_huge() {
        assert!(parse_duration("-5d").is_err());
        assert!(parse_duration("0h").is_err());
        assert!(parse_duration("9223372036854775807d").is_err());
        assert!(parse_duration("9999999999999999m").is_err());
    }

    #[test]
    fn test_parse_scale() {
        assert_eq!(parse_scale("500"), Ok(DialScale::Scale500));
        assert!(parse_scale("250").is_err());
        assert!(parse_scale("fast").is_err());
    }

    #[test]
    fn test_history_flag_default() {
        let args = Args::parse_from(["speedgauge", "--history"]);
        assert_eq!(args.history, Some(10));
        let args = Args::parse_from(["speedgauge", "--history", "3", "--unit", "mbyte"]);
        assert_eq!(args.history, Some(3));
        assert_eq!(args.unit, Some(DisplayUnit::Mbyte));
    }
}

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lathewatch::data::time::now_millis;
use lathewatch::data::{DisplayZone, Metric};
use lathewatch::source::{HistoryClient, WebSocketConnector};
use lathewatch::subscribe::{MessageCallback, StatusCallback};
use lathewatch::{Settings, TelemetryHub};

#[derive(Parser, Debug)]
#[command(name = "lathewatch")]
#[command(about = "Real-time telemetry ingestion for lathe sensor dashboards")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// WebSocket endpoint to stream from (overrides stream.url)
    #[arg(long)]
    connect: Option<String>,

    /// History API base URL (overrides history.endpoint)
    #[arg(long)]
    history: Option<String>,

    /// Skip seeding the series from the history endpoint
    #[arg(long)]
    no_bootstrap: bool,

    /// Render chart labels in UTC instead of local time
    #[arg(long)]
    utc: bool,

    /// Log filter (e.g. "debug", "lathewatch=trace"); defaults to RUST_LOG, then "info"
    #[arg(long)]
    log_level: Option<String>,

    /// Seconds between summary lines
    #[arg(short, long, default_value = "5")]
    summary_every: u64,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(short, long)]
    duration: Option<u64>,

    /// Write the series and connection state to a JSON file on exit
    #[arg(short, long, conflicts_with = "latest")]
    export: Option<PathBuf>,

    /// Print the newest stored reading as JSON and exit
    #[arg(long)]
    latest: bool,
}

impl Args {
    /// Apply command line overrides on top of file and environment settings.
    fn apply(&self, mut settings: Settings) -> Settings {
        if let Some(url) = &self.connect {
            settings.stream.url = url.clone();
        }
        if let Some(endpoint) = &self.history {
            settings.history.endpoint = endpoint.clone();
        }
        if self.no_bootstrap {
            settings.history.bootstrap = false;
        }
        if self.utc {
            settings.display.timezone = DisplayZone::Utc;
        }
        settings
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = match &args.log_level {
        Some(level) => EnvFilter::try_new(level)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let settings = args.apply(Settings::load(args.config.as_deref())?);

    if args.latest {
        let client = settings.history_client()?;
        return print_latest(&client).await;
    }

    run(&args, &settings).await
}

/// Print the newest stored reading
async fn print_latest(client: &HistoryClient) -> Result<()> {
    let row = client
        .fetch_latest()
        .await
        .with_context(|| format!("Failed to fetch latest reading from {}", client.endpoint()))?;
    println!("{}", serde_json::to_string_pretty(&row)?);
    Ok(())
}

/// Stream until interrupted, logging a periodic summary
async fn run(args: &Args, settings: &Settings) -> Result<()> {
    let hub = TelemetryHub::new(
        Arc::new(WebSocketConnector::new(settings.stream.url.clone())),
        settings.hub_options(),
    );
    let history = if settings.history.bootstrap {
        Some(settings.history_client()?)
    } else {
        None
    };

    let disconnects = Arc::new(AtomicUsize::new(0));
    let disconnect_counter = disconnects.clone();
    let on_status: StatusCallback = Arc::new(move |connected: bool| {
        if !connected {
            disconnect_counter.fetch_add(1, Ordering::Relaxed);
        }
    });
    let _status = hub.subscribe_status(on_status);

    let frames = Arc::new(AtomicU64::new(0));
    let frame_counter = frames.clone();
    let on_frame: MessageCallback = Arc::new(move |_: &Value| {
        frame_counter.fetch_add(1, Ordering::Relaxed);
    });
    let _frames = hub.subscribe_messages(on_frame);

    // A manual start policy only defers the start to here
    hub.start();
    info!("Streaming from {}", hub.endpoint());

    let bootstrap = async {
        match &history {
            Some(client) => Some(hub.bootstrap(client).await),
            None => None,
        }
    };
    tokio::pin!(bootstrap);
    let mut bootstrapped = false;

    let deadline = async {
        match args.duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut summary = tokio::time::interval(Duration::from_secs(args.summary_every.max(1)));
    summary.tick().await;

    loop {
        tokio::select! {
            report = &mut bootstrap, if !bootstrapped => {
                bootstrapped = true;
                if let Some(report) = report {
                    if report.is_success() {
                        info!(
                            "History bootstrap: {} rows, {} points seeded",
                            report.rows,
                            report.seeded_points()
                        );
                    } else {
                        warn!("Continuing without history; series will fill from the stream");
                    }
                }
            }
            _ = summary.tick() => {
                log_summary(&hub, frames.load(Ordering::Relaxed), disconnects.load(Ordering::Relaxed));
            }
            result = &mut ctrl_c => {
                if let Err(e) = result {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                }
                info!("Interrupted, shutting down");
                break;
            }
            _ = &mut deadline => {
                info!("Run duration elapsed, shutting down");
                break;
            }
        }
    }

    hub.stop();

    if let Some(path) = &args.export {
        export_to_file(&hub, frames.load(Ordering::Relaxed), path)?;
    }
    Ok(())
}

fn log_summary(hub: &TelemetryHub, frames: u64, disconnects: usize) {
    let store = hub.store();
    let values: Vec<String> = Metric::ALL
        .iter()
        .map(|metric| match store.last_value(*metric) {
            Some(value) => format!("{}={:.4}", metric.key(), value),
            None => format!("{}=-", metric.key()),
        })
        .collect();

    let last = hub
        .series(Metric::Mean)
        .last()
        .map(|p| p.time.clone())
        .unwrap_or_else(|| "--:--:--".to_string());
    let age = store
        .last_timestamp(Metric::Mean)
        .map(|ts| format!("{:.1}s", (now_millis() - ts) as f64 / 1000.0))
        .unwrap_or_else(|| "-".to_string());

    info!(
        "[{}] connected={} frames={} disconnects={} age={} {}",
        last,
        hub.is_connected(),
        frames,
        disconnects,
        age,
        values.join(" ")
    );
}

/// Export the series and connection state to a JSON file
fn export_to_file(hub: &TelemetryHub, frames: u64, export_path: &Path) -> Result<()> {
    use std::io::Write;

    let mut export = serde_json::Map::new();

    export.insert(
        "exported_at".to_string(),
        serde_json::json!(chrono::Utc::now().to_rfc3339()),
    );
    export.insert("endpoint".to_string(), serde_json::json!(hub.endpoint()));
    export.insert("connected".to_string(), serde_json::json!(hub.is_connected()));
    export.insert("frames_received".to_string(), serde_json::json!(frames));
    export.insert("timezone".to_string(), serde_json::to_value(hub.zone())?);
    export.insert("latest".to_string(), serde_json::to_value(hub.latest_record())?);
    export.insert("series".to_string(), serde_json::to_value(hub.store().snapshot())?);

    let titles: serde_json::Map<String, Value> = Metric::ALL
        .iter()
        .map(|metric| (metric.key().to_string(), serde_json::json!(metric.title())))
        .collect();
    export.insert("titles".to_string(), Value::Object(titles));

    let json = serde_json::to_string_pretty(&Value::Object(export))?;
    let mut file = std::fs::File::create(export_path)
        .with_context(|| format!("Failed to create {}", export_path.display()))?;
    file.write_all(json.as_bytes())?;

    info!("Exported telemetry state to: {}", export_path.display());
    Ok(())
}

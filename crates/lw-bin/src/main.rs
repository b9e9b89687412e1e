//! linewise entrypoint: headless host that replays UI events through a
//! session and prints every notice as one JSON line on stdout.
use anyhow::Result;
use clap::Parser;
use core_events::{EVENT_CHANNEL_CAP, Event, EventSourceRegistry, FrameTickSource, JsonLinesSource};
use core_io::{LocalFs, RopeLineProvider};
use core_model::{EditorSession, SessionDriver, SessionOptions};
use core_state::Geometry;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, trace, warn};
use tracing_appender::non_blocking::WorkerGuard;

const LOG_FILE: &str = "linewise.log";

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "linewise", version, about = "Windowed rendering engine for very large text buffers")]
struct Args {
    /// Configuration file (overrides discovery of `linewise.toml`).
    #[arg(long = "config")]
    config: Option<PathBuf>,
    /// Newline-delimited JSON UI events; stdin when omitted.
    #[arg(long = "script")]
    script: Option<PathBuf>,
    /// Container height in pixels.
    #[arg(long = "height", default_value_t = 600.0)]
    height: f64,
    /// Container width in pixels.
    #[arg(long = "width", default_value_t = 800.0)]
    width: f64,
}

fn configure_logging() -> Option<WorkerGuard> {
    let log_dir = Path::new(".");
    let log_path = log_dir.join(LOG_FILE);
    if log_path.exists() {
        let _ = std::fs::remove_file(&log_path);
    }
    let file_appender = tracing_appender::rolling::never(log_dir, LOG_FILE);
    let (nb_writer, guard) = tracing_appender::non_blocking(file_appender);
    match tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(nb_writer)
        .try_init()
    {
        Ok(_) => Some(guard),
        // Subscriber already installed; dropping the guard stops the writer.
        Err(_) => None,
    }
}

fn install_panic_hook() {
    static HOOK: Once = Once::new();
    HOOK.call_once(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            tracing::error!(target: "runtime.panic", ?info, "panic");
            default_panic(info);
        }));
    });
}

async fn register_sources(
    args: &Args,
    frame_interval: Duration,
    tx: &mpsc::Sender<Event>,
) -> Result<Vec<JoinHandle<()>>> {
    let mut registry = EventSourceRegistry::new();
    match &args.script {
        Some(path) => {
            let file = tokio::fs::File::open(path).await?;
            registry.register(JsonLinesSource::new(file));
        }
        None => registry.register(JsonLinesSource::new(tokio::io::stdin())),
    }
    registry.register(FrameTickSource::new(frame_interval));
    Ok(registry.spawn_all(tx))
}

async fn stop_sources(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        handle.abort();
        match tokio::time::timeout(Duration::from_millis(200), handle).await {
            Ok(Ok(())) => trace!(target: "runtime.shutdown", "event_source_task_stopped"),
            Ok(Err(err)) if err.is_cancelled() => {
                trace!(target: "runtime.shutdown", "event_source_task_cancelled")
            }
            Ok(Err(err)) => error!(target: "runtime.shutdown", ?err, "event_source_task_error"),
            Err(_) => warn!(target: "runtime.shutdown", "event_source_task_timeout"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = configure_logging();
    install_panic_hook();
    info!(target: "runtime", "startup");

    let args = Args::parse();
    let config_override = args.config.is_some();
    let config = core_config::load_from(args.config.clone())?;
    let geometry = Geometry::new(args.width, args.height);
    let options = SessionOptions::from_config(&config, geometry);
    let io = &config.file.io;
    info!(
        target: "runtime.startup",
        config_override,
        line_height = options.render.line_height,
        buffer_margin = options.render.buffer_margin,
        full_render_threshold = options.render.full_render_threshold,
        render_cache_limit_mb = options.render_cache_limit_mb,
        max_file_bytes = io.max_file_bytes,
        "bootstrap_complete"
    );

    let (tx, mut rx) = mpsc::channel::<Event>(EVENT_CHANNEL_CAP);
    let frame_interval = Duration::from_millis(config.file.render.frame_interval_ms);
    let sources = register_sources(&args, frame_interval, &tx).await?;

    let mut driver = SessionDriver::new(
        EditorSession::new(options),
        Arc::new(LocalFs::new(io.max_file_bytes)),
        Arc::new(RopeLineProvider::new(io.max_file_bytes)),
        tx,
    );
    let stdout = std::io::stdout();
    driver
        .run(&mut rx, |notice| {
            let mut out = stdout.lock();
            match serde_json::to_string(&notice) {
                Ok(line) => {
                    if let Err(e) = writeln!(out, "{line}") {
                        warn!(target: "runtime", error = %e, "notice_write_failed");
                    }
                }
                Err(e) => warn!(target: "runtime", error = %e, "notice_encode_failed"),
            }
        })
        .await;

    stop_sources(sources).await;
    let counters = core_events::counters_snapshot();
    info!(
        target: "runtime",
        frame_ticks = counters.frame_ticks,
        ui_events_decoded = counters.ui_events_decoded,
        ui_events_rejected = counters.ui_events_rejected,
        channel_send_failures = counters.channel_send_failures,
        "exit"
    );
    Ok(())
}

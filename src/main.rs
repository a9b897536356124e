use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use livepush::config::{self, AudioQuality};
use livepush::events::SessionEvent;
use livepush::session::{Collaborators, SessionController, SessionState};
use livepush::transport::simulated::{SimulatedDevices, SimulatedPermissions, SimulatedTransport};

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Verbose,
    Debug,
    Trace,
}

/// livepush command line arguments
#[derive(Parser, Debug)]
#[command(name = "livepush")]
#[command(version, about = "Publish a live session against a simulated RTMP server", long_about = None)]
struct CliArgs {
    /// Endpoint, e.g. rtmp://host[:port]/application/stream-key
    #[arg(value_name = "ENDPOINT")]
    endpoint: String,

    /// JSON session config file
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Stop after this many seconds (runs until Ctrl+C if omitted)
    #[arg(short = 'd', long, value_name = "SECS")]
    duration: Option<u64>,

    /// Audio quality preset (voice, balanced, high; overrides config)
    #[arg(short = 'q', long, value_name = "PRESET")]
    audio_quality: Option<AudioQuality>,

    /// Reject this many publish attempts
    #[arg(long, value_name = "N", default_value_t = 0)]
    fail_publishes: u32,

    /// Simulate a dropped connection after this many seconds of streaming
    #[arg(long, value_name = "SECS")]
    drop_after: Option<u64>,

    /// Print session events as JSON lines
    #[arg(long)]
    json_events: bool,

    /// Log level (error, warn, info, verbose, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Increase verbosity (-v for verbose, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_level, args.verbose, args.log_json);

    tracing::info!("Starting livepush v{}", env!("CARGO_PKG_VERSION"));

    let mut config = config::load_or_default(args.config.as_deref()).await?;
    if let Some(quality) = args.audio_quality {
        config.stream.audio.quality = quality;
    }
    tracing::info!(
        "Stream: {}x{}@{}fps, audio {} ({} bps)",
        config.stream.video.width,
        config.stream.video.height,
        config.stream.video.fps,
        config.stream.audio.quality,
        config.stream.audio.bitrate()
    );

    let transport = Arc::new(SimulatedTransport::new());
    transport.fail_next_publishes(args.fail_publishes);

    let controller = SessionController::new(
        config,
        Collaborators {
            transport: transport.clone(),
            devices: Arc::new(SimulatedDevices::new()),
            permissions: Arc::new(SimulatedPermissions::granting_all()),
        },
    );

    let mut status_rx = controller.subscribe_status();
    let mut events_rx = controller.subscribe_events();

    controller.start(args.endpoint);

    let deadline = async {
        match args.duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutdown signal received");
    };
    tokio::pin!(shutdown_signal);

    // Armed once the session is publishing
    let drop_timer = tokio::time::sleep(Duration::from_secs(86_400));
    tokio::pin!(drop_timer);
    let mut drop_armed = false;

    loop {
        tokio::select! {
            _ = &mut shutdown_signal => break,
            _ = &mut deadline => {
                tracing::info!("Duration elapsed");
                break;
            }
            _ = &mut drop_timer, if drop_armed => {
                tracing::info!("Simulating connection drop");
                transport.set_connected(false);
                drop_armed = false;
            }
            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = status_rx.borrow_and_update().clone();
                println!("[{}] {} ({})", status.message.timestamp.format("%H:%M:%S"), status.text(), status.state);
            }
            event = events_rx.recv() => {
                match event {
                    Ok(event) => {
                        if args.json_events {
                            println!("{}", serde_json::to_string(&event)?);
                        }
                        if let (SessionEvent::StateChanged { to: SessionState::Monitoring, .. }, Some(secs)) =
                            (&event, args.drop_after)
                        {
                            drop_timer.as_mut().reset(Instant::now() + Duration::from_secs(secs));
                            drop_armed = true;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("Dropped {} session events", n);
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    let final_state = controller.state().await?;
    tracing::info!("Shutting down from {}", final_state);
    controller.shutdown().await;
    tracing::info!("Bye");

    Ok(())
}

fn init_logging(level: LogLevel, verbose_count: u8, json: bool) {
    // Verbose count overrides log level
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Verbose,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "livepush=error",
        LogLevel::Warn => "livepush=warn",
        LogLevel::Info => "livepush=info",
        LogLevel::Verbose => "livepush=debug",
        LogLevel::Debug => "livepush=trace",
        LogLevel::Trace => "trace",
    };

    // Environment variable takes highest priority
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    // Status lines go to stdout, logs to stderr
    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };

    if let Err(err) = result {
        eprintln!("failed to initialize tracing: {}", err);
    }
}

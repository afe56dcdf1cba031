//! distortiond - Vehicle Core Daemon
//!
//! Connects the configured vehicles and prints every sink event (positions,
//! driving data, unreachable vehicles) to stdout as one JSON object per line.
//! Logs go to stderr.
//!
//! Usage:
//!   distortiond [OPTIONS] [config.toml]
//!
//! If no config file is provided, one mock vehicle is driven around a demo
//! track.

mod demo;

use std::sync::Arc;
use std::time::Duration;

use distortion_anki::{
    DistortionConfig, EventSink, Fleet, ModelSettings, SinkEvent, VehicleController,
};
use distortion_core::{BroadcastSink, DrivingData, Position, TracingSink, VehicleIdentity};
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Parsed command-line arguments
struct Args {
    /// Vehicle config file (TOML)
    config_path: Option<String>,
    /// Log as JSON instead of human-readable text
    json_logs: bool,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut result = Args {
        config_path: None,
        json_logs: false,
    };

    for arg in &args {
        match arg.as_str() {
            "--json" => result.json_logs = true,
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            arg if !arg.starts_with('-') => {
                // Positional argument = config file
                result.config_path = Some(arg.to_string());
            }
            _ => {
                eprintln!("Unknown argument: {}", arg);
            }
        }
    }

    result
}

fn print_help() {
    eprintln!(
        r#"distortiond - Vehicle Core Daemon

Usage: distortiond [OPTIONS] [config.toml]

Options:
      --json    Write logs as JSON
  -h, --help    Print this help message

Examples:
  # Drive one mock vehicle around a demo track
  distortiond

  # Connect the vehicles listed in a config file
  distortiond vehicles.toml
"#
    );
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "distortiond=info,distortion_anki=debug,distortion_core=info".into()
    });

    let json_layer = json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
    });
    let text_layer = (!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .init();
}

/// Publishes to subscribers and logs every emission
struct DaemonSink {
    broadcast: BroadcastSink,
    log: TracingSink,
}

impl EventSink for DaemonSink {
    fn emit_position(&self, vehicle_id: &VehicleIdentity, position: Position, heading_deg: f64) {
        self.log.emit_position(vehicle_id, position, heading_deg);
        self.broadcast.emit_position(vehicle_id, position, heading_deg);
    }

    fn emit_driving_data(&self, data: &DrivingData) {
        self.log.emit_driving_data(data);
        self.broadcast.emit_driving_data(data);
    }

    fn emit_unreachable(&self, vehicle_id: &VehicleIdentity, player: Option<&str>, message: &str) {
        self.log.emit_unreachable(vehicle_id, player, message);
        self.broadcast.emit_unreachable(vehicle_id, player, message);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = parse_args();
    init_logging(args.json_logs);

    tracing::info!("Starting distortiond (Vehicle Core Daemon)");

    let (config, demo_mode) = if let Some(ref path) = args.config_path {
        tracing::info!("Loading config from: {}", path);
        (DistortionConfig::load(path)?, false)
    } else {
        tracing::info!("No config file provided, using a mock vehicle");
        (demo::config(), true)
    };

    let broadcast = BroadcastSink::default();
    let printer = tokio::spawn(print_events(broadcast.subscribe()));
    let sink = Arc::new(DaemonSink {
        broadcast,
        log: TracingSink,
    });

    let fleet = Arc::new(Fleet::new(
        config.controller.clone(),
        ModelSettings::new(&config.model, &config.controller),
        Arc::new(config.track.clone()),
        sink,
    ));

    for vehicle in &config.vehicles {
        match fleet.add(vehicle).await {
            Ok(active) => {
                tracing::info!(vehicle = %vehicle.address, "Connected");
                let controller = active.controller();
                controller.request_version();
                tokio::time::sleep(Duration::from_millis(100)).await;
                controller.request_battery();
            }
            Err(e) => tracing::error!(vehicle = %vehicle.address, error = %e, "Failed to add vehicle"),
        }
    }

    if fleet.is_empty() {
        anyhow::bail!("No vehicle could be connected");
    }

    let demo = demo_mode.then(|| tokio::spawn(demo::drive(fleet.clone())));

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    if let Some(demo) = demo {
        demo.abort();
    }
    fleet.shutdown().await;
    printer.abort();

    Ok(())
}

/// Write sink events to stdout as JSON lines
async fn print_events(mut events: broadcast::Receiver<SinkEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => tracing::warn!(error = %e, "Failed to serialize event"),
            },
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(skipped = n, "Event printer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

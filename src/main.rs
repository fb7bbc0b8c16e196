// src/main.rs
//! Activity Recorder - live GPS activity recording in the terminal

use activity_recorder::{
    api::{spawn_uploader, ActivityApiClient},
    config::RecorderConfig,
    display::TerminalDisplay,
    error::RecorderError,
    export::{ExportFormat, SessionExporter},
    gps::{
        current_position, gpsd::GpsdSampler, replay::ReplaySampler, sampler::DEFAULT_FIX_TIMEOUT,
        serial::{list_serial_ports, SerialSampler}, GeoSampler,
    },
    session::{SessionController, SystemClock},
    CompletedSession, LiveMapModel, MetricsPresenter,
};
use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::{
    path::PathBuf,
    sync::{Arc, RwLock},
    time::Duration,
};

#[derive(Parser, Debug)]
#[command(name = "activity-recorder", version, about = "Record GPS activities from the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record an activity with a live dashboard
    Record(RecordArgs),
    /// Print the current position once
    Locate {
        #[command(flatten)]
        source: SourceArgs,
        /// Seconds to wait for a fix
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// List available serial ports
    Ports,
    /// Show the effective configuration
    Config {
        #[command(flatten)]
        source: SourceArgs,
        /// Persist the effective configuration
        #[arg(long, default_value_t = false)]
        save: bool,
    },
    /// Show the profile of the configured API account
    Profile,
}

#[derive(Args, Debug)]
struct SourceArgs {
    /// Location source: gpsd, serial or replay
    #[arg(long)]
    source: Option<String>,
    /// Serial port of an NMEA receiver
    #[arg(long)]
    port: Option<String>,
    /// Serial baud rate
    #[arg(long)]
    baud: Option<u32>,
    /// gpsd host
    #[arg(long)]
    host: Option<String>,
    /// gpsd port
    #[arg(long)]
    gpsd_port: Option<u16>,
    /// JSON-lines fix log to replay
    #[arg(long)]
    replay: Option<PathBuf>,
    /// Replay speed-up factor
    #[arg(long)]
    speedup: Option<f64>,
}

#[derive(Args, Debug)]
struct RecordArgs {
    #[command(flatten)]
    source: SourceArgs,
    /// Write the finished session to a .gpx, .geojson or .csv file
    #[arg(long)]
    export: Option<PathBuf>,
    /// Submit the finished session to the activity API
    #[arg(long, default_value_t = false)]
    submit: bool,
    /// Activity type sent with --submit
    #[arg(long, default_value = "running")]
    activity_type: String,
}

impl SourceArgs {
    /// Command line values take precedence over the stored configuration
    fn apply(&self, config: &mut RecorderConfig) {
        if let Some(ref source) = self.source {
            config.update_source(source);
        }
        if let Some(ref port) = self.port {
            let baud = self.baud.or(config.serial_baudrate).unwrap_or(9600);
            config.update_serial(port.clone(), baud);
        } else if let Some(baud) = self.baud {
            config.serial_baudrate = Some(baud);
        }
        if self.host.is_some() || self.gpsd_port.is_some() {
            let host = self
                .host
                .clone()
                .or_else(|| config.gpsd_host.clone())
                .unwrap_or_else(|| "localhost".to_string());
            let port = self.gpsd_port.or(config.gpsd_port).unwrap_or(2947);
            config.update_gpsd(host, port);
        }
        if let Some(ref file) = self.replay {
            let speedup = self.speedup.or(config.replay_speedup).unwrap_or(1.0);
            config.update_replay(file.clone(), speedup);
        } else if let Some(speedup) = self.speedup {
            config.replay_speedup = Some(speedup);
        }
    }
}

fn build_sampler(config: &RecorderConfig) -> activity_recorder::Result<Box<dyn GeoSampler>> {
    match config.source_type.as_str() {
        "gpsd" => Ok(Box::new(GpsdSampler::new(
            config.gpsd_host.clone().unwrap_or_else(|| "localhost".to_string()),
            config.gpsd_port.unwrap_or(2947),
            config.sampling,
        ))),
        "serial" => {
            let port = config
                .serial_port
                .clone()
                .ok_or_else(|| RecorderError::Config("serial source needs --port".to_string()))?;
            Ok(Box::new(SerialSampler::new(
                port,
                config.serial_baudrate.unwrap_or(9600),
                config.sampling,
            )))
        }
        "replay" => {
            let file = config
                .replay_file
                .as_ref()
                .ok_or_else(|| RecorderError::Config("replay source needs --replay <file>".to_string()))?;
            let sampler = ReplaySampler::from_file(file, config.replay_speedup.unwrap_or(1.0))?;
            log::info!("Replaying {} fixes from {}", sampler.len(), file.display());
            Ok(Box::new(sampler))
        }
        other => Err(RecorderError::Config(format!("Unknown source type: {}", other))),
    }
}

async fn record(config: RecorderConfig, args: RecordArgs) -> anyhow::Result<()> {
    let sampler = build_sampler(&config)?;
    let map = Arc::new(RwLock::new(LiveMapModel::new()));

    let (controller, fixes) = SessionController::new(sampler, config.filter, Arc::new(SystemClock));
    let mut controller = controller
        .with_pause_policy(config.pause_policy)
        .with_live_map(Box::new(Arc::clone(&map)));

    let uploader = if args.submit {
        let client = ActivityApiClient::new(config.api_base_url.clone(), config.api_token.clone());
        if !client.has_token() {
            log::warn!("No api_token configured; submission will likely be rejected");
        }
        let (sessions, task) = spawn_uploader(client, args.activity_type.clone());
        controller = controller.with_session_sink(Box::new(sessions));
        Some(task)
    } else {
        None
    };

    let (handle, recorder) = activity_recorder::spawn_recorder(controller, fixes);
    if let Err(e) = handle.start().await {
        if e.is_location_unavailable() {
            println!(
                "Tracking unavailable ({}). Map centered on {}",
                e,
                config.fallback_center.format()
            );
        }
        return Err(e.into());
    }

    let session = TerminalDisplay::new().run(handle.clone(), map).await?;

    // Dropping the last handle ends the recorder; dropping the controller closes the uploader queue
    drop(handle);
    let controller = recorder.await.context("recorder task failed")?;
    drop(controller);

    if let Some(ref session) = session {
        print_summary(session);
        if let Some(ref path) = args.export {
            let format = ExportFormat::from_path(path).unwrap_or(ExportFormat::GPX);
            SessionExporter::new(session).export_to_file(path, format)?;
            println!("Exported {} to {}", format.display_name(), path.display());
        }
    }

    if let Some(task) = uploader {
        task.await.context("uploader task failed")?;
    }
    Ok(())
}

fn print_summary(session: &CompletedSession) {
    let display = MetricsPresenter::present(&activity_recorder::SessionMetrics {
        distance_meters: session.distance_meters,
        duration_seconds: session.duration_seconds,
        current_speed_mps: 0.0,
    });

    println!("Session {}", session.id);
    println!("  Started:   {}", session.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("  Duration:  {}", display.duration);
    println!("  Distance:  {} km", display.distance_km);
    println!("  Avg pace:  {} /km", display.pace);
    println!("  Points:    {}", session.track.len());
}

async fn locate(config: RecorderConfig, timeout: Option<u64>) -> anyhow::Result<()> {
    let mut sampler = build_sampler(&config)?;
    let timeout = timeout.map(Duration::from_secs).unwrap_or(DEFAULT_FIX_TIMEOUT);

    match current_position(sampler.as_mut(), timeout).await {
        Ok(position) => {
            println!("{}", position.format());
            Ok(())
        }
        Err(e) if e.is_location_unavailable() => {
            println!("{} - using fallback {}", e, config.fallback_center.format());
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut config = RecorderConfig::load().unwrap_or_else(|e| {
        log::warn!("{}; using defaults", e);
        RecorderConfig::default()
    });

    match cli.command {
        Command::Record(args) => {
            args.source.apply(&mut config);
            log::info!("Using {} source", config.source_type);
            record(config, args).await
        }
        Command::Locate { source, timeout } => {
            source.apply(&mut config);
            let timeout = timeout.or(Some(config.fix_timeout_secs));
            locate(config, timeout).await
        }
        Command::Ports => {
            let ports = list_serial_ports()?;
            if ports.is_empty() {
                println!("No serial ports found.");
            } else {
                println!("Available serial ports:");
                for port in ports {
                    println!("  {}", port);
                }
            }
            Ok(())
        }
        Command::Config { source, save } => {
            source.apply(&mut config);
            println!("{}", serde_json::to_string_pretty(&config)?);
            if save {
                let path = config.save()?;
                println!("Saved to {}", path.display());
            }
            Ok(())
        }
        Command::Profile => {
            let client = ActivityApiClient::new(config.api_base_url.clone(), config.api_token.clone());
            let profile = client.fetch_profile().await?;
            println!("Name:     {}", profile.name.as_deref().unwrap_or("-"));
            println!("Username: {}", profile.username.as_deref().unwrap_or("-"));
            println!("Email:    {}", profile.email.as_deref().unwrap_or("-"));
            Ok(())
        }
    }
}

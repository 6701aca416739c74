// src/cli.rs
//
// Terminal host: lists ports, or runs a session and prints its events
// until Ctrl-C.

use clap::{ArgAction, Parser, Subcommand};
use log::LevelFilter;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::catalog::CatalogStatus;
use crate::events::{EventEmitter, SessionEvent};
use crate::io::{default_backend, list_port_details, PortId, PortInfo};
use crate::logging::{init_file_logging, init_logging, parse_level, stop_file_logging};
use crate::recording::FileSinkFactory;
use crate::scheduler::SystemClock;
use crate::sessions::{spawn_session, ConnectionState, SessionCommand, SessionController};
use crate::settings::{default_settings_path, load_or_init_settings, load_settings, MonitorSettings};

#[derive(Parser, Debug)]
#[command(
    name = "scalelog",
    version,
    about = "Live readout and time-series capture for a serial weighing scale"
)]
pub struct Cli {
    /// Settings file (defaults to <config dir>/scalelog/settings.toml)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the serial ports visible to this machine
    Ports {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Connect to the scale and show readings as they arrive
    Monitor {
        /// Port to connect to (picked automatically when only one exists)
        #[arg(short, long)]
        port: Option<String>,

        /// Record readings, optionally to PATH instead of the configured file
        #[arg(short, long, value_name = "PATH", num_args = 0..=1)]
        record: Option<Option<PathBuf>>,

        /// Also write the diagnostic log to a file in DIR
        #[arg(long, value_name = "DIR")]
        log_dir: Option<PathBuf>,

        /// Stop after this many seconds
        #[arg(long, value_name = "SECONDS")]
        duration: Option<u64>,

        /// Print events as JSON lines
        #[arg(long)]
        json: bool,
    },
}

pub async fn run(cli: Cli) -> Result<(), String> {
    let settings = init_from_settings(cli.config.as_deref(), cli.verbose)?;

    match cli.command {
        Command::Ports { json } => print_ports(json),
        Command::Monitor {
            port,
            record,
            log_dir,
            duration,
            json,
        } => {
            let log_dir = log_dir.or_else(|| settings.log_dir.as_ref().map(PathBuf::from));
            if let Some(dir) = &log_dir {
                init_file_logging(dir)?;
            }
            let result = monitor(&settings, port, record, duration, json).await;
            if log_dir.is_some() {
                stop_file_logging();
            }
            result
        }
    }
}

/// Install the logger, load settings, then apply the configured level.
/// The logger goes first so messages from loading are not lost.
fn init_from_settings(path: Option<&Path>, verbose: u8) -> Result<MonitorSettings, String> {
    init_logging(effective_level("info", verbose)?);
    let settings = load_cli_settings(path)?;
    log::set_max_level(effective_level(&settings.log_level, verbose)?);
    Ok(settings)
}

/// An explicit settings file must exist; the default one is created on first run.
fn load_cli_settings(path: Option<&Path>) -> Result<MonitorSettings, String> {
    match path {
        Some(path) => load_settings(path),
        None => load_or_init_settings(&default_settings_path()?),
    }
}

fn effective_level(configured: &str, verbose: u8) -> Result<LevelFilter, String> {
    let base = parse_level(configured)?;
    Ok(match verbose {
        0 => base,
        1 => base.max(LevelFilter::Debug),
        _ => LevelFilter::Trace,
    })
}

fn print_ports(json: bool) -> Result<(), String> {
    let ports = list_port_details()?;

    if json {
        let text = serde_json::to_string_pretty(&ports)
            .map_err(|e| format!("Failed to serialize port list: {}", e))?;
        println!("{}", text);
    } else if ports.is_empty() {
        println!("No serial ports found");
    } else {
        for port in &ports {
            println!("{}", describe_port(port));
        }
    }
    Ok(())
}

fn describe_port(port: &PortInfo) -> String {
    let mut line = format!("{:<24} {}", port.port_name, port.port_type);
    let label: Vec<&str> = [port.manufacturer.as_deref(), port.product.as_deref()]
        .into_iter()
        .flatten()
        .collect();
    if !label.is_empty() {
        line.push_str(&format!("  {}", label.join(" ")));
    }
    if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
        line.push_str(&format!("  [{:04x}:{:04x}]", vid, pid));
    }
    line
}

async fn monitor(
    settings: &MonitorSettings,
    port: Option<String>,
    record: Option<Option<PathBuf>>,
    duration: Option<u64>,
    json: bool,
) -> Result<(), String> {
    let record_path = match &record {
        Some(Some(path)) => path.clone(),
        _ => settings.record_path(),
    };

    let (events, mut rx) = EventEmitter::channel();
    let controller = SessionController::new(
        settings.timing(),
        settings.link_config(),
        default_backend(),
        Box::new(FileSinkFactory::new(record_path)),
        Box::new(SystemClock),
        events,
    );
    let handle = spawn_session(controller);

    if let Some(port) = port {
        handle.send(SessionCommand::SelectPort(PortId::from(port)))?;
    }
    handle.send(SessionCommand::Connect)?;
    if record.is_some() {
        handle.send(SessionCommand::StartRecording)?;
    }

    let deadline = async {
        match duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => println!("{}", render_event(&event, json)?),
                None => break,
            },
            _ = &mut ctrl_c => {
                log::info!("Interrupted, shutting down");
                break;
            }
            _ = &mut deadline => break,
        }
    }

    handle.shutdown().await?;
    while let Ok(event) = rx.try_recv() {
        println!("{}", render_event(&event, json)?);
    }
    Ok(())
}

/// One printable line per event.
pub fn render_event(event: &SessionEvent, json: bool) -> Result<String, String> {
    if json {
        return serde_json::to_string(event)
            .map_err(|e| format!("Failed to serialize event: {}", e));
    }

    Ok(match event {
        SessionEvent::CatalogChanged { snapshot } => {
            let ports: Vec<&str> = snapshot.ports.iter().map(|p| p.as_str()).collect();
            match (snapshot.status, &snapshot.selected) {
                (CatalogStatus::NoPortsAvailable, _) => "ports: none available".to_string(),
                (_, Some(selected)) => {
                    format!("ports: {} (selected: {})", ports.join(", "), selected)
                }
                (_, None) => format!("ports: {} (none selected)", ports.join(", ")),
            }
        }
        SessionEvent::ConnectionStateChanged { state, port, fault } => {
            let port = port.as_ref().map(|p| p.as_str()).unwrap_or("?");
            match (state, fault) {
                (ConnectionState::Connected, _) => format!("connected to {}", port),
                (ConnectionState::Disconnected, None) => format!("disconnected from {}", port),
                (ConnectionState::Disconnected, Some(fault)) => {
                    format!("connection lost on {}: {}", port, fault)
                }
            }
        }
        SessionEvent::MeasurementUpdated { measurement } => format!(
            "{}  {}",
            measurement.captured_at.format("%H:%M:%S%.3f"),
            measurement.raw_text.trim_end()
        ),
        SessionEvent::ReadingRejected { raw_text } => format!("rejected frame {:?}", raw_text),
        SessionEvent::RecordingStateChanged { active: true, sink } => {
            format!("recording to {}", sink.as_deref().unwrap_or("?"))
        }
        SessionEvent::RecordingStateChanged { active: false, .. } => {
            "recording stopped".to_string()
        }
        SessionEvent::TransientMessage { title, body, .. } => format!("[{}] {}", title, body),
    })
}

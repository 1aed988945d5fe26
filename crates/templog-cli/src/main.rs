use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use templog_core::protocol::{
    list_ports, Connection, ConnectionConfig, DeviceStatus, SerialPortProvider,
};
use templog_core::service::DeviceService;

#[derive(Parser, Debug)]
#[command(name = "templog", version)]
#[command(about = "Configure and download the temperature logger over USB serial")]
struct Cli {
    /// JSON file with connection timings
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use this port instead of probing every port
    #[arg(long, global = true)]
    port: Option<String>,

    /// More log output (repeat for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: AppCommand,
}

#[derive(Subcommand, Debug)]
enum AppCommand {
    /// List serial ports
    Ports,
    /// Find the port the logger answers on
    Find,
    /// Ask the logger for its status
    Status,
    /// Arm the logger with a start time, identifier and interval
    Configure(ConfigureArgs),
    /// Retrieve the logged samples
    Download(DownloadArgs),
}

#[derive(Args, Debug)]
struct ConfigureArgs {
    /// Start time as RFC 3339 or epoch seconds (default: now)
    #[arg(long)]
    start: Option<String>,
    /// Identifier stored with the log (at most 15 bytes)
    #[arg(long)]
    id: String,
    /// Seconds between samples
    #[arg(long, default_value_t = 300)]
    interval: u32,
}

#[derive(Args, Debug)]
struct DownloadArgs {
    /// Output file name; `.csv` is appended unless it ends in .csv or .raw
    filename: String,
    /// Directory to save into
    #[arg(long, default_value = "Downloaded Data")]
    dir: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(cli.config.as_ref())?;
    let provider = match &cli.port {
        Some(name) => SerialPortProvider::pinned(name.clone()),
        None => SerialPortProvider::new(),
    };
    let connection = Connection::with_provider(provider, config);

    match cli.command {
        AppCommand::Ports => run_ports(),
        AppCommand::Find => run_find(connection),
        AppCommand::Status => run_status(connection),
        AppCommand::Configure(args) => run_configure(connection, args),
        AppCommand::Download(args) => run_download(connection, args),
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<ConnectionConfig> {
    let Some(path) = path else {
        return Ok(ConnectionConfig::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config = serde_json::from_str(&text)
        .with_context(|| format!("invalid config {}", path.display()))?;
    tracing::debug!("Loaded connection config from {}", path.display());
    Ok(config)
}

fn parse_start(raw: Option<&str>) -> Result<DateTime<Utc>> {
    let Some(raw) = raw.map(str::trim) else {
        return Ok(Utc::now());
    };
    if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
        let secs: i64 = raw
            .parse()
            .with_context(|| format!("start time out of range: {raw}"))?;
        return DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| anyhow!("start time out of range: {raw}"));
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .with_context(|| format!("invalid start time: {raw}"))
}

fn run_ports() -> Result<()> {
    let ports = list_ports();
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        match (port.vid, port.pid) {
            (Some(vid), Some(pid)) => println!(
                "{}  {:04x}:{:04x}  {}",
                port.name,
                vid,
                pid,
                port.product.as_deref().unwrap_or("")
            ),
            _ => println!("{}", port.name),
        }
    }
    Ok(())
}

fn run_find(connection: Connection) -> Result<()> {
    let mut service = DeviceService::with_connection(connection, ".");
    let port = service.find_device()?;
    println!("Logger found on {port}");
    Ok(())
}

fn run_status(connection: Connection) -> Result<()> {
    let mut service = DeviceService::with_connection(connection, ".");
    let status = service.status();
    println!("{status}");
    if status != DeviceStatus::Connected {
        bail!("logger is not ready ({status})");
    }
    Ok(())
}

fn run_configure(connection: Connection, args: ConfigureArgs) -> Result<()> {
    let start = parse_start(args.start.as_deref())?;
    let mut service = DeviceService::with_connection(connection, ".");

    let report = service.configure(start, &args.id, args.interval);
    for line in &report.trace {
        println!("{line}");
    }
    let ack = report.outcome?;
    println!(
        "Configured: start {} every {}s as {:?}",
        start.format("%Y-%m-%d %H:%M:%S"),
        ack.record.wakeup_interval,
        ack.record.personal_id_text()
    );
    Ok(())
}

fn run_download(connection: Connection, args: DownloadArgs) -> Result<()> {
    let mut service = DeviceService::with_connection(connection, args.dir);
    let artifact = service
        .download(&args.filename)
        .context("failed to download log")?;

    let log = &artifact.summary.log;
    println!(
        "Saved {} samples ({} bytes, {}) to {}",
        log.data_rows,
        artifact.content.len(),
        artifact.mime_type,
        artifact.path.display()
    );
    if let (Some(first), Some(last)) = (log.first_sample, log.last_sample) {
        println!("Samples span {first} to {last}");
    }
    Ok(())
}

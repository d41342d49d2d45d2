//! di-monitor - watch link notifications and decode dummy_iface attributes.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::Context;
use clap::{ArgAction, Parser};
use dummy_iface::listener::{LinkReport, ReportCollector, report_decoder};
use dummy_iface::netlink::NetlinkSocket;
use tracing::{Level, debug, info};

#[derive(Parser)]
#[command(
    name = "di-monitor",
    version,
    about = "Watch link notifications and decode dummy_iface attributes"
)]
struct Cli {
    /// Output JSON.
    #[arg(short = 'j', long)]
    json: bool,

    /// Pretty print JSON.
    #[arg(short = 'p', long, requires = "json")]
    pretty: bool,

    /// Show links of every kind, not only dummy_iface.
    #[arg(short = 'a', long)]
    all: bool,

    /// Label output lines with timestamps.
    #[arg(short = 't', long)]
    timestamp: bool,

    /// Decode a captured netlink buffer ("-" for stdin) instead of listening.
    #[arg(short = 'r', long, value_name = "FILE")]
    read: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short = 'v', long, action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn log_level(&self) -> Level {
        match self.verbose {
            0 => Level::WARN,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }
}

fn write_timestamp<W: Write>(w: &mut W) -> io::Result<()> {
    let now = SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    write!(w, "[{}.{:03}] ", now.as_secs(), now.subsec_millis())
}

fn print_reports(cli: &Cli, reports: &[LinkReport]) -> anyhow::Result<()> {
    let mut stdout = io::stdout().lock();

    for report in reports.iter().filter(|r| cli.all || r.is_dummy_iface()) {
        if cli.timestamp {
            write_timestamp(&mut stdout)?;
        }
        if cli.json {
            let line = if cli.pretty {
                serde_json::to_string_pretty(report)?
            } else {
                serde_json::to_string(report)?
            };
            writeln!(stdout, "{}", line)?;
        } else {
            writeln!(stdout, "{}", report)?;
        }
    }

    stdout.flush()?;
    Ok(())
}

fn read_capture(path: &Path) -> anyhow::Result<Vec<u8>> {
    if path.as_os_str() == "-" {
        let mut buf = Vec::new();
        io::stdin()
            .read_to_end(&mut buf)
            .context("failed to read stdin")?;
        return Ok(buf);
    }
    std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(cli.log_level().into()),
        )
        .init();

    let decoder = report_decoder();
    let mut collector = ReportCollector::new();

    if let Some(path) = &cli.read {
        let buf = read_capture(path)?;
        let n = decoder.intake(&buf, &mut collector);
        debug!(messages = n, bytes = buf.len(), "decoded capture");
        return print_reports(&cli, &collector.take());
    }

    let socket = NetlinkSocket::link_monitor().context("failed to open link monitor socket")?;
    info!(pid = socket.pid(), "listening for link notifications");
    if !cli.json {
        println!("Monitoring link events (Ctrl+C to stop)...");
    }

    loop {
        tokio::select! {
            buf = socket.recv_msg() => {
                let buf = buf?;
                decoder.intake(&buf, &mut collector);
                print_reports(&cli, &collector.take())?;
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    Ok(())
}

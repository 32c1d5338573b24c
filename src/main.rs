//! pingwatch - endpoint reachability monitor
//!
//! Periodically probes a set of endpoints, keeps a per-endpoint check history and an
//! event log, and renders the log as an HTML status report.

mod config;
mod console;
mod db;
mod probe;
mod report;
mod scheduler;
mod state;
mod web;

use config::Config;
use probe::ProbeKind;
use scheduler::parse_interval;
use state::AppState;
use web::Server;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "pingwatch", version, about = "Endpoint reachability monitor")]
struct Cli {
    /// Directory holding servers.json and monitoring_log.json
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Directory the HTML report is written to
    #[arg(long, global = true)]
    report_dir: Option<PathBuf>,

    /// Probe type: ping, tcp or http
    #[arg(long, global = true)]
    probe: Option<ProbeKind>,

    /// Probe timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<f64>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start monitoring an endpoint
    Add { endpoint: String },
    /// Stop monitoring an endpoint and drop its history
    Remove { endpoint: String },
    /// List monitored endpoints
    List,
    /// Probe every endpoint once and render the report
    Check,
    /// Render the report from the event log
    Report,
    /// Monitor in the foreground until interrupted
    Monitor {
        /// Seconds between checks
        #[arg(value_parser = parse_interval)]
        interval: Duration,
    },
    /// Serve the HTTP control API and the report
    Serve {
        /// Start monitoring right away with this interval in seconds
        #[arg(long, value_parser = parse_interval)]
        interval: Option<Duration>,
        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,
    },
}

impl Cli {
    fn apply(&self, cfg: &mut Config) {
        if let Some(dir) = &self.data_dir {
            cfg.data_dir = dir.clone();
        }
        if let Some(dir) = &self.report_dir {
            cfg.report_dir = dir.clone();
        }
        if let Some(kind) = self.probe {
            cfg.probe.kind = kind;
        }
        if let Some(secs) = self.timeout.filter(|s| s.is_finite() && *s > 0.0) {
            cfg.probe.timeout = Duration::from_secs_f64(secs);
        }
        if let Some(Command::Serve {
            port: Some(port), ..
        }) = &self.command
        {
            cfg.http_port = *port;
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("pingwatch=info".parse()?))
        .init();

    let cli = Cli::parse();
    let mut cfg = Config::load();
    cli.apply(&mut cfg);

    tracing::debug!("Using data directory {}", cfg.data_dir.display());
    let state = AppState::open(cfg)?;

    match cli.command {
        None => console::run(&state).await?,
        Some(Command::Add { endpoint }) => {
            if state.registry.add(&endpoint)? {
                println!("Endpoint {} added.", endpoint.trim());
            } else {
                println!("Endpoint {} is already monitored.", endpoint.trim());
            }
        }
        Some(Command::Remove { endpoint }) => {
            if state.registry.remove(&endpoint)? {
                println!("Endpoint {} removed.", endpoint.trim());
            } else {
                println!("Endpoint {} is not monitored.", endpoint.trim());
            }
        }
        Some(Command::List) => {
            for endpoint in state.registry.list() {
                println!("{}", endpoint);
            }
        }
        Some(Command::Check) => {
            let summary = state.scheduler.run_tick().await;
            println!(
                "Checked {} endpoints: {} online, {} offline, {} recorded.",
                summary.probed,
                summary.online,
                summary.probed - summary.online,
                summary.recorded
            );
            println!("Report written to {}", state.renderer.report_path().display());
        }
        Some(Command::Report) => {
            let path = state.renderer.render(&state.log.load_all())?;
            println!("Report written to {}", path.display());
        }
        Some(Command::Monitor { interval }) => {
            state.scheduler.start(interval).await?;
            shutdown_signal().await;
            state.scheduler.stop().await;
        }
        Some(Command::Serve { interval, .. }) => {
            if let Some(interval) = interval {
                state.scheduler.start(interval).await?;
            }
            let server = Server::new(state.clone());
            server.start(shutdown_signal()).await?;
            state.scheduler.stop().await;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from([
            "pingwatch",
            "--data-dir",
            "/tmp/pw",
            "--probe",
            "tcp",
            "--timeout",
            "2",
            "serve",
            "--port",
            "9000",
            "--interval",
            "15",
        ]);
        let mut cfg = Config::default();
        cli.apply(&mut cfg);

        assert_eq!(cfg.data_dir, PathBuf::from("/tmp/pw"));
        assert_eq!(cfg.probe.kind, ProbeKind::Tcp);
        assert_eq!(cfg.probe.timeout, Duration::from_secs(2));
        assert_eq!(cfg.http_port, 9000);
        assert!(matches!(
            cli.command,
            Some(Command::Serve {
                interval: Some(d),
                ..
            }) if d == Duration::from_secs(15)
        ));
    }

    #[test]
    fn test_non_numeric_interval_rejected() {
        assert!(Cli::try_parse_from(["pingwatch", "monitor", "soon"]).is_err());
        assert!(Cli::try_parse_from(["pingwatch", "monitor", "0"]).is_err());
    }
}

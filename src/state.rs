//! Shared application state for the front ends.

use std::sync::Arc;

use crate::config::Config;
use crate::db::{DbError, EventLog, Registry};
use crate::probe::{build_probe, ProbeError};
use crate::report::ReportRenderer;
use crate::scheduler::Scheduler;

/// Startup error types.
#[derive(thiserror::Error, Debug)]
pub enum StartupError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Probe(#[from] ProbeError),
}

/// Stores and scheduler, shared between the console, CLI and web handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub registry: Arc<Registry>,
    pub log: Arc<EventLog>,
    pub renderer: ReportRenderer,
    pub scheduler: Arc<Scheduler>,
}

impl AppState {
    /// Open both stores and wire up the scheduler with the configured probe.
    pub fn open(config: Config) -> Result<Self, StartupError> {
        let registry = Arc::new(Registry::open(config.registry_path())?);
        let log = Arc::new(EventLog::open(config.event_log_path())?);
        let renderer = ReportRenderer::new(&config.report_dir);
        let probe = build_probe(&config.probe)?;

        tracing::debug!(
            "Opened {} endpoints and {} log entries, probing with {}",
            registry.len(),
            log.len(),
            config.probe.kind
        );

        let scheduler = Arc::new(Scheduler::new(
            registry.clone(),
            log.clone(),
            probe,
            renderer.clone(),
        ));

        Ok(Self {
            config,
            registry,
            log,
            renderer,
            scheduler,
        })
    }
}

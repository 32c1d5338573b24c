//! Scheduler module: the monitoring loop.
//!
//! A single background task probes every registered endpoint, records the results in the
//! registry and the event log, renders the report, then sleeps for the configured interval.

use crate::db::{EventLog, LogEntry, Observation, Registry};
use crate::probe::Probe;
use crate::report::ReportRenderer;

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

/// Scheduler error types.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("monitoring is already running (every {0:?})")]
    AlreadyRunning(Duration),
    #[error("interval must be a whole number of seconds, at least 1")]
    InvalidInterval,
}

/// Parse a user-supplied interval in whole seconds.
pub fn parse_interval(input: &str) -> Result<Duration, SchedulerError> {
    match input.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(SchedulerError::InvalidInterval),
    }
}

/// Observable scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerStatus {
    Stopped,
    Running { interval: Duration },
}

enum State {
    Stopped,
    Running {
        interval: Duration,
        stop_tx: broadcast::Sender<()>,
        handle: JoinHandle<()>,
    },
}

/// Counts for one completed tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub probed: usize,
    pub online: usize,
    pub recorded: usize,
}

/// Everything a tick touches, shared with the loop task.
struct Monitor {
    registry: Arc<Registry>,
    log: Arc<EventLog>,
    probe: Arc<dyn Probe>,
    renderer: ReportRenderer,
}

impl Monitor {
    async fn tick(&self) -> TickSummary {
        let endpoints = self.registry.list();
        let mut summary = TickSummary {
            probed: endpoints.len(),
            ..Default::default()
        };

        for endpoint in &endpoints {
            let response_time = self.probe.probe(endpoint).await;
            let observation = Observation::new(Utc::now(), response_time);
            if response_time.is_some() {
                summary.online += 1;
            }

            let stored = match self.registry.record_observation(endpoint, observation) {
                Ok(Some(stored)) => stored,
                Ok(None) => {
                    tracing::debug!("{} was removed during the tick, skipping", endpoint);
                    continue;
                }
                Err(e) => {
                    tracing::error!("Failed to record check for {}: {}", endpoint, e);
                    continue;
                }
            };

            tracing::debug!("{} is {}", endpoint, stored.status());
            match self.log.append(LogEntry::from_observation(endpoint, &stored)) {
                Ok(()) => summary.recorded += 1,
                Err(e) => {
                    tracing::error!("Failed to append log entry for {}: {}", endpoint, e);
                    // Keep the history and the log in step
                    if let Err(e) = self.registry.retract_observation(endpoint, &stored) {
                        tracing::error!("Failed to retract check for {}: {}", endpoint, e);
                    }
                }
            }
        }

        if let Err(e) = self.renderer.render(&self.log.load_all()) {
            tracing::error!("Failed to render report: {}", e);
        }

        summary
    }
}

/// Owns the monitoring loop and its lifecycle.
///
/// `lifecycle` serializes `start` and `stop` for their whole duration, while `state` is
/// only held briefly so `status` never waits on a stopping tick.
pub struct Scheduler {
    monitor: Arc<Monitor>,
    lifecycle: Mutex<()>,
    state: Mutex<State>,
}

impl Scheduler {
    pub fn new(
        registry: Arc<Registry>,
        log: Arc<EventLog>,
        probe: Arc<dyn Probe>,
        renderer: ReportRenderer,
    ) -> Self {
        Self {
            monitor: Arc::new(Monitor {
                registry,
                log,
                probe,
                renderer,
            }),
            lifecycle: Mutex::new(()),
            state: Mutex::new(State::Stopped),
        }
    }

    /// Start the monitoring loop. The first tick runs immediately.
    pub async fn start(&self, interval: Duration) -> Result<(), SchedulerError> {
        if interval < Duration::from_secs(1) {
            return Err(SchedulerError::InvalidInterval);
        }

        let _lifecycle = self.lifecycle.lock().await;
        let mut state = self.state.lock().await;
        if let State::Running { interval, .. } = &*state {
            return Err(SchedulerError::AlreadyRunning(*interval));
        }

        let (stop_tx, stop_rx) = broadcast::channel(1);
        let handle = tokio::spawn(run_monitor_loop(self.monitor.clone(), interval, stop_rx));

        tracing::info!("Monitoring started, checking every {:?}", interval);
        *state = State::Running {
            interval,
            stop_tx,
            handle,
        };
        Ok(())
    }

    /// Stop the loop and wait for it to exit.
    ///
    /// A tick in progress finishes first. Returns `false` if the scheduler was not running.
    pub async fn stop(&self) -> bool {
        let _lifecycle = self.lifecycle.lock().await;
        let previous = std::mem::replace(&mut *self.state.lock().await, State::Stopped);
        let State::Running {
            stop_tx, handle, ..
        } = previous
        else {
            return false;
        };

        let _ = stop_tx.send(());
        if let Err(e) = handle.await {
            tracing::error!("Monitoring task ended abnormally: {}", e);
        }
        tracing::info!("Monitoring stopped");
        true
    }

    pub async fn status(&self) -> SchedulerStatus {
        match &*self.state.lock().await {
            State::Stopped => SchedulerStatus::Stopped,
            State::Running { interval, .. } => SchedulerStatus::Running {
                interval: *interval,
            },
        }
    }

    /// Run a single tick outside the loop.
    pub async fn run_tick(&self) -> TickSummary {
        self.monitor.tick().await
    }
}

async fn run_monitor_loop(
    monitor: Arc<Monitor>,
    interval: Duration,
    mut stop_rx: broadcast::Receiver<()>,
) {
    loop {
        let summary = monitor.tick().await;
        tracing::info!(
            "Checked {} endpoints ({} online), next check in {:?}",
            summary.probed,
            summary.online,
            interval
        );

        // A stop sent mid-tick is buffered and ends the wait right away
        tokio::select! {
            _ = stop_rx.recv() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Status;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::{tempdir, TempDir};
    use tokio_test::{assert_err, assert_ok};

    type Hook = Box<dyn Fn(&str) + Send + Sync>;

    /// Probe with fixed answers per endpoint; unknown endpoints are unreachable.
    #[derive(Default)]
    struct ScriptedProbe {
        latencies: HashMap<String, Duration>,
        calls: AtomicUsize,
        delay: Duration,
        /// Runs before each answer, to change the environment mid-tick.
        before: Option<Hook>,
    }

    impl ScriptedProbe {
        fn with(pairs: &[(&str, u64)]) -> Self {
            Self {
                latencies: pairs
                    .iter()
                    .map(|(e, ms)| (e.to_string(), Duration::from_millis(*ms)))
                    .collect(),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl Probe for ScriptedProbe {
        async fn probe(&self, endpoint: &str) -> Option<Duration> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if let Some(hook) = &self.before {
                hook(endpoint);
            }
            self.latencies.get(endpoint).copied()
        }
    }

    struct Fixture {
        dir: TempDir,
        registry: Arc<Registry>,
        log: Arc<EventLog>,
        probe: Arc<ScriptedProbe>,
        renderer: ReportRenderer,
        scheduler: Scheduler,
    }

    fn fixture(probe: ScriptedProbe) -> Fixture {
        let dir = tempdir().unwrap();
        let registry = Arc::new(Registry::open(dir.path().join("servers.json")).unwrap());
        let log = Arc::new(EventLog::open(dir.path().join("monitoring_log.json")).unwrap());
        let probe = Arc::new(probe);
        let renderer = ReportRenderer::new(dir.path().join("reports"));
        let scheduler = Scheduler::new(
            registry.clone(),
            log.clone(),
            probe.clone(),
            renderer.clone(),
        );
        Fixture {
            dir,
            registry,
            log,
            probe,
            renderer,
            scheduler,
        }
    }

    #[tokio::test]
    async fn test_tick_records_both_stores() {
        let f = fixture(ScriptedProbe::with(&[("a.test", 10)]));
        f.registry.add("a.test").unwrap();
        f.registry.add("b.test").unwrap();

        let summary = f.scheduler.run_tick().await;
        assert_eq!(
            summary,
            TickSummary {
                probed: 2,
                online: 1,
                recorded: 2
            }
        );

        let log = f.log.load_all();
        assert_eq!(log.len(), 2);
        assert_eq!((log[0].endpoint.as_str(), log[0].status), ("a.test", Status::Online));
        assert_eq!((log[1].endpoint.as_str(), log[1].status), ("b.test", Status::Offline));

        let a = f.registry.history("a.test").unwrap();
        let b = f.registry.history("b.test").unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
        assert_eq!(a[0].response_time, Some(Duration::from_millis(10)));
        assert_eq!(b[0].response_time, None);
        assert_eq!(a[0].timestamp, log[0].timestamp);
        assert_eq!(b[0].timestamp, log[1].timestamp);
        assert!(f.renderer.report_path().exists());
    }

    #[tokio::test]
    async fn test_removed_endpoint_keeps_log_history() {
        let f = fixture(ScriptedProbe::with(&[("a.test", 10)]));
        f.registry.add("a.test").unwrap();
        f.registry.add("b.test").unwrap();
        f.scheduler.run_tick().await;
        let before = f.log.load_all();

        assert!(f.registry.remove("a.test").unwrap());
        assert_eq!(f.registry.list(), vec!["b.test"]);
        assert_eq!(f.log.load_all(), before);

        f.scheduler.run_tick().await;
        let after = f.log.load_all();
        assert_eq!(after.len(), 3);
        assert_eq!(after[..2], before[..]);
        assert_eq!(after[2].endpoint, "b.test");
    }

    #[tokio::test]
    async fn test_empty_registry_still_renders() {
        let f = fixture(ScriptedProbe::default());
        let summary = f.scheduler.run_tick().await;
        assert_eq!(summary, TickSummary::default());
        assert!(f.log.is_empty());
        let html = std::fs::read_to_string(f.renderer.report_path()).unwrap();
        assert!(html.contains("</html>"));
    }

    #[tokio::test]
    async fn test_entries_per_tick_match_registered_endpoints() {
        let f = fixture(ScriptedProbe::with(&[("a.test", 1), ("c.test", 2)]));
        for e in ["a.test", "b.test", "c.test"] {
            f.registry.add(e).unwrap();
        }
        f.scheduler.run_tick().await;
        assert_eq!(f.log.len(), 3);

        f.registry.add("d.test").unwrap();
        f.scheduler.run_tick().await;
        assert_eq!(f.log.len(), 7);
        assert_eq!(f.registry.history("a.test").unwrap().len(), 2);
        assert_eq!(f.registry.history("d.test").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_start_then_stop_runs_one_tick() {
        let f = fixture(ScriptedProbe::with(&[("a.test", 10)]));
        f.registry.add("a.test").unwrap();

        assert_ok!(f.scheduler.start(Duration::from_secs(5)).await);
        assert_eq!(
            f.scheduler.status().await,
            SchedulerStatus::Running {
                interval: Duration::from_secs(5)
            }
        );
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(f.scheduler.stop().await);

        assert_eq!(f.scheduler.status().await, SchedulerStatus::Stopped);
        assert_eq!(f.probe.calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.log.len(), 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(f.log.len(), 1);
    }

    #[tokio::test]
    async fn test_stop_waits_for_running_tick() {
        let mut probe = ScriptedProbe::with(&[("a.test", 1), ("b.test", 1)]);
        probe.delay = Duration::from_millis(150);
        let f = fixture(probe);
        f.registry.add("a.test").unwrap();
        f.registry.add("b.test").unwrap();

        f.scheduler.start(Duration::from_secs(60)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(f.scheduler.stop().await);

        // The interrupted tick still recorded every endpoint
        assert_eq!(f.log.len(), 2);
        assert_eq!(f.probe.calls.load(Ordering::SeqCst), 2);
        assert!(f.renderer.report_path().exists());
    }

    #[tokio::test]
    async fn test_second_start_rejected() {
        let f = fixture(ScriptedProbe::default());
        f.scheduler.start(Duration::from_secs(30)).await.unwrap();

        assert_eq!(
            f.scheduler.start(Duration::from_secs(5)).await,
            Err(SchedulerError::AlreadyRunning(Duration::from_secs(30)))
        );
        assert!(f.scheduler.stop().await);

        // Restart after a clean stop is allowed
        assert_ok!(f.scheduler.start(Duration::from_secs(5)).await);
        assert!(f.scheduler.stop().await);
    }

    #[test]
    fn test_parse_interval() {
        assert_eq!(parse_interval(" 5 "), Ok(Duration::from_secs(5)));
        assert_eq!(parse_interval("0"), Err(SchedulerError::InvalidInterval));
        assert_eq!(parse_interval("five"), Err(SchedulerError::InvalidInterval));
        assert_eq!(parse_interval("-1"), Err(SchedulerError::InvalidInterval));
    }

    #[tokio::test]
    async fn test_invalid_interval_and_idle_stop() {
        let f = fixture(ScriptedProbe::default());
        assert_err!(f.scheduler.start(Duration::ZERO).await);
        assert_eq!(f.scheduler.status().await, SchedulerStatus::Stopped);
        assert!(!f.scheduler.stop().await);
    }

    #[tokio::test]
    async fn test_loop_repeats_after_interval() {
        let f = fixture(ScriptedProbe::with(&[("a.test", 1)]));
        f.registry.add("a.test").unwrap();

        f.scheduler.start(Duration::from_secs(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        f.scheduler.stop().await;

        assert_eq!(f.log.len(), 2);
        let history = f.registry.history("a.test").unwrap();
        assert!(history[0].timestamp <= history[1].timestamp);
    }

    #[tokio::test]
    async fn test_failed_log_append_retracts_check() {
        let f = fixture(ScriptedProbe::with(&[("a.test", 10)]));
        f.registry.add("a.test").unwrap();
        // A directory where the log file goes makes every append fail
        let log_path = f.dir.path().join("monitoring_log.json");
        std::fs::create_dir(&log_path).unwrap();

        let summary = f.scheduler.run_tick().await;
        assert_eq!(summary.recorded, 0);
        assert!(f.log.is_empty());
        assert!(f.registry.history("a.test").unwrap().is_empty());

        let reloaded = Registry::open(f.dir.path().join("servers.json")).unwrap();
        assert!(reloaded.history("a.test").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_storage_failure_skips_only_that_endpoint() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("monitoring_log.json");
        let hook_path = log_path.clone();
        let mut probe = ScriptedProbe::with(&[("a.test", 10), ("b.test", 20)]);
        probe.before = Some(Box::new(move |endpoint: &str| {
            // a.test finds the log path blocked until the first entry is written
            if endpoint == "a.test" && !hook_path.exists() {
                std::fs::create_dir(&hook_path).unwrap();
            } else if endpoint == "b.test" && hook_path.is_dir() {
                std::fs::remove_dir(&hook_path).unwrap();
            }
        }));
        let registry = Arc::new(Registry::open(dir.path().join("servers.json")).unwrap());
        let log = Arc::new(EventLog::open(&log_path).unwrap());
        let scheduler = Scheduler::new(
            registry.clone(),
            log.clone(),
            Arc::new(probe),
            ReportRenderer::new(dir.path().join("reports")),
        );
        registry.add("a.test").unwrap();
        registry.add("b.test").unwrap();

        let summary = scheduler.run_tick().await;
        assert_eq!(
            summary,
            TickSummary {
                probed: 2,
                online: 2,
                recorded: 1
            }
        );
        let entries = log.load_all();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].endpoint, "b.test");
        assert!(registry.history("a.test").unwrap().is_empty());
        assert_eq!(registry.history("b.test").unwrap().len(), 1);

        // The next tick records every endpoint again
        assert_eq!(scheduler.run_tick().await.recorded, 2);
        assert_eq!(log.len(), 3);
        for endpoint in ["a.test", "b.test"] {
            let logged = log
                .load_all()
                .iter()
                .filter(|e| e.endpoint == endpoint)
                .count();
            assert_eq!(registry.history(endpoint).unwrap().len(), logged);
        }
    }

    #[tokio::test]
    async fn test_status_answers_while_stopping() {
        let mut probe = ScriptedProbe::with(&[("a.test", 1)]);
        probe.delay = Duration::from_millis(400);
        let f = fixture(probe);
        f.registry.add("a.test").unwrap();
        f.scheduler.start(Duration::from_secs(60)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let (stopped, status) = tokio::join!(f.scheduler.stop(), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            tokio::time::timeout(Duration::from_millis(100), f.scheduler.status()).await
        });

        assert!(stopped);
        assert!(matches!(status, Ok(SchedulerStatus::Stopped)));
        assert_eq!(f.log.len(), 1);
    }
}

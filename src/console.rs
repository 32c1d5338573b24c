//! Interactive console: a numbered menu over stdin.

use std::io::Write;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};

use crate::scheduler::parse_interval;
use crate::state::AppState;

const MENU: &str = "\
-----------------------------------------------------------------
1. Add an endpoint
2. Remove an endpoint
3. List endpoints
4. Start monitoring
5. Stop monitoring
6. Exit";

/// Run the console on stdin/stdout until the user exits or input ends.
pub async fn run(state: &AppState) -> std::io::Result<()> {
    let input = BufReader::new(tokio::io::stdin());
    let mut out = std::io::stdout();
    run_with(state, input, &mut out).await
}

async fn prompt<R, W>(
    lines: &mut Lines<R>,
    out: &mut W,
    text: &str,
) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    write!(out, "{}", text)?;
    out.flush()?;
    Ok(lines.next_line().await?.map(|l| l.trim().to_string()))
}

/// Drive the menu from any line source. Exiting stops a running monitor.
pub async fn run_with<R, W>(state: &AppState, input: R, out: &mut W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();

    loop {
        writeln!(out, "{}", MENU)?;
        let Some(choice) = prompt(&mut lines, out, "Enter the number of the action: ").await?
        else {
            break;
        };

        match choice.as_str() {
            "1" => {
                let Some(endpoint) = prompt(&mut lines, out, "Hostname or IP address to add: ").await?
                else {
                    break;
                };
                match state.registry.add(&endpoint) {
                    Ok(true) => writeln!(out, "Endpoint {} added.", endpoint)?,
                    Ok(false) => writeln!(out, "Endpoint {} is already monitored.", endpoint)?,
                    Err(e) => writeln!(out, "Could not add {}: {}", endpoint, e)?,
                }
            }
            "2" => {
                let Some(endpoint) = prompt(&mut lines, out, "Hostname or IP address to remove: ").await?
                else {
                    break;
                };
                match state.registry.remove(&endpoint) {
                    Ok(true) => writeln!(out, "Endpoint {} removed.", endpoint)?,
                    Ok(false) => writeln!(out, "Endpoint {} is not monitored.", endpoint)?,
                    Err(e) => writeln!(out, "Could not remove {}: {}", endpoint, e)?,
                }
            }
            "3" => {
                writeln!(out, "Monitored endpoints:")?;
                for endpoint in state.registry.list() {
                    writeln!(out, "{}", endpoint)?;
                }
            }
            "4" => {
                let Some(raw) = prompt(&mut lines, out, "Check interval in seconds: ").await?
                else {
                    break;
                };
                match parse_interval(&raw) {
                    Ok(interval) => match state.scheduler.start(interval).await {
                        Ok(()) => writeln!(
                            out,
                            "Monitoring started, checking every {}s.",
                            interval.as_secs()
                        )?,
                        Err(e) => writeln!(out, "{}", e)?,
                    },
                    Err(e) => writeln!(out, "{}", e)?,
                }
            }
            "5" => {
                if state.scheduler.stop().await {
                    writeln!(out, "Monitoring stopped.")?;
                } else {
                    writeln!(out, "Monitoring is not running.")?;
                }
            }
            "6" | "q" | "quit" | "exit" => break,
            _ => writeln!(out, "Invalid choice, try again.")?,
        }
    }

    state.scheduler.stop().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::probe::ProbeKind;
    use crate::scheduler::SchedulerStatus;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    fn test_state() -> (TempDir, AppState) {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = dir.path().to_path_buf();
        config.report_dir = dir.path().join("reports");
        config.probe.kind = ProbeKind::Tcp;
        config.probe.timeout = Duration::from_millis(200);
        (dir, AppState::open(config).unwrap())
    }

    async fn run_script(state: &AppState, script: &str) -> String {
        let mut out = Vec::new();
        run_with(state, script.as_bytes(), &mut out).await.unwrap();
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn test_add_list_remove() {
        let (_dir, state) = test_state();
        let out = run_script(&state, "1\na.test\n1\nb.test\n2\na.test\n3\n6\n").await;

        assert!(out.contains("Endpoint a.test added."));
        assert!(out.contains("Endpoint a.test removed."));
        assert_eq!(state.registry.list(), vec!["b.test"]);
        let listing = out.split("Monitored endpoints:").nth(1).unwrap();
        assert!(listing.contains("b.test"));
    }

    #[tokio::test]
    async fn test_bad_input_is_reported() {
        let (_dir, state) = test_state();
        let out = run_script(&state, "9\n4\nsoon\n5\n").await;

        assert!(out.contains("Invalid choice, try again."));
        assert!(out.contains("interval must be a whole number of seconds"));
        assert!(out.contains("Monitoring is not running."));
        assert_eq!(state.scheduler.status().await, SchedulerStatus::Stopped);
    }

    #[tokio::test]
    async fn test_end_of_input_stops_monitoring() {
        let (_dir, state) = test_state();
        let out = run_script(&state, "4\n60\n4\n60\n").await;

        assert!(out.contains("Monitoring started, checking every 60s."));
        assert!(out.contains("monitoring is already running"));
        assert_eq!(state.scheduler.status().await, SchedulerStatus::Stopped);
    }
}

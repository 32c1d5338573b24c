//! Static HTML status report rendered from the event log.

use askama::Template;
use chrono::{Local, Utc};
use rust_embed::RustEmbed;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::db::{LogEntry, Status};

/// File name of the rendered report inside the report directory.
pub const REPORT_FILE: &str = "monitoring_report.html";

/// Stylesheets linked by the report, also served by the web UI.
#[derive(RustEmbed)]
#[folder = "assets/"]
pub struct Assets;

/// Report error types.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("template error: {0}")]
    Template(#[from] askama::Error),
}

struct ReportRow<'a> {
    endpoint: &'a str,
    status: &'static str,
    timestamp: String,
}

#[derive(Template)]
#[template(path = "monitoring_report.html")]
struct ReportPage<'a> {
    generated_at: String,
    online: usize,
    offline: usize,
    rows: Vec<ReportRow<'a>>,
}

/// ctime-style local timestamp, e.g. `Tue Mar  5 14:02:11 2024`.
fn display_time(ts: &chrono::DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%a %b %e %H:%M:%S %Y").to_string()
}

/// Writes the report and its stylesheets to a fixed directory.
#[derive(Debug, Clone)]
pub struct ReportRenderer {
    dir: PathBuf,
}

impl ReportRenderer {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn report_path(&self) -> PathBuf {
        self.dir.join(REPORT_FILE)
    }

    /// Render the HTML for the given log entries.
    pub fn render_html(&self, entries: &[LogEntry]) -> Result<String, ReportError> {
        let online = entries
            .iter()
            .filter(|e| e.status == Status::Online)
            .count();

        let page = ReportPage {
            generated_at: display_time(&Utc::now()),
            online,
            offline: entries.len() - online,
            rows: entries
                .iter()
                .map(|e| ReportRow {
                    endpoint: &e.endpoint,
                    status: e.status.as_str(),
                    timestamp: display_time(&e.timestamp),
                })
                .collect(),
        };

        Ok(page.render()?)
    }

    /// Render the report to `<dir>/monitoring_report.html` and return its path.
    pub fn render(&self, entries: &[LogEntry]) -> Result<PathBuf, ReportError> {
        let html = self.render_html(entries)?;

        fs::create_dir_all(&self.dir).map_err(|source| ReportError::Io {
            path: self.dir.clone(),
            source,
        })?;

        for name in ["reset.css", "style.css"] {
            if let Some(asset) = Assets::get(name) {
                self.write_file(name, &asset.data)?;
            }
        }

        let path = self.write_file(REPORT_FILE, html.as_bytes())?;
        tracing::debug!("Rendered report with {} entries to {}", entries.len(), path.display());
        Ok(path)
    }

    /// Replace a file in the report directory without exposing a partial write.
    fn write_file(&self, name: &str, data: &[u8]) -> Result<PathBuf, ReportError> {
        let path = self.dir.join(name);
        let tmp = self.dir.join(format!(".{}.tmp", name));

        fs::write(&tmp, data)
            .and_then(|_| fs::rename(&tmp, &path))
            .map_err(|source| ReportError::Io {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }
}

//! Per-site report output
//!
//! The scheduler hands every finished `SiteStats` to a `SiteReporter`. How the
//! report is rendered is up to the reporter.

use std::fs::File;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use serde::Serialize;

use shared_crawler_api::{CrawlTarget, SiteStats};

const SEPARATOR: &str =
    "----------------------------------------------------------------------------";

pub trait SiteReporter: Send + Sync {
    fn report(&self, target: &CrawlTarget, stats: &SiteStats) -> Result<()>;
}

fn format_ms(value: Option<f64>) -> String {
    match value {
        Some(ms) => format!("{ms:.2}ms"),
        None => "N.A".to_string(),
    }
}

/// Render the human readable block printed for one site
pub fn render_site_report(target: &CrawlTarget, stats: &SiteStats) -> String {
    format!(
        "{SEPARATOR}\n\
         Website: {}\n\
         Depth (distance from the starting pages): {}\n\
         Number of Pages Discovered: {}\n\
         Number of Pages Failed to Discover: {}\n\
         Number of Linked Sites: {}\n\
         Min. Response Time: {}\n\
         Max. Response Time: {}\n\
         Average Response Time: {}\n",
        stats.hostname,
        target.depth,
        stats.pages_discovered(),
        stats.failed_pages,
        stats.linked_sites.len(),
        format_ms(stats.min_response_time()),
        format_ms(stats.max_response_time()),
        format_ms(stats.average_response_time()),
    )
}

/// Prints each report to stdout
pub struct ConsoleReporter;

impl SiteReporter for ConsoleReporter {
    fn report(&self, target: &CrawlTarget, stats: &SiteStats) -> Result<()> {
        print!("{}", render_site_report(target, stats));
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct SiteReportRow<'a> {
    hostname: &'a str,
    depth: usize,
    pages_discovered: usize,
    pages_failed: usize,
    linked_sites: String,
    min_response_time_ms: Option<f64>,
    max_response_time_ms: Option<f64>,
    average_response_time_ms: Option<f64>,
}

/// Appends one CSV row per site
pub struct CsvReporter<W: std::io::Write> {
    writer: Mutex<csv::Writer<W>>,
}

impl CsvReporter<File> {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("failed to create report file {}", path.display()))?;
        Ok(Self::from_writer(file))
    }
}

impl<W: std::io::Write> CsvReporter<W> {
    pub fn from_writer(writer: W) -> Self {
        Self {
            writer: Mutex::new(csv::Writer::from_writer(writer)),
        }
    }

    /// Flush and hand back the underlying writer
    #[cfg(test)]
    pub fn into_inner(self) -> Result<W> {
        let writer = self
            .writer
            .into_inner()
            .map_err(|_| anyhow::anyhow!("report writer lock poisoned"))?;
        writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("failed to flush report: {}", e.error()))
    }
}

impl<W: std::io::Write + Send> SiteReporter for CsvReporter<W> {
    fn report(&self, target: &CrawlTarget, stats: &SiteStats) -> Result<()> {
        let row = SiteReportRow {
            hostname: &stats.hostname,
            depth: target.depth,
            pages_discovered: stats.pages_discovered(),
            pages_failed: stats.failed_pages,
            linked_sites: stats.linked_sites.join(";"),
            min_response_time_ms: stats.min_response_time(),
            max_response_time_ms: stats.max_response_time(),
            average_response_time_ms: stats.average_response_time(),
        };

        let mut writer = self
            .writer
            .lock()
            .map_err(|_| anyhow::anyhow!("report writer lock poisoned"))?;
        writer.serialize(&row).context("failed to write report row")?;
        writer.flush().context("failed to flush report")?;
        Ok(())
    }
}

/// Sends every report to each inner reporter, in order
#[derive(Default)]
pub struct MultiReporter {
    reporters: Vec<Box<dyn SiteReporter>>,
}

impl MultiReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, reporter: impl SiteReporter + 'static) -> Self {
        self.reporters.push(Box::new(reporter));
        self
    }
}

impl SiteReporter for MultiReporter {
    fn report(&self, target: &CrawlTarget, stats: &SiteStats) -> Result<()> {
        let mut first_error = None;
        for reporter in &self.reporters {
            if let Err(e) = reporter.report(target, stats) {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

use anyhow::{Context, Result};
use std::env;
use std::sync::Arc;
use tracing::info;

use shared_crawler_api::config::CrawlConfig;

mod crawl_loop;
mod extractor;
mod report;
mod site_crawler;
mod stats;
mod web_visitor;

use crawl_loop::{CrawlLoop, CrawlLoopSettings};
use report::{ConsoleReporter, CsvReporter, MultiReporter};
use web_visitor::RawHttpVisitor;

const DEFAULT_CONFIG_PATH: &str = "config.txt";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let config_path = env::args()
        .nth(1)
        .or_else(|| env::var("SPIDER_CONFIG").ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    let text = std::fs::read_to_string(&config_path)
        .with_context(|| format!("failed to read config file {}", config_path))?;
    let config = CrawlConfig::parse(&text)
        .with_context(|| format!("invalid config file {}", config_path))?;

    info!(
        "crawling {} start urls with {} workers (depth limit {}, pages limit {:?}, linked sites limit {})",
        config.start_urls.len(),
        config.max_threads,
        config.depth_limit,
        config.pages_limit,
        config.linked_sites_limit
    );

    let mut reporter = MultiReporter::new().with(ConsoleReporter);
    if let Ok(csv_path) = env::var("SPIDER_REPORT_CSV") {
        reporter = reporter.with(CsvReporter::create(&csv_path)?);
        info!("writing site reports to {}", csv_path);
    }

    let crawl_loop = CrawlLoop::new(
        CrawlLoopSettings::from_config(&config),
        RawHttpVisitor::from_config(&config),
        Arc::new(reporter),
    );
    crawl_loop.add_start_urls(config.start_urls.as_slice()).await;

    let summary = crawl_loop.run().await;
    info!("visited hosts: {}", summary.visited_hosts.join(", "));

    println!(
        "{}",
        serde_json::to_string_pretty(&summary.stats).context("failed to render summary")?
    );

    Ok(())
}

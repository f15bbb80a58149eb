use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use tokio::time::sleep;

use shared_crawler_api::{PageVisit, SiteStats};

use crate::extractor::extract_urls;
use crate::web_visitor::WebVisitor;

/// Pending paths of one host. A path is marked visited when it is queued, so
/// two pages linking to it cannot both queue it.
#[derive(Debug)]
struct PageFrontier {
    pending: VecDeque<String>,
    visited: HashSet<String>,
}

impl PageFrontier {
    fn starting_at_root() -> Self {
        let mut frontier = PageFrontier {
            pending: VecDeque::new(),
            visited: HashSet::new(),
        };
        frontier.push("/");
        frontier
    }

    /// Returns false if the path was already seen during this run
    fn push(&mut self, path: &str) -> bool {
        if !self.visited.insert(path.to_string()) {
            return false;
        }
        self.pending.push_back(path.to_string());
        true
    }

    fn pop(&mut self) -> Option<String> {
        self.pending.pop_front()
    }
}

/// Crawls the pages of a single host, one request at a time.
pub struct SiteCrawler<'a, V> {
    hostname: String,
    visitor: &'a V,
    pages_limit: Option<usize>,
    crawl_delay: Duration,
    frontier: PageFrontier,
}

impl<'a, V: WebVisitor> SiteCrawler<'a, V> {
    pub fn new(
        hostname: impl Into<String>,
        visitor: &'a V,
        pages_limit: Option<usize>,
        crawl_delay: Duration,
    ) -> Self {
        SiteCrawler {
            hostname: hostname.into(),
            visitor,
            pages_limit,
            crawl_delay,
            frontier: PageFrontier::starting_at_root(),
        }
    }

    fn below_page_limit(&self, pages_fetched: usize) -> bool {
        self.pages_limit.map_or(true, |limit| pages_fetched < limit)
    }

    /// Crawl until the host runs out of pages or the page limit is reached.
    /// Fetch failures are counted, never retried.
    pub async fn crawl(mut self) -> SiteStats {
        let mut pages: Vec<PageVisit> = Vec::new();
        let mut failed_pages = 0usize;
        let mut linked_sites: Vec<String> = Vec::new();
        let mut seen_sites: HashSet<String> = HashSet::new();
        let mut first_request = true;

        tracing::info!("starting crawl of {}", self.hostname);

        while self.below_page_limit(pages.len()) {
            let Some(path) = self.frontier.pop() else {
                break;
            };

            if !first_request {
                sleep(self.crawl_delay).await;
            }
            first_request = false;

            let page = match self.visitor.fetch_page(&self.hostname, &path).await {
                Ok(page) => page,
                Err(e) => {
                    tracing::warn!("failed fetching {}{}: {}", self.hostname, path, e);
                    failed_pages += 1;
                    continue;
                }
            };

            let response_time_ms = page.response_time.as_nanos() as f64 / 1_000_000.0;
            tracing::debug!(
                "fetched {}{} ({} bytes, {:.1}ms)",
                self.hostname,
                path,
                page.body.len(),
                response_time_ms
            );
            pages.push(PageVisit {
                url: format!("{}{}", self.hostname, path),
                response_time_ms,
            });

            for (host, link_path) in extract_urls(&page.body) {
                if host.is_empty() || host == self.hostname {
                    self.frontier.push(&link_path);
                } else if seen_sites.insert(host.clone()) {
                    linked_sites.push(host);
                }
            }
        }

        tracing::info!(
            "finished crawl of {} (pages {}, failed {}, linked sites {})",
            self.hostname,
            pages.len(),
            failed_pages,
            linked_sites.len()
        );

        SiteStats::new(self.hostname, pages, failed_pages, linked_sites)
    }
}

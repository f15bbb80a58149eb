use serde::{Deserialize, Serialize};

pub mod config;

/// A host admitted to the fleet frontier, with its hop distance from the seeds
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CrawlTarget {
    pub hostname: String,
    pub depth: usize,
}

impl CrawlTarget {
    pub fn new(hostname: impl Into<String>, depth: usize) -> Self {
        Self {
            hostname: hostname.into(),
            depth,
        }
    }
}

/// One successfully fetched page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageVisit {
    // host + path, e.g. "example.com/about"
    pub url: String,
    pub response_time_ms: f64,
}

/// Result of crawling a single host. Built once by the site crawler and
/// handed to the reporter; nothing mutates it afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteStats {
    pub hostname: String,
    pub pages: Vec<PageVisit>,
    pub failed_pages: usize,
    pub linked_sites: Vec<String>,
}

impl SiteStats {
    pub fn new(
        hostname: String,
        pages: Vec<PageVisit>,
        failed_pages: usize,
        linked_sites: Vec<String>,
    ) -> Self {
        Self {
            hostname,
            pages,
            failed_pages,
            linked_sites,
        }
    }

    pub fn pages_discovered(&self) -> usize {
        self.pages.len()
    }

    /// Fastest response time, `None` when no page was fetched
    pub fn min_response_time(&self) -> Option<f64> {
        self.response_times().reduce(f64::min)
    }

    /// Slowest response time, `None` when no page was fetched
    pub fn max_response_time(&self) -> Option<f64> {
        self.response_times().reduce(f64::max)
    }

    /// Arithmetic mean of the response times, `None` when no page was fetched
    pub fn average_response_time(&self) -> Option<f64> {
        if self.pages.is_empty() {
            return None;
        }
        let total: f64 = self.response_times().sum();
        Some(total / self.pages.len() as f64)
    }

    fn response_times(&self) -> impl Iterator<Item = f64> + '_ {
        self.pages.iter().map(|p| p.response_time_ms)
    }
}

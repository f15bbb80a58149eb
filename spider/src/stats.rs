//! Statistics tracking for the crawl fleet
//!
//! Thread-safe atomic counters shared by the scheduler and its workers.

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};

use shared_crawler_api::SiteStats;

/// Thread-safe statistics counters for one crawl run
#[derive(Default)]
pub struct CrawlStats {
    pub hosts_admitted: AtomicUsize,
    pub hosts_crawled: AtomicUsize,
    pub pages_fetched: AtomicUsize,
    pub pages_failed: AtomicUsize,
    pub peak_active_workers: AtomicUsize,
}

impl CrawlStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_admitted(&self, count: usize) {
        self.hosts_admitted.fetch_add(count, Ordering::Relaxed);
    }

    /// Fold a finished host into the totals
    pub fn record_site(&self, site: &SiteStats) {
        self.hosts_crawled.fetch_add(1, Ordering::Relaxed);
        self.pages_fetched
            .fetch_add(site.pages_discovered(), Ordering::Relaxed);
        self.pages_failed
            .fetch_add(site.failed_pages, Ordering::Relaxed);
    }

    pub fn observe_active(&self, active: usize) {
        self.peak_active_workers.fetch_max(active, Ordering::Relaxed);
    }

    /// Get a snapshot of current stats
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hosts_admitted: self.hosts_admitted.load(Ordering::Relaxed),
            hosts_crawled: self.hosts_crawled.load(Ordering::Relaxed),
            pages_fetched: self.pages_fetched.load(Ordering::Relaxed),
            pages_failed: self.pages_failed.load(Ordering::Relaxed),
            peak_active_workers: self.peak_active_workers.load(Ordering::Relaxed),
        }
    }
}

/// Serializable snapshot of the counters
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub hosts_admitted: usize,
    pub hosts_crawled: usize,
    pub pages_fetched: usize,
    pub pages_failed: usize,
    pub peak_active_workers: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_crawler_api::PageVisit;

    #[test]
    fn test_record_site_and_peak() {
        let stats = CrawlStats::new();
        let site = SiteStats::new(
            "a.com".to_string(),
            vec![PageVisit {
                url: "a.com/".to_string(),
                response_time_ms: 1.0,
            }],
            2,
            vec![],
        );

        stats.add_admitted(1);
        stats.record_site(&site);
        stats.observe_active(3);
        stats.observe_active(1);

        assert_eq!(
            stats.snapshot(),
            StatsSnapshot {
                hosts_admitted: 1,
                hosts_crawled: 1,
                pages_fetched: 1,
                pages_failed: 2,
                peak_active_workers: 3,
            }
        );
    }
}

use std::{
    collections::{HashSet, VecDeque},
    sync::Arc,
    time::Duration,
};

use tokio::{sync::Mutex, task::JoinSet};

use shared_crawler_api::{config::CrawlConfig, CrawlTarget, SiteStats};

use crate::{
    extractor::parse_host,
    report::SiteReporter,
    site_crawler::SiteCrawler,
    stats::{CrawlStats, StatsSnapshot},
    web_visitor::WebVisitor,
};

#[derive(Debug, Clone)]
pub struct CrawlLoopSettings {
    pub max_threads: usize,
    pub depth_limit: usize,
    pub pages_limit: Option<usize>,
    pub linked_sites_limit: usize,
    pub crawl_delay: Duration,
}

impl CrawlLoopSettings {
    pub fn from_config(config: &CrawlConfig) -> Self {
        CrawlLoopSettings {
            max_threads: config.max_threads,
            depth_limit: config.depth_limit,
            pages_limit: config.pages_limit,
            linked_sites_limit: config.linked_sites_limit,
            crawl_delay: config.crawl_delay(),
        }
    }
}

/// Everything the scheduler and its workers share. Only touched under the
/// `CrawlLoop` lock.
#[derive(Debug, Default)]
struct FleetState {
    frontier: VecDeque<CrawlTarget>,
    visited_hosts: HashSet<String>,
    // admission order of `visited_hosts`
    admitted: Vec<String>,
    active_workers: usize,
}

impl FleetState {
    /// Queue a host unless it was seen before. The host counts as visited
    /// from this point on.
    fn admit(&mut self, hostname: &str, depth: usize) -> bool {
        if !self.visited_hosts.insert(hostname.to_string()) {
            return false;
        }
        self.admitted.push(hostname.to_string());
        self.frontier.push_back(CrawlTarget::new(hostname, depth));
        true
    }

    fn is_finished(&self) -> bool {
        self.frontier.is_empty() && self.active_workers == 0
    }
}

/// Outcome of a finished run
#[derive(Debug, Clone)]
pub struct CrawlSummary {
    /// Every host that was scheduled, in admission order
    pub visited_hosts: Vec<String>,
    pub stats: StatsSnapshot,
}

/// Schedules one site crawler per host, never more than `max_threads` at a
/// time, and feeds hosts discovered by finished crawls back into the frontier.
pub struct CrawlLoop<V> {
    settings: Arc<CrawlLoopSettings>,
    state: Arc<Mutex<FleetState>>,
    visitor: Arc<V>,
    reporter: Arc<dyn SiteReporter>,
    stats: Arc<CrawlStats>,
}

impl<V> CrawlLoop<V>
where
    V: WebVisitor + Send + Sync + 'static,
{
    /// Panics if `settings.max_threads` is zero; `CrawlConfig::validate`
    /// rejects that value before a loop is ever built.
    pub fn new(settings: CrawlLoopSettings, visitor: V, reporter: Arc<dyn SiteReporter>) -> Self {
        assert!(settings.max_threads > 0, "max_threads must be at least 1");
        CrawlLoop {
            settings: Arc::new(settings),
            state: Arc::new(Mutex::new(FleetState::default())),
            visitor: Arc::new(visitor),
            reporter,
            stats: Arc::new(CrawlStats::new()),
        }
    }

    /// Seed the frontier at depth 0. Returns how many new hosts were queued.
    pub async fn add_start_urls<S: AsRef<str>>(&self, urls: &[S]) -> usize {
        let mut state = self.state.lock().await;
        let mut added = 0;
        for url in urls {
            let host = parse_host(url.as_ref().trim()).to_ascii_lowercase();
            if host.is_empty() {
                tracing::warn!("ignoring start url without a host: {}", url.as_ref());
                continue;
            }
            if state.admit(&host, 0) {
                added += 1;
            }
        }
        self.stats.add_admitted(added);
        added
    }

    /// Run until the frontier is empty and no worker is left.
    pub async fn run(&self) -> CrawlSummary {
        let max_threads = self.settings.max_threads;
        let mut workers = JoinSet::new();

        loop {
            {
                let mut state = self.state.lock().await;
                // both halves observed under the same lock
                if state.is_finished() {
                    break;
                }

                while state.active_workers < max_threads {
                    let Some(target) = state.frontier.pop_front() else {
                        break;
                    };
                    state.active_workers += 1;
                    self.stats.observe_active(state.active_workers);
                    tracing::info!(
                        "launching worker for {} (depth {}, active {})",
                        target.hostname,
                        target.depth,
                        state.active_workers
                    );
                    workers.spawn(run_worker(
                        target,
                        self.settings.clone(),
                        self.state.clone(),
                        self.visitor.clone(),
                        self.reporter.clone(),
                        self.stats.clone(),
                    ));
                }
            }

            // Wait for any worker to finish, then re-check everything. Waking
            // up with nothing new to schedule just leads back here.
            match workers.join_next().await {
                Some(Ok(())) | None => {}
                Some(Err(e)) => {
                    // the worker died before releasing its slot
                    tracing::error!("crawl worker failed: {}", e);
                    let mut state = self.state.lock().await;
                    state.active_workers = state.active_workers.saturating_sub(1);
                }
            }
        }

        let visited_hosts = self.state.lock().await.admitted.clone();
        let stats = self.stats.snapshot();
        tracing::info!(
            "crawl finished: {} hosts, {} pages, {} failed, peak {} workers",
            stats.hosts_crawled,
            stats.pages_fetched,
            stats.pages_failed,
            stats.peak_active_workers
        );

        CrawlSummary {
            visited_hosts,
            stats,
        }
    }
}

/// Crawl one host outside the lock, then merge its results under the lock
/// and give the worker slot back.
async fn run_worker<V: WebVisitor>(
    target: CrawlTarget,
    settings: Arc<CrawlLoopSettings>,
    state: Arc<Mutex<FleetState>>,
    visitor: Arc<V>,
    reporter: Arc<dyn SiteReporter>,
    stats: Arc<CrawlStats>,
) {
    let site = SiteCrawler::new(
        target.hostname.as_str(),
        &*visitor,
        settings.pages_limit,
        settings.crawl_delay,
    )
    .crawl()
    .await;

    stats.record_site(&site);

    let mut state = state.lock().await;
    if let Err(e) = reporter.report(&target, &site) {
        tracing::warn!("failed to report {}: {:#}", site.hostname, e);
    }
    let admitted = merge_linked_sites(&mut state, &target, &site, &settings);
    stats.add_admitted(admitted);
    state.active_workers -= 1;
}

/// Admit up to `linked_sites_limit` of the sites this host links to, unless
/// the host is already at the depth limit.
fn merge_linked_sites(
    state: &mut FleetState,
    target: &CrawlTarget,
    site: &SiteStats,
    settings: &CrawlLoopSettings,
) -> usize {
    if target.depth >= settings.depth_limit {
        return 0;
    }
    site.linked_sites
        .iter()
        .take(settings.linked_sites_limit)
        .filter(|host| state.admit(host, target.depth + 1))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site_crawler::tests::FakeWeb;
    use crate::web_visitor::{FetchedPage, TransportError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    /// Keeps every report it receives
    #[derive(Default)]
    struct CollectingReporter {
        reports: StdMutex<Vec<(CrawlTarget, SiteStats)>>,
    }

    impl CollectingReporter {
        fn targets(&self) -> Vec<CrawlTarget> {
            self.reports
                .lock()
                .unwrap()
                .iter()
                .map(|(t, _)| t.clone())
                .collect()
        }
    }

    impl SiteReporter for CollectingReporter {
        fn report(&self, target: &CrawlTarget, stats: &SiteStats) -> anyhow::Result<()> {
            self.reports
                .lock()
                .unwrap()
                .push((target.clone(), stats.clone()));
            Ok(())
        }
    }

    fn settings(max_threads: usize, depth_limit: usize, linked_sites_limit: usize) -> CrawlLoopSettings {
        CrawlLoopSettings {
            max_threads,
            depth_limit,
            pages_limit: Some(10),
            linked_sites_limit,
            crawl_delay: Duration::ZERO,
        }
    }

    async fn run_with<V: WebVisitor + Send + Sync + 'static>(
        settings: CrawlLoopSettings,
        visitor: V,
        seeds: &[&str],
    ) -> (CrawlSummary, Arc<CollectingReporter>, bool) {
        let reporter = Arc::new(CollectingReporter::default());
        let crawl_loop = CrawlLoop::new(settings, visitor, reporter.clone());
        crawl_loop.add_start_urls(seeds).await;
        let summary = crawl_loop.run().await;
        let idle = crawl_loop.state.lock().await.is_finished();
        (summary, reporter, idle)
    }

    #[tokio::test]
    async fn test_follows_linked_host_one_level() {
        let web = FakeWeb::default()
            .page("a.com", "/", r#"<a href="http://b.com/"> <a href="/sub">"#)
            .page("a.com", "/sub", "")
            .page("b.com", "/", "");

        let (summary, reporter, idle) =
            run_with(settings(4, 1, 10), web, &["http://a.com"]).await;

        let visited: HashSet<String> = summary.visited_hosts.iter().cloned().collect();
        assert_eq!(visited, HashSet::from(["a.com".to_string(), "b.com".to_string()]));

        let targets = reporter.targets();
        assert!(targets.contains(&CrawlTarget::new("a.com", 0)));
        assert!(targets.contains(&CrawlTarget::new("b.com", 1)));

        let a_stats = reporter
            .reports
            .lock()
            .unwrap()
            .iter()
            .find(|(t, _)| t.hostname == "a.com")
            .map(|(_, s)| s.clone())
            .unwrap();
        assert_eq!(a_stats.pages_discovered(), 2);

        assert!(idle);
        assert_eq!(summary.stats.hosts_crawled, 2);
    }

    #[tokio::test]
    async fn test_depth_limit_stops_admission() {
        let web = FakeWeb::default()
            .page("a.com", "/", "http://b.com")
            .page("b.com", "/", "http://c.com")
            .page("c.com", "/", "http://d.com");

        let (summary, reporter, _) = run_with(settings(2, 1, 10), web, &["a.com"]).await;

        assert_eq!(summary.visited_hosts, vec!["a.com", "b.com"]);
        assert_eq!(reporter.targets().len(), 2);
    }

    #[tokio::test]
    async fn test_linked_sites_limit_takes_first_hosts() {
        let web = FakeWeb::default().page(
            "a.com",
            "/",
            "http://b.com http://c.com http://d.com http://e.com",
        );

        let (summary, _, _) = run_with(settings(2, 5, 2), web, &["a.com"]).await;

        assert_eq!(summary.visited_hosts, vec!["a.com", "b.com", "c.com"]);
    }

    #[tokio::test]
    async fn test_each_host_scheduled_once() {
        // a cycle plus duplicate seeds
        let web = FakeWeb::default()
            .page("a.com", "/", "http://b.com http://c.com")
            .page("b.com", "/", "http://a.com http://c.com")
            .page("c.com", "/", "http://a.com http://b.com");

        let (summary, reporter, idle) =
            run_with(settings(3, 10, 10), web, &["a.com", "http://A.com/x", "b.com"]).await;

        let mut targets: Vec<String> = reporter
            .targets()
            .into_iter()
            .map(|t| t.hostname)
            .collect();
        targets.sort();
        assert_eq!(targets, vec!["a.com", "b.com", "c.com"]);
        assert_eq!(summary.visited_hosts.len(), 3);
        assert_eq!(summary.stats.hosts_admitted, 3);
        assert!(idle);
    }

    #[tokio::test]
    async fn test_unreachable_hosts_still_finish() {
        let (summary, reporter, idle) =
            run_with(settings(2, 3, 10), FakeWeb::default(), &["x.com", "y.com", "z.com"]).await;

        assert_eq!(summary.stats.hosts_crawled, 3);
        assert_eq!(summary.stats.pages_failed, 3);
        assert_eq!(reporter.targets().len(), 3);
        assert!(idle);
    }

    #[tokio::test]
    async fn test_no_seeds_finishes_immediately() {
        let empty: [&str; 0] = [];
        let (summary, _, idle) = run_with(settings(2, 3, 10), FakeWeb::default(), &empty).await;
        assert!(summary.visited_hosts.is_empty());
        assert!(idle);
    }

    /// Slow visitor that tracks how many hosts are being fetched at once
    #[derive(Default)]
    struct SlowWeb {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl WebVisitor for SlowWeb {
        async fn fetch_page(&self, host: &str, path: &str) -> Result<FetchedPage, TransportError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            // the seed links to ten more hosts
            let body = if host == "hub.com" && path == "/" {
                (0..10).map(|i| format!("http://site{i}.com ")).collect()
            } else {
                String::new()
            };
            Ok(FetchedPage {
                body: body.into_bytes(),
                response_time: Duration::from_millis(20),
            })
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_active_workers_never_exceed_cap() {
        let reporter = Arc::new(CollectingReporter::default());
        let crawl_loop = CrawlLoop::new(settings(3, 1, 10), SlowWeb::default(), reporter.clone());
        crawl_loop.add_start_urls(&["hub.com"]).await;

        let summary = crawl_loop.run().await;

        assert_eq!(summary.visited_hosts.len(), 11);
        assert_eq!(reporter.targets().len(), 11);
        assert!(summary.stats.peak_active_workers <= 3);
        assert!(crawl_loop.visitor.peak.load(Ordering::SeqCst) <= 3);
        assert!(crawl_loop.state.lock().await.is_finished());
    }

    /// Reporter that panics for one host, taking its worker down
    struct PanickyReporter;

    impl SiteReporter for PanickyReporter {
        fn report(&self, target: &CrawlTarget, _stats: &SiteStats) -> anyhow::Result<()> {
            if target.hostname == "bad.com" {
                panic!("reporter blew up");
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_panicked_worker_releases_slot() {
        let crawl_loop = CrawlLoop::new(
            settings(1, 0, 10),
            FakeWeb::default(),
            Arc::new(PanickyReporter),
        );
        crawl_loop.add_start_urls(&["bad.com", "good.com"]).await;

        let summary = crawl_loop.run().await;

        assert_eq!(summary.visited_hosts, vec!["bad.com", "good.com"]);
        assert!(crawl_loop.state.lock().await.is_finished());
    }

    #[test]
    #[should_panic(expected = "max_threads must be at least 1")]
    fn test_zero_worker_cap_is_rejected() {
        CrawlLoop::new(
            settings(0, 1, 10),
            FakeWeb::default(),
            Arc::new(CollectingReporter::default()),
        );
    }
}

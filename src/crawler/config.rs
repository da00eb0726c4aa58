use std::sync::Arc;
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Default timeout for a single page request in seconds
pub const LINK_REQUEST_TIMEOUT_SEC: u64 = 10;

/// What to do with an `<a>` element that carries no `href`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MissingHrefPolicy {
    /// Record the page as a referrer of the empty-string key
    #[default]
    Record,
    /// Ignore the anchor
    Skip,
}

/// Configuration for the crawler, read-only for the whole run
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    /// Scope boundary, stored without a trailing slash
    pub site_url: String,
    pub start_path: String,
    pub max_depth: usize,
    pub follow_external_links: bool,
    /// Anchors inspected per page, 0 means unlimited
    pub link_limit: usize,
    pub worker_count: usize,
    pub request_timeout_sec: u64,
    pub timeout: Duration,
    pub idle_grace: Duration,
    pub blacklist: Vec<String>,
    pub missing_href: MissingHrefPolicy,
}

impl CrawlerConfig {
    pub fn new(site_url: &str) -> Self {
        Self {
            site_url: site_url.trim_end_matches('/').to_string(),
            start_path: "/".to_string(),
            max_depth: 3,
            follow_external_links: true,
            link_limit: 30,
            worker_count: 8,
            request_timeout_sec: LINK_REQUEST_TIMEOUT_SEC,
            timeout: Duration::from_secs(30),
            idle_grace: Duration::ZERO,
            blacklist: Vec::new(),
            missing_href: MissingHrefPolicy::Record,
        }
    }

    /// The page the crawl starts from
    pub fn seed_url(&self) -> String {
        format!("{}{}", self.site_url, self.start_path)
    }

    pub fn with_start_path(mut self, start_path: &str) -> Self {
        self.start_path = start_path.to_string();
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_external_links(mut self, follow: bool) -> Self {
        self.follow_external_links = follow;
        self
    }

    pub fn with_link_limit(mut self, link_limit: usize) -> Self {
        self.link_limit = link_limit;
        self
    }

    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn with_request_timeout(mut self, secs: u64) -> Self {
        self.request_timeout_sec = secs;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_idle_grace(mut self, grace: Duration) -> Self {
        self.idle_grace = grace;
        self
    }

    pub fn with_blacklist(mut self, patterns: Vec<String>) -> Self {
        self.blacklist = patterns;
        self
    }

    pub fn with_missing_href(mut self, policy: MissingHrefPolicy) -> Self {
        self.missing_href = policy;
        self
    }
}

pub type CrawlerConfigRef = Arc<CrawlerConfig>;

use anyhow::Context;
use clap::{ArgAction, Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use url::Url;

use crate::crawler::{CrawlerConfig, MissingHrefPolicy, LINK_REQUEST_TIMEOUT_SEC};

/// Directory searched for `--conf NAME` files
pub const CONFIG_DIR: &str = "./config";

/// Upper bound for every duration option, one year
pub const MAX_DURATION_SEC: u64 = 365 * 24 * 60 * 60;

/// Log levels as defined in log2 crate
#[derive(Debug, Serialize, Deserialize, Clone, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}
/// This struct is supposed to receive all program arguments while CrawlerConfig
/// describes only the crawler. A JSON file uses the same keys in camelCase;
/// the key names of the older settings format are accepted too.
#[derive(Parser, Debug, Serialize, Deserialize)]
#[command(author, version, about = "Crawls a site and reports broken links", long_about = None)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct Config {
    /// Name of a settings file in ./config (without .json); replaces every other option
    #[arg(long)]
    #[serde(skip)]
    pub conf: Option<String>,
    /// Site base URL, the crawl scope boundary
    #[arg(short, long, default_value = "http://localhost")]
    #[serde(alias = "siteurl")]
    pub site_url: String,
    /// Page to start from, appended to the site URL
    #[arg(short = 'p', long, default_value = "/")]
    #[serde(alias = "checkingPage")]
    pub start_path: String,
    /// Maximum nesting depth
    #[arg(long, default_value = "3")]
    #[serde(alias = "nestLevel")]
    pub max_depth: usize,
    /// Seconds from start until the crawl is stopped
    #[arg(long, default_value = "30")]
    #[serde(alias = "secToTimeout")]
    pub timeout_sec: u64,
    /// Seconds to wait before watching for idle workers
    #[arg(long, default_value = "5")]
    #[serde(alias = "secToFirstCheckWorkers")]
    pub idle_grace_sec: u64,
    /// Exit right after writing the report instead of waiting for Enter
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub close_on_finish: bool,
    /// Do not check links leading outside the site
    #[arg(long)]
    #[serde(alias = "externalLinksCheck")]
    pub skip_external: bool,
    /// Anchors inspected per page (0 = no limit)
    #[arg(long, default_value = "30")]
    #[serde(alias = "limitPageSearch")]
    pub link_limit: usize,
    /// Prefix of the report file name
    #[arg(long, default_value = "default")]
    pub result_prefix: String,
    /// Number of fetch workers
    #[arg(short, long, default_value = "8")]
    pub workers: usize,
    /// Per request timeout in seconds
    #[arg(long, default_value_t = LINK_REQUEST_TIMEOUT_SEC)]
    pub request_timeout_sec: u64,
    /// Links containing this text are never followed (repeatable)
    #[arg(long)]
    pub blacklist: Vec<String>,
    /// What to record for anchors without href
    #[arg(long, default_value = "record", value_enum)]
    pub missing_href: MissingHrefPolicy,
    /// Logging level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", value_enum)]
    pub log_level: LogLevel,
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_from([env!("CARGO_PKG_NAME")])
    }
}

impl Config {
    /// Command line, or the named settings file when `--conf` is given
    pub fn load() -> anyhow::Result<Self> {
        let cli = Self::parse();
        match &cli.conf {
            Some(name) => Self::from_file(&Self::config_path(name)),
            None => Ok(cli),
        }
    }

    pub fn config_path(name: &str) -> PathBuf {
        Path::new(CONFIG_DIR).join(format!("{}.json", name))
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let site = Url::parse(&self.site_url)
            .with_context(|| format!("site_url {:?} is not a valid URL", self.site_url))?;
        if site.scheme() != "http" && site.scheme() != "https" {
            anyhow::bail!("site_url must use http or https");
        }
        if !self.start_path.is_empty() && !self.start_path.starts_with('/') {
            anyhow::bail!("start_path must be empty or start with '/'");
        }
        if self.workers == 0 {
            anyhow::bail!("workers must be greater than 0");
        }
        for (name, secs) in [
            ("timeout_sec", self.timeout_sec),
            ("idle_grace_sec", self.idle_grace_sec),
            ("request_timeout_sec", self.request_timeout_sec),
        ] {
            if secs > MAX_DURATION_SEC {
                anyhow::bail!("{} must not exceed {} seconds", name, MAX_DURATION_SEC);
            }
        }
        if self.result_prefix.is_empty() || self.result_prefix.contains(['/', '\\']) {
            anyhow::bail!("result_prefix must be a non-empty file name component");
        }
        Ok(())
    }

    /// When the crawl must stop, counting `timeout_sec` from `start`
    pub fn deadline(&self, start: Instant) -> anyhow::Result<Instant> {
        start
            .checked_add(Duration::from_secs(self.timeout_sec))
            .with_context(|| format!("timeout_sec {} is too large", self.timeout_sec))
    }

    pub fn crawler_config(&self) -> CrawlerConfig {
        CrawlerConfig::new(&self.site_url)
            .with_start_path(&self.start_path)
            .with_max_depth(self.max_depth)
            .with_external_links(!self.skip_external)
            .with_link_limit(self.link_limit)
            .with_worker_count(self.workers)
            .with_request_timeout(self.request_timeout_sec)
            .with_timeout(Duration::from_secs(self.timeout_sec))
            .with_idle_grace(Duration::from_secs(self.idle_grace_sec))
            .with_blacklist(self.blacklist.clone())
            .with_missing_href(self.missing_href)
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.start_path, "/");
        assert_eq!(config.max_depth, 3);
        assert_eq!(config.timeout_sec, 30);
        assert_eq!(config.idle_grace_sec, 5);
        assert!(config.close_on_finish);
        assert!(!config.skip_external);
        assert_eq!(config.link_limit, 30);
        assert_eq!(config.result_prefix, "default");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cli_flags() {
        let config = Config::parse_from([
            "LinkWalker",
            "--site-url", "https://site.test/",
            "--max-depth", "1",
            "--skip-external",
            "--close-on-finish", "false",
            "--blacklist", "/logout",
            "--blacklist", "/admin",
            "--missing-href", "skip",
        ]);
        assert!(!config.close_on_finish);

        let crawler = config.crawler_config();
        assert_eq!(crawler.site_url, "https://site.test");
        assert_eq!(crawler.seed_url(), "https://site.test/");
        assert_eq!(crawler.max_depth, 1);
        assert!(!crawler.follow_external_links);
        assert_eq!(crawler.blacklist.len(), 2);
        assert_eq!(crawler.missing_href, MissingHrefPolicy::Skip);
    }

    #[test]
    fn test_file_config_fills_missing_keys() -> anyhow::Result<()> {
        let path = write_temp_config(
            "conf",
            r#"{"siteUrl": "http://site.test", "maxDepth": 2,
                "skipExternal": true, "logLevel": "debug"}"#,
        )?;

        let config = Config::from_file(&path)?;
        std::fs::remove_file(&path)?;

        assert_eq!(config.site_url, "http://site.test");
        assert_eq!(config.max_depth, 2);
        assert!(config.skip_external);
        assert_eq!(config.link_limit, 30);
        assert_eq!(config.log_level.to_string(), "debug");
        Ok(())
    }

    fn write_temp_config(name: &str, json: &str) -> std::io::Result<PathBuf> {
        let path = std::env::temp_dir()
            .join(format!("linkwalker-{}-{}.json", name, std::process::id()));
        std::fs::write(&path, json)?;
        Ok(path)
    }

    #[test]
    fn test_file_config_in_older_format() -> anyhow::Result<()> {
        let path = write_temp_config(
            "older",
            r#"{
                "siteurl": "http://lenta.ru",
                "checkingPage": "/news",
                "nestLevel": 1,
                "secToTimeout": 7,
                "secToFirstCheckWorkers": 2,
                "closeOnFinish": false,
                "externalLinksCheck": true,
                "limitPageSearch": 5,
                "resultPrefix": "lenta"
            }"#,
        )?;

        let config = Config::from_file(&path)?;
        std::fs::remove_file(&path)?;

        assert_eq!(config.site_url, "http://lenta.ru");
        assert_eq!(config.start_path, "/news");
        assert_eq!(config.max_depth, 1);
        assert_eq!(config.timeout_sec, 7);
        assert_eq!(config.idle_grace_sec, 2);
        assert!(!config.close_on_finish);
        assert!(config.skip_external);
        assert_eq!(config.link_limit, 5);
        assert_eq!(config.result_prefix, "lenta");

        let crawler = config.crawler_config();
        assert_eq!(crawler.seed_url(), "http://lenta.ru/news");
        assert!(!crawler.follow_external_links);
        Ok(())
    }

    #[test]
    fn test_unknown_config_key_is_an_error() -> anyhow::Result<()> {
        let path = write_temp_config("typo", r#"{"siteUrl": "http://site.test", "maxDeph": 2}"#)?;
        let result = Config::from_file(&path);
        std::fs::remove_file(&path)?;

        assert!(result.is_err());
        Ok(())
    }

    #[test]
    fn test_huge_timeout_is_rejected() {
        let config = Config::parse_from(["LinkWalker", "--timeout-sec", "18446744073709551615"]);
        assert!(config.validate().is_err());
        assert!(config.deadline(Instant::now()).is_err());

        let config = Config::parse_from(["LinkWalker", "--idle-grace-sec", "18446744073709551615"]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deadline_counts_from_start() -> anyhow::Result<()> {
        let config = Config::parse_from(["LinkWalker", "--timeout-sec", "7"]);
        let start = Instant::now();
        assert_eq!(config.deadline(start)?, start + Duration::from_secs(7));
        Ok(())
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(Config::from_file(Path::new("./config/does-not-exist.json")).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.site_url = "mailto:someone@site.test".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.start_path = "index.html".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.workers = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.result_prefix = "../escape".to_string();
        assert!(config.validate().is_err());
    }
}

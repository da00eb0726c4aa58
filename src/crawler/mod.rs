pub mod arbiter;
pub mod classify;
pub mod config;
pub mod runner;
pub mod scrape;
pub mod state;
pub mod store;


pub use arbiter::{await_termination, StopReason, Termination};
pub use classify::{classify, LinkDecision};
pub use config::{CrawlerConfig, CrawlerConfigRef, MissingHrefPolicy, LINK_REQUEST_TIMEOUT_SEC};
pub use runner::{crawl, CrawlHandle, Supervisor, SupervisorRef};
pub use state::{CrawlerState, CrawlerStateRef};
pub use store::{PageResult, ResultStore};

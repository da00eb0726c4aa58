use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use log2::*;
use tokio::time::{interval, sleep, sleep_until, Instant, MissedTickBehavior};

use super::config::CrawlerConfig;
use super::state::CrawlerStateRef;
use super::store::PageResult;

/// How often the live-task count is reported while waiting
const PROGRESS_INTERVAL: Duration = Duration::from_secs(2);

/// Which trigger ended the crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Interrupted,
    WorkersExhausted,
    TimedOut,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::Interrupted => "stopped by interrupt",
            StopReason::WorkersExhausted => "stopped by lack of workers",
            StopReason::TimedOut => "stopped by timeout",
        };
        write!(f, "{}", s)
    }
}

/// Result of a finished crawl
#[derive(Debug)]
pub struct Termination {
    pub reason: StopReason,
    pub snapshot: BTreeMap<String, PageResult>,
}

/// Waits for the first of `interrupt`, worker exhaustion or `deadline`.
/// Worker exhaustion is only watched after `config.idle_grace`.
///
/// On the first trigger it raises the shutdown flag, so no new fetch starts,
/// and takes a snapshot of the store. Fetches already running are not awaited.
pub async fn await_termination<F>(
    state: &CrawlerStateRef,
    config: &CrawlerConfig,
    deadline: Instant,
    interrupt: F,
) -> Termination
where
    F: Future<Output = ()>,
{
    let exhausted = async {
        sleep(config.idle_grace).await;
        state.workers_exhausted().await;
    };
    let timeout = sleep_until(deadline);
    tokio::pin!(interrupt, exhausted, timeout);

    let mut progress = interval(PROGRESS_INTERVAL);
    progress.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately
    progress.tick().await;

    let reason = loop {
        tokio::select! {
            _ = &mut interrupt => break StopReason::Interrupted,
            _ = &mut exhausted => break StopReason::WorkersExhausted,
            _ = &mut timeout => break StopReason::TimedOut,
            _ = progress.tick() => {
                info!("Live tasks: {}. Continue", state.live_tasks());
            }
        }
    };

    state.request_shutdown();
    info!("Crawl {}, live tasks left: {}", reason, state.live_tasks());

    let snapshot = state.store.snapshot().await;
    Termination { reason, snapshot }
}

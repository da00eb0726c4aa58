use std::future::Future;
use std::sync::Arc;
use anyhow::Result;
use log2::*;
use reqwest::Client;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::arbiter::{await_termination, Termination};
use super::classify::classify;
use super::config::{CrawlerConfigRef, MissingHrefPolicy};
use super::scrape::{build_client, extract_anchors, fetch_page, is_success, read_html};
use super::state::{CrawlerStateRef, LiveTask};

/// A page waiting for a worker. Holds one unit of the live-task count until dropped.
struct FetchJob {
    url: String,
    depth: usize,
    live: LiveTask,
}

type JobQueue = Arc<Mutex<mpsc::UnboundedReceiver<FetchJob>>>;

/// Owns the fetch task lifecycle: queues accepted links, runs them on a
/// fixed pool of workers and expands successful pages.
pub struct Supervisor {
    state: CrawlerStateRef,
    config: CrawlerConfigRef,
    client: Client,
    queue: mpsc::UnboundedSender<FetchJob>,
}

pub type SupervisorRef = Arc<Supervisor>;

/// Running crawl. Dropping it leaves the workers running until shutdown.
pub struct CrawlHandle {
    pub supervisor: SupervisorRef,
    workers: Vec<JoinHandle<()>>,
}

impl CrawlHandle {
    /// Waits for every worker to exit. Workers only exit after shutdown is requested.
    pub async fn join(self) -> Result<()> {
        for handle in self.workers {
            handle.await?;
        }
        Ok(())
    }
}

impl Supervisor {
    /// Spawns the worker pool and queues the seed page at depth 0
    pub fn start(state: CrawlerStateRef, config: CrawlerConfigRef) -> Result<CrawlHandle> {
        let client = build_client(config.request_timeout_sec)?;
        let (queue, receiver) = mpsc::unbounded_channel();
        let receiver: JobQueue = Arc::new(Mutex::new(receiver));

        let supervisor = Arc::new(Self { state, config, client, queue });

        let workers = (0..supervisor.config.worker_count)
            .map(|worker_id| {
                let supervisor = Arc::clone(&supervisor);
                let receiver = Arc::clone(&receiver);
                tokio::spawn(async move { supervisor.run_worker(worker_id, receiver).await })
            })
            .collect();

        let seed = supervisor.config.seed_url();
        info!(
            "Crawling {} with {} workers, max depth {}",
            seed, supervisor.config.worker_count, supervisor.config.max_depth
        );
        supervisor.spawn_fetch(seed, 0);

        Ok(CrawlHandle { supervisor, workers })
    }

    /// Queues a fetch of `url` at `depth`. Refused once shutdown has been requested.
    pub fn spawn_fetch(&self, url: String, depth: usize) -> bool {
        if self.state.is_shutting_down() {
            debug!("Shutdown requested, not queueing {}", url);
            return false;
        }

        let job = FetchJob { url, depth, live: LiveTask::start(&self.state) };
        if let Err(rejected) = self.queue.send(job) {
            debug!("Work queue closed, dropping {}", rejected.0.url);
            return false;
        }
        true
    }

    async fn run_worker(&self, worker_id: usize, queue: JobQueue) {
        info!("Worker {} started", worker_id);
        let mut shutdown = self.state.subscribe_shutdown();

        loop {
            let next_job = {
                let mut queue = queue.lock().await;
                tokio::select! {
                    biased;
                    _ = wait_for_shutdown(&mut shutdown) => None,
                    job = queue.recv() => job,
                }
            };

            let Some(job) = next_job else { break };
            self.process(worker_id, job).await;
        }

        info!("Worker {} finished", worker_id);
    }

    /// Fetches one page and expands its anchors. Every return path drops
    /// the job's live-task unit exactly once.
    async fn process(&self, worker_id: usize, job: FetchJob) {
        let FetchJob { url, depth, live: _live } = job;

        if self.state.is_shutting_down() {
            debug!("Worker {}: Shutdown requested, skipping {}", worker_id, url);
            return;
        }

        let registration = self.state.store.register_if_absent(&url, depth).await;
        let Some(claim) = registration.claim else {
            debug!("Worker {}: {} is already registered", worker_id, url);
            return;
        };

        info!(
            "Worker {}: Checking {} at depth {}, live tasks {}",
            worker_id, url, depth, self.state.live_tasks()
        );

        let response = match fetch_page(&self.client, &url).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Worker {}: Failed to fetch {}: {}", worker_id, url, e);
                self.state.store.resolve(&claim, 0, false).await;
                return;
            }
        };

        let status = response.status().as_u16();
        let valid = is_success(status);
        self.state.store.resolve(&claim, status, valid).await;
        if !valid {
            warn!("Worker {}: {} answered {}", worker_id, url, status);
            return;
        }

        if depth + 1 > self.config.max_depth {
            debug!("Worker {}: Max depth {} reached for {}", worker_id, self.config.max_depth, url);
            return;
        }

        let html = match read_html(response).await {
            Ok(html) => html,
            Err(e) => {
                debug!("Worker {}: Failed to read body of {}: {}", worker_id, url, e);
                return;
            }
        };

        let anchors = match extract_anchors(&html, self.config.link_limit) {
            Ok(anchors) => anchors,
            Err(e) => {
                debug!("Worker {}: Failed to parse {}: {}", worker_id, url, e);
                return;
            }
        };

        debug!("Worker {}: Found {} anchors on {}", worker_id, anchors.len(), url);
        for href in anchors {
            self.follow_anchor(&url, depth, href).await;
        }
    }

    async fn follow_anchor(&self, page_url: &str, depth: usize, href: Option<String>) {
        let Some(raw_link) = href else {
            if self.config.missing_href == MissingHrefPolicy::Record {
                self.state.store.append_backlink("", page_url).await;
            }
            return;
        };

        let decision = classify(&raw_link, depth, &self.config);
        if !decision.valid {
            debug!("Skipped link {:?} on {}", raw_link, page_url);
            return;
        }

        // The store decides who fetches: only the first reference schedules a job
        let existed = self.state.store.append_backlink(&decision.link, page_url).await;
        if !existed {
            self.spawn_fetch(decision.link, decision.next_depth);
        }
    }
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    // Err only when the state is gone, which also means stop
    let _ = shutdown.wait_for(|stopping| *stopping).await;
}

/// Runs a whole crawl: starts the supervisor on the seed page, then waits for
/// the first of `interrupt`, worker exhaustion or `deadline`.
/// Returns without waiting for fetches still in flight.
pub async fn crawl<F>(
    crawler_state_ref: CrawlerStateRef,
    crawler_cfg_ref: CrawlerConfigRef,
    deadline: Instant,
    interrupt: F,
) -> Result<Termination>
where
    F: Future<Output = ()>,
{
    let _handle = Supervisor::start(
        Arc::clone(&crawler_state_ref),
        Arc::clone(&crawler_cfg_ref),
    )?;
    let termination =
        await_termination(&crawler_state_ref, &crawler_cfg_ref, deadline, interrupt).await;
    Ok(termination)
}

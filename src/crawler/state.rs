use log2::debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{Notify, watch};

use super::store::ResultStore;

/// Current state of the crawler, shared by the supervisor, every worker and the arbiter
pub struct CrawlerState {
    /// Records for every discovered URL
    pub store: ResultStore,
    /// Fetch jobs queued or running
    live_tasks: AtomicUsize,
    /// Set once the live-task count has dropped to zero
    exhausted_signalled: AtomicBool,
    workers_exhausted: Notify,
    shutdown: watch::Sender<bool>,
}

impl CrawlerState {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            store: ResultStore::new(),
            live_tasks: AtomicUsize::new(0),
            exhausted_signalled: AtomicBool::new(false),
            workers_exhausted: Notify::new(),
            shutdown,
        }
    }

    pub fn live_tasks(&self) -> usize {
        self.live_tasks.load(Ordering::SeqCst)
    }

    pub(crate) fn task_started(&self) {
        self.live_tasks.fetch_add(1, Ordering::SeqCst);
    }

    /// Returns true for the single call that signalled exhaustion
    pub(crate) fn task_finished(&self) -> bool {
        let previous = self.live_tasks.fetch_sub(1, Ordering::SeqCst);
        if previous != 1 {
            return false;
        }
        if self
            .exhausted_signalled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        // notify_one keeps a permit when nobody is waiting yet
        self.workers_exhausted.notify_one();
        true
    }

    /// Resolves once the live-task count has reached zero
    pub async fn workers_exhausted(&self) {
        self.workers_exhausted.notified().await;
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Stops new fetch tasks from starting; running ones finish on their own
    pub fn request_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub(crate) fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }
}

impl Default for CrawlerState {
    fn default() -> Self {
        Self::new()
    }
}

pub type CrawlerStateRef = Arc<CrawlerState>;

/// One unit of the live-task count. Dropping it decrements the count.
pub(crate) struct LiveTask {
    state: CrawlerStateRef,
}

impl LiveTask {
    pub(crate) fn start(state: &CrawlerStateRef) -> Self {
        state.task_started();
        Self { state: Arc::clone(state) }
    }
}

impl Drop for LiveTask {
    fn drop(&mut self) {
        if self.state.task_finished() {
            debug!("No live tasks left");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_exhaustion_signalled_exactly_once() {
        let state = Arc::new(CrawlerState::new());
        for _ in 0..200 {
            state.task_started();
        }

        let mut handles = Vec::new();
        for _ in 0..200 {
            let state = Arc::clone(&state);
            handles.push(tokio::spawn(async move { state.task_finished() }));
        }

        let mut signals = 0;
        for handle in handles {
            if handle.await.unwrap() {
                signals += 1;
            }
        }

        assert_eq!(signals, 1);
        assert_eq!(state.live_tasks(), 0);
        tokio::time::timeout(Duration::from_secs(1), state.workers_exhausted())
            .await
            .expect("exhaustion permit should be stored");
    }

    #[tokio::test]
    async fn test_live_task_guard_decrements_on_drop() {
        let state = Arc::new(CrawlerState::new());
        let first = LiveTask::start(&state);
        let second = LiveTask::start(&state);
        assert_eq!(state.live_tasks(), 2);

        drop(first);
        assert_eq!(state.live_tasks(), 1);
        drop(second);
        assert_eq!(state.live_tasks(), 0);

        tokio::time::timeout(Duration::from_secs(1), state.workers_exhausted())
            .await
            .expect("dropping the last guard signals exhaustion");
    }

    #[test]
    fn test_shutdown_flag() {
        let state = CrawlerState::new();
        let receiver = state.subscribe_shutdown();
        assert!(!state.is_shutting_down());

        state.request_shutdown();
        assert!(state.is_shutting_down());
        assert!(*receiver.borrow());
    }
}

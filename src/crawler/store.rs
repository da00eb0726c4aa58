use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// Everything known about one normalized URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageResult {
    #[serde(rename = "page")]
    pub url: String,
    /// 0 until a fetch completes
    pub status: u16,
    #[serde(rename = "nestLevel")]
    pub depth: usize,
    #[serde(rename = "isValid")]
    pub valid: bool,
    /// Pages linking here, in the order they were recorded
    #[serde(rename = "linksFrom")]
    pub referrers: Vec<String>,
}

impl PageResult {
    fn placeholder(url: &str, depth: usize) -> Self {
        Self {
            url: url.to_string(),
            status: 0,
            depth,
            valid: false,
            referrers: Vec::new(),
        }
    }
}

/// Proof that the holder created (registered) a record.
/// Only the holder may resolve its status.
#[derive(Debug)]
pub struct Claim {
    url: String,
}

impl Claim {
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Outcome of [`ResultStore::register_if_absent`]
#[derive(Debug)]
pub struct Registration {
    pub record: PageResult,
    /// `Some` only for the caller that created the record
    pub claim: Option<Claim>,
}

impl Registration {
    pub fn created(&self) -> bool {
        self.claim.is_some()
    }
}

struct Slot {
    result: PageResult,
    /// false while the record is only a referenced placeholder
    registered: bool,
}

/// One record per normalized URL, shared by every fetch task.
/// All mutations go through a single lock.
#[derive(Default)]
pub struct ResultStore {
    slots: Mutex<HashMap<String, Slot>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a pending record at `depth` unless one is already registered.
    ///
    /// A placeholder left by [`append_backlink`](Self::append_backlink) is adopted:
    /// it takes the depth and keeps its referrers. The first caller wins.
    pub async fn register_if_absent(&self, url: &str, depth: usize) -> Registration {
        let mut slots = self.slots.lock().await;
        let slot = slots.entry(url.to_string()).or_insert_with(|| Slot {
            result: PageResult::placeholder(url, depth),
            registered: false,
        });

        if slot.registered {
            return Registration { record: slot.result.clone(), claim: None };
        }

        slot.registered = true;
        slot.result.depth = depth;
        Registration {
            record: slot.result.clone(),
            claim: Some(Claim { url: url.to_string() }),
        }
    }

    /// Records that `from_page` links to `url`, creating a placeholder
    /// (`status=0`, `depth=0`, invalid) if nothing is known about `url` yet.
    ///
    /// Returns whether a record already existed. A `false` return is the
    /// caller's licence to schedule the one and only fetch of `url`.
    pub async fn append_backlink(&self, url: &str, from_page: &str) -> bool {
        let mut slots = self.slots.lock().await;
        match slots.get_mut(url) {
            Some(slot) => {
                slot.result.referrers.push(from_page.to_string());
                true
            }
            None => {
                let mut result = PageResult::placeholder(url, 0);
                result.referrers.push(from_page.to_string());
                slots.insert(url.to_string(), Slot { result, registered: false });
                false
            }
        }
    }

    /// Sets the fetch outcome of a record created by the claim holder
    pub async fn resolve(&self, claim: &Claim, status: u16, valid: bool) {
        let mut slots = self.slots.lock().await;
        if let Some(slot) = slots.get_mut(&claim.url) {
            slot.result.status = status;
            slot.result.valid = valid;
        }
    }

    pub async fn get(&self, url: &str) -> Option<PageResult> {
        let slots = self.slots.lock().await;
        slots.get(url).map(|slot| slot.result.clone())
    }

    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Point-in-time copy of every record, keyed by URL
    pub async fn snapshot(&self) -> BTreeMap<String, PageResult> {
        let slots = self.slots.lock().await;
        slots
            .iter()
            .map(|(url, slot)| (url.clone(), slot.result.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_register_creates_pending_record() {
        let store = ResultStore::new();
        let registration = store.register_if_absent("http://site/a", 2).await;

        assert!(registration.created());
        assert_eq!(registration.record.depth, 2);
        assert_eq!(registration.record.status, 0);
        assert!(!registration.record.valid);
    }

    #[tokio::test]
    async fn test_second_register_keeps_first_depth() {
        let store = ResultStore::new();
        store.register_if_absent("http://site/a", 1).await;
        let again = store.register_if_absent("http://site/a", 3).await;

        assert!(!again.created());
        assert_eq!(again.record.depth, 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_register_creates_once() {
        let store = Arc::new(ResultStore::new());
        let mut handles = Vec::new();
        for depth in 0..64 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.register_if_absent("http://site/a", depth).await.created()
            }));
        }

        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap() {
                created += 1;
            }
        }

        assert_eq!(created, 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_backlink_on_unknown_url_creates_placeholder() {
        let store = ResultStore::new();
        let existed = store.append_backlink("http://site/b", "http://site/").await;

        assert!(!existed);
        let record = store.get("http://site/b").await.unwrap();
        assert_eq!(record.referrers, vec!["http://site/".to_string()]);
        assert_eq!(record.depth, 0);
        assert_eq!(record.status, 0);
        assert!(!record.valid);
    }

    #[tokio::test]
    async fn test_backlinks_append_in_order_with_duplicates() {
        let store = ResultStore::new();
        store.register_if_absent("http://site/b", 1).await;

        assert!(store.append_backlink("http://site/b", "http://site/x").await);
        assert!(store.append_backlink("http://site/b", "http://site/y").await);
        assert!(store.append_backlink("http://site/b", "http://site/x").await);

        let record = store.get("http://site/b").await.unwrap();
        assert_eq!(record.referrers, vec!["http://site/x", "http://site/y", "http://site/x"]);
        assert_eq!(record.depth, 1);
    }

    #[tokio::test]
    async fn test_register_adopts_placeholder() {
        let store = ResultStore::new();
        store.append_backlink("http://site/b", "http://site/").await;

        let registration = store.register_if_absent("http://site/b", 1).await;
        assert!(registration.created());
        assert_eq!(registration.record.depth, 1);
        assert_eq!(registration.record.referrers, vec!["http://site/"]);

        assert!(!store.register_if_absent("http://site/b", 2).await.created());
    }

    #[tokio::test]
    async fn test_resolve_sets_status() {
        let store = ResultStore::new();
        let claim = store.register_if_absent("http://site/", 0).await.claim.unwrap();
        store.resolve(&claim, 200, true).await;

        let record = store.get("http://site/").await.unwrap();
        assert_eq!(record.status, 200);
        assert!(record.valid);
    }

    #[tokio::test]
    async fn test_snapshot_serializes_report_fields() {
        let store = ResultStore::new();
        store.register_if_absent("http://site/", 0).await;
        store.append_backlink("http://site/a", "http://site/").await;

        let snapshot = store.snapshot().await;
        let json = serde_json::to_value(&snapshot).unwrap();
        let record = &json["http://site/a"];
        assert_eq!(record["page"], "http://site/a");
        assert_eq!(record["status"], 0);
        assert_eq!(record["nestLevel"], 0);
        assert_eq!(record["isValid"], false);
        assert_eq!(record["linksFrom"][0], "http://site/");
    }
}

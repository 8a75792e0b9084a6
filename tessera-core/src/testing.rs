//! In-memory store with fault injection and a concurrency gauge, for tests.

use crate::error::{StoreError, StoreResult};
use crate::store::{BlobStore, ObjectEntry, ObjectStoreBackend};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

struct FailRule {
    suffix: String,
    remaining: Option<usize>,
}

pub(crate) struct InstrumentedStore {
    inner: ObjectStoreBackend,
    put_delay: Duration,
    fail_rules: Mutex<Vec<FailRule>>,
    delete_fail_rules: Mutex<Vec<FailRule>>,
    payload_puts_in_flight: AtomicUsize,
    max_payload_puts_in_flight: AtomicUsize,
    completed_puts: Mutex<Vec<String>>,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl InstrumentedStore {
    pub(crate) fn new() -> Self {
        Self {
            inner: ObjectStoreBackend::in_memory(),
            put_delay: Duration::ZERO,
            fail_rules: Mutex::new(Vec::new()),
            delete_fail_rules: Mutex::new(Vec::new()),
            payload_puts_in_flight: AtomicUsize::new(0),
            max_payload_puts_in_flight: AtomicUsize::new(0),
            completed_puts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_put_delay(mut self, delay: Duration) -> Self {
        self.put_delay = delay;
        self
    }

    /// Every put to a path ending in `suffix` fails.
    pub(crate) fn fail_puts(&self, suffix: &str) {
        self.push_rule(suffix, None);
    }

    /// The next put to a path ending in `suffix` fails.
    pub(crate) fn fail_next_put(&self, suffix: &str) {
        self.push_rule(suffix, Some(1));
    }

    /// Every delete of a path ending in `suffix` fails.
    pub(crate) fn fail_deletes(&self, suffix: &str) {
        self.delete_fail_rules.lock().unwrap().push(FailRule {
            suffix: suffix.to_string(),
            remaining: None,
        });
    }

    fn push_rule(&self, suffix: &str, remaining: Option<usize>) {
        self.fail_rules.lock().unwrap().push(FailRule {
            suffix: suffix.to_string(),
            remaining,
        });
    }

    fn should_fail(rules: &Mutex<Vec<FailRule>>, path: &str) -> bool {
        let mut rules = rules.lock().unwrap();
        for rule in rules.iter_mut() {
            if !path.ends_with(&rule.suffix) {
                continue;
            }
            match rule.remaining.as_mut() {
                None => return true,
                Some(0) => continue,
                Some(remaining) => {
                    *remaining -= 1;
                    return true;
                }
            }
        }
        false
    }

    /// Highest number of payload puts observed running at once.
    pub(crate) fn max_payload_puts_in_flight(&self) -> usize {
        self.max_payload_puts_in_flight.load(Ordering::SeqCst)
    }

    /// Paths of successful puts in completion order.
    pub(crate) fn completed_puts(&self) -> Vec<String> {
        self.completed_puts.lock().unwrap().clone()
    }

    pub(crate) async fn object_names(&self, dir: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .list_objects(dir)
            .await
            .unwrap()
            .into_iter()
            .map(|entry| entry.name)
            .collect();
        names.sort();
        names
    }
}

fn is_payload(path: &str) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path);
    !name.starts_with("index") && name != "finished"
}

fn injected(path: &str) -> StoreError {
    StoreError::Backend(object_store::Error::Generic {
        store: "instrumented",
        source: format!("injected failure for {}", path).into(),
    })
}

#[async_trait]
impl BlobStore for InstrumentedStore {
    async fn put_object(&self, path: &str, data: Bytes) -> StoreResult<()> {
        let _gauge = if is_payload(path) {
            let now = self.payload_puts_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_payload_puts_in_flight
                .fetch_max(now, Ordering::SeqCst);
            Some(InFlight(&self.payload_puts_in_flight))
        } else {
            None
        };

        if !self.put_delay.is_zero() {
            tokio::time::sleep(self.put_delay).await;
        }

        if Self::should_fail(&self.fail_rules, path) {
            return Err(injected(path));
        }

        self.inner.put_object(path, data).await?;
        self.completed_puts.lock().unwrap().push(path.to_string());
        Ok(())
    }

    async fn get_object(&self, path: &str) -> StoreResult<Bytes> {
        self.inner.get_object(path).await
    }

    async fn list_objects(&self, dir: &str) -> StoreResult<Vec<ObjectEntry>> {
        self.inner.list_objects(dir).await
    }

    async fn delete_object_if_exists(&self, path: &str) -> StoreResult<()> {
        if Self::should_fail(&self.delete_fail_rules, path) {
            return Err(injected(path));
        }
        self.inner.delete_object_if_exists(path).await
    }

    async fn exists(&self, path: &str) -> StoreResult<bool> {
        self.inner.exists(path).await
    }
}

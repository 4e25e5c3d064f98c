//! Common test utilities and setup

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use workflow_bookmarks::{
    Bookmark, BookmarkConfig, BookmarkError, BookmarkFilter, BookmarkKey, BookmarkRecord,
    BookmarkService, BookmarkStore, InMemoryBookmarkStore, Result, SuspendRequest,
};

/// Install a test subscriber honouring `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// In-memory store plus a service over it
pub fn setup_service(config: BookmarkConfig) -> (Arc<InMemoryBookmarkStore>, BookmarkService) {
    init_tracing();
    let store = Arc::new(InMemoryBookmarkStore::new());
    let service = BookmarkService::new(store.clone(), config).expect("valid config");
    (store, service)
}

pub fn order_paid(instance_id: &str, order_id: &str) -> SuspendRequest {
    SuspendRequest::new(instance_id, "OrderPaid", "wait-payment", "checkout:wait-payment")
        .with_payload(serde_json::json!({ "orderId": order_id }))
}

/// Store wrapper whose operations can be switched to fail with `Transient`
#[derive(Default)]
pub struct FlakyStore {
    inner: InMemoryBookmarkStore,
    fail_gets: AtomicBool,
    fail_deletes: AtomicBool,
    failing_bookmarks: Mutex<HashSet<String>>,
    failed_calls: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &InMemoryBookmarkStore {
        &self.inner
    }

    pub fn fail_gets(&self, fail: bool) {
        self.fail_gets.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Make conditional deletes of one bookmark fail
    pub fn fail_deletes_of(&self, bookmark_id: &str, fail: bool) {
        let mut failing = self.failing_bookmarks.lock();
        if fail {
            failing.insert(bookmark_id.to_string());
        } else {
            failing.remove(bookmark_id);
        }
    }

    pub fn failed_calls(&self) -> usize {
        self.failed_calls.load(Ordering::SeqCst)
    }

    fn check(&self, flag: &AtomicBool, operation: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            self.failed_calls.fetch_add(1, Ordering::SeqCst);
            return Err(BookmarkError::Transient(format!("{} timed out", operation)));
        }
        Ok(())
    }
}

#[async_trait]
impl BookmarkStore for FlakyStore {
    async fn create(&self, instance_id: &str, bookmark: Bookmark) -> Result<BookmarkRecord> {
        self.inner.create(instance_id, bookmark).await
    }

    async fn get(&self, instance_id: &str, bookmark_id: &str) -> Result<BookmarkRecord> {
        self.check(&self.fail_gets, "get")?;
        self.inner.get(instance_id, bookmark_id).await
    }

    async fn find_by_hash(&self, hash: &str) -> Result<Vec<BookmarkKey>> {
        self.inner.find_by_hash(hash).await
    }

    async fn update(&self, instance_id: &str, bookmark: Bookmark) -> Result<BookmarkRecord> {
        self.inner.update(instance_id, bookmark).await
    }

    async fn delete(&self, instance_id: &str, bookmark_id: &str) -> Result<bool> {
        self.check(&self.fail_deletes, "delete")?;
        self.inner.delete(instance_id, bookmark_id).await
    }

    async fn delete_if_unchanged(
        &self,
        instance_id: &str,
        bookmark_id: &str,
        revision: u64,
    ) -> Result<bool> {
        self.check(&self.fail_deletes, "delete_if_unchanged")?;
        if self.failing_bookmarks.lock().contains(bookmark_id) {
            self.failed_calls.fetch_add(1, Ordering::SeqCst);
            return Err(BookmarkError::Transient(format!("delete of {} timed out", bookmark_id)));
        }
        self.inner
            .delete_if_unchanged(instance_id, bookmark_id, revision)
            .await
    }

    async fn delete_all_for_instance(&self, instance_id: &str) -> Result<usize> {
        self.check(&self.fail_deletes, "delete_all_for_instance")?;
        self.inner.delete_all_for_instance(instance_id).await
    }

    async fn list(&self, filter: &BookmarkFilter) -> Result<Vec<BookmarkRecord>> {
        self.inner.list(filter).await
    }

    async fn scan(&self) -> Result<Vec<(String, BookmarkKey)>> {
        self.inner.scan().await
    }

    async fn count(&self) -> Result<usize> {
        self.inner.count().await
    }

    async fn rebuild_index(&self) -> Result<usize> {
        self.inner.rebuild_index().await
    }
}

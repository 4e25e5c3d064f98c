//! Bookmark storage contract
//!
//! [`BookmarkStore`] is the durable keyed collection behind the resolver. Records are keyed
//! by `(instance_id, bookmark_id)` and every store maintains a hash index in the same
//! logical operation as the record change.
//!
//! # Contract
//!
//! | Operation | Behaviour |
//! |-----------|-----------|
//! | `create` | `DuplicateId` if the key exists; otherwise stores a revision never used before |
//! | `get` | `NotFound` if absent |
//! | `find_by_hash` | Keys currently indexed under the hash |
//! | `update` | Sets `activity_instance_id` (once) / replaces `metadata`; else `Immutable` |
//! | `delete` | Idempotent; `Ok(false)` when nothing was there |
//! | `delete_if_unchanged` | Atomic conditional delete on revision; the only burn primitive |
//! | `delete_all_for_instance` | Removes every record and index entry of an instance at once |
//!
//! Revisions are unique within a store, including across a delete and re-create of the same
//! key, so `delete_if_unchanged` never matches a record other than the one that was read.
//!
//! Operations on one key are linearizable; operations on different keys are independent.
//! Implementations fail fast with [`BookmarkError::Transient`](crate::BookmarkError::Transient)
//! when the backend is unavailable and never retry internally.
//!
//! # Implementing a Backend
//!
//! ```rust,ignore
//! use async_trait::async_trait;
//! use workflow_bookmarks::{BookmarkStore, BookmarkRecord, Bookmark, Result};
//!
//! pub struct PostgresBookmarkStore { pool: PgPool }
//!
//! #[async_trait]
//! impl BookmarkStore for PostgresBookmarkStore {
//!     async fn delete_if_unchanged(&self, instance: &str, id: &str, rev: u64) -> Result<bool> {
//!         // DELETE FROM bookmarks WHERE instance_id = $1 AND id = $2 AND revision = $3
//!         // rows_affected() == 1
//!     }
//!     // ...
//! }
//! ```

pub mod memory;

use crate::bookmark::{Bookmark, BookmarkKey, BookmarkRecord};
use crate::error::Result;
use async_trait::async_trait;

pub use memory::InMemoryBookmarkStore;

/// Durable, indexed bookmark storage
#[async_trait]
pub trait BookmarkStore: Send + Sync {
    /// Persist a new bookmark for `instance_id`
    async fn create(&self, instance_id: &str, bookmark: Bookmark) -> Result<BookmarkRecord>;

    /// Fetch one bookmark
    async fn get(&self, instance_id: &str, bookmark_id: &str) -> Result<BookmarkRecord>;

    /// Keys of all bookmarks whose hash equals `hash`
    async fn find_by_hash(&self, hash: &str) -> Result<Vec<BookmarkKey>>;

    /// Replace the mutable fields of an existing bookmark and give it a fresh revision
    async fn update(&self, instance_id: &str, bookmark: Bookmark) -> Result<BookmarkRecord>;

    /// Remove a bookmark; returns whether a record was removed
    async fn delete(&self, instance_id: &str, bookmark_id: &str) -> Result<bool>;

    /// Remove a bookmark only if it still exists at `revision`
    async fn delete_if_unchanged(
        &self,
        instance_id: &str,
        bookmark_id: &str,
        revision: u64,
    ) -> Result<bool>;

    /// Remove every bookmark of an instance; returns how many were removed
    async fn delete_all_for_instance(&self, instance_id: &str) -> Result<usize>;

    /// Records matching `filter`, in resolution order
    async fn list(&self, filter: &BookmarkFilter) -> Result<Vec<BookmarkRecord>>;

    /// Every `(hash, key)` pair held by the store
    async fn scan(&self) -> Result<Vec<(String, BookmarkKey)>>;

    /// Total number of stored bookmarks
    async fn count(&self) -> Result<usize>;

    /// Recompute the hash index from stored records; returns the number of indexed entries
    async fn rebuild_index(&self) -> Result<usize>;
}

/// Query over stored bookmarks; unset fields match anything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookmarkFilter {
    pub instance_id: Option<String>,
    pub name: Option<String>,
    pub hash: Option<String>,
    pub activity_node_id: Option<String>,
    pub activity_instance_id: Option<String>,
}

impl BookmarkFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = Some(instance_id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into());
        self
    }

    pub fn with_activity_node_id(mut self, activity_node_id: impl Into<String>) -> Self {
        self.activity_node_id = Some(activity_node_id.into());
        self
    }

    pub fn with_activity_instance_id(mut self, activity_instance_id: impl Into<String>) -> Self {
        self.activity_instance_id = Some(activity_instance_id.into());
        self
    }

    /// Whether `record` satisfies every set criterion
    pub fn matches(&self, record: &BookmarkRecord) -> bool {
        let bookmark = &record.bookmark;

        fn check(expected: &Option<String>, actual: &str) -> bool {
            expected.as_deref().map_or(true, |e| e == actual)
        }

        check(&self.instance_id, &record.instance_id)
            && check(&self.name, &bookmark.name)
            && check(&self.hash, &bookmark.hash)
            && check(&self.activity_node_id, &bookmark.activity_node_id)
            && match &self.activity_instance_id {
                Some(expected) => {
                    bookmark.activity_instance_id.as_deref() == Some(expected.as_str())
                }
                None => true,
            }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_matches() {
        let record = BookmarkRecord::new(
            "wf-1",
            Bookmark::new("bm-1", "OrderPaid", "h1", "act-1", "node-1")
                .with_activity_instance_id("ai-1"),
        );

        assert!(BookmarkFilter::new().matches(&record));
        assert!(BookmarkFilter::new()
            .with_instance_id("wf-1")
            .with_name("OrderPaid")
            .with_activity_instance_id("ai-1")
            .matches(&record));
        assert!(!BookmarkFilter::new().with_hash("h2").matches(&record));
        assert!(!BookmarkFilter::new().with_activity_node_id("node-2").matches(&record));
    }
}

//! In-memory bookmark storage
//!
//! [`InMemoryBookmarkStore`] keeps records in a map sharded by workflow instance and maintains
//! a [`BookmarkIndex`] next to it. Every mutation of an instance happens while that
//! instance's shard is locked, and the matching index change is applied inside the same
//! critical section, so a key is never visible in the index without its record having
//! been written first.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  InMemoryBookmarkStore                                    │
//! │                                                           │
//! │  records: DashMap<instance_id, HashMap<id, Record>>       │
//! │    wf-1 ─┬─ bm-a (rev 1, hash 9f..)                       │
//! │          └─ bm-b (rev 2, hash 31..)                       │
//! │    wf-2 ─── bm-c (rev 1, hash 9f..)                       │
//! │                                                           │
//! │  index: hash → {(instance_id, id)}                        │
//! │    9f.. ─► {(wf-1, bm-a), (wf-2, bm-c)}                   │
//! │    31.. ─► {(wf-1, bm-b)}                                 │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Revisions come from one counter per store. A key that is deleted and created again never
//! gets a revision it held before, so a record resolved earlier cannot burn its successor.
//!
//! Data lives for the lifetime of the process unless written out with
//! [`save_snapshot`](InMemoryBookmarkStore::save_snapshot).
//! Cloning the store shares the same data.

use crate::bookmark::{Bookmark, BookmarkId, BookmarkKey, BookmarkRecord, InstanceId};
use crate::error::{BookmarkError, Result};
use crate::index::BookmarkIndex;
use crate::store::{BookmarkFilter, BookmarkStore};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry as InstanceEntry;
use dashmap::DashMap;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

type InstanceBookmarks = HashMap<BookmarkId, BookmarkRecord>;

/// Thread-safe in-memory bookmark store with a built-in hash index
#[derive(Debug, Clone, Default)]
pub struct InMemoryBookmarkStore {
    records: Arc<DashMap<InstanceId, InstanceBookmarks>>,
    index: Arc<BookmarkIndex>,
    revisions: Arc<AtomicU64>,
}

impl InMemoryBookmarkStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// The hash index maintained by this store
    pub fn index(&self) -> &BookmarkIndex {
        &self.index
    }

    /// Number of instances holding at least one bookmark
    pub fn instance_count(&self) -> usize {
        self.records.iter().filter(|entry| !entry.is_empty()).count()
    }

    /// All records, unordered
    pub fn records(&self) -> Vec<BookmarkRecord> {
        self.records
            .iter()
            .flat_map(|entry| entry.values().cloned().collect::<Vec<_>>())
            .collect()
    }

    /// Remove all records and index entries (useful for testing)
    pub fn clear(&self) {
        self.records.clear();
        self.index.clear();
    }

    /// Replace the store contents with `records` and rebuild the index.
    ///
    /// Every record is checked before anything is replaced; on error the store is untouched.
    /// Fails with `RebuildInProgress` while an index rebuild is running.
    pub(crate) fn load_records(&self, records: Vec<BookmarkRecord>) -> Result<usize> {
        let mut loaded: HashMap<InstanceId, InstanceBookmarks> = HashMap::new();
        let mut latest: u64 = 0;
        for record in records {
            if record.instance_id.trim().is_empty() {
                return Err(BookmarkError::Invalid("instance_id must not be empty".to_string()));
            }
            record.bookmark.validate()?;
            latest = latest.max(record.revision);

            let bookmarks = loaded.entry(record.instance_id.clone()).or_default();
            match bookmarks.entry(record.bookmark.id.clone()) {
                Entry::Occupied(_) => {
                    return Err(BookmarkError::DuplicateId {
                        instance_id: record.instance_id,
                        bookmark_id: record.bookmark.id,
                    })
                }
                Entry::Vacant(slot) => {
                    slot.insert(record);
                }
            }
        }

        self.index.begin_rebuild()?;
        self.records.clear();
        for (instance_id, bookmarks) in loaded {
            self.records.insert(instance_id, bookmarks);
        }
        self.revisions.fetch_max(latest, Ordering::SeqCst);
        Ok(self.rebuild())
    }

    fn next_revision(&self) -> u64 {
        self.revisions.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn scan_pairs(&self) -> Vec<(String, BookmarkKey)> {
        self.records
            .iter()
            .flat_map(|entry| {
                entry
                    .values()
                    .map(|record| (record.bookmark.hash.clone(), record.key()))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    fn rebuild(&self) -> usize {
        let scanned = self.scan_pairs();
        let replayed = self.index.finish_rebuild(scanned);
        let entries = self.index.len();
        info!(entries, replayed, "Bookmark index rebuilt");
        entries
    }

    /// Remove a record if `guard` accepts it, index entry first
    fn remove_where(
        &self,
        instance_id: &str,
        bookmark_id: &str,
        guard: impl FnOnce(&BookmarkRecord) -> bool,
    ) -> bool {
        let removed = match self.records.get_mut(instance_id) {
            Some(mut bookmarks) => {
                let accepted = bookmarks
                    .get(bookmark_id)
                    .filter(|record| guard(record))
                    .map(|record| (record.bookmark.hash.clone(), record.key()));
                match accepted {
                    Some((hash, key)) => {
                        self.index.remove(&hash, &key);
                        bookmarks.remove(bookmark_id);
                        true
                    }
                    None => false,
                }
            }
            None => false,
        };

        if removed {
            self.records.remove_if(instance_id, |_, bookmarks| bookmarks.is_empty());
        }
        removed
    }
}

#[async_trait]
impl BookmarkStore for InMemoryBookmarkStore {
    async fn create(&self, instance_id: &str, bookmark: Bookmark) -> Result<BookmarkRecord> {
        if instance_id.trim().is_empty() {
            return Err(BookmarkError::Invalid("instance_id must not be empty".to_string()));
        }
        bookmark.validate()?;

        let mut bookmarks = self.records.entry(instance_id.to_string()).or_default();
        match bookmarks.entry(bookmark.id.clone()) {
            Entry::Occupied(_) => Err(BookmarkError::DuplicateId {
                instance_id: instance_id.to_string(),
                bookmark_id: bookmark.id,
            }),
            Entry::Vacant(slot) => {
                let mut record = BookmarkRecord::new(instance_id, bookmark);
                record.revision = self.next_revision();
                slot.insert(record.clone());
                self.index.insert(&record.bookmark.hash, record.key());
                debug!(
                    instance_id = %instance_id,
                    bookmark_id = %record.bookmark.id,
                    hash = %record.bookmark.hash,
                    "Bookmark created"
                );
                Ok(record)
            }
        }
    }

    async fn get(&self, instance_id: &str, bookmark_id: &str) -> Result<BookmarkRecord> {
        self.records
            .get(instance_id)
            .and_then(|bookmarks| bookmarks.get(bookmark_id).cloned())
            .ok_or_else(|| BookmarkError::not_found(instance_id, bookmark_id))
    }

    async fn find_by_hash(&self, hash: &str) -> Result<Vec<BookmarkKey>> {
        Ok(self.index.lookup(hash))
    }

    async fn update(&self, instance_id: &str, bookmark: Bookmark) -> Result<BookmarkRecord> {
        let mut bookmarks = self
            .records
            .get_mut(instance_id)
            .ok_or_else(|| BookmarkError::not_found(instance_id, &bookmark.id))?;
        let record = bookmarks
            .get_mut(&bookmark.id)
            .ok_or_else(|| BookmarkError::not_found(instance_id, &bookmark.id))?;

        if let Some(field) = record.bookmark.protected_change(&bookmark) {
            return Err(BookmarkError::Immutable { field });
        }

        record.bookmark = bookmark;
        record.revision = self.next_revision();
        Ok(record.clone())
    }

    async fn delete(&self, instance_id: &str, bookmark_id: &str) -> Result<bool> {
        let removed = self.remove_where(instance_id, bookmark_id, |_| true);
        if removed {
            debug!(instance_id = %instance_id, bookmark_id = %bookmark_id, "Bookmark deleted");
        }
        Ok(removed)
    }

    async fn delete_if_unchanged(
        &self,
        instance_id: &str,
        bookmark_id: &str,
        revision: u64,
    ) -> Result<bool> {
        Ok(self.remove_where(instance_id, bookmark_id, |record| record.revision == revision))
    }

    async fn delete_all_for_instance(&self, instance_id: &str) -> Result<usize> {
        match self.records.entry(instance_id.to_string()) {
            InstanceEntry::Occupied(entry) => {
                self.index.remove_many(
                    entry
                        .get()
                        .values()
                        .map(|record| (record.bookmark.hash.as_str(), record.key())),
                );
                let removed = entry.remove().len();
                debug!(instance_id = %instance_id, removed, "Instance bookmarks deleted");
                Ok(removed)
            }
            InstanceEntry::Vacant(_) => Ok(0),
        }
    }

    async fn list(&self, filter: &BookmarkFilter) -> Result<Vec<BookmarkRecord>> {
        let mut results: Vec<BookmarkRecord> = match &filter.instance_id {
            Some(instance_id) => self
                .records
                .get(instance_id.as_str())
                .map(|bookmarks| {
                    bookmarks
                        .values()
                        .filter(|record| filter.matches(record))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default(),
            None => self
                .records
                .iter()
                .flat_map(|entry| {
                    entry
                        .values()
                        .filter(|record| filter.matches(record))
                        .cloned()
                        .collect::<Vec<_>>()
                })
                .collect(),
        };

        results.sort_by(|a, b| a.resolution_order(b));
        Ok(results)
    }

    async fn scan(&self) -> Result<Vec<(String, BookmarkKey)>> {
        Ok(self.scan_pairs())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.iter().map(|entry| entry.len()).sum())
    }

    async fn rebuild_index(&self) -> Result<usize> {
        self.index.begin_rebuild()?;
        Ok(self.rebuild())
    }
}

//! Secondary index from bookmark hash to bookmark keys
//!
//! The index is a cache over the store. Stores update it inside the same logical operation
//! as the record change; it can always be rebuilt by scanning the store.
//!
//! # Rebuild
//!
//! ```text
//!   begin_rebuild()      live map keeps serving lookups; every insert/remove is
//!        │               applied to the live map AND appended to the log
//!        ▼
//!   scan the store       (no index lock held)
//!        │
//!        ▼
//!   finish_rebuild()     replay the log over the scanned map, swap it in
//! ```
//!
//! Index operations are idempotent set operations, so a write that the scan already saw
//! and that also sits in the log replays to the same state.

use crate::bookmark::BookmarkKey;
use crate::error::{BookmarkError, Result};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};

type KeysByHash = HashMap<String, BTreeSet<BookmarkKey>>;

#[derive(Debug, Clone)]
enum IndexOp {
    Insert(String, BookmarkKey),
    Remove(String, BookmarkKey),
}

#[derive(Debug, Default)]
struct IndexState {
    by_hash: KeysByHash,
    entries: usize,
    rebuild_log: Option<Vec<IndexOp>>,
}

impl IndexState {
    fn apply(&mut self, op: IndexOp) {
        match op {
            IndexOp::Insert(hash, key) => {
                if self.by_hash.entry(hash).or_default().insert(key) {
                    self.entries += 1;
                }
            }
            IndexOp::Remove(hash, key) => {
                if let Some(keys) = self.by_hash.get_mut(&hash) {
                    if keys.remove(&key) {
                        self.entries -= 1;
                    }
                    if keys.is_empty() {
                        self.by_hash.remove(&hash);
                    }
                }
            }
        }
    }

    fn record(&mut self, op: IndexOp) {
        if let Some(log) = self.rebuild_log.as_mut() {
            log.push(op.clone());
        }
        self.apply(op);
    }
}

/// Thread-safe hash → keys index
#[derive(Debug, Default)]
pub struct BookmarkIndex {
    state: RwLock<IndexState>,
}

impl BookmarkIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `key` under `hash`
    pub fn insert(&self, hash: &str, key: BookmarkKey) {
        self.state
            .write()
            .record(IndexOp::Insert(hash.to_string(), key));
    }

    /// Remove `key` from under `hash`; absent entries are ignored
    pub fn remove(&self, hash: &str, key: &BookmarkKey) {
        self.state
            .write()
            .record(IndexOp::Remove(hash.to_string(), key.clone()));
    }

    /// Remove many entries in one step; concurrent lookups see all or none of them gone
    pub fn remove_many<'a>(&self, entries: impl IntoIterator<Item = (&'a str, BookmarkKey)>) {
        let mut state = self.state.write();
        for (hash, key) in entries {
            state.record(IndexOp::Remove(hash.to_string(), key));
        }
    }

    /// Keys indexed under `hash`, in key order
    pub fn lookup(&self, hash: &str) -> Vec<BookmarkKey> {
        self.state
            .read()
            .by_hash
            .get(hash)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of indexed (hash, key) pairs
    pub fn len(&self) -> usize {
        self.state.read().entries
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of distinct hashes
    pub fn hash_count(&self) -> usize {
        self.state.read().by_hash.len()
    }

    pub fn is_rebuilding(&self) -> bool {
        self.state.read().rebuild_log.is_some()
    }

    /// Start logging writes for a rebuild
    pub fn begin_rebuild(&self) -> Result<()> {
        let mut state = self.state.write();
        if state.rebuild_log.is_some() {
            return Err(BookmarkError::RebuildInProgress);
        }
        state.rebuild_log = Some(Vec::new());
        Ok(())
    }

    /// Replace the live map with `scanned` plus every write logged since `begin_rebuild`.
    ///
    /// Returns the number of logged writes that were replayed.
    pub fn finish_rebuild(
        &self,
        scanned: impl IntoIterator<Item = (String, BookmarkKey)>,
    ) -> usize {
        let mut fresh = IndexState::default();
        for (hash, key) in scanned {
            fresh.apply(IndexOp::Insert(hash, key));
        }

        let mut state = self.state.write();
        let log = state.rebuild_log.take().unwrap_or_default();
        let replayed = log.len();
        for op in log {
            fresh.apply(op);
        }
        state.by_hash = fresh.by_hash;
        state.entries = fresh.entries;

        replayed
    }

    /// Drop the write log without touching the live map
    pub fn abort_rebuild(&self) {
        self.state.write().rebuild_log = None;
    }

    /// Remove every entry
    pub fn clear(&self) {
        let mut state = self.state.write();
        state.by_hash.clear();
        state.entries = 0;
    }
}

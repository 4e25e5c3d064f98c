//! Snapshot persistence for the in-memory store
//!
//! A [`BookmarkSnapshot`] captures every record of an [`InMemoryBookmarkStore`] so bookmarks
//! survive a host restart. Restoring a snapshot rebuilds the hash index from the records;
//! the index itself is never written.
//!
//! Payloads are stored as canonical JSON text, which keeps the snapshot readable by
//! non-self-describing encoders such as bincode.

use crate::bookmark::{Bookmark, BookmarkRecord};
use crate::config::SnapshotFormat;
use crate::error::{BookmarkError, Result};
use crate::hasher::write_canonical;
use crate::store::InMemoryBookmarkStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::info;

/// Current snapshot layout version
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// One stored bookmark in snapshot form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub instance_id: String,
    pub revision: u64,
    pub id: String,
    pub name: String,
    pub hash: String,
    pub payload_json: Option<String>,
    pub activity_id: String,
    pub activity_node_id: String,
    pub activity_instance_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub auto_burn: bool,
    pub callback_method_name: Option<String>,
    pub auto_complete: bool,
    /// Sorted by key
    pub metadata: Option<Vec<(String, String)>>,
}

impl From<&BookmarkRecord> for SnapshotRecord {
    fn from(record: &BookmarkRecord) -> Self {
        let bookmark = &record.bookmark;
        let payload_json = bookmark.payload.as_ref().map(|payload| {
            let mut text = String::new();
            write_canonical(payload, &mut text);
            text
        });
        let metadata = bookmark.metadata.as_ref().map(|metadata| {
            let mut entries: Vec<(String, String)> =
                metadata.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            entries.sort();
            entries
        });

        Self {
            instance_id: record.instance_id.clone(),
            revision: record.revision,
            id: bookmark.id.clone(),
            name: bookmark.name.clone(),
            hash: bookmark.hash.clone(),
            payload_json,
            activity_id: bookmark.activity_id.clone(),
            activity_node_id: bookmark.activity_node_id.clone(),
            activity_instance_id: bookmark.activity_instance_id.clone(),
            created_at: bookmark.created_at,
            auto_burn: bookmark.auto_burn,
            callback_method_name: bookmark.callback_method_name.clone(),
            auto_complete: bookmark.auto_complete,
            metadata,
        }
    }
}

impl TryFrom<SnapshotRecord> for BookmarkRecord {
    type Error = BookmarkError;

    fn try_from(record: SnapshotRecord) -> Result<Self> {
        let payload: Option<Value> = record
            .payload_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        let bookmark = Bookmark {
            id: record.id,
            name: record.name,
            hash: record.hash,
            payload,
            activity_id: record.activity_id,
            activity_node_id: record.activity_node_id,
            activity_instance_id: record.activity_instance_id,
            created_at: record.created_at,
            auto_burn: record.auto_burn,
            callback_method_name: record.callback_method_name,
            auto_complete: record.auto_complete,
            metadata: record.metadata.map(|entries| entries.into_iter().collect()),
        };

        Ok(BookmarkRecord {
            instance_id: record.instance_id,
            bookmark,
            revision: record.revision,
        })
    }
}

/// Point-in-time copy of a store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookmarkSnapshot {
    pub format_version: u32,
    pub taken_at: DateTime<Utc>,
    pub records: Vec<SnapshotRecord>,
}

/// Encoding of snapshots to bytes
pub trait SnapshotSerializer: Send + Sync {
    /// Serialize a snapshot to bytes
    fn dumps(&self, snapshot: &BookmarkSnapshot) -> Result<Vec<u8>>;

    /// Deserialize a snapshot from bytes
    fn loads(&self, data: &[u8]) -> Result<BookmarkSnapshot>;
}

/// JSON-based serializer (default)
#[derive(Debug, Clone, Default)]
pub struct JsonSnapshotSerializer;

impl SnapshotSerializer for JsonSnapshotSerializer {
    fn dumps(&self, snapshot: &BookmarkSnapshot) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(snapshot)?)
    }

    fn loads(&self, data: &[u8]) -> Result<BookmarkSnapshot> {
        Ok(serde_json::from_slice(data)?)
    }
}

/// Binary serializer using bincode
#[derive(Debug, Clone, Default)]
pub struct BincodeSnapshotSerializer;

impl SnapshotSerializer for BincodeSnapshotSerializer {
    fn dumps(&self, snapshot: &BookmarkSnapshot) -> Result<Vec<u8>> {
        Ok(bincode::serialize(snapshot)?)
    }

    fn loads(&self, data: &[u8]) -> Result<BookmarkSnapshot> {
        Ok(bincode::deserialize(data)?)
    }
}

/// Serializer for a configured format
pub fn serializer_for(format: SnapshotFormat) -> Box<dyn SnapshotSerializer> {
    match format {
        SnapshotFormat::Json => Box::new(JsonSnapshotSerializer),
        SnapshotFormat::Bincode => Box::new(BincodeSnapshotSerializer),
    }
}

impl InMemoryBookmarkStore {
    /// Copy every record, in resolution order
    pub fn snapshot(&self) -> BookmarkSnapshot {
        let mut records = self.records();
        records.sort_by(|a, b| a.resolution_order(b));

        BookmarkSnapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            taken_at: Utc::now(),
            records: records.iter().map(SnapshotRecord::from).collect(),
        }
    }

    /// Replace the contents of this store with `snapshot` and rebuild the index.
    ///
    /// Returns the number of restored records. A snapshot with an invalid or duplicate record
    /// is rejected as a whole and the store keeps its current contents. Not meant to run
    /// alongside live traffic.
    pub fn restore(&self, snapshot: BookmarkSnapshot) -> Result<usize> {
        if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(BookmarkError::Invalid(format!(
                "unsupported snapshot version {}",
                snapshot.format_version
            )));
        }

        let records = snapshot
            .records
            .into_iter()
            .map(BookmarkRecord::try_from)
            .collect::<Result<Vec<_>>>()?;
        let count = records.len();
        self.load_records(records)?;

        info!(records = count, taken_at = %snapshot.taken_at, "Bookmark snapshot restored");
        Ok(count)
    }

    /// Write a snapshot to `path` (via a temporary file and rename)
    pub async fn save_snapshot(
        &self,
        path: impl AsRef<Path>,
        serializer: &dyn SnapshotSerializer,
    ) -> Result<usize> {
        let path = path.as_ref();
        let snapshot = self.snapshot();
        let count = snapshot.records.len();
        let bytes = serializer.dumps(&snapshot)?;

        let tmp = temp_path(path);
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, path).await?;

        info!(records = count, path = %path.display(), "Bookmark snapshot saved");
        Ok(count)
    }

    /// Create a store from a snapshot file
    pub async fn load_snapshot(
        path: impl AsRef<Path>,
        serializer: &dyn SnapshotSerializer,
    ) -> Result<Self> {
        let bytes = tokio::fs::read(path.as_ref()).await?;
        let snapshot = serializer.loads(&bytes)?;

        let store = Self::new();
        store.restore(snapshot)?;
        Ok(store)
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::BookmarkStore;
    use serde_json::json;
    use tempfile::TempDir;

    async fn populated_store() -> InMemoryBookmarkStore {
        let store = InMemoryBookmarkStore::new();
        store
            .create(
                "wf-1",
                Bookmark::new("bm-1", "OrderPaid", "h1", "act-1", "node-1")
                    .with_payload(json!({"orderId": "42", "lines": [1, 2]}))
                    .with_metadata_entry("tenant", "acme")
                    .with_callback_method_name("OnPaid"),
            )
            .await
            .unwrap();
        let timer = store
            .create(
                "wf-2",
                Bookmark::new("bm-2", "Timer", "h2", "act-2", "node-2").with_auto_burn(false),
            )
            .await
            .unwrap();
        store
            .update("wf-2", timer.bookmark.with_activity_instance_id("ai-2"))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_snapshot_restore_preserves_records() {
        let store = populated_store().await;
        let snapshot = store.snapshot();
        assert_eq!(snapshot.records.len(), 2);

        let restored = InMemoryBookmarkStore::new();
        assert_eq!(restored.restore(snapshot).unwrap(), 2);

        let original = store.get("wf-2", "bm-2").await.unwrap();
        assert_eq!(restored.get("wf-2", "bm-2").await.unwrap(), original);
        assert_eq!(
            restored.get("wf-1", "bm-1").await.unwrap(),
            store.get("wf-1", "bm-1").await.unwrap()
        );
        assert_eq!(restored.find_by_hash("h1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_bincode_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bookmarks.bin");
        let store = populated_store().await;

        let written = store.save_snapshot(&path, &BincodeSnapshotSerializer).await.unwrap();
        assert_eq!(written, 2);
        assert!(!temp_path(&path).exists());

        let loaded = InMemoryBookmarkStore::load_snapshot(&path, &BincodeSnapshotSerializer)
            .await
            .unwrap();
        assert_eq!(loaded.count().await.unwrap(), 2);
        assert_eq!(
            loaded.get("wf-1", "bm-1").await.unwrap().bookmark.payload,
            Some(json!({"orderId": "42", "lines": [1, 2]}))
        );
        assert_eq!(loaded.find_by_hash("h2").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_json_file_via_configured_format() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bookmarks.json");
        let serializer = serializer_for(SnapshotFormat::Json);

        populated_store()
            .await
            .save_snapshot(&path, serializer.as_ref())
            .await
            .unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"format_version\": 1"));

        let loaded = InMemoryBookmarkStore::load_snapshot(&path, serializer.as_ref())
            .await
            .unwrap();
        assert_eq!(loaded.instance_count(), 2);
    }

    #[tokio::test]
    async fn test_restore_rejects_unknown_version() {
        let mut snapshot = populated_store().await.snapshot();
        snapshot.format_version = 99;

        assert!(matches!(
            InMemoryBookmarkStore::new().restore(snapshot),
            Err(BookmarkError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_restore_replaces_existing_contents() {
        let target = populated_store().await;
        let empty = InMemoryBookmarkStore::new().snapshot();

        assert_eq!(target.restore(empty).unwrap(), 0);
        assert_eq!(target.count().await.unwrap(), 0);
        assert!(target.find_by_hash("h1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_restore_keeps_live_records_indexed() {
        let store = InMemoryBookmarkStore::new();
        store
            .create("wf-live", Bookmark::new("live", "OrderPaid", "h-live", "act", "node"))
            .await
            .unwrap();

        let mut snapshot = populated_store().await.snapshot();
        let twin = snapshot.records[0].clone();
        snapshot.records.push(twin);

        assert!(matches!(
            store.restore(snapshot),
            Err(BookmarkError::DuplicateId { .. })
        ));
        assert_eq!(store.count().await.unwrap(), 1);
        assert!(store.get("wf-live", "live").await.is_ok());
        assert_eq!(
            store.find_by_hash("h-live").await.unwrap(),
            vec![crate::bookmark::BookmarkKey::new("wf-live", "live")]
        );
        assert!(store.find_by_hash("h1").await.unwrap().is_empty());
        assert!(!store.index().is_rebuilding());
    }

    #[tokio::test]
    async fn test_restore_refuses_to_run_during_rebuild() {
        let store = InMemoryBookmarkStore::new();
        let snapshot = populated_store().await.snapshot();

        store.index().begin_rebuild().unwrap();
        assert!(matches!(
            store.restore(snapshot.clone()),
            Err(BookmarkError::RebuildInProgress)
        ));
        assert_eq!(store.count().await.unwrap(), 0);

        store.index().abort_rebuild();
        assert_eq!(store.restore(snapshot).unwrap(), 2);
    }

    #[tokio::test]
    async fn test_restored_revisions_are_not_handed_out_again() {
        let snapshot = populated_store().await.snapshot();
        let latest = snapshot.records.iter().map(|record| record.revision).max().unwrap();

        let store = InMemoryBookmarkStore::new();
        store.restore(snapshot).unwrap();
        let created = store
            .create("wf-3", Bookmark::new("bm-3", "Timer", "h3", "act-3", "node-3"))
            .await
            .unwrap();

        assert!(created.revision > latest);
    }
}

//! At-most-once consumption of auto-burn bookmarks
//!
//! Several stimuli can resolve to the same bookmark at the same time (duplicate deliveries,
//! retries upstream). [`BurnCoordinator::try_consume`] settles that race with the store's
//! conditional delete: exactly one caller removes the record at the revision it resolved,
//! everybody else gets `false` and must not resume.

use crate::bookmark::BookmarkRecord;
use crate::error::Result;
use crate::store::BookmarkStore;
use std::sync::Arc;
use tracing::{debug, info};

/// Decides whether a resolved bookmark may actually be resumed
#[derive(Clone)]
pub struct BurnCoordinator {
    store: Arc<dyn BookmarkStore>,
}

impl BurnCoordinator {
    pub fn new(store: Arc<dyn BookmarkStore>) -> Self {
        Self { store }
    }

    /// Consume `record` if it is still there.
    ///
    /// Non-burning bookmarks are always consumable and stay in the store. For auto-burn
    /// bookmarks this returns `true` only for the caller whose conditional delete removed
    /// the record; a lost race is `Ok(false)`, not an error.
    pub async fn try_consume(&self, record: &BookmarkRecord) -> Result<bool> {
        if !record.bookmark.auto_burn {
            return Ok(true);
        }

        let burned = self
            .store
            .delete_if_unchanged(&record.instance_id, &record.bookmark.id, record.revision)
            .await?;

        if burned {
            info!(
                instance_id = %record.instance_id,
                bookmark_id = %record.bookmark.id,
                "Bookmark burned"
            );
        } else {
            debug!(
                instance_id = %record.instance_id,
                bookmark_id = %record.bookmark.id,
                revision = record.revision,
                "Bookmark already consumed or changed"
            );
        }
        Ok(burned)
    }
}

impl std::fmt::Debug for BurnCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BurnCoordinator").finish_non_exhaustive()
    }
}

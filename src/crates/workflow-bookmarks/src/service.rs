//! Engine-facing bookmark operations
//!
//! [`BookmarkService`] is what a workflow execution engine talks to. It creates bookmarks when
//! activities suspend, records activity instance ids, cleans up after terminated instances,
//! and turns inbound stimuli into [`ResumeTarget`]s the engine can act on.
//!
//! A [`ResumeOutcome`] lists the bookmarks that were consumed and the matches a store error
//! kept out of reach. Deferred matches are still in the store; redelivering the stimulus
//! reaches them.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use workflow_bookmarks::{
//!     BookmarkConfig, BookmarkService, CorrelationFilter, InMemoryBookmarkStore, Stimulus,
//!     SuspendRequest,
//! };
//!
//! # async fn example() -> workflow_bookmarks::Result<()> {
//! let store = Arc::new(InMemoryBookmarkStore::new());
//! let service = BookmarkService::new(store, BookmarkConfig::default())?;
//!
//! service
//!     .suspend_with_bookmark(
//!         SuspendRequest::new("wf-1", "OrderPaid", "wait-payment", "checkout:wait-payment")
//!             .with_payload(json!({"orderId": "42"})),
//!     )
//!     .await?;
//!
//! let stimulus = Stimulus::new("OrderPaid").with_payload(json!({"orderId": "42"}));
//! let outcome = service.resume(&stimulus, &CorrelationFilter::Any).await?;
//! for target in &outcome.targets {
//!     println!("resume {} at {}", target.instance_id, target.activity_node_id);
//! }
//! if !outcome.is_complete() {
//!     // redeliver the stimulus later
//! }
//! # Ok(())
//! # }
//! ```

use crate::bookmark::{Bookmark, BookmarkId, BookmarkKey, BookmarkRecord, InstanceId, Stimulus};
use crate::burn::BurnCoordinator;
use crate::config::{BookmarkConfig, ResumeMode};
use crate::error::{BookmarkError, Result};
use crate::hasher::BookmarkHasher;
use crate::registry::StimulusRegistry;
use crate::resolver::{CorrelationFilter, Resolver};
use crate::store::{BookmarkFilter, BookmarkStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Parameters of `suspend_with_bookmark`
#[derive(Debug, Clone, PartialEq)]
pub struct SuspendRequest {
    pub instance_id: InstanceId,
    pub name: String,
    pub payload: Option<Value>,
    pub activity_id: String,
    pub activity_node_id: String,
    pub auto_burn: bool,
    pub callback_method_name: Option<String>,
    pub auto_complete: bool,
    pub metadata: Option<HashMap<String, String>>,
    /// Explicit bookmark id; a UUID v4 is generated when unset
    pub bookmark_id: Option<BookmarkId>,
}

impl SuspendRequest {
    pub fn new(
        instance_id: impl Into<InstanceId>,
        name: impl Into<String>,
        activity_id: impl Into<String>,
        activity_node_id: impl Into<String>,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            name: name.into(),
            payload: None,
            activity_id: activity_id.into(),
            activity_node_id: activity_node_id.into(),
            auto_burn: true,
            callback_method_name: None,
            auto_complete: true,
            metadata: None,
            bookmark_id: None,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_auto_burn(mut self, auto_burn: bool) -> Self {
        self.auto_burn = auto_burn;
        self
    }

    pub fn with_callback_method_name(mut self, name: impl Into<String>) -> Self {
        self.callback_method_name = Some(name.into());
        self
    }

    pub fn with_auto_complete(mut self, auto_complete: bool) -> Self {
        self.auto_complete = auto_complete;
        self
    }

    pub fn with_metadata_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn with_bookmark_id(mut self, id: impl Into<BookmarkId>) -> Self {
        self.bookmark_id = Some(id.into());
        self
    }
}

/// What the engine needs to resume one suspended activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeTarget {
    pub instance_id: InstanceId,
    pub bookmark_id: BookmarkId,
    pub activity_node_id: String,
    pub activity_instance_id: Option<String>,
    /// `None` means the activity's default resume handler
    pub callback_method_name: Option<String>,
    pub auto_complete: bool,
    /// Bookmark payload, handed back to the activity
    pub payload: Option<Value>,
}

impl From<BookmarkRecord> for ResumeTarget {
    fn from(record: BookmarkRecord) -> Self {
        let bookmark = record.bookmark;
        Self {
            instance_id: record.instance_id,
            bookmark_id: bookmark.id,
            activity_node_id: bookmark.activity_node_id,
            activity_instance_id: bookmark.activity_instance_id,
            callback_method_name: bookmark.callback_method_name,
            auto_complete: bookmark.auto_complete,
            payload: bookmark.payload,
        }
    }
}

/// Result of dispatching one stimulus
#[derive(Debug, Default)]
pub struct ResumeOutcome {
    /// Consumed bookmarks, in resolution order; the engine must resume every one
    pub targets: Vec<ResumeTarget>,
    /// Matches whose burn failed with a store error; they stay in the store
    pub deferred: Vec<(BookmarkKey, BookmarkError)>,
}

impl ResumeOutcome {
    /// No match was left behind by a store error
    pub fn is_complete(&self) -> bool {
        self.deferred.is_empty()
    }
}

/// Bookmark lifecycle and resumption on top of a [`BookmarkStore`]
#[derive(Debug, Clone)]
pub struct BookmarkService {
    resolver: Resolver,
    burn: BurnCoordinator,
    config: BookmarkConfig,
}

impl BookmarkService {
    /// Service over `store` with the registry described by `config`
    pub fn new(store: Arc<dyn BookmarkStore>, config: BookmarkConfig) -> Result<Self> {
        config.validate()?;
        let registry = Arc::new(config.registry()?);
        Ok(Self::from_parts(store, registry, config))
    }

    /// Service with an explicitly built registry; `config.stimuli` is not consulted
    pub fn from_parts(
        store: Arc<dyn BookmarkStore>,
        registry: Arc<StimulusRegistry>,
        config: BookmarkConfig,
    ) -> Self {
        Self {
            resolver: Resolver::new(store.clone(), registry),
            burn: BurnCoordinator::new(store),
            config,
        }
    }

    /// Replace the hasher used for both suspension and resolution
    pub fn with_hasher(mut self, hasher: Arc<dyn BookmarkHasher>) -> Self {
        self.resolver = self.resolver.with_hasher(hasher);
        self
    }

    pub fn store(&self) -> &Arc<dyn BookmarkStore> {
        self.resolver.store()
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn burn_coordinator(&self) -> &BurnCoordinator {
        &self.burn
    }

    pub fn config(&self) -> &BookmarkConfig {
        &self.config
    }

    /// Record that an activity is waiting for `request.name`
    pub async fn suspend_with_bookmark(&self, request: SuspendRequest) -> Result<Bookmark> {
        self.resolver.registry().ensure_known(&request.name)?;
        if request.instance_id.trim().is_empty() {
            return Err(BookmarkError::Invalid("instance_id must not be empty".to_string()));
        }

        let hash = self
            .resolver
            .hasher()
            .compute(&request.name, request.payload.as_ref());
        let id = request
            .bookmark_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut bookmark = Bookmark::new(
            id,
            request.name,
            hash,
            request.activity_id,
            request.activity_node_id,
        )
        .with_auto_burn(request.auto_burn)
        .with_auto_complete(request.auto_complete);
        bookmark.payload = request.payload;
        bookmark.callback_method_name = request.callback_method_name;
        bookmark.metadata = request.metadata;

        let record = self.store().create(&request.instance_id, bookmark).await?;
        info!(
            instance_id = %record.instance_id,
            bookmark_id = %record.bookmark.id,
            name = %record.bookmark.name,
            hash = %record.bookmark.hash,
            "Workflow suspended on bookmark"
        );
        Ok(record.bookmark)
    }

    /// Attach the runtime activity instance id to a bookmark
    pub async fn on_activity_instance_started(
        &self,
        instance_id: &str,
        bookmark_id: &str,
        activity_instance_id: &str,
    ) -> Result<BookmarkRecord> {
        let record = self.store().get(instance_id, bookmark_id).await?;
        if record.bookmark.activity_instance_id.as_deref() == Some(activity_instance_id) {
            return Ok(record);
        }

        let updated = record.bookmark.with_activity_instance_id(activity_instance_id);
        self.store().update(instance_id, updated).await
    }

    /// Drop every bookmark of a completed or cancelled instance
    pub async fn on_instance_terminated(&self, instance_id: &str) -> Result<usize> {
        let removed = self.store().delete_all_for_instance(instance_id).await?;
        info!(instance_id = %instance_id, removed, "Instance bookmarks cleaned up");
        Ok(removed)
    }

    /// Remove one bookmark because its activity stopped waiting; no-op if already gone
    pub async fn remove_bookmark(&self, instance_id: &str, bookmark_id: &str) -> Result<bool> {
        self.store().delete(instance_id, bookmark_id).await
    }

    /// Resolve `stimulus` and consume the matches according to the configured [`ResumeMode`].
    ///
    /// Matches lost to a concurrent consumer are skipped. A store error fails the call while
    /// nothing has been consumed yet. Once a target has been burned the call always returns
    /// it, and later store errors land in [`ResumeOutcome::deferred`] instead.
    pub async fn resume(
        &self,
        stimulus: &Stimulus,
        filter: &CorrelationFilter,
    ) -> Result<ResumeOutcome> {
        let matches = self.resolver.find(stimulus, filter).await?;
        let candidates = matches.len();
        let mut outcome = ResumeOutcome::default();

        for record in matches {
            let consumed = match self.burn.try_consume(&record).await {
                Ok(consumed) => consumed,
                Err(e) if outcome.targets.is_empty() => return Err(e),
                Err(e) => {
                    warn!(
                        instance_id = %record.instance_id,
                        bookmark_id = %record.bookmark.id,
                        error = %e,
                        "Deferring bookmark after store error"
                    );
                    outcome.deferred.push((record.key(), e));
                    continue;
                }
            };
            if !consumed {
                continue;
            }

            outcome.targets.push(ResumeTarget::from(record));
            if self.config.resume_mode == ResumeMode::First {
                break;
            }
        }

        debug!(
            stimulus = %stimulus.name,
            candidates,
            resumed = outcome.targets.len(),
            deferred = outcome.deferred.len(),
            "Stimulus dispatched"
        );
        Ok(outcome)
    }

    /// Resume one known bookmark without going through the hash index
    pub async fn resume_bookmark(
        &self,
        instance_id: &str,
        bookmark_id: &str,
    ) -> Result<Option<ResumeTarget>> {
        let record = match self.store().get(instance_id, bookmark_id).await {
            Ok(record) => record,
            Err(BookmarkError::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };

        if self.burn.try_consume(&record).await? {
            Ok(Some(ResumeTarget::from(record)))
        } else {
            Ok(None)
        }
    }

    /// Bookmarks currently held for an instance, in resolution order
    pub async fn bookmarks_for_instance(&self, instance_id: &str) -> Result<Vec<BookmarkRecord>> {
        self.store()
            .list(&BookmarkFilter::new().with_instance_id(instance_id))
            .await
    }

    /// Rebuild the hash index from the stored records
    pub async fn rebuild_index(&self) -> Result<usize> {
        self.store().rebuild_index().await
    }
}

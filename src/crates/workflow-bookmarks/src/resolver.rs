//! Stimulus resolution
//!
//! [`Resolver::find`] turns an inbound [`Stimulus`] into the ordered list of stored bookmarks
//! it matches:
//!
//! ```text
//!   stimulus ─► hash ─► index lookup ─► get each candidate ─► correlation filter ─► sort
//!                                         │
//!                                         └─ NotFound: stale index entry, skipped
//! ```
//!
//! Resolution never burns anything. The caller decides whether to consume every match
//! (fan-out) or only the first, through the [`BurnCoordinator`](crate::BurnCoordinator).

use crate::bookmark::{BookmarkKey, BookmarkRecord, InstanceId, Stimulus};
use crate::error::{BookmarkError, Result};
use crate::hasher::{BookmarkHasher, CorrelationHasher};
use crate::registry::StimulusRegistry;
use crate::store::BookmarkStore;
use futures::future::try_join_all;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Caller-supplied scope applied to candidates after lookup
#[derive(Clone, Default)]
pub enum CorrelationFilter {
    /// Every candidate passes
    #[default]
    Any,
    /// Only bookmarks of one workflow instance
    Instance(InstanceId),
    /// Only bookmarks of the listed instances
    Instances(BTreeSet<InstanceId>),
    /// Arbitrary predicate, e.g. a tenant check against metadata
    Predicate(Arc<dyn Fn(&BookmarkRecord) -> bool + Send + Sync>),
}

impl CorrelationFilter {
    pub fn instance(instance_id: impl Into<InstanceId>) -> Self {
        Self::Instance(instance_id.into())
    }

    pub fn predicate(f: impl Fn(&BookmarkRecord) -> bool + Send + Sync + 'static) -> Self {
        Self::Predicate(Arc::new(f))
    }

    pub fn matches(&self, record: &BookmarkRecord) -> bool {
        match self {
            Self::Any => true,
            Self::Instance(instance_id) => &record.instance_id == instance_id,
            Self::Instances(instance_ids) => instance_ids.contains(&record.instance_id),
            Self::Predicate(f) => f(record),
        }
    }
}

impl fmt::Debug for CorrelationFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "Any"),
            Self::Instance(id) => f.debug_tuple("Instance").field(id).finish(),
            Self::Instances(ids) => f.debug_tuple("Instances").field(ids).finish(),
            Self::Predicate(_) => write!(f, "Predicate(..)"),
        }
    }
}

/// Finds the bookmarks a stimulus resumes
#[derive(Clone)]
pub struct Resolver {
    store: Arc<dyn BookmarkStore>,
    registry: Arc<StimulusRegistry>,
    hasher: Arc<dyn BookmarkHasher>,
}

impl Resolver {
    /// Resolver using the default [`CorrelationHasher`] over `registry`
    pub fn new(store: Arc<dyn BookmarkStore>, registry: Arc<StimulusRegistry>) -> Self {
        let hasher = Arc::new(CorrelationHasher::new(registry.clone()));
        Self {
            store,
            registry,
            hasher,
        }
    }

    /// Replace the hasher
    pub fn with_hasher(mut self, hasher: Arc<dyn BookmarkHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn store(&self) -> &Arc<dyn BookmarkStore> {
        &self.store
    }

    pub fn registry(&self) -> &StimulusRegistry {
        &self.registry
    }

    pub fn hasher(&self) -> &Arc<dyn BookmarkHasher> {
        &self.hasher
    }

    /// Hash a stimulus the same way bookmarks are hashed
    pub fn hash_of(&self, stimulus: &Stimulus) -> String {
        self.hasher.compute(&stimulus.name, stimulus.payload.as_ref())
    }

    /// Bookmarks matching `stimulus` that pass `filter`, oldest first
    pub async fn find(
        &self,
        stimulus: &Stimulus,
        filter: &CorrelationFilter,
    ) -> Result<Vec<BookmarkRecord>> {
        self.registry.ensure_known(&stimulus.name)?;

        let hash = self.hash_of(stimulus);
        let candidates = self.store.find_by_hash(&hash).await?;

        let fetched = try_join_all(candidates.into_iter().map(|key| self.fetch(key))).await?;

        let mut matches: Vec<BookmarkRecord> = fetched
            .into_iter()
            .flatten()
            .filter(|record| record.bookmark.hash == hash)
            .filter(|record| filter.matches(record))
            .collect();
        matches.sort_by(|a, b| a.resolution_order(b));

        debug!(
            stimulus = %stimulus.name,
            hash = %hash,
            matches = matches.len(),
            "Stimulus resolved"
        );
        Ok(matches)
    }

    async fn fetch(&self, key: BookmarkKey) -> Result<Option<BookmarkRecord>> {
        match self.store.get(&key.instance_id, &key.bookmark_id).await {
            Ok(record) => Ok(Some(record)),
            Err(BookmarkError::NotFound { .. }) => {
                debug!(bookmark = %key, "Index entry without record, skipping");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

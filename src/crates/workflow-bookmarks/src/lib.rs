//! # workflow-bookmarks - Suspension Points for Long-Running Workflows
//!
//! **Bookmark storage, hash indexing and stimulus resolution** for a workflow engine that
//! suspends in-flight instances and resumes them when an external event arrives, possibly
//! after a restart.
//!
//! ## Overview
//!
//! A bookmark records that an activity, at a given node of a workflow instance, is waiting
//! for a named condition. When an event (a *stimulus*) comes in, this crate finds every
//! bookmark waiting for it, decides which ones may be resumed, and hands the engine a list
//! of [`ResumeTarget`]s.
//!
//! ## Core Concepts
//!
//! ### 1. Bookmarks and hashes
//!
//! A [`Bookmark`] carries a `hash` computed by a [`BookmarkHasher`] from its name and the
//! correlation-relevant part of its payload. Stimuli are hashed the same way, so matching is
//! an index lookup rather than a scan. The default [`CorrelationHasher`] is SHA-256 over a
//! canonical JSON rendering filtered by the [`CorrelationPolicy`] registered for the name.
//!
//! ### 2. Store and index
//!
//! The [`BookmarkStore`] trait is keyed by `(instance_id, bookmark_id)` and exposes lookup by
//! hash. [`InMemoryBookmarkStore`] keeps records sharded per instance and maintains a
//! [`BookmarkIndex`] in the same critical section as each write. The index can be rebuilt
//! from the records while writes continue.
//!
//! ### 3. Resolution and burning
//!
//! - [`Resolver::find`] - hash, look up, fetch, filter, order (never consumes)
//! - [`BurnCoordinator::try_consume`] - conditional delete, exactly one winner per bookmark
//! - [`BookmarkService::resume`] - both of the above, fan-out or first-match
//!
//! ### 4. Persistence
//!
//! [`InMemoryBookmarkStore::save_snapshot`] and [`InMemoryBookmarkStore::load_snapshot`] write
//! and read [`BookmarkSnapshot`]s as JSON or bincode.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use workflow_bookmarks::{
//!     BookmarkConfig, BookmarkService, CorrelationFilter, InMemoryBookmarkStore, Stimulus,
//!     SuspendRequest,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(InMemoryBookmarkStore::new());
//!     let service = BookmarkService::new(store, BookmarkConfig::default())?;
//!
//!     // Activity suspends, waiting for the order to be paid
//!     let bookmark = service
//!         .suspend_with_bookmark(
//!             SuspendRequest::new("order-wf-17", "OrderPaid", "wait-payment", "checkout:3")
//!                 .with_payload(json!({"orderId": "42"}))
//!                 .with_callback_method_name("OnPaid"),
//!         )
//!         .await?;
//!     println!("Suspended on bookmark {}", bookmark.id);
//!
//!     // Payment event arrives
//!     let stimulus = Stimulus::new("OrderPaid").with_payload(json!({"orderId": "42"}));
//!     let outcome = service.resume(&stimulus, &CorrelationFilter::Any).await?;
//!     assert_eq!(outcome.targets.len(), 1);
//!
//!     // Bookmark was burned; a duplicate delivery matches nothing
//!     let duplicate = service.resume(&stimulus, &CorrelationFilter::Any).await?;
//!     assert!(duplicate.targets.is_empty());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      BookmarkService                        │
//! │  suspend / started / terminated / remove / resume           │
//! └──────────────┬──────────────────────────────┬───────────────┘
//!                │                              │
//!                ▼                              ▼
//! ┌──────────────────────────────┐  ┌───────────────────────────┐
//! │  Resolver                    │  │  BurnCoordinator          │
//! │  StimulusRegistry + Hasher   │  │  delete_if_unchanged      │
//! └──────────────┬───────────────┘  └─────────────┬─────────────┘
//!                │                                │
//!                ▼                                ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │            BookmarkStore (InMemoryBookmarkStore)            │
//! │   records per instance  ──►  BookmarkIndex (hash → keys)    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! All operations return [`Result<T>`] with [`BookmarkError`]. A lost burn race is `Ok(false)`,
//! not an error; [`BookmarkError::is_retryable`] tells callers which failures to retry.

pub mod bookmark;
pub mod burn;
pub mod config;
pub mod error;
pub mod hasher;
pub mod index;
pub mod registry;
pub mod resolver;
pub mod service;
pub mod snapshot;
pub mod store;

// Re-export main types
pub use bookmark::{Bookmark, BookmarkId, BookmarkKey, BookmarkRecord, InstanceId, Stimulus};
pub use burn::BurnCoordinator;
pub use config::{BookmarkConfig, ResumeMode, SnapshotConfig, SnapshotFormat};
pub use error::{BookmarkError, Result};
pub use hasher::{BookmarkHasher, CorrelationHasher};
pub use index::BookmarkIndex;
pub use registry::{CorrelationPolicy, StimulusDescriptor, StimulusRegistry};
pub use resolver::{CorrelationFilter, Resolver};
pub use service::{BookmarkService, ResumeOutcome, ResumeTarget, SuspendRequest};
pub use snapshot::{
    serializer_for, BincodeSnapshotSerializer, BookmarkSnapshot, JsonSnapshotSerializer,
    SnapshotRecord, SnapshotSerializer, SNAPSHOT_FORMAT_VERSION,
};
pub use store::{BookmarkFilter, BookmarkStore, InMemoryBookmarkStore};

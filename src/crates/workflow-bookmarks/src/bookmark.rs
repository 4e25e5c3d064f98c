//! Core bookmark data structures
//!
//! A **[`Bookmark`]** records that one activity of one workflow instance is suspended and
//! waiting for a named condition. Bookmarks are created when the activity suspends, matched
//! against inbound stimuli by their [`hash`](Bookmark::hash), and either burned (deleted) on
//! the first successful match or kept for further matches, depending on
//! [`auto_burn`](Bookmark::auto_burn).
//!
//! # Core Types
//!
//! - [`Bookmark`] - The suspension point itself
//! - [`BookmarkKey`] - Store key: owning instance id + bookmark id
//! - [`BookmarkRecord`] - A stored bookmark with its owner and revision
//! - [`Stimulus`] - Inbound event (name + payload) that may match bookmarks
//!
//! # Lifecycle
//!
//! ```text
//!   activity suspends          activity instance known        stimulus matches
//!  ───────────────────►  ┌──────────┐  ───────────────────►  ┌──────────┐
//!     create (rev 1)     │ Bookmark │   update (rev 2)       │ Bookmark │ ──► burned (auto_burn)
//!                        └──────────┘                        └──────────┘ ──► kept   (!auto_burn)
//!                              │
//!                              └──► removed when the instance terminates or stops waiting
//! ```
//!
//! Only `activity_instance_id` (set once) and `metadata` may change after creation. The
//! payload is treated as immutable: a different payload means a different hash, so the
//! activity removes the old bookmark and creates a new one.
//!
//! # Quick Start
//!
//! ```rust
//! use workflow_bookmarks::Bookmark;
//! use serde_json::json;
//!
//! let bookmark = Bookmark::new("bm-1", "OrderPaid", "hash", "wait-payment", "flow:wait-payment")
//!     .with_payload(json!({"orderId": "42"}))
//!     .with_auto_burn(true)
//!     .with_callback_method_name("OnPaymentReceived");
//!
//! assert!(bookmark.auto_complete);
//! assert!(bookmark.validate().is_ok());
//! ```

use crate::error::{BookmarkError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Bookmark ID type
pub type BookmarkId = String;

/// Workflow instance ID type
pub type InstanceId = String;

/// Store key of a bookmark: the owning workflow instance plus the bookmark id
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BookmarkKey {
    pub instance_id: InstanceId,
    pub bookmark_id: BookmarkId,
}

impl BookmarkKey {
    pub fn new(instance_id: impl Into<InstanceId>, bookmark_id: impl Into<BookmarkId>) -> Self {
        Self {
            instance_id: instance_id.into(),
            bookmark_id: bookmark_id.into(),
        }
    }
}

impl std::fmt::Display for BookmarkKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.instance_id, self.bookmark_id)
    }
}

/// A suspension point awaiting a named condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bookmark {
    /// Unique id of the bookmark
    pub id: BookmarkId,

    /// Kind of condition the bookmark waits for, usually the stimulus name
    pub name: String,

    /// Digest of the name and correlation-relevant payload; the index key
    pub hash: String,

    /// Activity-specific correlation data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,

    /// Activity definition that owns the bookmark
    pub activity_id: String,

    /// Position of the activity in the workflow graph
    pub activity_node_id: String,

    /// Runtime instance of the activity, once it has started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_instance_id: Option<String>,

    /// Creation time, never mutated
    pub created_at: DateTime<Utc>,

    /// Remove the bookmark on its first successful resolution
    #[serde(default = "default_true")]
    pub auto_burn: bool,

    /// Resume handler to invoke on the owning activity; `None` means the default handler
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_method_name: Option<String>,

    /// Let the engine advance past the activity once resumption completes
    #[serde(default = "default_true")]
    pub auto_complete: bool,

    /// Free-form annotations, not hashed and not matched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
}

fn default_true() -> bool {
    true
}

impl Bookmark {
    /// Create a bookmark with default flags (`auto_burn` and `auto_complete` set)
    pub fn new(
        id: impl Into<BookmarkId>,
        name: impl Into<String>,
        hash: impl Into<String>,
        activity_id: impl Into<String>,
        activity_node_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            hash: hash.into(),
            payload: None,
            activity_id: activity_id.into(),
            activity_node_id: activity_node_id.into(),
            activity_instance_id: None,
            created_at: Utc::now(),
            auto_burn: true,
            callback_method_name: None,
            auto_complete: true,
            metadata: None,
        }
    }

    /// Set the payload
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Set the activity instance id
    pub fn with_activity_instance_id(mut self, activity_instance_id: impl Into<String>) -> Self {
        self.activity_instance_id = Some(activity_instance_id.into());
        self
    }

    /// Set the creation time
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Set the auto-burn flag
    pub fn with_auto_burn(mut self, auto_burn: bool) -> Self {
        self.auto_burn = auto_burn;
        self
    }

    /// Set the resume handler name
    pub fn with_callback_method_name(mut self, name: impl Into<String>) -> Self {
        self.callback_method_name = Some(name.into());
        self
    }

    /// Set the auto-complete flag
    pub fn with_auto_complete(mut self, auto_complete: bool) -> Self {
        self.auto_complete = auto_complete;
        self
    }

    /// Replace the metadata map
    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Add a single metadata entry
    pub fn with_metadata_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Check the fields that must be non-empty
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("id", &self.id),
            ("name", &self.name),
            ("hash", &self.hash),
            ("activity_id", &self.activity_id),
            ("activity_node_id", &self.activity_node_id),
        ];

        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(BookmarkError::Invalid(format!("{} must not be empty", field)));
            }
        }

        Ok(())
    }

    /// First field that differs from `other` and may not be changed by an update.
    ///
    /// `activity_instance_id` may go from unset to set, but never change once set.
    pub fn protected_change(&self, other: &Bookmark) -> Option<&'static str> {
        if self.id != other.id {
            return Some("id");
        }
        if self.hash != other.hash {
            return Some("hash");
        }
        if self.name != other.name {
            return Some("name");
        }
        if self.activity_id != other.activity_id {
            return Some("activity_id");
        }
        if self.activity_node_id != other.activity_node_id {
            return Some("activity_node_id");
        }
        if self.created_at != other.created_at {
            return Some("created_at");
        }
        if self.payload != other.payload {
            return Some("payload");
        }
        if self.auto_burn != other.auto_burn {
            return Some("auto_burn");
        }
        if self.auto_complete != other.auto_complete {
            return Some("auto_complete");
        }
        if self.callback_method_name != other.callback_method_name {
            return Some("callback_method_name");
        }
        match (&self.activity_instance_id, &other.activity_instance_id) {
            (Some(current), Some(next)) if current != next => Some("activity_instance_id"),
            (Some(_), None) => Some("activity_instance_id"),
            _ => None,
        }
    }
}

/// A bookmark as held by a store
#[derive(Debug, Clone, PartialEq)]
pub struct BookmarkRecord {
    /// Workflow instance owning the bookmark
    pub instance_id: InstanceId,

    /// The bookmark itself
    pub bookmark: Bookmark,

    /// Assigned by the store on create and on every update; conditional deletes compare it
    pub revision: u64,
}

impl BookmarkRecord {
    /// Record at revision 1; stores replace the revision with their own
    pub fn new(instance_id: impl Into<InstanceId>, bookmark: Bookmark) -> Self {
        Self {
            instance_id: instance_id.into(),
            bookmark,
            revision: 1,
        }
    }

    /// Store key of this record
    pub fn key(&self) -> BookmarkKey {
        BookmarkKey::new(self.instance_id.clone(), self.bookmark.id.clone())
    }

    /// Resolution order: creation time, then bookmark id, then owning instance
    pub fn resolution_order(&self, other: &Self) -> Ordering {
        self.bookmark
            .created_at
            .cmp(&other.bookmark.created_at)
            .then_with(|| self.bookmark.id.cmp(&other.bookmark.id))
            .then_with(|| self.instance_id.cmp(&other.instance_id))
    }
}

/// Inbound event that may match one or more bookmarks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stimulus {
    /// Name of the event, compared against bookmark names through the hash
    pub name: String,

    /// Correlation data carried by the event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl Stimulus {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: None,
        }
    }

    /// Set the payload
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

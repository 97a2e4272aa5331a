//! Merge-conflict detection against the last-synchronized upstream copy.
//!
//! A conflict is derived state, never stored: the upstream object can change
//! independently of staging, so every read recomputes it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use satchel_core::{ApiStatus, Timestamp};

use crate::record::StagedRecord;

/// Read-only view of the last-synchronized copy of upstream objects.
///
/// Owned by the synchronization layer; this engine only consumes it.
pub trait UpstreamStore {
    /// Current modification time of the upstream object, if it exists.
    fn date_modified(&self, token: &str) -> Option<Timestamp>;
    /// Last-synchronized content, for display-side diffing.
    fn content(&self, token: &str) -> Option<String>;
}

/// An upstream object snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamObject {
    pub date_modified: Timestamp,
    pub content: String,
}

/// In-memory upstream view, used by tests and the CLI.
#[derive(Debug, Default)]
pub struct MemoryUpstream {
    objects: HashMap<String, UpstreamObject>,
}

impl MemoryUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, token: impl Into<String>, object: UpstreamObject) {
        self.objects.insert(token.into(), object);
    }
}

impl UpstreamStore for MemoryUpstream {
    fn date_modified(&self, token: &str) -> Option<Timestamp> {
        self.objects.get(token).map(|o| o.date_modified)
    }

    fn content(&self, token: &str) -> Option<String> {
        self.objects.get(token).map(|o| o.content.clone())
    }
}

/// Compares a staged snapshot against the live upstream object.
pub struct ConflictDetector;

impl ConflictDetector {
    /// True iff upstream changed after the local edit was taken: the staged
    /// base snapshot is strictly older than the upstream modification time.
    ///
    /// Placeholder objects and files have no upstream counterpart and never
    /// conflict; explicit reconciliation clears a conflict by moving the
    /// base snapshot forward (see `StagingStore::reconcile`).
    pub fn evaluate(staged: &StagedRecord, upstream: &dyn UpstreamStore) -> bool {
        let Some(base) = staged.payload.base_modified() else {
            return false;
        };
        match upstream.date_modified(&staged.token) {
            Some(upstream_modified) => base < upstream_modified,
            None => false,
        }
    }

    /// The wire status for a staged edit: `MasterDataModified` when it
    /// conflicts, `Ok` otherwise.
    pub fn status(staged: &StagedRecord, upstream: &dyn UpstreamStore) -> ApiStatus {
        if Self::evaluate(staged, upstream) {
            ApiStatus::MasterDataModified
        } else {
            ApiStatus::Ok
        }
    }
}

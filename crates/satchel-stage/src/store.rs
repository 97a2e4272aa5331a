//! Staging store: pending local edits keyed by (token, operation), sealed
//! at rest under the master key, flushed atomically via temp+rename.
//!
//! The store lock is the serialization point: cascades and GC passes run
//! under it, so they observe a consistent snapshot and never interleave with
//! a concurrent add/remove on related objects. Concurrent edits to the same
//! (token, operation) serialize last-write-wins.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use satchel_core::{now_epoch, Operation, SatchelResult, StagedKind, Timestamp};
use satchel_crypto::{open_payload, seal_payload, SecretKey};

use crate::record::{StagedRecord, PLACEHOLDER_PREFIX};

/// On-disk form of one staged edit: plaintext metadata, sealed payload.
#[derive(Serialize, Deserialize)]
struct SealedRecord {
    token: String,
    operation: Operation,
    date_modified: Timestamp,
    frozen: bool,
    /// base64 of `seal_payload(master_key, payload JSON)`
    payload: String,
}

struct Inner {
    records: BTreeMap<(String, Operation), StagedRecord>,
    dirty: bool,
}

/// Persisted staging table with an in-memory mirror.
pub struct StagingStore {
    db_path: PathBuf,
    master_key: SecretKey,
    inner: Mutex<Inner>,
}

impl StagingStore {
    /// Load or create the staging table, opening every sealed payload with
    /// the given master key. A payload that fails to open means the wrong
    /// key or a corrupted store; both refuse to open.
    pub fn open(db_path: &Path, master_key: SecretKey) -> Result<Self> {
        let mut records = BTreeMap::new();

        if db_path.exists() {
            let content = std::fs::read_to_string(db_path)
                .with_context(|| format!("reading staging table: {}", db_path.display()))?;
            let sealed: Vec<SealedRecord> = serde_json::from_str(&content)
                .with_context(|| format!("parsing staging table: {}", db_path.display()))?;

            for entry in sealed {
                let blob = BASE64
                    .decode(&entry.payload)
                    .with_context(|| format!("decoding staged payload for {}", entry.token))?;
                let plain = open_payload(&master_key, &blob)
                    .with_context(|| format!("opening staged payload for {}", entry.token))?;
                let payload = serde_json::from_slice(&plain)
                    .with_context(|| format!("parsing staged payload for {}", entry.token))?;
                records.insert(
                    (entry.token.clone(), entry.operation),
                    StagedRecord {
                        token: entry.token,
                        operation: entry.operation,
                        date_modified: entry.date_modified,
                        frozen: entry.frozen,
                        payload,
                    },
                );
            }
        }

        Ok(StagingStore {
            db_path: db_path.to_path_buf(),
            master_key,
            inner: Mutex::new(Inner {
                records,
                dirty: false,
            }),
        })
    }

    /// Insert or replace the staged edit for (token, operation).
    ///
    /// Repeated local edits supersede each other here; last write wins.
    /// Content whose markers point at files that were never staged is stored
    /// as-is; attachment existence is a display-time concern.
    pub fn add(&self, mut record: StagedRecord) -> SatchelResult<()> {
        record.date_modified = now_epoch();
        let mut inner = self.inner.lock().expect("staging store lock");
        tracing::debug!(token = %record.token, op = %record.operation, "staging edit");
        inner
            .records
            .insert((record.token.clone(), record.operation), record);
        inner.dirty = true;
        self.flush_locked(&mut inner).map_err(Into::into)
    }

    /// Replace an existing staged edit's body wholesale. Same storage path
    /// as `add`; the distinction only matters to callers.
    pub fn modify(&self, record: StagedRecord) -> SatchelResult<()> {
        self.add(record)
    }

    /// Typed lookup. Without an operation, returns the most relevant pending
    /// edit for the token: highest operation priority, newest first among
    /// records of the same priority (the keying makes that unique anyway).
    pub fn get(&self, token: &str, operation: Option<Operation>) -> Option<StagedRecord> {
        let inner = self.inner.lock().expect("staging store lock");
        match operation {
            Some(op) => inner.records.get(&(token.to_string(), op)).cloned(),
            None => inner
                .records
                .values()
                .filter(|r| r.token == token)
                .min_by_key(|r| r.operation)
                .cloned(),
        }
    }

    /// Remove a specific staged edit, then garbage-collect file attachments
    /// that no remaining edit references. Missing targets are a no-op.
    pub fn remove(&self, token: &str, operation: Operation) -> SatchelResult<()> {
        let mut inner = self.inner.lock().expect("staging store lock");
        if inner
            .records
            .remove(&(token.to_string(), operation))
            .is_none()
        {
            return Ok(());
        }
        tracing::debug!(token, op = %operation, "staged edit removed");
        inner.dirty = true;
        Self::collect_orphaned_files(&mut inner);
        self.flush_locked(&mut inner).map_err(Into::into)
    }

    /// Undo a pending edit: remove it and run the file GC pass. Double
    /// clicks (already-undone edits) are silent no-ops by design.
    pub fn undo(&self, token: &str, operation: Operation) -> SatchelResult<()> {
        self.remove(token, operation)
    }

    /// Set the frozen flag on every staged edit of an object and cascade:
    ///   1. collect the attachment markers referenced by the target's content
    ///   2. freeze/unfreeze the matching File records
    ///   3. propagate the same flag to every other staged edit referencing
    ///      any of those markers
    ///
    /// One pass suffices: references run file-to-document only, never
    /// document→document. Unknown tokens and re-freezing are no-ops.
    pub fn freeze(&self, token: &str, frozen: bool) -> SatchelResult<()> {
        let mut inner = self.inner.lock().expect("staging store lock");

        let mut markers: BTreeSet<u64> = BTreeSet::new();
        let mut touched = false;
        for record in inner.records.values_mut().filter(|r| r.token == token) {
            if record.frozen != frozen {
                record.frozen = frozen;
                touched = true;
            }
            markers.extend(record.markers());
            if let Some(marker) = record.payload.file_marker() {
                // Freezing a file directly also cascades to its referrers
                markers.insert(marker);
            }
        }
        if markers.is_empty() && !touched {
            return Ok(());
        }

        for record in inner.records.values_mut() {
            let hit = record
                .payload
                .file_marker()
                .map(|m| markers.contains(&m))
                .unwrap_or_else(|| !record.markers().is_disjoint(&markers));
            if hit && record.frozen != frozen {
                record.frozen = frozen;
                touched = true;
            }
        }

        if touched {
            tracing::debug!(token, frozen, "freeze cascade applied");
            inner.dirty = true;
            self.flush_locked(&mut inner)?;
        }
        Ok(())
    }

    /// Move a staged edit's base snapshot forward after the user explicitly
    /// reconciled it against upstream. Clears the derived merge conflict.
    pub fn reconcile(
        &self,
        token: &str,
        operation: Operation,
        upstream_modified: Timestamp,
    ) -> SatchelResult<()> {
        let mut inner = self.inner.lock().expect("staging store lock");
        if let Some(record) = inner.records.get_mut(&(token.to_string(), operation)) {
            record.payload.set_base_modified(upstream_modified);
            inner.dirty = true;
            self.flush_locked(&mut inner)?;
        }
        Ok(())
    }

    /// Restartable enumeration for display: newest first, ties broken by
    /// operation priority.
    pub fn get_all(&self, kind: Option<StagedKind>) -> Vec<StagedRecord> {
        let inner = self.inner.lock().expect("staging store lock");
        let mut records: Vec<StagedRecord> = inner
            .records
            .values()
            .filter(|r| kind.map_or(true, |k| r.kind() == k))
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            b.date_modified
                .cmp(&a.date_modified)
                .then(a.operation.cmp(&b.operation))
        });
        records
    }

    /// Next free placeholder token for an object created while offline.
    pub fn next_placeholder(&self) -> String {
        let inner = self.inner.lock().expect("staging store lock");
        let max = inner
            .records
            .keys()
            .filter_map(|(token, _)| token.strip_prefix(PLACEHOLDER_PREFIX))
            .filter_map(|n| n.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        crate::record::placeholder_token(max + 1)
    }

    /// Re-key every staged edit of a placeholder object once upstream has
    /// assigned its real token.
    pub fn assign_upstream_token(&self, placeholder: &str, real: &str) -> SatchelResult<()> {
        let mut inner = self.inner.lock().expect("staging store lock");
        let keys: Vec<(String, Operation)> = inner
            .records
            .keys()
            .filter(|(token, _)| token == placeholder)
            .cloned()
            .collect();
        if keys.is_empty() {
            return Ok(());
        }
        for key in keys {
            if let Some(mut record) = inner.records.remove(&key) {
                record.token = real.to_string();
                inner.records.insert((real.to_string(), key.1), record);
            }
        }
        tracing::debug!(placeholder, real, "placeholder token assigned");
        inner.dirty = true;
        self.flush_locked(&mut inner).map_err(Into::into)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("staging store lock").records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reference-counted file lifetime: delete every File record whose
    /// marker no remaining staged content embeds.
    fn collect_orphaned_files(inner: &mut Inner) {
        let live: BTreeSet<u64> = inner
            .records
            .values()
            .flat_map(|r| r.markers())
            .collect();
        let before = inner.records.len();
        inner.records.retain(|_, r| {
            r.payload
                .file_marker()
                .map(|marker| live.contains(&marker))
                .unwrap_or(true)
        });
        let collected = before - inner.records.len();
        if collected > 0 {
            tracing::debug!(collected, "orphaned file attachments collected");
            inner.dirty = true;
        }
    }

    /// Flush dirty state to disk using an atomic write (write then rename).
    fn flush_locked(&self, inner: &mut Inner) -> Result<()> {
        if !inner.dirty {
            return Ok(());
        }

        if let Some(parent) = self.db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating store dir: {}", parent.display()))?;
        }

        let mut sealed = Vec::with_capacity(inner.records.len());
        for record in inner.records.values() {
            let plain =
                serde_json::to_vec(&record.payload).context("serializing staged payload")?;
            let blob = seal_payload(&self.master_key, &plain)
                .with_context(|| format!("sealing staged payload for {}", record.token))?;
            sealed.push(SealedRecord {
                token: record.token.clone(),
                operation: record.operation,
                date_modified: record.date_modified,
                frozen: record.frozen,
                payload: BASE64.encode(blob),
            });
        }

        let json = serde_json::to_string_pretty(&sealed).context("serializing staging table")?;
        let tmp_path = self.db_path.with_extension("tmp");
        std::fs::write(&tmp_path, &json)
            .with_context(|| format!("writing staging table temp: {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &self.db_path)
            .with_context(|| format!("renaming staging table: {}", self.db_path.display()))?;

        inner.dirty = false;
        Ok(())
    }
}

impl Drop for StagingStore {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.inner.lock() {
            if inner.dirty {
                if let Err(e) = self.flush_locked(&mut inner) {
                    tracing::warn!("failed to flush staging store on drop: {e}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::StagedPayload;
    use satchel_crypto::KEY_SIZE;

    fn test_key(byte: u8) -> SecretKey {
        SecretKey::from_bytes([byte; KEY_SIZE])
    }

    fn doc(token: &str, content: &str) -> StagedRecord {
        StagedRecord::new(
            token,
            Operation::EditBody,
            StagedPayload::Document {
                title: token.to_string(),
                content: content.to_string(),
                base_modified: 100,
            },
        )
    }

    fn file(token: &str, marker: u64) -> StagedRecord {
        StagedRecord::new(
            token,
            Operation::Create,
            StagedPayload::File {
                marker,
                file_name: format!("file-{marker}.bin"),
                data: vec![0xAB; 8],
            },
        )
    }

    fn open_store(dir: &Path) -> StagingStore {
        StagingStore::open(&dir.join("stage.json"), test_key(7)).unwrap()
    }

    #[test]
    fn test_add_get_supersede() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());

        store.add(doc("PHID-WIKI-1", "v1")).unwrap();
        store.add(doc("PHID-WIKI-1", "v2")).unwrap();

        // Same (token, operation) pair: one record, last write wins
        assert_eq!(store.len(), 1);
        let got = store.get("PHID-WIKI-1", Some(Operation::EditBody)).unwrap();
        assert!(matches!(
            got.payload,
            StagedPayload::Document { ref content, .. } if content == "v2"
        ));
    }

    #[test]
    fn test_get_without_operation_prefers_defining_edit() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());

        let mut field_edit = doc("PHID-WIKI-1", "meta");
        field_edit.operation = Operation::EditField;
        store.add(field_edit).unwrap();
        store.add(doc("PHID-WIKI-1", "body")).unwrap();

        let got = store.get("PHID-WIKI-1", None).unwrap();
        assert_eq!(got.operation, Operation::EditBody);
    }

    #[test]
    fn test_persists_sealed_and_reopens() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = open_store(dir.path());
            store.add(doc("PHID-WIKI-1", "offline edit {F-3}")).unwrap();
            store.add(file("PHID-FILE-3", 3)).unwrap();
        }

        // Payloads on disk are sealed, not plaintext
        let raw = std::fs::read_to_string(dir.path().join("stage.json")).unwrap();
        assert!(!raw.contains("offline edit"));
        assert!(raw.contains("PHID-WIKI-1"));

        let store = open_store(dir.path());
        assert_eq!(store.len(), 2);
        let got = store.get("PHID-WIKI-1", None).unwrap();
        assert_eq!(got.markers(), BTreeSet::from([3]));
    }

    #[test]
    fn test_open_with_wrong_key_refuses() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = open_store(dir.path());
            store.add(doc("PHID-WIKI-1", "secret")).unwrap();
        }
        let result = StagingStore::open(&dir.path().join("stage.json"), test_key(8));
        assert!(result.is_err());
    }

    #[test]
    fn test_undo_and_freeze_missing_are_noops() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        store.undo("PHID-WIKI-404", Operation::EditBody).unwrap();
        store.freeze("PHID-WIKI-404", true).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_get_all_ordering() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());

        let mut a = doc("PHID-WIKI-1", "a");
        let mut b = doc("PHID-WIKI-2", "b");
        let mut c = b.clone();
        c.operation = Operation::EditComment;
        store.add(a.clone()).unwrap();
        store.add(b.clone()).unwrap();
        store.add(c.clone()).unwrap();

        // Pin timestamps directly to make the ordering deterministic
        {
            let mut inner = store.inner.lock().unwrap();
            a.date_modified = 100;
            b.date_modified = 300;
            c.date_modified = 300;
            for r in [&a, &b, &c] {
                inner
                    .records
                    .insert((r.token.clone(), r.operation), r.clone());
            }
        }

        let all = store.get_all(None);
        assert_eq!(all.len(), 3);
        // Newest first; equal timestamps fall back to operation priority
        assert_eq!(all[0].date_modified, 300);
        assert_eq!(all[0].operation, Operation::EditBody);
        assert_eq!(all[1].operation, Operation::EditComment);
        assert_eq!(all[2].date_modified, 100);

        let docs_only = store.get_all(Some(StagedKind::Document));
        assert_eq!(docs_only.len(), 3);
        assert!(store.get_all(Some(StagedKind::File)).is_empty());
    }

    #[test]
    fn test_placeholder_allocation_and_assignment() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());

        assert_eq!(store.next_placeholder(), "NEWTOKEN-1");
        store.add(doc("NEWTOKEN-1", "new page")).unwrap();
        assert_eq!(store.next_placeholder(), "NEWTOKEN-2");

        store
            .assign_upstream_token("NEWTOKEN-1", "PHID-WIKI-77")
            .unwrap();
        assert!(store.get("NEWTOKEN-1", None).is_none());
        assert!(store.get("PHID-WIKI-77", None).is_some());
    }

    #[test]
    fn test_malformed_marker_content_is_stored_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        // References a file that was never staged; accepted at write time
        store.add(doc("PHID-WIKI-1", "dangling {F-99}")).unwrap();
        assert_eq!(store.len(), 1);
    }
}

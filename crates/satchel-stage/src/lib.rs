//! satchel-stage: offline-edit staging engine
//!
//! Records pending local mutations to remotely-sourced objects (documents,
//! tasks, file attachments, metadata transactions) until they are reconciled
//! with the remote source. Owns:
//!
//!   - conflict detection against the last-synchronized upstream copy
//!   - freeze/unfreeze (exclude an edit from the next upload, keep it locally)
//!     with cascades across file attachments and their other referrers
//!   - undo with reference-counted garbage collection of file attachments
//!
//! Staged payloads are sealed with the store's master key before they touch
//! disk; everything a cascade or GC pass needs stays plaintext metadata.

pub mod conflict;
pub mod record;
pub mod store;

pub use conflict::{ConflictDetector, MemoryUpstream, UpstreamObject, UpstreamStore};
pub use record::{placeholder_token, StagedPayload, StagedRecord, PLACEHOLDER_PREFIX};
pub use store::StagingStore;

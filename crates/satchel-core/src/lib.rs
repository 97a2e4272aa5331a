pub mod config;
pub mod error;
pub mod types;

pub use error::{SatchelError, SatchelResult};
pub use types::{now_epoch, ApiStatus, AuthFactor, Operation, StagedKind, Timestamp};

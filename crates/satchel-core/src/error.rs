use thiserror::Error;

pub type SatchelResult<T> = Result<T, SatchelError>;

/// Error taxonomy for the key & staging engine.
///
/// `Authentication` deliberately covers both "unknown account" and "wrong
/// password" so callers cannot enumerate accounts. Destructive staging
/// operations never produce `NotFound`; reads that are expected to return
/// data do.
#[derive(Debug, Error)]
pub enum SatchelError {
    #[error("authentication failed")]
    Authentication,

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("upstream changed since the edit was staged: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

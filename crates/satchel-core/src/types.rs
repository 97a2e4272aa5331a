use serde::{Deserialize, Serialize};

/// Unix timestamp in seconds
pub type Timestamp = u64;

/// Current wall-clock time as a Unix timestamp.
pub fn now_epoch() -> Timestamp {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Status field of JSON responses produced by login and password-change flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiStatus {
    /// Request succeeded
    #[serde(rename = "OK")]
    Ok,
    /// Request failed for an unremarkable reason
    #[serde(rename = "NOK")]
    Nok,
    /// Credentials rejected (never distinguishes unknown account from wrong password)
    AuthenticationError,
    /// Empty store: the first account was created from these credentials
    BootstrappedNewAccount,
    /// Upstream changed after the local edit was staged; reconciliation required
    MasterDataModified,
}

/// Kind of pending change a staged edit represents.
///
/// Ordering doubles as relevance priority: when a caller asks for "the"
/// pending edit of an object without naming an operation, `Create` beats
/// `EditBody` beats `EditComment` beats `EditField`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    EditBody,
    EditComment,
    EditField,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Operation::Create => "create",
            Operation::EditBody => "edit_body",
            Operation::EditComment => "edit_comment",
            Operation::EditField => "edit_field",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Operation::Create),
            "edit_body" => Ok(Operation::EditBody),
            "edit_comment" => Ok(Operation::EditComment),
            "edit_field" => Ok(Operation::EditField),
            other => Err(format!("unknown operation: {other}")),
        }
    }
}

/// Object kind a staged edit applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StagedKind {
    Document,
    Task,
    File,
    Transaction,
}

/// How a session was authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthFactor {
    /// No factor supplied yet
    None,
    /// A password was typed
    Knowledge,
    /// OS-level identity (no password; private partition stays locked)
    ExternalIdentity,
}

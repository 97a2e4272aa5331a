use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level engine configuration (loaded from satchel.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SatchelConfig {
    pub store: StoreConfig,
    pub kdf: KdfConfig,
    pub remote: RemoteConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding the local store files (default: ~/.local/share/satchel)
    pub data_dir: PathBuf,
    /// Account table file name within data_dir
    pub accounts_file: String,
    /// Staged-edit table file name within data_dir
    pub stage_file: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let home = std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"));
        Self {
            data_dir: home.join(".local/share/satchel"),
            accounts_file: "accounts.json".into(),
            stage_file: "stage.json".into(),
        }
    }
}

impl StoreConfig {
    pub fn accounts_path(&self) -> PathBuf {
        self.data_dir.join(&self.accounts_file)
    }

    pub fn stage_path(&self) -> PathBuf {
        self.data_dir.join(&self.stage_file)
    }
}

/// Argon2id cost parameters for password-derived keys.
///
/// These must stay stable for the lifetime of a store: the token hash is a
/// pure function of (username, password, costs), so changing costs silently
/// invalidates every stored account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfConfig {
    /// Memory cost in KiB (default: 65536 = 64 MiB)
    pub mem_cost_kib: u32,
    /// Time cost / iterations (default: 3)
    pub time_cost: u32,
    /// Parallelism (default: 4)
    pub parallelism: u32,
}

impl Default for KdfConfig {
    fn default() -> Self {
        Self {
            mem_cost_kib: 65536,
            time_cost: 3,
            parallelism: 4,
        }
    }
}

/// Remote source the staged edits will eventually be reconciled against.
///
/// The engine only records these; the synchronization protocol itself lives
/// outside this workspace.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the remote tracker
    pub url: String,
    /// Conduit API token used by the synchronization layer
    pub conduit_api_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl SatchelConfig {
    /// Load configuration from a TOML file, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!("config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading config {}: {e}", path.display()))?;
        let config: SatchelConfig = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("parsing config {}: {e}", path.display()))?;
        Ok(config)
    }
}

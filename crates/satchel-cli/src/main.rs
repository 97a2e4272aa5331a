//! satchel: offline mirror store CLI
//!
//! Commands:
//!   login <username>                 - run the login protocol, print the JSON status
//!   passwd <username>                - change a password without re-encrypting the store
//!   add-user <username>              - add another account that unlocks the same store
//!   stage list [--kind <k>]          - staged edits, newest first
//!   stage freeze <token>             - exclude an edit (and its files) from the next upload
//!   stage unfreeze <token>           - include it again
//!   stage undo <token> <operation>   - drop a pending edit and collect orphaned files

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use secrecy::SecretString;
use std::collections::HashMap;
use std::path::PathBuf;

use satchel_accounts::{AccountStore, AuthEngine, Token};
use satchel_core::config::SatchelConfig;
use satchel_core::{ApiStatus, Operation, StagedKind};
use satchel_crypto::KdfParams;
use satchel_stage::{
    ConflictDetector, MemoryUpstream, StagingStore, UpstreamObject, UpstreamStore,
};

#[derive(Parser, Debug)]
#[command(
    name = "satchel",
    version,
    about = "Offline mirror store: multi-password unlock and staged-edit management"
)]
struct Cli {
    /// Path to satchel.toml configuration file
    #[arg(long, short = 'c', env = "SATCHEL_CONFIG", default_value = "satchel.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Log in (bootstraps the store on first run)
    Login {
        username: String,
        /// Record the remote tracker URL on the account
        #[arg(long)]
        remote_url: Option<String>,
        /// Record the Conduit API token used by the synchronization layer
        #[arg(long)]
        conduit_api_token: Option<String>,
    },

    /// Change a password; the store's ciphertext is untouched
    Passwd {
        username: String,
    },

    /// Add another account that unlocks the same store
    AddUser {
        username: String,
    },

    /// Staged offline edits
    Stage {
        #[command(subcommand)]
        action: StageAction,
    },
}

#[derive(Subcommand, Debug)]
enum StageAction {
    /// List staged edits, newest first
    List {
        /// Filter by kind: document, task, file, transaction
        #[arg(long)]
        kind: Option<String>,
    },
    /// Keep an edit locally but exclude it from the next upload
    Freeze { token: String },
    /// Include a frozen edit in the next upload again
    Unfreeze { token: String },
    /// Drop a pending edit and collect orphaned file attachments
    Undo { token: String, operation: Operation },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = SatchelConfig::load(&cli.config)?;
    init_logging(&config.log.level, &config.log.format);

    match cli.command {
        Commands::Login {
            username,
            remote_url,
            conduit_api_token,
        } => login(&config, &username, remote_url, conduit_api_token),
        Commands::Passwd { username } => passwd(&config, &username),
        Commands::AddUser { username } => add_user(&config, &username),
        Commands::Stage { action } => stage(&config, action),
    }
}

fn init_logging(level: &str, format: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn kdf_params(config: &SatchelConfig) -> KdfParams {
    KdfParams {
        mem_cost_kib: config.kdf.mem_cost_kib,
        time_cost: config.kdf.time_cost,
        parallelism: config.kdf.parallelism,
    }
}

fn auth_engine(config: &SatchelConfig) -> Result<AuthEngine> {
    let accounts = AccountStore::open(&config.store.accounts_path())
        .context("opening account store")?;
    Ok(AuthEngine::new(accounts, kdf_params(config)))
}

fn prompt_password(prompt: &str) -> Result<SecretString> {
    let password = rpassword::prompt_password(prompt).context("reading password")?;
    Ok(SecretString::from(password))
}

fn prompt_line(prompt: &str) -> Result<String> {
    use std::io::Write;
    print!("{prompt}");
    std::io::stdout().flush().context("flushing prompt")?;
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .context("reading input")?;
    Ok(line.trim().to_string())
}

fn print_status(status: ApiStatus) -> Result<()> {
    println!("{}", serde_json::json!({ "status": status }));
    Ok(())
}

fn login(
    config: &SatchelConfig,
    username: &str,
    remote_url: Option<String>,
    conduit_api_token: Option<String>,
) -> Result<()> {
    let engine = auth_engine(config)?;
    let password = prompt_password("Password: ")?;
    let response = engine.login(username, &password)?;
    if let Some(token) = &response.token {
        if remote_url.is_some() || conduit_api_token.is_some() {
            engine.update_remote(&token.id, remote_url, conduit_api_token)?;
        }
    }
    print_status(response.status)
}

fn passwd(config: &SatchelConfig, username: &str) -> Result<()> {
    let engine = auth_engine(config)?;
    let old_password = prompt_password("Old password: ")?;
    let new_password = prompt_password("New password: ")?;

    // Establish the session the change will replace
    let login = engine.login(username, &old_password)?;
    let Some(token) = login.token else {
        return print_status(login.status);
    };

    let response = engine.change_password(&token.id, username, &old_password, &new_password)?;
    print_status(response.status)
}

fn add_user(config: &SatchelConfig, new_username: &str) -> Result<()> {
    let engine = auth_engine(config)?;
    let existing = prompt_line("Existing account user name: ")?;
    let password = prompt_password("Existing account password: ")?;

    let login = engine.login(&existing, &password)?;
    let Some(token) = login.token else {
        return print_status(login.status);
    };

    let new_password = prompt_password("New account password: ")?;
    let response = engine.add_account(&token.id, new_username, &new_password)?;
    print_status(response.status)
}

/// Authenticate and open the staging store with the session's master key.
fn open_stage(config: &SatchelConfig) -> Result<(Token, StagingStore)> {
    let engine = auth_engine(config)?;
    let username = prompt_line("User name: ")?;
    let password = prompt_password("Password: ")?;

    let login = engine.login(&username, &password)?;
    let token = login.token.with_context(|| {
        format!("login failed: {}", serde_json::json!({ "status": login.status }))
    })?;

    let store = StagingStore::open(&config.store.stage_path(), token.encryption_key.clone())
        .context("opening staging store")?;
    Ok((token, store))
}

/// Load the last-synchronized upstream snapshot maintained by the sync
/// layer, if one exists. Conflicts are recomputed on every listing.
fn load_upstream(config: &SatchelConfig) -> Result<MemoryUpstream> {
    let path = config.store.data_dir.join("upstream.json");
    let mut upstream = MemoryUpstream::new();
    if path.exists() {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading upstream snapshot: {}", path.display()))?;
        let objects: HashMap<String, UpstreamObject> = serde_json::from_str(&content)
            .with_context(|| format!("parsing upstream snapshot: {}", path.display()))?;
        for (token, object) in objects {
            upstream.insert(token, object);
        }
    }
    Ok(upstream)
}

fn stage(config: &SatchelConfig, action: StageAction) -> Result<()> {
    let (_token, store) = open_stage(config)?;

    match action {
        StageAction::List { kind } => {
            let kind = kind
                .map(|k| parse_kind(&k))
                .transpose()?;
            let upstream = load_upstream(config)?;
            list_staged(&store, &upstream, kind);
            Ok(())
        }
        StageAction::Freeze { token } => {
            store.freeze(&token, true)?;
            print_status(ApiStatus::Ok)
        }
        StageAction::Unfreeze { token } => {
            store.freeze(&token, false)?;
            print_status(ApiStatus::Ok)
        }
        StageAction::Undo { token, operation } => {
            store.undo(&token, operation)?;
            print_status(ApiStatus::Ok)
        }
    }
}

fn parse_kind(s: &str) -> Result<StagedKind> {
    match s {
        "document" => Ok(StagedKind::Document),
        "task" => Ok(StagedKind::Task),
        "file" => Ok(StagedKind::File),
        "transaction" => Ok(StagedKind::Transaction),
        other => anyhow::bail!("unknown kind: {other}"),
    }
}

fn list_staged(store: &StagingStore, upstream: &dyn UpstreamStore, kind: Option<StagedKind>) {
    let records = store.get_all(kind);
    if records.is_empty() {
        println!("no staged edits");
        return;
    }

    println!(
        "{:<24} {:<14} {:<12} {:<7} STATUS",
        "TOKEN", "OPERATION", "KIND", "FROZEN"
    );
    for record in records {
        let status = ConflictDetector::status(&record, upstream);
        println!(
            "{:<24} {:<14} {:<12} {:<7} {}",
            record.token,
            record.operation.to_string(),
            format!("{:?}", record.kind()).to_lowercase(),
            if record.frozen { "yes" } else { "no" },
            serde_json::json!(status),
        );
    }
}

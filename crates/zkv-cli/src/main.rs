//! zkv: zero-knowledge credential vault CLI
//!
//! Every command opens a fresh session against the configured remote store
//! and local cache. Commands that touch credentials unlock first, reading the
//! passphrase from ZKV_PASSPHRASE or prompting for it.
//!
//!   status              - remote store reachability and key state
//!   config show         - display current configuration
//!   unlock              - create the vault key, or check the passphrase
//!   list                - list credentials (filter by space, search, sort)
//!   add                 - store a new credential
//!   delete <id>         - remove a credential everywhere
//!   spaces              - list or add space labels
//!   generate            - print a strong random password
//!   audit               - compare the local cache with the remote store
//!   logout              - wipe this user's data from the local cache

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::{ExposeSecret, SecretString};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use zkv_core::config::{expand_tilde, VaultConfig};
use zkv_core::{CredentialFields, UserIdentity};
use zkv_storage::{build_operator, check_health, open_local_store, OpendalRemoteStore, S3Credentials};
use zkv_sync::{
    PassphraseStatus, ReadyKind, SessionSettings, SortOrder, SpaceFilter, UnlockOutcome,
    VaultSession, ViewQuery,
};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "zkv",
    version,
    about = "Zero-knowledge credential vault",
    long_about = "zkv: store credentials encrypted on the device; the remote store only ever sees ciphertext"
)]
struct Cli {
    /// Path to the zkv configuration file
    #[arg(long, short = 'c', env = "ZKV_CONFIG", default_value = "~/.config/zkv/config.toml")]
    config: PathBuf,

    /// Vault owner
    #[arg(long, short = 'u', env = "ZKV_USER")]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show remote store and key status
    Status,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Set the passphrase on first use, or check it afterwards
    Unlock,

    /// List credentials
    List {
        /// Only show credentials in this space
        #[arg(long, short = 's')]
        space: Option<String>,
        /// Case-insensitive match on website or username
        #[arg(long, short = 'q')]
        search: Option<String>,
        /// Sort order: alphabetical or newest
        #[arg(long, default_value = "alphabetical")]
        sort: SortOrder,
        /// Print passwords in clear text
        #[arg(long)]
        show_passwords: bool,
    },

    /// Store a new credential
    Add {
        #[arg(long)]
        username: String,
        #[arg(long)]
        website: Option<String>,
        /// Space label (default: main)
        #[arg(long, short = 's')]
        space: Option<String>,
        /// Generate a random password of this length instead of reading one
        #[arg(long, value_name = "LENGTH")]
        generate: Option<usize>,
        /// Password to store (prompted for when absent)
        #[arg(long, env = "ZKV_ENTRY_PASSWORD", hide_env_values = true, hide = true)]
        password: Option<String>,
    },

    /// Delete a credential by id
    Delete { id: String },

    /// List space labels, or add one
    Spaces {
        #[arg(long)]
        add: Option<String>,
    },

    /// Print a strong random password
    Generate {
        #[arg(long, short = 'l', default_value_t = 20)]
        length: usize,
    },

    /// Compare the local cache against the remote store
    Audit,

    /// Lock the vault and wipe this user's local data
    Logout,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = expand_tilde(&cli.config);
    let config = VaultConfig::load(&config_path)
        .with_context(|| format!("loading config: {}", config_path.display()))?;
    init_logging(&config.log.level, &config.log.format);

    let user = cli.user.as_deref();
    let session = || open_session(&config, user);

    match cli.command {
        Commands::Status => cmd_status(&config, &session().await?).await,
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &config_path),
        Commands::Unlock => cmd_unlock(&session().await?).await,
        Commands::List {
            space,
            search,
            sort,
            show_passwords,
        } => cmd_list(&session().await?, space, search, sort, show_passwords).await,
        Commands::Add {
            username,
            website,
            space,
            generate,
            password,
        } => cmd_add(&session().await?, username, website, space, generate, password).await,
        Commands::Delete { id } => cmd_delete(&session().await?, &id).await,
        Commands::Spaces { add } => cmd_spaces(&session().await?, add.as_deref()).await,
        Commands::Generate { length } => cmd_generate(length),
        Commands::Audit => cmd_audit(&session().await?).await,
        Commands::Logout => cmd_logout(&session().await?).await,
    }
}

fn init_logging(level: &str, format: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries command output; logs go to stderr
    match format {
        "json" => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        _ => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

fn resolve_user(flag: Option<&str>) -> Result<UserIdentity> {
    let id = flag
        .map(str::to_string)
        .or_else(|| std::env::var("USER").ok())
        .context("no vault user; pass --user or set ZKV_USER")?;
    Ok(UserIdentity::new(id)?)
}

// ── Session wiring ────────────────────────────────────────────────────────────

async fn open_session(config: &VaultConfig, user: Option<&str>) -> Result<VaultSession> {
    let user = resolve_user(user)?;
    let creds = S3Credentials::from_env();
    let op = build_operator(&config.storage, creds.as_ref())?;
    let remote = Arc::new(OpendalRemoteStore::new(op, &config.storage.prefix));
    let local = open_local_store(&config.local)
        .await
        .context("opening local cache")?;
    tracing::debug!(
        user = %user,
        remote = %config.storage.backend,
        local = %config.local.backend,
        "session opened"
    );
    Ok(VaultSession::new(
        user,
        local,
        remote,
        SessionSettings::from_config(config),
    ))
}

/// Passphrase from ZKV_PASSPHRASE, else an interactive prompt.
fn read_passphrase(confirm: bool) -> Result<SecretString> {
    if let Ok(p) = std::env::var("ZKV_PASSPHRASE") {
        return Ok(SecretString::from(p));
    }
    let first = rpassword::prompt_password("Vault passphrase: ").context("reading passphrase")?;
    if confirm {
        let second =
            rpassword::prompt_password("Repeat passphrase: ").context("reading passphrase")?;
        if first != second {
            anyhow::bail!("passphrases do not match");
        }
    }
    Ok(SecretString::from(first))
}

/// Unlock the session, creating the vault key on first use.
async fn unlock(session: &VaultSession) -> Result<ReadyKind> {
    let first_use = session.passphrase_status().await? == PassphraseStatus::NotSet;
    if first_use {
        eprintln!("No vault key found for {}; choose a passphrase.", session.user());
    }
    let passphrase = read_passphrase(first_use)?;

    let spinner = make_spinner("unlock");
    spinner.set_message("deriving key...");
    let outcome = session.unlock(&passphrase).await;
    spinner.finish_and_clear();

    match outcome? {
        UnlockOutcome::Ready(kind) => Ok(kind),
        UnlockOutcome::WrongPassphraseOrCorruptKey => {
            anyhow::bail!("wrong passphrase or corrupt key record")
        }
    }
}

fn make_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

// ── `zkv status` ──────────────────────────────────────────────────────────────

async fn cmd_status(config: &VaultConfig, session: &VaultSession) -> Result<()> {
    let creds = S3Credentials::from_env();
    let op = build_operator(&config.storage, creds.as_ref())?;
    let store = OpendalRemoteStore::new(op, &config.storage.prefix);
    let remote = match check_health(&store).await {
        Ok(vaults) => format!("ok, {vaults} vault(s)"),
        Err(e) => format!("UNREACHABLE ({e})"),
    };
    let key = match session.passphrase_status().await {
        Ok(PassphraseStatus::Set) => "set".to_string(),
        Ok(PassphraseStatus::NotSet) => "not set (run `zkv unlock`)".to_string(),
        Err(e) => format!("unknown ({e})"),
    };

    println!("zkv v{}", env!("CARGO_PKG_VERSION"));
    println!("  user:    {}", session.user());
    println!(
        "  remote:  {} [{}]",
        describe_remote(config),
        remote
    );
    println!(
        "  local:   {} ({})",
        config.local.backend,
        expand_tilde(&config.local.path).display()
    );
    println!("  key:     {key}");
    Ok(())
}

fn describe_remote(config: &VaultConfig) -> String {
    let s = &config.storage;
    match s.backend.as_str() {
        "s3" => format!("s3 {}/{}/{}", s.endpoint, s.bucket, s.prefix),
        "fs" => format!("fs {}/{}", expand_tilde(&s.root).display(), s.prefix),
        other => other.to_string(),
    }
}

// ── `zkv config show` ─────────────────────────────────────────────────────────

fn cmd_config_show(config: &VaultConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

// ── `zkv unlock` ──────────────────────────────────────────────────────────────

async fn cmd_unlock(session: &VaultSession) -> Result<()> {
    match unlock(session).await? {
        ReadyKind::Created => println!("vault key created for {}", session.user()),
        ReadyKind::Unlocked => {
            let count = session.list_decrypted().await?.len();
            println!("unlocked: {count} credential(s)");
        }
    }
    report_unreadable(session).await
}

async fn report_unreadable(session: &VaultSession) -> Result<()> {
    let unreadable = session.unreadable().await?;
    if !unreadable.is_empty() {
        eprintln!("warning: {} record(s) could not be decrypted:", unreadable.len());
        for id in unreadable {
            eprintln!("  {id}");
        }
    }
    Ok(())
}

// ── `zkv list` ────────────────────────────────────────────────────────────────

async fn cmd_list(
    session: &VaultSession,
    space: Option<String>,
    search: Option<String>,
    sort: SortOrder,
    show_passwords: bool,
) -> Result<()> {
    unlock(session).await?;
    let query = ViewQuery {
        space: space.map(SpaceFilter::Named).unwrap_or_default(),
        search,
        sort,
    };
    let entries = session.view(&query).await?;
    if entries.is_empty() {
        println!("no credentials");
    }
    for c in &entries {
        let password = if show_passwords {
            c.password.expose_secret().to_string()
        } else {
            "********".to_string()
        };
        println!(
            "{}  [{}]  {}  {}  {}",
            c.id,
            c.space,
            c.website.as_deref().unwrap_or("-"),
            c.username,
            password
        );
    }
    report_unreadable(session).await
}

// ── `zkv add` ─────────────────────────────────────────────────────────────────

async fn cmd_add(
    session: &VaultSession,
    username: String,
    website: Option<String>,
    space: Option<String>,
    generate: Option<usize>,
    password: Option<String>,
) -> Result<()> {
    let password = match (generate, password) {
        (Some(len), _) => zkv_crypto::generate_strong_password(len)?,
        (None, Some(p)) => SecretString::from(p),
        (None, None) => SecretString::from(
            rpassword::prompt_password("Password to store: ").context("reading password")?,
        ),
    };

    let mut fields = CredentialFields::new(username, password);
    if let Some(w) = website {
        fields = fields.with_website(w);
    }
    if let Some(s) = space {
        fields = fields.with_space(s);
    }
    // Fail on bad input before asking for the passphrase
    fields.validate()?;

    unlock(session).await?;
    let created = session.create_credential(fields).await?;
    println!("created {} in space {}", created.id, created.space);
    if generate.is_some() {
        println!("password: {}", created.password.expose_secret());
    }
    Ok(())
}

// ── `zkv delete` ──────────────────────────────────────────────────────────────

async fn cmd_delete(session: &VaultSession, id: &str) -> Result<()> {
    unlock(session).await?;
    session.delete_credential(id).await?;
    println!("deleted {id}");
    Ok(())
}

// ── `zkv spaces` ──────────────────────────────────────────────────────────────

async fn cmd_spaces(session: &VaultSession, add: Option<&str>) -> Result<()> {
    let spaces = match add {
        Some(name) => session.add_space(name).await?,
        None => session.spaces().await?,
    };
    for s in spaces {
        println!("{s}");
    }
    Ok(())
}

// ── `zkv generate` ────────────────────────────────────────────────────────────

fn cmd_generate(length: usize) -> Result<()> {
    let password = zkv_crypto::generate_strong_password(length)?;
    println!("{}", password.expose_secret());
    Ok(())
}

// ── `zkv audit` ───────────────────────────────────────────────────────────────

async fn cmd_audit(session: &VaultSession) -> Result<()> {
    unlock(session).await?;
    let report = session.audit().await?;
    println!("local:   {}", report.local);
    println!("remote:  {}", report.remote);
    if report.pending > 0 {
        println!("pending: {}", report.pending);
    }
    if !report.remote_unreadable.is_empty() {
        println!("remote records that do not parse:");
        for id in &report.remote_unreadable {
            println!("  {id}");
        }
    }
    println!("cache and remote agree");
    Ok(())
}

// ── `zkv logout` ──────────────────────────────────────────────────────────────

async fn cmd_logout(session: &VaultSession) -> Result<()> {
    session.logout().await?;
    println!("local data for this device cleared");
    Ok(())
}

mod credential_commands;
mod maintenance_commands;

use std::path::PathBuf;

use {
    anyhow::Context,
    clap::{Parser, Subcommand},
    strongbox_config::{StrongboxConfig, VaultPaths},
    strongbox_metrics::{MetricsRecorderConfig, init_metrics},
    strongbox_vault::{DailyBackup, RecordId, Vault},
    tracing::{debug, info},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "strongbox", about = "Strongbox: encrypted credential store", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Custom data directory (overrides config and the platform default).
    #[arg(long, global = true, env = "STRONGBOX_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Print collected metrics in Prometheus format to stderr on exit.
    #[arg(long, global = true, default_value_t = false)]
    metrics: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a credential. The secret is read from stdin.
    Add {
        service: String,
        username: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// List stored credentials.
    List {
        /// Include secrets, emails and notes in the output.
        #[arg(long)]
        reveal: bool,
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Show one credential, including its secret.
    Show {
        id: RecordId,
        #[arg(long)]
        json: bool,
    },
    /// Change fields of a credential.
    Edit {
        id: RecordId,
        #[arg(long)]
        service: Option<String>,
        #[arg(long)]
        username: Option<String>,
        /// Read a new secret from stdin.
        #[arg(long)]
        secret: bool,
        #[arg(long, conflicts_with = "clear_email")]
        email: Option<String>,
        #[arg(long)]
        clear_email: bool,
        #[arg(long, conflicts_with = "clear_notes")]
        notes: Option<String>,
        #[arg(long)]
        clear_notes: bool,
    },
    /// Delete a credential and its key.
    Delete { id: RecordId },
    /// Remove key files that no longer belong to a record.
    Sweep,
    /// Verify that every record has a key and decrypts.
    Check,
    /// Write a snapshot of records and keys.
    Backup {
        /// Snapshot directory. Defaults to today's daily backup.
        #[arg(long)]
        dest: Option<PathBuf>,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr; stdout carries command output only.
    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// Open the vault described by `config`, wiring the daily backup and the
/// startup sweep.
async fn open_vault(config: &StrongboxConfig) -> anyhow::Result<Vault> {
    let paths = VaultPaths::from_config(config);
    debug!(data_dir = %paths.data_dir.display(), "resolved vault paths");

    let mut vault = Vault::open(&paths.database, &paths.keys_dir)
        .await
        .with_context(|| format!("failed to open vault in {}", paths.data_dir.display()))?;
    if let Some(dir) = paths.backup_dir {
        vault = vault.with_daily_backup(DailyBackup::new(dir));
    }

    if config.maintenance.sweep_on_open {
        let swept = vault.sweep_orphan_keys().await?;
        if !swept.is_empty() {
            info!(count = swept.len(), "removed orphan keys on open");
        }
    }

    Ok(vault)
}

/// `--field value` sets, `--clear-field` clears, neither leaves it alone.
fn clearable(value: Option<String>, clear: bool) -> Option<Option<String>> {
    if clear { Some(None) } else { value.map(Some) }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_telemetry(&cli);

    let metrics = init_metrics(MetricsRecorderConfig {
        enabled: cli.metrics,
        ..Default::default()
    })?;

    debug!(version = env!("CARGO_PKG_VERSION"), "strongbox starting");

    if let Some(ref dir) = cli.data_dir {
        strongbox_config::set_data_dir(dir.clone());
    }
    let config = strongbox_config::discover_and_load();
    let vault = open_vault(&config).await?;

    let result = match cli.command {
        Commands::Add {
            service,
            username,
            email,
            notes,
        } => credential_commands::add(&vault, service, username, email, notes).await,
        Commands::List { reveal, json } => credential_commands::list(&vault, reveal, json).await,
        Commands::Show { id, json } => credential_commands::show(&vault, id, json).await,
        Commands::Edit {
            id,
            service,
            username,
            secret,
            email,
            clear_email,
            notes,
            clear_notes,
        } => {
            let fields = credential_commands::EditFields {
                service,
                username,
                secret,
                email: clearable(email, clear_email),
                notes: clearable(notes, clear_notes),
            };
            credential_commands::edit(&vault, id, fields).await
        },
        Commands::Delete { id } => credential_commands::delete(&vault, id).await,
        Commands::Sweep => maintenance_commands::sweep(&vault).await,
        Commands::Check => maintenance_commands::check(&vault).await,
        Commands::Backup { dest } => maintenance_commands::backup(&vault, dest).await,
    };

    if cli.metrics {
        eprint!("{}", metrics.render());
    }

    result
}

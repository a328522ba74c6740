//! keepsync CLI
//!
//! Keeps a KeePass database in sync with versioned S3-compatible remotes.
//!
//! # Commands
//!
//! - `sync` - Push or pull, whichever side is newer (default)
//! - `status` - Show what `sync` would do
//! - `push` / `pull` - Force a direction
//! - `sync-all` - Push the local database to every remote
//! - `remote` - List and edit configured remotes

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use humansize::{format_size, BINARY};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use keepsync::config::{default_remote, RemoteConfig, SyncConfigFile};
use keepsync::fs::DatabaseSelector;
use keepsync::remote::{RemoteSelection, S3StoreFactory, StoreFactory};
use keepsync::sync::{sync_all, DecisionKind, PullPolicy, Reconciler, SyncOutcome, SyncRequest};
use keepsync::SyncError;

/// Keep a KeePass database in sync with versioned S3 remotes.
#[derive(Parser)]
#[command(name = "keepsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (.json, .yaml or .yml)
    #[arg(global = true, short, long, env = "KEEPSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args, Clone, Default)]
struct DbArgs {
    /// Remote to use instead of the default one
    #[arg(short, long)]
    remote: Option<String>,

    /// Exact database file name (no directory scan)
    #[arg(short, long, conflicts_with_all = ["pattern", "glob"])]
    file: Option<String>,

    /// Regular expression selecting candidate files
    #[arg(long, conflicts_with = "glob")]
    pattern: Option<String>,

    /// Glob selecting candidate files, e.g. '*.kdbx'
    #[arg(long)]
    glob: Option<String>,

    /// Directory holding the database
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// On pull, move the local file aside as a conflict copy instead of replacing it
    #[arg(long)]
    keep_both: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Push or pull, whichever side is newer
    Sync(DbArgs),
    /// Show what sync would do, without transferring
    Status(DbArgs),
    /// Upload the local database as a new remote version
    Push(DbArgs),
    /// Download the latest remote version
    Pull(DbArgs),
    /// Push the local database to every configured remote
    SyncAll(DbArgs),
    /// Manage configured remotes
    Remote {
        #[command(subcommand)]
        command: RemoteCommands,
    },
}

#[derive(Subcommand)]
enum RemoteCommands {
    /// List configured remotes
    List {
        /// Also print the API keys
        #[arg(long)]
        show_secrets: bool,
    },
    /// Add a remote
    Add {
        name: String,
        #[arg(long)]
        bucket: String,
        #[arg(long, default_value = "")]
        endpoint: String,
        #[arg(long, default_value = "")]
        region: String,
        #[arg(long, env = "KEEPSYNC_API_ID", default_value = "")]
        api_id: String,
        #[arg(long, env = "KEEPSYNC_API_KEY", default_value = "", hide_env_values = true)]
        api_key: String,
        /// Make this the default remote
        #[arg(long)]
        default: bool,
    },
    /// Remove a remote
    Remove { name: String },
    /// Make a remote the default one
    SetDefault { name: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    if let Err(err) = run(cli).await {
        eprintln!("Error: {:#}", err);
        if let Some(sync_err) = err.downcast_ref::<SyncError>() {
            eprintln!("Suggestion: {}", sync_err.suggestion());
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = match cli.config {
        Some(path) => path,
        None => SyncConfigFile::default_path().ok_or_else(|| anyhow!("no config directory; pass --config"))?,
    };
    let factory: Arc<dyn StoreFactory> = Arc::new(S3StoreFactory);

    match cli.command.unwrap_or(Commands::Sync(DbArgs::default())) {
        Commands::Sync(args) => {
            let config = load(&config_path)?;
            let outcome = reconciler(&config, &args, factory)?.run().await?;
            print_outcome(&outcome);
        }
        Commands::Status(args) => {
            let config = load(&config_path)?;
            let plan = reconciler(&config, &args, factory)?.plan().await?;
            println!("Local:  {} (modified {})", plan.local.path.display(), plan.local.modified_at);
            println!(
                "Remote: {} version {} (modified {})",
                plan.remote_name, plan.remote.version_id, plan.remote.last_modified
            );
            println!("Action: {}", plan.action.description());
        }
        Commands::Push(args) => {
            let config = load(&config_path)?;
            let outcome = reconciler(&config, &args, factory)?.push_forced().await?;
            print_outcome(&outcome);
        }
        Commands::Pull(args) => {
            let config = load(&config_path)?;
            let outcome = reconciler(&config, &args, factory)?.pull_forced().await?;
            print_outcome(&outcome);
        }
        Commands::SyncAll(args) => {
            let config = load(&config_path)?;
            let request = request(&config, &args)?;
            let mut failed = 0;
            for (name, result) in sync_all(&request, &config.remotes, factory).await {
                match result {
                    Ok(outcome) => print_outcome(&outcome),
                    Err(e) => {
                        failed += 1;
                        eprintln!("{}: {}", name, e);
                    }
                }
            }
            if failed > 0 {
                return Err(anyhow!("{} of {} remotes failed", failed, config.remotes.len()));
            }
        }
        Commands::Remote { command } => remote_command(&config_path, command)?,
    }

    Ok(())
}

fn load(path: &Path) -> Result<SyncConfigFile> {
    SyncConfigFile::load(path).map_err(SyncError::from).context("failed to load config")
}

fn request(config: &SyncConfigFile, args: &DbArgs) -> Result<SyncRequest> {
    let selector = if let Some(file) = &args.file {
        DatabaseSelector::Exact(file.clone())
    } else if let Some(pattern) = &args.pattern {
        DatabaseSelector::Pattern(pattern.clone())
    } else if let Some(glob) = &args.glob {
        DatabaseSelector::Glob(glob.clone())
    } else {
        config.selector()
    };

    let directory = match args.dir.clone().or_else(|| config.directory.clone()) {
        Some(dir) => dir,
        None => std::env::current_dir().context("failed to read working directory")?,
    };

    let mut request = SyncRequest::new(directory, selector);
    if let Some(name) = &config.db_name {
        request = request.with_db_name(name.clone());
    }
    Ok(request)
}

fn reconciler(config: &SyncConfigFile, args: &DbArgs, factory: Arc<dyn StoreFactory>) -> Result<Reconciler> {
    let selection = match &args.remote {
        Some(name) => RemoteSelection::Named(name.clone()),
        None => RemoteSelection::Default,
    };
    let policy = if args.keep_both {
        PullPolicy::KeepBoth
    } else {
        config.pull_policy
    };

    Ok(Reconciler::new(request(config, args)?, config.remotes.clone(), factory)
        .with_selection(selection)
        .with_pull_policy(policy))
}

fn print_outcome(outcome: &SyncOutcome) {
    let version = outcome
        .version
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_default();
    match outcome.action {
        DecisionKind::NoOp => {
            let name = outcome.local.as_ref().map(|l| l.name.as_str()).unwrap_or("database");
            println!("{} is already in sync with remote {}.", name, outcome.remote_name);
        }
        DecisionKind::Push => {
            let name = outcome.local.as_ref().map(|l| l.name.as_str()).unwrap_or("database");
            println!(
                "Pushed {} ({}) to remote {} as version {}.",
                name,
                format_size(outcome.bytes, BINARY),
                outcome.remote_name,
                version
            );
        }
        DecisionKind::Pull => {
            let path = outcome
                .written_to
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            println!(
                "Pulled version {} ({}) from remote {} to {}.",
                version,
                format_size(outcome.bytes, BINARY),
                outcome.remote_name,
                path
            );
            if let Some(kept) = &outcome.kept_as {
                println!("Previous local copy kept as {}.", kept.display());
            }
        }
    }
}

fn remote_command(path: &Path, command: RemoteCommands) -> Result<()> {
    match command {
        RemoteCommands::List { show_secrets } => {
            let config = load(path)?;
            let default_name = default_remote(&config.remotes).ok().map(|r| r.name.clone());
            for (i, r) in config.remotes.iter().enumerate() {
                let marker = if Some(&r.name) == default_name.as_ref() { " (default)" } else { "" };
                println!("Remote #{}: {}{}", i, r.name, marker);
                println!("  Endpoint: {}", if r.endpoint.is_empty() { "AWS" } else { &r.endpoint });
                println!("  Region:   {}", r.effective_region());
                println!("  Bucket:   {}", r.bucket);
                println!("  Key ID:   {}", r.credential_id);
                if show_secrets {
                    println!("  API key:  {}", r.credential_secret);
                }
            }
        }
        RemoteCommands::Add {
            name,
            bucket,
            endpoint,
            region,
            api_id,
            api_key,
            default,
        } => {
            let mut config = if path.exists() {
                load(path)?
            } else {
                SyncConfigFile::empty(path)
            };
            let mut remote = RemoteConfig::new(&name, bucket)
                .with_endpoint(endpoint)
                .with_region(region)
                .with_credentials(api_id, api_key);
            // The first remote becomes the default.
            remote.is_default = default || config.remotes.is_empty();
            config.add_remote(remote).map_err(SyncError::from)?;
            config.save().map_err(SyncError::from)?;
            println!("Added remote {}.", name);
        }
        RemoteCommands::Remove { name } => {
            let mut config = load(path)?;
            config.remove_remote(&name).map_err(SyncError::from)?;
            config.save().map_err(SyncError::from)?;
            println!("Removed remote {}.", name);
        }
        RemoteCommands::SetDefault { name } => {
            let mut config = load(path)?;
            config.set_default(&name).map_err(SyncError::from)?;
            config.save().map_err(SyncError::from)?;
            println!("Remote {} is now the default.", name);
        }
    }
    Ok(())
}

//! filesync - synchronize the DBAFS index and notify owners of changed files

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use filesync::report;
use filesync::{
    Dbafs, Filesync, FilesyncConfig, JsonDirectory, OutboxTransport, SyncOptions,
};
use filesync_logging::LogConfig;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::warn;

#[derive(Parser, Debug)]
#[command(name = "filesync", about = "Synchronize the DBAFS index and notify file owners")]
struct Cli {
    /// Enable verbose logging (debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Config file (default: <FILESYNC_HOME>/filesync.toml)
    #[arg(long, global = true, env = "FILESYNC_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Reconcile the index with the upload directory and send notifications
    Sync {
        /// Optional path(s) for partial synchronization
        paths: Vec<String>,

        /// Report changes without writing the index or sending mail
        #[arg(long)]
        dry_run: bool,

        /// Update the index but send no notifications
        #[arg(long)]
        no_notify: bool,
    },

    /// Print the live snapshot of the upload directory
    Scan {
        /// Optional path(s) to scan
        paths: Vec<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _log_guard = match filesync_logging::init_logging(LogConfig {
        app_name: "filesync",
        verbose: cli.verbose,
        log_dir: None,
    }) {
        Ok(guard) => Some(guard),
        Err(err) => {
            eprintln!("Warning: failed to initialize logging: {:#}", err);
            None
        }
    };

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:?}", err);
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.unwrap_or_else(FilesyncConfig::default_path);
    let config = FilesyncConfig::load_or_default(&config_path)
        .with_context(|| format!("Failed to load config: {}", config_path.display()))?;

    match cli.command {
        Commands::Sync {
            paths,
            dry_run,
            no_notify,
        } => cmd_sync(&config, &paths, dry_run, no_notify),
        Commands::Scan { paths, json } => cmd_scan(&config, &paths, json),
    }
}

fn cmd_sync(config: &FilesyncConfig, paths: &[String], dry_run: bool, no_notify: bool) -> Result<()> {
    let mut options = SyncOptions::from_config(config);
    options.notify &= !(dry_run || no_notify);

    let directory = if options.notify {
        match JsonDirectory::load(&config.directory_path) {
            Ok(directory) => directory,
            Err(e) => {
                warn!(error = %e, "Directory unavailable, notifications disabled for this run");
                println!("{}", report::notice_line(&e));
                options.notify = false;
                JsonDirectory::default()
            }
        }
    } else {
        JsonDirectory::default()
    };
    let directory = Arc::new(directory);

    let store = Dbafs::from_config(config).with_dry_run(dry_run);
    let mut filesync = Filesync::new(
        Box::new(store),
        directory.clone(),
        directory,
        Box::new(OutboxTransport::new(&config.notify.outbox_dir)),
        options,
    );

    println!("Synchronizing…");
    let outcome = filesync
        .synchronize(paths)
        .context("Synchronization failed")?;

    for notice in &outcome.notices {
        println!("{}", report::notice_line(notice));
    }
    for line in report::delivery_lines(&outcome.delivery) {
        println!("{}", line);
    }
    println!("{}", report::render_change_set(&outcome.change_set));
    println!();
    println!("{}", report::completion_line(outcome.duration));
    Ok(())
}

fn cmd_scan(config: &FilesyncConfig, paths: &[String], json: bool) -> Result<()> {
    let snapshot = Dbafs::from_config(config)
        .snapshot(paths)
        .context("Failed to scan upload directory")?;

    if json {
        let entries: Vec<_> = snapshot.iter().collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    for entry in snapshot.iter() {
        let marker = if entry.is_directory { "d" } else { "f" };
        println!("{} {} {}", marker, entry.hash, entry.path);
    }
    println!(
        "{} entries ({} files)",
        snapshot.len(),
        snapshot.file_count()
    );
    Ok(())
}

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Offline repair tools for a stopped Jellyfin server.
///
/// Back up your data directory before running any of these.
#[derive(Debug, Parser)]
#[command(name = "jellyfin-repair", version, about)]
pub struct Cli {
    /// Path to config.toml
    #[arg(long, global = true, env = "JELLYFIN_REPAIR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Jellyfin data directory (contains data/library.db)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Do not copy databases or user files before changing them
    #[arg(long, global = true)]
    pub no_backup: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Remove standalone duplicates of trailers and other extras
    Extras(ExtrasArgs),

    /// Unlock local user accounts and optionally reset their passwords
    Login(LoginArgs),
}

#[derive(Debug, Args)]
pub struct ExtrasArgs {
    /// Path to library.db (overrides --data-dir)
    #[arg(long)]
    pub library_db: Option<PathBuf>,

    /// Log every change, then roll all of them back
    #[arg(long)]
    pub dry_run: bool,

    /// Commit each statement on its own instead of one transaction
    #[arg(long, conflicts_with = "dry_run")]
    pub no_transaction: bool,
}

#[derive(Debug, Args)]
pub struct LoginArgs {
    /// Path to users.db (overrides --data-dir)
    #[arg(long)]
    pub users_db: Option<PathBuf>,

    /// Directory containing one folder of policy.xml/config.xml per user
    #[arg(long)]
    pub users_dir: Option<PathBuf>,

    /// Only repair the user with this name
    #[arg(long)]
    pub user: Option<String>,

    /// Restore every locked-out user without asking; never resets passwords
    #[arg(long, short = 'y')]
    pub yes: bool,
}

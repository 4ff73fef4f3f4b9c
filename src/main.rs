use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod config;
mod db;
mod error;
mod models;
mod services;

use cli::{Cli, Command, ExtrasArgs, LoginArgs};
use config::AppConfig;
use error::PreflightError;
use services::extras::{ExtrasRepairer, RepairOptions};
use services::preflight;
use services::prompt::{ConsolePrompter, UnattendedPrompter};
use services::users::{LoginRepairOptions, LoginRepairer};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jellyfin_repair=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(preflight) = e.downcast_ref::<PreflightError>() {
                tracing::error!("{}", preflight);
                tracing::error!("{}", preflight.remediation());
                return ExitCode::from(preflight.exit_code());
            }
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = AppConfig::load(cli.config.as_deref());
    if let Some(data_dir) = cli.data_dir {
        config.set_data_dir(data_dir);
    }
    if cli.no_backup {
        config.backup = false;
    }
    config.log_config();

    match cli.command {
        Command::Extras(args) => run_extras(&config, args).await,
        Command::Login(args) => run_login(&config, args).await,
    }
}

async fn run_extras(config: &AppConfig, args: ExtrasArgs) -> Result<()> {
    let library_db = args
        .library_db
        .unwrap_or_else(|| config.paths.library_db.clone());

    preflight::ensure_server_stopped(&config.process_name)?;
    preflight::ensure_exists(&library_db)?;
    preflight::ensure_writable(&library_db)?;

    if config.backup && !args.dry_run {
        db::backup_store(&library_db).await?;
    }

    let pool = db::open_store(&library_db).await?;

    let options = RepairOptions {
        transactional: config.transactional && !args.no_transaction,
        dry_run: args.dry_run,
    };
    let result = ExtrasRepairer::new(pool.clone(), options).run().await;
    pool.close().await;
    let report = result?;

    tracing::info!(
        "{} incorrect keys, {} extras lists rewritten, {} items deleted, {} empty markers cleared",
        report.blacklisted_keys,
        report.lists_rewritten,
        report.rows_deleted,
        report.empty_markers_cleared
    );
    if !report.anomalies.is_empty() {
        tracing::warn!(
            "{} paths are shared in ways this tool does not repair; review them manually",
            report.anomalies.len()
        );
    }
    if report.dry_run {
        tracing::info!("Dry run complete, nothing was written.");
    } else if report.is_clean() {
        tracing::info!("Nothing to fix.");
    } else {
        tracing::info!("Done.");
    }

    Ok(())
}

async fn run_login(config: &AppConfig, args: LoginArgs) -> Result<()> {
    let users_db = args
        .users_db
        .unwrap_or_else(|| config.paths.users_db.clone());
    let users_dir = args
        .users_dir
        .unwrap_or_else(|| config.paths.users_dir.clone());

    preflight::ensure_server_stopped(&config.process_name)?;
    preflight::ensure_exists(&users_db)?;

    let pool = db::open_store(&users_db).await?;

    let mut repairer = LoginRepairer::new(
        pool.clone(),
        LoginRepairOptions {
            users_db,
            users_dir,
            only_user: args.user,
            backup: config.backup,
        },
    );

    let result = if args.yes {
        repairer.run(&mut UnattendedPrompter).await
    } else {
        repairer.run(&mut ConsolePrompter::new()).await
    };
    pool.close().await;
    let report = result?;

    tracing::info!(
        "{} users checked, {} restored, {} passwords reset",
        report.users_seen,
        report.users_restored,
        report.passwords_reset
    );

    Ok(())
}

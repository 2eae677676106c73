//! clubsync CLI - inspect and sync the club directory from the terminal

mod cli;
mod commands;
mod error;

use clap::Parser;
use clubsync_core::db::ClubFilter;

use crate::cli::{Cli, Commands};
use crate::commands::common::{resolve_settings, SettingsOverrides};
use crate::commands::completions::run_completions;
use crate::commands::diff::run_diff;
use crate::commands::export::run_export;
use crate::commands::sync::run_sync;
use crate::commands::validate::run_validate;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("clubsync=info".parse().expect("valid directive")),
        )
        .init();

    let cli = Cli::parse();
    if let Commands::Completions { shell, output } = &cli.command {
        return run_completions(*shell, output.as_deref());
    }

    let settings = resolve_settings(SettingsOverrides {
        repo_root: cli.repo_root,
        snapshot: cli.snapshot,
        db_path: cli.db_path,
    })?;

    match cli.command {
        Commands::Diff { all, json } => run_diff(&settings, all, json).await?,
        Commands::Sync {
            strategy,
            message,
            local,
            json,
        } => run_sync(&settings, strategy.into(), message, local, json).await?,
        Commands::Export {
            province,
            school,
            output,
        } => {
            let mut filter = ClubFilter::all();
            if let Some(province) = province {
                filter = filter.province(province);
            }
            if let Some(school) = school {
                filter = filter.school(school);
            }
            run_export(&settings, &filter, output.as_deref()).await?;
        }
        Commands::Validate { json } => run_validate(&settings, json).await?,
        Commands::Completions { .. } => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests;

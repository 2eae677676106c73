use std::sync::Arc;

use clubsync_core::sync::SyncPipeline;
use clubsync_core::vcs::{PullOutcome, PushMethod};
use clubsync_core::{GitGateway, Strategy, SyncCoordinator, SyncResult, SyncSettings};

use crate::commands::common::{
    format_counts, format_duplicate_lines, format_failure_lines, open_reconciler,
};
use crate::error::CliError;

pub async fn run_sync(
    settings: &SyncSettings,
    strategy: Strategy,
    message: Option<String>,
    local: bool,
    as_json: bool,
) -> Result<(), CliError> {
    let reconciler = open_reconciler(settings).await?;

    if local {
        let report = reconciler.reconcile(strategy).await?;
        if as_json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            println!("{strategy}: {}", format_counts(&report.counts));
            for line in format_failure_lines(&report.failures)
                .into_iter()
                .chain(format_duplicate_lines(&report.duplicates))
            {
                println!("{line}");
            }
            if !report.file_written {
                println!("Snapshot unchanged");
            }
        }
        return Ok(());
    }

    let gateway = Arc::new(GitGateway::new(settings.git_config()));
    let coordinator = SyncCoordinator::spawn(SyncPipeline::new(
        reconciler,
        gateway,
        settings.pipeline_options(),
    ));
    let result = coordinator.trigger(strategy, message).wait().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        for line in format_sync_result(&result) {
            println!("{line}");
        }
    }
    Ok(())
}

pub fn format_sync_result(result: &SyncResult) -> Vec<String> {
    let mut lines = vec![format!("{}: {}", result.strategy, format_counts(&result.counts))];
    lines.extend(format_failure_lines(&result.failures));
    lines.extend(format_duplicate_lines(&result.duplicates));

    if let PullOutcome::ConflictsResolved {
        kept_local,
        took_remote,
    } = &result.pull
    {
        lines.push(format!(
            "Resolved pull conflicts: kept local {}, took remote {}",
            kept_local.len(),
            took_remote.len()
        ));
    }

    if result.committed {
        let method = match result.method {
            Some(PushMethod::ResolvedConflict) => "after resolving a rejection",
            Some(PushMethod::Normal) | None => "normal",
        };
        lines.push(format!("Committed \"{}\" and pushed ({method})", result.commit_message));
    } else {
        lines.push("Nothing to commit".to_string());
    }

    if let Some(reimport) = &result.reimport {
        lines.push(format!("Re-imported: {}", format_counts(&reimport.counts)));
    }
    if let Some(error) = &result.reimport_error {
        lines.push(format!("Warning: database re-import failed: {}", error.message));
    }
    lines
}

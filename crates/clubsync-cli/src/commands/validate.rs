use clubsync_core::diff::{diff, Side};
use clubsync_core::reconcile::{validate_entries, RecordFailure};
use clubsync_core::{SnapshotFile, SyncSettings};
use serde::Serialize;

use crate::commands::common::format_failure_lines;
use crate::error::CliError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSummary {
    pub total: usize,
    pub problems: Vec<RecordFailure>,
}

/// Read the snapshot and list every entry the database would reject.
///
/// Entries sharing a natural key are reported too; only the first of them
/// takes part in a sync.
pub async fn validate_snapshot(settings: &SyncSettings) -> Result<ValidationSummary, CliError> {
    let entries = SnapshotFile::new(settings.snapshot_path())
        .read_required()
        .await?;

    let mut problems = validate_entries(&entries);
    let duplicates = diff(&[], &entries).duplicates;
    problems.extend(
        duplicates
            .into_iter()
            .filter(|group| group.side == Side::File)
            .map(|group| RecordFailure {
                record: group.key.to_string(),
                reason: format!("{} entries share this name and school", group.count),
            }),
    );

    Ok(ValidationSummary {
        total: entries.len(),
        problems,
    })
}

pub async fn run_validate(settings: &SyncSettings, as_json: bool) -> Result<(), CliError> {
    let summary = validate_snapshot(settings).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        for line in format_failure_lines(&summary.problems) {
            println!("{line}");
        }
        println!(
            "{} entries checked, {} problems",
            summary.total,
            summary.problems.len()
        );
    }

    if summary.problems.is_empty() {
        Ok(())
    } else {
        Err(CliError::InvalidSnapshot(summary.problems.len()))
    }
}

use std::path::PathBuf;
use std::sync::Arc;

use clubsync_core::diff::{DiffEntry, DiffKind, DiffReport, DuplicateGroup, Side};
use clubsync_core::reconcile::{RecordFailure, SyncCounts};
use clubsync_core::services::DatabaseService;
use clubsync_core::{Reconciler, SnapshotFile, SyncSettings};

use crate::error::CliError;

/// Global flags that take precedence over the environment
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub repo_root: Option<PathBuf>,
    pub snapshot: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
}

pub fn resolve_settings(overrides: SettingsOverrides) -> Result<SyncSettings, CliError> {
    Ok(apply_overrides(SyncSettings::from_env()?, overrides))
}

pub fn apply_overrides(mut settings: SyncSettings, overrides: SettingsOverrides) -> SyncSettings {
    if let Some(repo_root) = overrides.repo_root {
        settings.repo_root = repo_root;
    }
    if let Some(snapshot) = overrides.snapshot {
        settings.snapshot_path = snapshot;
    }
    if let Some(db_path) = overrides.db_path {
        settings.db_path = db_path;
    }
    settings
}

pub async fn open_reconciler(settings: &SyncSettings) -> Result<Arc<Reconciler>, CliError> {
    let store = Arc::new(DatabaseService::open_path(&settings.db_path).await?);
    Ok(Arc::new(Reconciler::new(
        store,
        SnapshotFile::new(settings.snapshot_path()),
    )))
}

pub fn format_diff_lines(report: &DiffReport, include_identical: bool) -> Vec<String> {
    let stats = &report.stats;
    let mut lines = vec![format!(
        "database: {} records ({} unique), snapshot: {} records ({} unique)",
        stats.store_total, stats.store_unique, stats.file_total, stats.file_unique
    )];

    for entry in &report.entries {
        if entry.kind == DiffKind::Identical && !include_identical {
            continue;
        }
        lines.extend(format_diff_entry(entry));
    }

    lines.extend(format_duplicate_lines(&report.duplicates));

    lines.push(format!(
        "identical {}, different {}, database only {}, snapshot only {}",
        stats.identical, stats.different, stats.store_only, stats.file_only
    ));
    lines
}

fn format_diff_entry(entry: &DiffEntry) -> Vec<String> {
    let label = format!("{} | {}", entry.name, entry.school);
    match &entry.kind {
        DiffKind::Identical => vec![format!("= {label}")],
        DiffKind::StoreOnly => vec![format!("+ {label} (database only)")],
        DiffKind::FileOnly => vec![format!("- {label} (snapshot only)")],
        DiffKind::Different { deltas } => {
            let mut lines = vec![format!("~ {label}")];
            lines.extend(deltas.iter().map(|delta| {
                format!(
                    "    {}: database {} / snapshot {}",
                    delta.field, delta.store_value, delta.file_value
                )
            }));
            lines
        }
    }
}

pub fn format_duplicate_lines(duplicates: &[DuplicateGroup]) -> Vec<String> {
    duplicates
        .iter()
        .map(|group| {
            let side = match group.side {
                Side::Store => "database",
                Side::File => "snapshot",
            };
            format!("duplicate in {side}: {} ({} records)", group.key, group.count)
        })
        .collect()
}

pub fn format_counts(counts: &SyncCounts) -> String {
    format!(
        "database +{} ~{}, snapshot +{} ~{}, unchanged {}, skipped {}",
        counts.store_added,
        counts.store_updated,
        counts.file_added,
        counts.file_updated,
        counts.unchanged,
        counts.skipped
    )
}

pub fn format_failure_lines(failures: &[RecordFailure]) -> Vec<String> {
    failures
        .iter()
        .map(|failure| format!("! {}: {}", failure.record, failure.reason))
        .collect()
}

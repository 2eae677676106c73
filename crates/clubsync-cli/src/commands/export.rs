use std::path::Path;

use clubsync_core::db::{ClubFilter, ClubStore};
use clubsync_core::snapshot::render_snapshot;
use clubsync_core::{SnapshotEntry, SnapshotFile, SyncSettings};

use crate::commands::common::open_reconciler;
use crate::error::CliError;

pub async fn run_export(
    settings: &SyncSettings,
    filter: &ClubFilter,
    output_path: Option<&Path>,
) -> Result<(), CliError> {
    let reconciler = open_reconciler(settings).await?;
    let clubs = reconciler.store().find(filter).await?;
    let entries: Vec<SnapshotEntry> = clubs.iter().map(SnapshotEntry::from_club).collect();

    if let Some(path) = output_path {
        SnapshotFile::new(path).write(&entries).await?;
        println!("{}", path.display());
    } else {
        print!("{}", render_snapshot(&entries)?);
    }

    Ok(())
}

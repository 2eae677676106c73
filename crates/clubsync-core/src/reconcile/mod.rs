//! Merge strategies between the record store and the snapshot file.
//!
//! The snapshot is loaded, reconciled and written within one call and never
//! cached between calls. Per-record problems are collected into the report;
//! only an unreadable snapshot, an unreachable store or a failed snapshot
//! write abort the run.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::{ClubFilter, ClubStore};
use crate::diff::{diff, index_by_key, DiffReport, DuplicateGroup, Side};
use crate::models::{Club, NaturalKey, ValidationError};
use crate::snapshot::{SnapshotEntry, SnapshotError, SnapshotFile};
use crate::sync::SyncPhase;

/// Direction of a reconciliation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Strategy {
    /// Bidirectional merge, file wins on content
    Merge,
    /// Replace the snapshot with the store's projection
    StoreToFile,
    /// Replace the store with the snapshot's records
    FileToStore,
}

impl Strategy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Merge => "merge",
            Self::StoreToFile => "storeToFile",
            Self::FileToStore => "fileToStore",
        }
    }

    /// Whether a pushed run of this strategy is followed by a store re-import
    #[must_use]
    pub const fn reimports_after_push(self) -> bool {
        matches!(self, Self::Merge | Self::StoreToFile)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "merge" => Ok(Self::Merge),
            "storeToFile" | "store-to-file" => Ok(Self::StoreToFile),
            "fileToStore" | "file-to-store" => Ok(Self::FileToStore),
            other => Err(format!(
                "unknown strategy `{other}` (expected merge, storeToFile or fileToStore)"
            )),
        }
    }
}

/// How the store is refreshed from the snapshot after a push
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReimportMode {
    /// Delete every store record and insert the snapshot's records
    #[default]
    Full,
    /// Insert or update from the snapshot, keep store-only records
    Upsert,
}

impl FromStr for ReimportMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "upsert" => Ok(Self::Upsert),
            other => Err(format!("unknown re-import mode `{other}` (expected full or upsert)")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCounts {
    pub store_added: usize,
    pub store_updated: usize,
    pub file_added: usize,
    pub file_updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
}

/// Why a single record was skipped
#[derive(Debug, Error)]
pub enum RecordError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("store write failed: {0}")]
    Store(#[from] crate::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordFailure {
    /// Natural key, or the entry's position when it has none
    pub record: String,
    pub reason: String,
}

impl RecordFailure {
    fn new(position: usize, name: &str, school: &str, error: &RecordError) -> Self {
        let key = NaturalKey::new(name, school);
        let record = if key.name.is_empty() && key.school.is_empty() {
            format!("entry #{position}")
        } else {
            key.to_string()
        };
        Self {
            record,
            reason: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub counts: SyncCounts,
    pub failures: Vec<RecordFailure>,
    /// Whether the snapshot file was rewritten
    pub file_written: bool,
    /// Natural keys shared by several records on either side
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub duplicates: Vec<DuplicateGroup>,
}

impl ReconcileReport {
    fn skip(&mut self, failure: RecordFailure) {
        tracing::warn!(record = %failure.record, reason = %failure.reason, "Skipped record");
        self.counts.skipped += 1;
        self.failures.push(failure);
    }
}

/// Conditions that abort a whole reconciliation run
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("snapshot file not found: {}", .0.display())]
    SnapshotMissing(PathBuf),

    #[error("record store is empty; refusing to overwrite the snapshot")]
    EmptyStore,

    #[error("snapshot unavailable: {0}")]
    SnapshotUnavailable(#[source] SnapshotError),

    #[error("record store unavailable: {0}")]
    StoreUnavailable(#[source] crate::Error),

    #[error("failed to write snapshot: {0}")]
    SnapshotWrite(#[source] SnapshotError),
}

impl ReconcileError {
    /// Pipeline phase this failure is reported under
    #[must_use]
    pub const fn phase(&self) -> SyncPhase {
        match self {
            Self::SnapshotMissing(_) | Self::EmptyStore => SyncPhase::Precondition,
            Self::SnapshotUnavailable(_) | Self::StoreUnavailable(_) => SyncPhase::Diff,
            Self::SnapshotWrite(_) => SyncPhase::WriteFile,
        }
    }
}

/// Check every snapshot entry against the store's required fields.
#[must_use]
pub fn validate_entries(entries: &[SnapshotEntry]) -> Vec<RecordFailure> {
    entries
        .iter()
        .enumerate()
        .filter_map(|(position, entry)| {
            entry.to_fields().err().map(|error| {
                RecordFailure::new(position, &entry.name, &entry.school, &RecordError::from(error))
            })
        })
        .collect()
}

/// Runs reconciliation strategies against one store and one snapshot file
pub struct Reconciler {
    store: Arc<dyn ClubStore>,
    snapshot: SnapshotFile,
}

impl Reconciler {
    pub fn new(store: Arc<dyn ClubStore>, snapshot: SnapshotFile) -> Self {
        Self { store, snapshot }
    }

    #[must_use]
    pub const fn snapshot(&self) -> &SnapshotFile {
        &self.snapshot
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn ClubStore> {
        &self.store
    }

    pub async fn reconcile(&self, strategy: Strategy) -> Result<ReconcileReport, ReconcileError> {
        tracing::info!(%strategy, snapshot = %self.snapshot.path().display(), "Reconciling");
        let report = match strategy {
            Strategy::Merge => self.merge().await?,
            Strategy::StoreToFile => self.store_to_file().await?,
            Strategy::FileToStore => self.file_to_store().await?,
        };
        tracing::info!(
            %strategy,
            counts = ?report.counts,
            file_written = report.file_written,
            duplicates = report.duplicates.len(),
            "Reconciled"
        );
        Ok(report)
    }

    /// Diff the current store against the current snapshot.
    pub async fn compare(&self) -> Result<DiffReport, ReconcileError> {
        let clubs = self.list_store().await?;
        let entries = self.read_snapshot().await?.unwrap_or_default();
        Ok(diff(&clubs, &entries))
    }

    /// Refresh the store from the snapshot as it now stands.
    pub async fn reimport(&self, mode: ReimportMode) -> Result<ReconcileReport, ReconcileError> {
        tracing::info!(?mode, "Re-importing store from snapshot");
        match mode {
            ReimportMode::Full => self.file_to_store().await,
            ReimportMode::Upsert => {
                let entries = self.read_required_snapshot().await?;
                let mut report = ReconcileReport::default();
                self.apply_file_to_store(&entries, &mut report).await?;
                report.duplicates = diff(&self.list_store().await?, &entries).duplicates;
                Ok(report)
            }
        }
    }

    async fn list_store(&self) -> Result<Vec<Club>, ReconcileError> {
        self.store
            .find(&ClubFilter::all())
            .await
            .map_err(ReconcileError::StoreUnavailable)
    }

    async fn read_snapshot(&self) -> Result<Option<Vec<SnapshotEntry>>, ReconcileError> {
        self.snapshot
            .read()
            .await
            .map_err(ReconcileError::SnapshotUnavailable)
    }

    async fn read_required_snapshot(&self) -> Result<Vec<SnapshotEntry>, ReconcileError> {
        self.read_snapshot()
            .await?
            .ok_or_else(|| ReconcileError::SnapshotMissing(self.snapshot.path().to_path_buf()))
    }

    async fn write_snapshot(&self, entries: &[SnapshotEntry]) -> Result<(), ReconcileError> {
        self.snapshot
            .write(entries)
            .await
            .map_err(ReconcileError::SnapshotWrite)
    }

    async fn store_to_file(&self) -> Result<ReconcileReport, ReconcileError> {
        let clubs = self.list_store().await?;
        if clubs.is_empty() {
            return Err(ReconcileError::EmptyStore);
        }

        // The previous snapshot only feeds the counts, so an unreadable one is not fatal.
        let previous = match self.snapshot.read().await {
            Ok(entries) => entries.unwrap_or_default(),
            Err(error) => {
                tracing::warn!(%error, "Overwriting unreadable snapshot");
                Vec::new()
            }
        };
        let previous_diff = diff(&clubs, &previous);
        let stats = previous_diff.stats;

        let entries: Vec<_> = clubs.iter().map(SnapshotEntry::from_club).collect();
        self.write_snapshot(&entries).await?;

        Ok(ReconcileReport {
            counts: SyncCounts {
                file_added: stats.store_only,
                file_updated: stats.different,
                unchanged: stats.identical,
                ..SyncCounts::default()
            },
            failures: Vec::new(),
            file_written: true,
            duplicates: previous_diff
                .duplicates
                .into_iter()
                .filter(|group| group.side == Side::Store)
                .collect(),
        })
    }

    async fn file_to_store(&self) -> Result<ReconcileReport, ReconcileError> {
        let entries = self.read_required_snapshot().await?;

        let removed = self
            .store
            .delete_all(&ClubFilter::all())
            .await
            .map_err(ReconcileError::StoreUnavailable)?;
        tracing::info!(removed, entries = entries.len(), "Replacing store contents");

        let mut report = ReconcileReport::default();
        for (position, entry) in entries.iter().enumerate() {
            match self.insert_entry(entry).await {
                Ok(_) => report.counts.store_added += 1,
                Err(error) => {
                    report.skip(RecordFailure::new(position, &entry.name, &entry.school, &error));
                }
            }
        }
        report.duplicates = diff(&self.list_store().await?, &entries).duplicates;
        Ok(report)
    }

    async fn insert_entry(&self, entry: &SnapshotEntry) -> Result<Club, RecordError> {
        let fields = entry.to_fields()?;
        Ok(self.store.create(&fields).await?)
    }

    async fn merge(&self) -> Result<ReconcileReport, ReconcileError> {
        let existing = self.read_snapshot().await?;
        let file_missing = existing.is_none();
        let entries = existing.unwrap_or_default();

        let mut report = ReconcileReport::default();
        self.apply_file_to_store(&entries, &mut report).await?;

        let clubs = self.list_store().await?;
        report.duplicates = diff(&clubs, &entries).duplicates;
        let merged = project_onto_file(&clubs, &entries, &mut report.counts);

        if file_missing || merged != entries {
            self.write_snapshot(&merged).await?;
            report.file_written = true;
        }
        Ok(report)
    }

    /// File entries win: update matching store records, insert the rest.
    ///
    /// Only the first entry of each natural key is applied; later duplicates
    /// would otherwise overwrite it within the same run, so they are skipped.
    async fn apply_file_to_store(
        &self,
        entries: &[SnapshotEntry],
        report: &mut ReconcileReport,
    ) -> Result<(), ReconcileError> {
        let mut seen = HashSet::new();

        for (position, entry) in entries.iter().enumerate() {
            let key = entry.natural_key();
            if !key.name.is_empty() && !seen.insert(key.clone()) {
                report.skip(RecordFailure {
                    record: key.to_string(),
                    reason: format!("entry #{position} repeats an earlier name and school, not applied"),
                });
                continue;
            }

            let outcome = match self.find_match(entry).await? {
                Some(club) => self.update_from_entry(&club, entry).await,
                None => self
                    .insert_entry(entry)
                    .await
                    .map(|_| Applied::Added),
            };

            match outcome {
                Ok(Applied::Added) => report.counts.store_added += 1,
                Ok(Applied::Updated) => report.counts.store_updated += 1,
                Ok(Applied::Unchanged) => report.counts.unchanged += 1,
                Err(error) => {
                    report.skip(RecordFailure::new(position, &entry.name, &entry.school, &error));
                }
            }
        }
        Ok(())
    }

    /// Store record for an entry: by carried ID first, then by natural key.
    async fn find_match(&self, entry: &SnapshotEntry) -> Result<Option<Club>, ReconcileError> {
        if let Some(id) = entry.store_id() {
            let found = self
                .store
                .find_by_id(&id)
                .await
                .map_err(ReconcileError::StoreUnavailable)?;
            if found.is_some() {
                return Ok(found);
            }
        }

        if entry.name.trim().is_empty() || entry.school.trim().is_empty() {
            return Ok(None);
        }
        self.store
            .find_by_natural_key(&entry.name, &entry.school)
            .await
            .map_err(ReconcileError::StoreUnavailable)
    }

    async fn update_from_entry(
        &self,
        club: &Club,
        entry: &SnapshotEntry,
    ) -> Result<Applied, RecordError> {
        let fields = entry.overlay_onto(&club.fields);
        if fields == club.fields {
            return Ok(Applied::Unchanged);
        }
        fields.validate()?;
        self.store.update(&club.id, &fields).await?;
        Ok(Applied::Updated)
    }
}

enum Applied {
    Added,
    Updated,
    Unchanged,
}

/// Build the new snapshot from the store listing and the current entries.
///
/// Entries keep their position. Each store record claims at most one entry,
/// by carried ID first and natural key second; a claimed entry is filled in
/// from the store without losing its own values. Store records that claim
/// nothing are appended in store order, and unclaimed entries stay as they are.
fn project_onto_file(
    clubs: &[Club],
    entries: &[SnapshotEntry],
    counts: &mut SyncCounts,
) -> Vec<SnapshotEntry> {
    let mut by_id: HashMap<&str, usize> = HashMap::new();
    for (position, entry) in entries.iter().enumerate() {
        if let Some(id) = entry.id.as_deref() {
            by_id.entry(id).or_insert(position);
        }
    }
    let by_key = index_by_key(entries, SnapshotEntry::natural_key);

    let mut claimed = vec![false; entries.len()];
    let mut merged = entries.to_vec();
    let mut appended = Vec::new();

    for club in clubs {
        let id = club.id.as_str();
        let position = by_id
            .get(id.as_str())
            .copied()
            .filter(|&position| !claimed[position])
            .or_else(|| {
                by_key.get(&club.natural_key()).and_then(|positions| {
                    positions.iter().copied().find(|&position| !claimed[position])
                })
            });

        match position {
            Some(position) => {
                claimed[position] = true;
                let filled = entries[position].merged_with(club);
                if filled != entries[position] {
                    counts.file_updated += 1;
                }
                merged[position] = filled;
            }
            None => {
                counts.file_added += 1;
                appended.push(SnapshotEntry::from_club(club));
            }
        }
    }

    merged.extend(appended);
    merged
}

#[cfg(test)]
mod tests;

use std::io;

use clubsync_core::config::ConfigError;
use clubsync_core::reconcile::ReconcileError;
use clubsync_core::snapshot::SnapshotError;
use clubsync_core::SyncFailure;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] clubsync_core::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Sync(#[from] SyncFailure),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Snapshot has {0} invalid entries")]
    InvalidSnapshot(usize),
}

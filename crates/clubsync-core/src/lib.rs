//! clubsync-core - Core library for clubsync
//!
//! Keeps two replicas of the club directory consistent: the libSQL record
//! store edited by administrators, and the `clubs.json` snapshot versioned in
//! a git repository. Shared by the admin API and the CLI.

pub mod config;
pub mod db;
pub mod diff;
pub mod error;
pub mod models;
pub mod reconcile;
pub mod services;
pub mod snapshot;
pub mod sync;
pub mod vcs;

pub use config::{ConfigError, SyncSettings};
pub use diff::{diff, DiffReport};
pub use error::{Error, Result};
pub use models::{Club, ClubFields, ClubId, Coordinates, NaturalKey};
pub use reconcile::{Reconciler, ReimportMode, Strategy};
pub use snapshot::{SnapshotEntry, SnapshotFile};
pub use sync::{SyncCoordinator, SyncFailure, SyncPipeline, SyncResult};
pub use vcs::{GitGateway, VersionControl};

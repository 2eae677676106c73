//! Serialized sync pipeline: pull, reconcile, commit, push, re-import.

mod coordinator;
mod pipeline;

pub use coordinator::{SyncCoordinator, SyncJob, SyncStatus};
pub use pipeline::{PipelineOptions, SyncPipeline, DEFAULT_COMMIT_MESSAGE};

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::diff::DuplicateGroup;
use crate::reconcile::{ReconcileReport, RecordFailure, Strategy, SyncCounts};
use crate::vcs::{PullOutcome, PushMethod};

/// Step of the pipeline a failure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncPhase {
    Precondition,
    VcsPull,
    Diff,
    WriteFile,
    VcsCommit,
    VcsPush,
    PostSyncReimport,
    /// The job never ran to completion on the worker
    Queue,
}

impl SyncPhase {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Precondition => "precondition",
            Self::VcsPull => "vcs-pull",
            Self::Diff => "diff",
            Self::WriteFile => "write-file",
            Self::VcsCommit => "vcs-commit",
            Self::VcsPush => "vcs-push",
            Self::PostSyncReimport => "post-sync-reimport",
            Self::Queue => "queue",
        }
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A job that stopped at `phase`
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("sync job {job_id} failed during {phase}: {message}")]
#[serde(rename_all = "camelCase")]
pub struct SyncFailure {
    pub job_id: u64,
    pub strategy: Strategy,
    pub phase: SyncPhase,
    pub message: String,
    pub failed_at: DateTime<Utc>,
}

impl SyncFailure {
    pub fn new(job_id: u64, strategy: Strategy, phase: SyncPhase, error: impl fmt::Display) -> Self {
        Self {
            job_id,
            strategy,
            phase,
            message: error.to_string(),
            failed_at: Utc::now(),
        }
    }
}

/// A job that completed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub job_id: u64,
    pub strategy: Strategy,
    pub commit_message: String,
    pub committed: bool,
    pub pushed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<PushMethod>,
    pub pull: PullOutcome,
    pub counts: SyncCounts,
    pub failures: Vec<RecordFailure>,
    pub file_written: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub duplicates: Vec<DuplicateGroup>,
    /// Post-push refresh of the store, when one was needed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reimport: Option<ReconcileReport>,
    /// Set when the push succeeded but the store could not be refreshed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reimport_error: Option<SyncFailure>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

pub type SyncOutcome = Result<SyncResult, SyncFailure>;

/// Last finished job, as kept in the coordinator's memory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum JobOutcome {
    Succeeded(SyncResult),
    Failed(SyncFailure),
}

impl From<&SyncOutcome> for JobOutcome {
    fn from(outcome: &SyncOutcome) -> Self {
        match outcome {
            Ok(result) => Self::Succeeded(result.clone()),
            Err(failure) => Self::Failed(failure.clone()),
        }
    }
}

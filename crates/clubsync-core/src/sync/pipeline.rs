use std::sync::Arc;

use chrono::Utc;

use super::{SyncFailure, SyncOutcome, SyncPhase, SyncResult};
use crate::reconcile::{ReconcileReport, Reconciler, ReimportMode, Strategy};
use crate::vcs::{PullOutcome, PushMethod, VersionControl};

pub const DEFAULT_COMMIT_MESSAGE: &str = "Auto-sync approved clubs";

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Used when a trigger carries no message
    pub default_message: String,
    pub reimport_after_push: bool,
    pub reimport_mode: ReimportMode,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            default_message: DEFAULT_COMMIT_MESSAGE.to_string(),
            reimport_after_push: true,
            reimport_mode: ReimportMode::Full,
        }
    }
}

/// One full sync run against a reconciler and a working copy
#[derive(Clone)]
pub struct SyncPipeline {
    reconciler: Arc<Reconciler>,
    vcs: Arc<dyn VersionControl>,
    options: PipelineOptions,
}

impl SyncPipeline {
    pub fn new(
        reconciler: Arc<Reconciler>,
        vcs: Arc<dyn VersionControl>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            reconciler,
            vcs,
            options,
        }
    }

    #[must_use]
    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    /// Run every step in order, stopping at the first fatal failure.
    pub async fn run(self, job_id: u64, strategy: Strategy, message: Option<String>) -> SyncOutcome {
        let started_at = Utc::now();
        let fail = |phase: SyncPhase, error: &dyn std::fmt::Display| {
            SyncFailure::new(job_id, strategy, phase, error)
        };
        let commit_message = message
            .filter(|message| !message.trim().is_empty())
            .unwrap_or_else(|| self.options.default_message.clone());

        self.vcs
            .ensure_trunk()
            .await
            .map_err(|error| fail(SyncPhase::Precondition, &error))?;
        if self
            .vcs
            .has_local_changes()
            .await
            .map_err(|error| fail(SyncPhase::Precondition, &error))?
        {
            tracing::info!(job_id, "Working tree has uncommitted changes, they will be included");
        }

        let pull = self
            .vcs
            .pull()
            .await
            .map_err(|error| fail(SyncPhase::VcsPull, &error))?;
        let pull_resolved = matches!(pull, PullOutcome::ConflictsResolved { .. });

        let report = self
            .reconciler
            .reconcile(strategy)
            .await
            .map_err(|error| fail(error.phase(), &error))?;

        self.vcs
            .stage_all()
            .await
            .map_err(|error| fail(SyncPhase::VcsCommit, &error))?;
        let committed = self
            .vcs
            .commit(&commit_message)
            .await
            .map_err(|error| fail(SyncPhase::VcsCommit, &error))?;

        let mut result = SyncResult {
            job_id,
            strategy,
            commit_message,
            committed,
            pushed: false,
            method: None,
            pull,
            counts: report.counts,
            failures: report.failures,
            file_written: report.file_written,
            duplicates: report.duplicates,
            reimport: None,
            reimport_error: None,
            started_at,
            finished_at: started_at,
        };

        if committed {
            let method = self
                .vcs
                .push()
                .await
                .map_err(|error| fail(SyncPhase::VcsPush, &error))?;
            result.pushed = true;
            result.method = Some(method);

            // Only conflict resolution can leave the pushed file out of step with the store
            let resolved = pull_resolved || method == PushMethod::ResolvedConflict;
            if resolved && self.options.reimport_after_push && strategy.reimports_after_push() {
                match self.reimport().await {
                    Ok(report) => result.reimport = report,
                    Err(error) => {
                        tracing::warn!(job_id, %error, "Store re-import after push failed");
                        result.reimport_error = Some(fail(SyncPhase::PostSyncReimport, &error));
                    }
                }
            }
        } else {
            tracing::info!(job_id, "No changes to commit, skipping push");
        }

        result.finished_at = Utc::now();
        Ok(result)
    }

    /// Bring the store in line with what was pushed; a no-op when nothing drifted.
    async fn reimport(&self) -> Result<Option<ReconcileReport>, crate::reconcile::ReconcileError> {
        if self.reconciler.compare().await?.is_in_sync() {
            return Ok(None);
        }
        self.reconciler
            .reimport(self.options.reimport_mode)
            .await
            .map(Some)
    }
}

//! Git working-copy operations for the sync pipeline.
//!
//! Every command runs as a `git` subprocess in the repository root with a
//! hard timeout; a command that outlives it is killed.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;

/// Porcelain status codes of unmerged paths
const UNMERGED_CODES: &[&str] = &["DD", "AU", "UD", "UA", "DU", "AA", "UU"];

#[derive(Debug, Error)]
pub enum VcsError {
    #[error("git {command} timed out after {}s", timeout.as_secs())]
    Timeout { command: String, timeout: Duration },

    #[error("failed to run git {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("git {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("working copy is on branch `{actual}`, sync requires `{expected}`")]
    WrongBranch { expected: String, actual: String },

    #[error("could not resolve merge conflicts in {}: {reason}", files.join(", "))]
    ConflictUnresolved { files: Vec<String>, reason: String },

    #[error("push rejected again after reset and retry: {stderr}")]
    PushRejected { stderr: String },
}

/// How a pull concluded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum PullOutcome {
    Clean,
    #[serde(rename_all = "camelCase")]
    ConflictsResolved {
        /// Paths resolved to the working-copy version
        kept_local: Vec<String>,
        /// Paths resolved to the remote version
        took_remote: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushMethod {
    Normal,
    /// Pushed after a rejection, a hard reset to the remote tip and a re-pull
    ResolvedConflict,
}

/// Version-control operations the sync pipeline depends on
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Branch every sync must run on
    fn trunk_branch(&self) -> &str;

    async fn current_branch(&self) -> Result<String, VcsError>;

    /// Whether the working tree has uncommitted changes
    async fn has_local_changes(&self) -> Result<bool, VcsError>;

    /// Pull the trunk from the remote, resolving conflicts by fixed policy
    async fn pull(&self) -> Result<PullOutcome, VcsError>;

    async fn stage_all(&self) -> Result<(), VcsError>;

    /// Commit staged changes. Returns `false` when nothing was staged.
    async fn commit(&self, message: &str) -> Result<bool, VcsError>;

    async fn push(&self) -> Result<PushMethod, VcsError>;

    /// Fail unless the working copy is on the trunk branch.
    async fn ensure_trunk(&self) -> Result<(), VcsError> {
        let actual = self.current_branch().await?;
        if actual == self.trunk_branch() {
            Ok(())
        } else {
            Err(VcsError::WrongBranch {
                expected: self.trunk_branch().to_string(),
                actual,
            })
        }
    }
}

#[derive(Debug, Clone)]
pub struct GitConfig {
    pub repo_root: PathBuf,
    pub remote: String,
    pub trunk: String,
    /// Snapshot file; absolute or relative to `repo_root`
    pub snapshot_path: PathBuf,
    pub timeout: Duration,
}

struct GitOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

impl GitOutput {
    fn combined(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr)
    }
}

/// [`VersionControl`] backed by the `git` command line
pub struct GitGateway {
    config: GitConfig,
    snapshot_rel: String,
}

impl GitGateway {
    pub fn new(config: GitConfig) -> Self {
        let snapshot_rel = relative_to(&config.repo_root, &config.snapshot_path);
        Self {
            config,
            snapshot_rel,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &GitConfig {
        &self.config
    }

    async fn run(&self, args: &[&str]) -> Result<GitOutput, VcsError> {
        let command = args.join(" ");
        tracing::debug!(%command, "Running git");

        let mut child = Command::new("git");
        child
            .args(args)
            .current_dir(&self.config.repo_root)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.config.timeout, child.output())
            .await
            .map_err(|_| VcsError::Timeout {
                command: command.clone(),
                timeout: self.config.timeout,
            })?
            .map_err(|source| VcsError::Spawn {
                command: command.clone(),
                source,
            })?;

        Ok(GitOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    /// Run a command that must succeed; returns its stdout.
    async fn git(&self, args: &[&str]) -> Result<String, VcsError> {
        let output = self.run(args).await?;
        if output.success {
            Ok(output.stdout)
        } else {
            Err(VcsError::CommandFailed {
                command: args.join(" "),
                stderr: failure_text(&output),
            })
        }
    }

    async fn unmerged_paths(&self) -> Result<Vec<(String, String)>, VcsError> {
        let status = self.git(&["status", "--porcelain"]).await?;
        Ok(parse_unmerged(&status))
    }

    /// Snapshot keeps the working-copy side, everything else the remote side.
    async fn resolve_conflicts(&self) -> Result<PullOutcome, VcsError> {
        let unmerged = self.unmerged_paths().await?;
        let files: Vec<String> = unmerged.iter().map(|(_, path)| path.clone()).collect();
        tracing::warn!(files = ?files, "Pull produced conflicts, resolving");

        match self.apply_resolution(&unmerged).await {
            Ok(outcome) => {
                tracing::info!(?outcome, "Resolved pull conflicts");
                Ok(outcome)
            }
            Err(error) => {
                if let Err(abort_error) = self.git(&["merge", "--abort"]).await {
                    tracing::warn!(%abort_error, "Failed to abort merge");
                }
                Err(VcsError::ConflictUnresolved {
                    files,
                    reason: error.to_string(),
                })
            }
        }
    }

    async fn apply_resolution(
        &self,
        unmerged: &[(String, String)],
    ) -> Result<PullOutcome, VcsError> {
        let mut kept_local = Vec::new();
        let mut took_remote = Vec::new();

        for (code, path) in unmerged {
            let keep_local = *path == self.snapshot_rel;
            // `D` on our side (first column) or theirs (second) means that side deleted it
            let deleted = if keep_local {
                code.starts_with('D')
            } else {
                code.ends_with('D')
            };

            if deleted {
                self.git(&["rm", "--quiet", "--", path.as_str()]).await?;
            } else {
                let side = if keep_local { "--ours" } else { "--theirs" };
                self.git(&["checkout", side, "--", path.as_str()]).await?;
                self.git(&["add", "--", path.as_str()]).await?;
            }

            if keep_local {
                kept_local.push(path.clone());
            } else {
                took_remote.push(path.clone());
            }
        }

        self.git(&["commit", "--no-edit"]).await?;
        Ok(PullOutcome::ConflictsResolved {
            kept_local,
            took_remote,
        })
    }

    async fn push_once(&self) -> Result<GitOutput, VcsError> {
        self.run(&["push", self.config.remote.as_str(), self.config.trunk.as_str()])
            .await
    }
}

#[async_trait]
impl VersionControl for GitGateway {
    fn trunk_branch(&self) -> &str {
        &self.config.trunk
    }

    async fn current_branch(&self) -> Result<String, VcsError> {
        self.git(&["rev-parse", "--abbrev-ref", "HEAD"]).await
    }

    async fn has_local_changes(&self) -> Result<bool, VcsError> {
        Ok(!self.git(&["status", "--porcelain"]).await?.is_empty())
    }

    async fn pull(&self) -> Result<PullOutcome, VcsError> {
        let output = self
            .run(&[
                "pull",
                "--no-rebase",
                "--no-edit",
                self.config.remote.as_str(),
                self.config.trunk.as_str(),
            ])
            .await?;
        if output.success {
            return Ok(PullOutcome::Clean);
        }

        let has_unmerged = !self.unmerged_paths().await?.is_empty();
        if has_unmerged || output.combined().contains("CONFLICT") {
            return self.resolve_conflicts().await;
        }

        Err(VcsError::CommandFailed {
            command: "pull".to_string(),
            stderr: failure_text(&output),
        })
    }

    async fn stage_all(&self) -> Result<(), VcsError> {
        self.git(&["add", "--all", "."]).await.map(|_| ())
    }

    async fn commit(&self, message: &str) -> Result<bool, VcsError> {
        let staged = self.git(&["diff", "--cached", "--name-only"]).await?;
        if staged.is_empty() {
            tracing::info!("Nothing staged, skipping commit");
            return Ok(false);
        }

        self.git(&["commit", "--quiet", "-m", message]).await?;
        tracing::info!(%message, "Committed");
        Ok(true)
    }

    async fn push(&self) -> Result<PushMethod, VcsError> {
        let first = self.push_once().await?;
        if first.success {
            return Ok(PushMethod::Normal);
        }
        if !is_rejection(&first.stderr) {
            return Err(VcsError::CommandFailed {
                command: "push".to_string(),
                stderr: failure_text(&first),
            });
        }

        tracing::warn!(stderr = %first.stderr, "Push rejected, resetting to remote tip and retrying");
        let remote_tip = format!("{}/{}", self.config.remote, self.config.trunk);
        self.git(&["fetch", self.config.remote.as_str(), self.config.trunk.as_str()])
            .await?;
        self.git(&["reset", "--hard", remote_tip.as_str()]).await?;
        self.pull().await?;

        let retry = self.push_once().await?;
        if retry.success {
            Ok(PushMethod::ResolvedConflict)
        } else {
            Err(VcsError::PushRejected {
                stderr: failure_text(&retry),
            })
        }
    }
}

fn failure_text(output: &GitOutput) -> String {
    if output.stderr.is_empty() {
        output.stdout.clone()
    } else {
        output.stderr.clone()
    }
}

fn is_rejection(stderr: &str) -> bool {
    stderr.contains("rejected") || stderr.contains("non-fast-forward") || stderr.contains("fetch first")
}

/// `(code, path)` for every unmerged entry of `git status --porcelain`
fn parse_unmerged(status: &str) -> Vec<(String, String)> {
    status
        .lines()
        .filter_map(|line| {
            let code = line.get(..2)?;
            let path = line.get(3..)?.trim().trim_matches('"');
            UNMERGED_CODES
                .contains(&code)
                .then(|| (code.to_string(), path.to_string()))
        })
        .collect()
}

/// Path as git prints it: relative to the repository root, `/`-separated.
fn relative_to(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .filter_map(|component| match component {
            std::path::Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

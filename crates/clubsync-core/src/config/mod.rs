//! Environment-driven settings shared by the API server and the CLI.

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::reconcile::ReimportMode;
use crate::sync::{PipelineOptions, DEFAULT_COMMIT_MESSAGE};
use crate::vcs::GitConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Where the two replicas live and how a sync job behaves
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub repo_root: PathBuf,
    /// As configured; see [`SyncSettings::snapshot_path`] for the resolved path
    pub snapshot_path: PathBuf,
    pub db_path: PathBuf,
    pub git_remote: String,
    pub trunk_branch: String,
    pub git_timeout: Duration,
    pub reimport_mode: ReimportMode,
    pub reimport_after_push: bool,
    pub commit_message: String,
}

impl SyncSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let repo_root = PathBuf::from(value_or_default(&lookup, "CLUBSYNC_REPO_ROOT", "."));
        let snapshot_path = PathBuf::from(value_or_default(
            &lookup,
            "CLUBSYNC_SNAPSHOT_PATH",
            "public/data/clubs.json",
        ));
        let db_path = optional_trimmed(&lookup, "CLUBSYNC_DB_PATH")
            .map_or_else(default_db_path, PathBuf::from);

        let git_remote = value_or_default(&lookup, "CLUBSYNC_GIT_REMOTE", "origin");
        let trunk_branch = value_or_default(&lookup, "CLUBSYNC_TRUNK_BRANCH", "main");

        let git_timeout_secs = value_or_default(&lookup, "CLUBSYNC_GIT_TIMEOUT_SECS", "30")
            .parse::<u64>()
            .map_err(|_| {
                ConfigError::Invalid(
                    "CLUBSYNC_GIT_TIMEOUT_SECS must be an integer in [1, 600]".to_string(),
                )
            })?;
        if !(1..=600).contains(&git_timeout_secs) {
            return Err(ConfigError::Invalid(
                "CLUBSYNC_GIT_TIMEOUT_SECS must be in [1, 600]".to_string(),
            ));
        }

        let reimport_mode = value_or_default(&lookup, "CLUBSYNC_REIMPORT_MODE", "full")
            .parse::<ReimportMode>()
            .map_err(|error| ConfigError::Invalid(format!("CLUBSYNC_REIMPORT_MODE: {error}")))?;
        let reimport_after_push = parse_bool(
            &value_or_default(&lookup, "CLUBSYNC_REIMPORT_AFTER_PUSH", "true"),
        )
        .ok_or_else(|| {
            ConfigError::Invalid("CLUBSYNC_REIMPORT_AFTER_PUSH must be true or false".to_string())
        })?;

        let commit_message =
            value_or_default(&lookup, "CLUBSYNC_COMMIT_MESSAGE", DEFAULT_COMMIT_MESSAGE);

        Ok(Self {
            repo_root,
            snapshot_path,
            db_path,
            git_remote,
            trunk_branch,
            git_timeout: Duration::from_secs(git_timeout_secs),
            reimport_mode,
            reimport_after_push,
            commit_message,
        })
    }

    /// Snapshot path resolved against the repository root.
    pub fn snapshot_path(&self) -> PathBuf {
        if self.snapshot_path.is_absolute() {
            self.snapshot_path.clone()
        } else {
            self.repo_root.join(&self.snapshot_path)
        }
    }

    pub fn git_config(&self) -> GitConfig {
        GitConfig {
            repo_root: self.repo_root.clone(),
            remote: self.git_remote.clone(),
            trunk: self.trunk_branch.clone(),
            snapshot_path: self.snapshot_path(),
            timeout: self.git_timeout,
        }
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            default_message: self.commit_message.clone(),
            reimport_after_push: self.reimport_after_push,
            reimport_mode: self.reimport_mode,
        }
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| Path::new(".").to_path_buf())
        .join("clubsync")
        .join("clubs.db")
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn value_or_default(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: &str,
) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

pub fn required_trimmed(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    optional_trimmed(lookup, name).ok_or(ConfigError::MissingVar(name))
}

/// Trimmed value of `name`; empty counts as unset.
pub fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

//! The versioned `clubs.json` snapshot file

mod entry;

pub use entry::SnapshotEntry;

use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors reading or writing the snapshot file
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot file not found: {}", .0.display())]
    Missing(PathBuf),

    #[error("failed to read snapshot {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("snapshot {} is not a valid club array: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to render snapshot: {0}")]
    Render(#[from] serde_json::Error),

    #[error("failed to write snapshot {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Parse a snapshot payload: a JSON array of club objects.
pub fn parse_snapshot(payload: &str) -> serde_json::Result<Vec<SnapshotEntry>> {
    serde_json::from_str(payload)
}

/// Render entries the way they are committed: two-space indent, trailing newline.
pub fn render_snapshot(entries: &[SnapshotEntry]) -> serde_json::Result<String> {
    let mut rendered = serde_json::to_string_pretty(entries)?;
    rendered.push('\n');
    Ok(rendered)
}

/// Location of the snapshot inside the working copy
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the snapshot. A missing file is `Ok(None)`.
    pub async fn read(&self) -> Result<Option<Vec<SnapshotEntry>>, SnapshotError> {
        let payload = match tokio::fs::read_to_string(&self.path).await {
            Ok(payload) => payload,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(SnapshotError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let entries = parse_snapshot(&payload).map_err(|source| SnapshotError::Parse {
            path: self.path.clone(),
            source,
        })?;
        tracing::debug!(path = %self.path.display(), entries = entries.len(), "Read snapshot");
        Ok(Some(entries))
    }

    /// Read the snapshot, treating a missing file as an error.
    pub async fn read_required(&self) -> Result<Vec<SnapshotEntry>, SnapshotError> {
        self.read()
            .await?
            .ok_or_else(|| SnapshotError::Missing(self.path.clone()))
    }

    /// Replace the snapshot atomically.
    ///
    /// The payload goes to a temporary file in the same directory which is
    /// then renamed over the target, so readers never see a partial array.
    pub async fn write(&self, entries: &[SnapshotEntry]) -> Result<(), SnapshotError> {
        let rendered = render_snapshot(entries)?;
        let path = self.path.clone();
        let count = entries.len();

        tokio::task::spawn_blocking(move || write_atomic(&path, rendered.as_bytes()))
            .await
            .map_err(|error| SnapshotError::Write {
                path: self.path.clone(),
                source: std::io::Error::other(error),
            })?
            .map_err(|source| SnapshotError::Write {
                path: self.path.clone(),
                source,
            })?;

        tracing::info!(path = %self.path.display(), entries = count, "Wrote snapshot");
        Ok(())
    }
}

fn write_atomic(path: &Path, payload: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent)?;

    let mut temp = tempfile::NamedTempFile::new_in(&parent)?;
    temp.write_all(payload)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|error| error.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::sample_fields;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let file = SnapshotFile::new(dir.path().join("clubs.json"));

        assert!(file.read().await.unwrap().is_none());
        assert!(matches!(
            file.read_required().await,
            Err(SnapshotError::Missing(_))
        ));
    }

    #[tokio::test]
    async fn write_creates_parent_dirs_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let file = SnapshotFile::new(dir.path().join("public/data/clubs.json"));
        let entries = vec![
            SnapshotEntry::from_fields(&sample_fields("Go Club", "State U")),
            SnapshotEntry::from_fields(&sample_fields("Chess Club", "City College")),
        ];

        file.write(&entries).await.unwrap();

        let raw = std::fs::read_to_string(file.path()).unwrap();
        assert!(raw.starts_with("[\n  {\n    \"name\": \"Go Club\""));
        assert!(raw.ends_with("]\n"));
        assert_eq!(file.read().await.unwrap(), Some(entries));
    }

    #[tokio::test]
    async fn invalid_json_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clubs.json");
        std::fs::write(&path, "{\"not\": \"an array\"}").unwrap();

        let result = SnapshotFile::new(path).read().await;
        assert!(matches!(result, Err(SnapshotError::Parse { .. })));
    }

    #[tokio::test]
    async fn empty_array_is_a_valid_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clubs.json");
        std::fs::write(&path, "[]\n").unwrap();

        assert_eq!(SnapshotFile::new(path).read().await.unwrap(), Some(Vec::new()));
    }
}

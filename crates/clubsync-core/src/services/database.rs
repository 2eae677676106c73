//! Shared database service wrapper used by the API and CLI.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::db::{ClubFilter, ClubStore, Database, LibSqlClubRepository};
use crate::models::{Club, ClubFields, ClubId};
use crate::Result;

/// Thread-safe record store backed by one libSQL connection.
#[derive(Clone)]
pub struct DatabaseService {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl DatabaseService {
    /// Open a database service at the given filesystem path.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        tracing::info!("Opening club store at {}", db_path.display());
        let db = Database::open(&db_path).await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory database service (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    /// Path of the database file, `None` when in memory.
    #[must_use]
    pub fn db_path(&self) -> Option<&PathBuf> {
        self.db_path.as_ref()
    }
}

#[async_trait]
impl ClubStore for DatabaseService {
    async fn find(&self, filter: &ClubFilter) -> Result<Vec<Club>> {
        let db = self.db.lock().await;
        LibSqlClubRepository::new(db.connection()).find(filter).await
    }

    async fn find_by_natural_key(&self, name: &str, school: &str) -> Result<Option<Club>> {
        let db = self.db.lock().await;
        LibSqlClubRepository::new(db.connection())
            .find_by_natural_key(name, school)
            .await
    }

    async fn find_by_id(&self, id: &ClubId) -> Result<Option<Club>> {
        let db = self.db.lock().await;
        LibSqlClubRepository::new(db.connection())
            .find_by_id(id)
            .await
    }

    async fn create(&self, fields: &ClubFields) -> Result<Club> {
        let db = self.db.lock().await;
        LibSqlClubRepository::new(db.connection())
            .create(fields)
            .await
    }

    async fn update(&self, id: &ClubId, fields: &ClubFields) -> Result<Club> {
        let db = self.db.lock().await;
        LibSqlClubRepository::new(db.connection())
            .update(id, fields)
            .await
    }

    async fn delete_all(&self, filter: &ClubFilter) -> Result<u64> {
        let db = self.db.lock().await;
        LibSqlClubRepository::new(db.connection())
            .delete_all(filter)
            .await
    }

    async fn count(&self) -> Result<u64> {
        let db = self.db.lock().await;
        LibSqlClubRepository::new(db.connection()).count().await
    }
}

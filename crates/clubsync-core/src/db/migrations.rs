//! Database migrations

use crate::error::Result;
use libsql::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 1;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version < 1 {
        migrate_v1(conn).await?;
    }

    Ok(())
}

/// Get the current schema version
async fn get_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

/// Migration to version 1: clubs table
async fn migrate_v1(conn: &Connection) -> Result<()> {
    // libsql has no execute_batch; run each statement inside one transaction
    conn.execute("BEGIN TRANSACTION", ()).await?;

    let statements = [
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        "CREATE TABLE IF NOT EXISTS clubs (
            id TEXT PRIMARY KEY,
            sort_index INTEGER NOT NULL,
            name TEXT NOT NULL,
            school TEXT NOT NULL,
            natural_key TEXT NOT NULL,
            city TEXT NOT NULL DEFAULT '',
            province TEXT NOT NULL,
            longitude REAL NOT NULL,
            latitude REAL NOT NULL,
            logo TEXT NOT NULL DEFAULT '',
            short_description TEXT NOT NULL DEFAULT '',
            description TEXT NOT NULL DEFAULT '',
            tags_json TEXT NOT NULL DEFAULT '[]',
            external_links_json TEXT NOT NULL DEFAULT '[]',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )",
        // Not unique: duplicates are reported, never rejected
        "CREATE INDEX IF NOT EXISTS idx_clubs_natural_key ON clubs(natural_key)",
        "CREATE INDEX IF NOT EXISTS idx_clubs_sort_index ON clubs(sort_index)",
        "CREATE INDEX IF NOT EXISTS idx_clubs_province ON clubs(province)",
        "INSERT INTO schema_version (version) VALUES (1)",
    ];

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    tracing::info!("Migrated database to version {CURRENT_VERSION}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use libsql::Builder;

    async fn setup() -> Connection {
        let db = Builder::new_local(":memory:").build().await.unwrap();
        db.connect().unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        let version = get_version(&conn).await.unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations_idempotent() {
        let conn = setup().await;
        run(&conn).await.unwrap();
        run(&conn).await.unwrap();

        let version = get_version(&conn).await.unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_natural_key_index_is_not_unique() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        let mut rows = conn
            .query(
                "SELECT \"unique\" FROM pragma_index_list('clubs') WHERE name = 'idx_clubs_natural_key'",
                (),
            )
            .await
            .unwrap();

        let unique = rows
            .next()
            .await
            .unwrap()
            .map(|row| row.get::<i32>(0).unwrap());

        assert_eq!(unique, Some(0));
    }
}

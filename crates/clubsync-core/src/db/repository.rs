//! Club repository implementation

use async_trait::async_trait;
use libsql::{params, Connection, Row};

use crate::error::{Error, Result};
use crate::models::{Club, ClubFields, ClubId, Coordinates, NaturalKey};

const CLUB_COLUMNS: &str = "id, sort_index, name, school, city, province, longitude, latitude, \
     logo, short_description, description, tags_json, external_links_json, created_at, updated_at";

/// Narrows `find` and `delete_all`; the default matches every club
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClubFilter {
    pub province: Option<String>,
    pub school: Option<String>,
}

impl ClubFilter {
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn province(mut self, province: impl Into<String>) -> Self {
        self.province = Some(province.into());
        self
    }

    #[must_use]
    pub fn school(mut self, school: impl Into<String>) -> Self {
        self.school = Some(school.into());
        self
    }
}

/// The mutable record store consulted by reconciliation
#[async_trait]
pub trait ClubStore: Send + Sync {
    /// List clubs matching the filter in display order
    async fn find(&self, filter: &ClubFilter) -> Result<Vec<Club>>;

    /// First club (in display order) whose natural key matches
    async fn find_by_natural_key(&self, name: &str, school: &str) -> Result<Option<Club>>;

    async fn find_by_id(&self, id: &ClubId) -> Result<Option<Club>>;

    /// Insert a club with a fresh ID at the end of the display order
    async fn create(&self, fields: &ClubFields) -> Result<Club>;

    /// Replace every business field of an existing club
    async fn update(&self, id: &ClubId, fields: &ClubFields) -> Result<Club>;

    /// Delete matching clubs, returning how many were removed
    async fn delete_all(&self, filter: &ClubFilter) -> Result<u64>;

    async fn count(&self) -> Result<u64>;
}

/// libSQL-backed club queries over a borrowed connection
pub struct LibSqlClubRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlClubRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_club(row: &Row) -> Result<Club> {
        let id: String = row.get(0)?;
        let id = id
            .parse()
            .map_err(|_| Error::Database(format!("Invalid club ID in store: {id}")))?;
        let tags_json: String = row.get(11)?;
        let links_json: String = row.get(12)?;

        Ok(Club {
            id,
            sort_index: row.get(1)?,
            fields: ClubFields {
                name: row.get(2)?,
                school: row.get(3)?,
                city: row.get(4)?,
                province: row.get(5)?,
                coordinates: Coordinates::new(row.get(6)?, row.get(7)?),
                logo: row.get(8)?,
                short_description: row.get(9)?,
                description: row.get(10)?,
                tags: serde_json::from_str(&tags_json)?,
                external_links: serde_json::from_str(&links_json)?,
            },
            created_at: row.get(13)?,
            updated_at: row.get(14)?,
        })
    }

    async fn collect(&self, sql: &str, params: impl libsql::params::IntoParams) -> Result<Vec<Club>> {
        let mut rows = self.conn.query(sql, params).await?;
        let mut clubs = Vec::new();
        while let Some(row) = rows.next().await? {
            clubs.push(Self::parse_club(&row)?);
        }
        Ok(clubs)
    }

    pub async fn find(&self, filter: &ClubFilter) -> Result<Vec<Club>> {
        let sql = format!(
            "SELECT {CLUB_COLUMNS} FROM clubs
             WHERE (?1 IS NULL OR province = ?1) AND (?2 IS NULL OR school = ?2)
             ORDER BY sort_index ASC, rowid ASC"
        );
        self.collect(&sql, params![filter.province.clone(), filter.school.clone()])
            .await
    }

    pub async fn find_by_natural_key(&self, name: &str, school: &str) -> Result<Option<Club>> {
        let key = NaturalKey::new(name, school).storage_key();
        let sql = format!(
            "SELECT {CLUB_COLUMNS} FROM clubs WHERE natural_key = ?1
             ORDER BY sort_index ASC, rowid ASC LIMIT 1"
        );
        Ok(self.collect(&sql, params![key]).await?.into_iter().next())
    }

    pub async fn find_by_id(&self, id: &ClubId) -> Result<Option<Club>> {
        let sql = format!("SELECT {CLUB_COLUMNS} FROM clubs WHERE id = ?1");
        Ok(self
            .collect(&sql, params![id.as_str()])
            .await?
            .into_iter()
            .next())
    }

    async fn next_sort_index(&self) -> Result<i64> {
        let mut rows = self
            .conn
            .query("SELECT COALESCE(MAX(sort_index) + 1, 0) FROM clubs", ())
            .await?;
        match rows.next().await? {
            Some(row) => Ok(row.get(0)?),
            None => Ok(0),
        }
    }

    pub async fn create(&self, fields: &ClubFields) -> Result<Club> {
        let club = Club::new(fields.clone(), self.next_sort_index().await?);
        let fields = &club.fields;

        self.conn
            .execute(
                "INSERT INTO clubs (id, sort_index, name, school, natural_key, city, province,
                    longitude, latitude, logo, short_description, description, tags_json,
                    external_links_json, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                params![
                    club.id.as_str(),
                    club.sort_index,
                    fields.name.clone(),
                    fields.school.clone(),
                    fields.natural_key().storage_key(),
                    fields.city.clone(),
                    fields.province.clone(),
                    fields.coordinates.longitude,
                    fields.coordinates.latitude,
                    fields.logo.clone(),
                    fields.short_description.clone(),
                    fields.description.clone(),
                    serde_json::to_string(&fields.tags)?,
                    serde_json::to_string(&fields.external_links)?,
                    club.created_at,
                    club.updated_at
                ],
            )
            .await?;

        Ok(club)
    }

    pub async fn update(&self, id: &ClubId, fields: &ClubFields) -> Result<Club> {
        let now = chrono::Utc::now().timestamp_millis();

        let rows = self
            .conn
            .execute(
                "UPDATE clubs SET name = ?1, school = ?2, natural_key = ?3, city = ?4,
                    province = ?5, longitude = ?6, latitude = ?7, logo = ?8,
                    short_description = ?9, description = ?10, tags_json = ?11,
                    external_links_json = ?12, updated_at = ?13
                 WHERE id = ?14",
                params![
                    fields.name.clone(),
                    fields.school.clone(),
                    fields.natural_key().storage_key(),
                    fields.city.clone(),
                    fields.province.clone(),
                    fields.coordinates.longitude,
                    fields.coordinates.latitude,
                    fields.logo.clone(),
                    fields.short_description.clone(),
                    fields.description.clone(),
                    serde_json::to_string(&fields.tags)?,
                    serde_json::to_string(&fields.external_links)?,
                    now,
                    id.as_str()
                ],
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }

        self.find_by_id(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    pub async fn delete_all(&self, filter: &ClubFilter) -> Result<u64> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM clubs
                 WHERE (?1 IS NULL OR province = ?1) AND (?2 IS NULL OR school = ?2)",
                params![filter.province.clone(), filter.school.clone()],
            )
            .await?;
        Ok(removed)
    }

    pub async fn count(&self) -> Result<u64> {
        let mut rows = self.conn.query("SELECT COUNT(*) FROM clubs", ()).await?;
        let count: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };
        u64::try_from(count).map_err(|_| Error::Database(format!("Negative club count: {count}")))
    }
}

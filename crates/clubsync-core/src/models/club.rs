//! Club model

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Surrogate identifier assigned by the record store, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClubId(Uuid);

impl ClubId {
    /// Create a new unique club ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for ClubId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClubId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ClubId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s.trim())?))
    }
}

/// Map position, always `[longitude, latitude]` on the wire
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct Coordinates {
    pub longitude: f64,
    pub latitude: f64,
}

impl Coordinates {
    #[must_use]
    pub const fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }

    /// Read a `[longitude, latitude]` JSON array.
    ///
    /// Returns `None` for anything that is not an array of exactly two numbers.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value.as_array()?.as_slice() {
            [longitude, latitude] => Some(Self::new(longitude.as_f64()?, latitude.as_f64()?)),
            _ => None,
        }
    }

    /// Longitude within `[-180, 180]` and latitude within `[-90, 90]`
    #[must_use]
    pub fn is_in_range(&self) -> bool {
        (-180.0..=180.0).contains(&self.longitude) && (-90.0..=90.0).contains(&self.latitude)
    }
}

impl From<(f64, f64)> for Coordinates {
    fn from((longitude, latitude): (f64, f64)) -> Self {
        Self::new(longitude, latitude)
    }
}

impl From<Coordinates> for (f64, f64) {
    fn from(value: Coordinates) -> Self {
        (value.longitude, value.latitude)
    }
}

/// Link shown on a club's detail card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalLink {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qrcode: Option<String>,
}

/// Business fields of a club, compared as an opaque value bag during sync
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClubFields {
    pub name: String,
    pub school: String,
    pub city: String,
    pub province: String,
    pub coordinates: Coordinates,
    pub logo: String,
    pub short_description: String,
    pub description: String,
    pub tags: Vec<String>,
    pub external_links: Vec<ExternalLink>,
}

/// Reasons a record cannot be written to the store
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("coordinates out of range: [{longitude}, {latitude}]")]
    CoordinatesOutOfRange { longitude: f64, latitude: f64 },
}

impl ClubFields {
    /// Natural key of this record
    #[must_use]
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey::new(&self.name, &self.school)
    }

    /// Check the fields every stored club must carry.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingField("name"));
        }
        if self.school.trim().is_empty() {
            return Err(ValidationError::MissingField("school"));
        }
        if self.province.trim().is_empty() {
            return Err(ValidationError::MissingField("province"));
        }
        if !self.coordinates.is_in_range() {
            return Err(ValidationError::CoordinatesOutOfRange {
                longitude: self.coordinates.longitude,
                latitude: self.coordinates.latitude,
            });
        }
        Ok(())
    }
}

/// A club as held by the record store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Club {
    /// Surrogate identifier
    pub id: ClubId,
    /// Display order, assigned at creation
    pub sort_index: i64,
    #[serde(flatten)]
    pub fields: ClubFields,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
}

impl Club {
    /// Create a new club with a fresh ID
    #[must_use]
    pub fn new(fields: ClubFields, sort_index: i64) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: ClubId::new(),
            sort_index,
            fields,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn natural_key(&self) -> NaturalKey {
        self.fields.natural_key()
    }
}

/// `(name, school)` identity shared by both replicas.
///
/// Both parts are trimmed and lowercased so manual edits that only change
/// capitalization or surrounding whitespace still match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NaturalKey {
    pub name: String,
    pub school: String,
}

impl NaturalKey {
    #[must_use]
    pub fn new(name: &str, school: &str) -> Self {
        Self {
            name: name.trim().to_lowercase(),
            school: school.trim().to_lowercase(),
        }
    }

    /// Single-column form used by the store index
    #[must_use]
    pub fn storage_key(&self) -> String {
        format!("{}\u{1f}{}", self.name, self.school)
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.name, self.school)
    }
}

#[cfg(test)]
pub(crate) fn sample_fields(name: &str, school: &str) -> ClubFields {
    ClubFields {
        name: name.to_string(),
        school: school.to_string(),
        city: "Beijing".to_string(),
        province: "Beijing".to_string(),
        coordinates: Coordinates::new(116.3, 39.9),
        logo: String::new(),
        short_description: String::new(),
        description: String::new(),
        tags: Vec::new(),
        external_links: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn coordinates_serialize_longitude_first() {
        let value = serde_json::to_value(Coordinates::new(121.5, 31.2)).unwrap();
        assert_eq!(value, json!([121.5, 31.2]));
    }

    #[test]
    fn coordinates_from_value_rejects_wrong_shape() {
        assert_eq!(
            Coordinates::from_value(&json!([1, 2])),
            Some(Coordinates::new(1.0, 2.0))
        );
        assert_eq!(Coordinates::from_value(&json!([1])), None);
        assert_eq!(Coordinates::from_value(&json!(["1", "2"])), None);
        assert_eq!(Coordinates::from_value(&json!({"lng": 1})), None);
    }

    #[test]
    fn natural_key_ignores_case_and_surrounding_whitespace() {
        assert_eq!(
            NaturalKey::new("  Go Club ", "State U"),
            NaturalKey::new("go club", "STATE U")
        );
        assert_ne!(
            NaturalKey::new("Go Club", "State U"),
            NaturalKey::new("Go Club", "City College")
        );
    }

    #[test]
    fn validate_reports_first_missing_field() {
        let mut fields = sample_fields("Go Club", "State U");
        assert!(fields.validate().is_ok());

        fields.province = "  ".to_string();
        assert_eq!(
            fields.validate(),
            Err(ValidationError::MissingField("province"))
        );
    }

    #[test]
    fn validate_rejects_swapped_coordinates() {
        let mut fields = sample_fields("Go Club", "State U");
        fields.coordinates = Coordinates::new(39.9, 116.3);
        assert_eq!(
            fields.validate(),
            Err(ValidationError::CoordinatesOutOfRange {
                longitude: 39.9,
                latitude: 116.3
            })
        );

        fields.coordinates = Coordinates::new(-181.0, 0.0);
        assert!(matches!(
            fields.validate(),
            Err(ValidationError::CoordinatesOutOfRange { .. })
        ));
    }

    #[test]
    fn club_id_round_trips_through_string() {
        let id = ClubId::new();
        let parsed: ClubId = id.as_str().parse().unwrap();
        assert_eq!(parsed, id);
    }
}

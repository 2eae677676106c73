//! One element of the `clubs.json` array.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{
    Club, ClubFields, ClubId, Coordinates, ExternalLink, NaturalKey, ValidationError,
};

/// A club as carried by the snapshot file.
///
/// Every business field is optional so the entry remembers exactly which
/// fields the file carries. Keys this model does not know about are kept in
/// `extra` and written back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawSnapshotEntry")]
pub struct SnapshotEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub school: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub province: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_links: Option<Vec<ExternalLink>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl SnapshotEntry {
    /// Snapshot projection of a stored club. The store's ID is not exported.
    #[must_use]
    pub fn from_club(club: &Club) -> Self {
        Self::from_fields(&club.fields)
    }

    #[must_use]
    pub fn from_fields(fields: &ClubFields) -> Self {
        Self {
            id: None,
            name: fields.name.clone(),
            school: fields.school.clone(),
            city: Some(fields.city.clone()),
            province: Some(fields.province.clone()),
            coordinates: Some(fields.coordinates),
            logo: Some(fields.logo.clone()),
            short_description: Some(fields.short_description.clone()),
            description: Some(fields.description.clone()),
            tags: Some(fields.tags.clone()),
            external_links: Some(fields.external_links.clone()),
            extra: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey::new(&self.name, &self.school)
    }

    /// The carried ID, when it parses as a store ID
    #[must_use]
    pub fn store_id(&self) -> Option<ClubId> {
        self.id.as_deref().and_then(|id| id.parse().ok())
    }

    /// Fields for a brand-new store record built from this entry alone.
    pub fn to_fields(&self) -> Result<ClubFields, ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingField("name"));
        }
        if self.school.trim().is_empty() {
            return Err(ValidationError::MissingField("school"));
        }
        let province = self
            .province
            .clone()
            .ok_or(ValidationError::MissingField("province"))?;
        let coordinates = self
            .coordinates
            .ok_or(ValidationError::MissingField("coordinates"))?;

        let fields = ClubFields {
            name: self.name.clone(),
            school: self.school.clone(),
            city: self.city.clone().unwrap_or_default(),
            province,
            coordinates,
            logo: self.logo.clone().unwrap_or_default(),
            short_description: self.short_description.clone().unwrap_or_default(),
            description: self.description.clone().unwrap_or_default(),
            tags: self.tags.clone().unwrap_or_default(),
            external_links: self.external_links.clone().unwrap_or_default(),
        };
        fields.validate()?;
        Ok(fields)
    }

    /// Store fields after applying every value this entry carries on top of `base`.
    #[must_use]
    pub fn overlay_onto(&self, base: &ClubFields) -> ClubFields {
        ClubFields {
            name: non_empty_or(&self.name, &base.name),
            school: non_empty_or(&self.school, &base.school),
            city: self.city.clone().unwrap_or_else(|| base.city.clone()),
            province: self.province.clone().unwrap_or_else(|| base.province.clone()),
            coordinates: self.coordinates.unwrap_or(base.coordinates),
            logo: self.logo.clone().unwrap_or_else(|| base.logo.clone()),
            short_description: self
                .short_description
                .clone()
                .unwrap_or_else(|| base.short_description.clone()),
            description: self
                .description
                .clone()
                .unwrap_or_else(|| base.description.clone()),
            tags: self.tags.clone().unwrap_or_else(|| base.tags.clone()),
            external_links: self
                .external_links
                .clone()
                .unwrap_or_else(|| base.external_links.clone()),
        }
    }

    /// This entry with every missing field filled from the stored club.
    ///
    /// Values the entry already carries, its ID and its unknown keys are kept.
    #[must_use]
    pub fn merged_with(&self, club: &Club) -> Self {
        let fields = &club.fields;
        let mut merged = self.clone();
        if merged.name.trim().is_empty() {
            merged.name.clone_from(&fields.name);
        }
        if merged.school.trim().is_empty() {
            merged.school.clone_from(&fields.school);
        }
        merged.city.get_or_insert_with(|| fields.city.clone());
        merged
            .province
            .get_or_insert_with(|| fields.province.clone());
        if merged.coordinates.is_none() {
            merged.coordinates = Some(fields.coordinates);
            merged.extra.remove("coordinates");
        }
        merged.logo.get_or_insert_with(|| fields.logo.clone());
        merged
            .short_description
            .get_or_insert_with(|| fields.short_description.clone());
        merged
            .description
            .get_or_insert_with(|| fields.description.clone());
        merged.tags.get_or_insert_with(|| fields.tags.clone());
        merged
            .external_links
            .get_or_insert_with(|| fields.external_links.clone());
        merged
    }
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

/// Wire shape accepted on read, including legacy layouts.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSnapshotEntry {
    #[serde(default, alias = "_id")]
    id: Option<Value>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    school: String,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    province: Option<String>,
    #[serde(default)]
    coordinates: Option<Value>,
    #[serde(default)]
    longitude: Option<f64>,
    #[serde(default)]
    latitude: Option<f64>,
    #[serde(default)]
    logo: Option<String>,
    #[serde(default)]
    short_description: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    external_links: Option<Vec<ExternalLink>>,
    #[serde(flatten)]
    extra: BTreeMap<String, Value>,
}

impl From<RawSnapshotEntry> for SnapshotEntry {
    fn from(raw: RawSnapshotEntry) -> Self {
        let mut extra = raw.extra;

        let id = match raw.id {
            Some(Value::String(id)) => Some(id),
            Some(Value::Number(id)) => Some(id.to_string()),
            _ => None,
        };

        let coordinates = match raw.coordinates {
            Some(Value::Null) | None => None,
            Some(value) => {
                let parsed = Coordinates::from_value(&value);
                if parsed.is_none() {
                    extra.insert("coordinates".to_string(), value);
                }
                parsed
            }
        };
        let coordinates = match (coordinates, raw.longitude, raw.latitude) {
            (Some(coordinates), _, _) => Some(coordinates),
            (None, Some(longitude), Some(latitude)) => {
                Some(Coordinates::new(longitude, latitude))
            }
            (None, longitude, latitude) => {
                if let Some(longitude) = longitude {
                    extra.insert("longitude".to_string(), Value::from(longitude));
                }
                if let Some(latitude) = latitude {
                    extra.insert("latitude".to_string(), Value::from(latitude));
                }
                None
            }
        };

        Self {
            id,
            name: raw.name,
            school: raw.school,
            city: raw.city,
            province: raw.province,
            coordinates,
            logo: raw.logo,
            short_description: raw.short_description,
            description: raw.description,
            tags: raw.tags,
            external_links: raw.external_links,
            extra,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::sample_fields;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn parse(value: Value) -> SnapshotEntry {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn legacy_longitude_latitude_are_normalized() {
        let entry = parse(json!({
            "name": "Go Club",
            "school": "State U",
            "longitude": 116.3,
            "latitude": 39.9
        }));

        assert_eq!(entry.coordinates, Some(Coordinates::new(116.3, 39.9)));
        assert!(entry.extra.is_empty());
        let written = serde_json::to_value(&entry).unwrap();
        assert_eq!(written["coordinates"], json!([116.3, 39.9]));
        assert!(written.get("longitude").is_none());
    }

    #[test]
    fn malformed_coordinates_are_kept_verbatim() {
        let entry = parse(json!({
            "name": "Go Club",
            "school": "State U",
            "coordinates": [116.3]
        }));

        assert_eq!(entry.coordinates, None);
        assert_eq!(
            serde_json::to_value(&entry).unwrap()["coordinates"],
            json!([116.3])
        );
    }

    #[test]
    fn mongo_style_id_and_unknown_keys_survive() {
        let entry = parse(json!({
            "_id": "abc123",
            "name": "Go Club",
            "school": "State U",
            "verifiedBy": "admin"
        }));

        assert_eq!(entry.id.as_deref(), Some("abc123"));
        assert_eq!(entry.extra.get("verifiedBy"), Some(&json!("admin")));
        assert_eq!(entry.store_id(), None);
    }

    #[test]
    fn projection_writes_fields_in_snapshot_order() {
        let entry = SnapshotEntry::from_fields(&sample_fields("Go Club", "State U"));
        let rendered = serde_json::to_string(&entry).unwrap();

        assert!(rendered.starts_with(r#"{"name":"Go Club","school":"State U","city""#));
        assert!(rendered.contains(r#""coordinates":[116.3,39.9],"logo""#));
        assert!(rendered.ends_with(r#""tags":[],"externalLinks":[]}"#));
    }

    #[test]
    fn to_fields_requires_coordinates() {
        let entry = parse(json!({
            "name": "Go Club",
            "school": "State U",
            "province": "Beijing"
        }));

        assert_eq!(
            entry.to_fields(),
            Err(ValidationError::MissingField("coordinates"))
        );
    }

    #[test]
    fn overlay_only_replaces_carried_fields() {
        let mut base = sample_fields("Go Club", "State U");
        base.tags = vec!["go".to_string(), "board".to_string()];
        base.description = "Weekly games".to_string();

        let entry = parse(json!({
            "name": "Go Club",
            "school": "State U",
            "tags": ["go"]
        }));

        let overlaid = entry.overlay_onto(&base);
        assert_eq!(overlaid.tags, vec!["go".to_string()]);
        assert_eq!(overlaid.description, "Weekly games");
        assert_eq!(overlaid.coordinates, base.coordinates);
    }

    #[test]
    fn merged_with_keeps_file_values_and_id() {
        let mut fields = sample_fields("Go Club", "State U");
        fields.tags = vec!["go".to_string(), "board".to_string()];
        let club = Club::new(fields, 0);

        let entry = parse(json!({
            "id": "file-id-1",
            "name": "Go Club",
            "school": "State U",
            "tags": ["go"],
            "coordinates": "somewhere"
        }));

        let merged = entry.merged_with(&club);
        assert_eq!(merged.id.as_deref(), Some("file-id-1"));
        assert_eq!(merged.tags, Some(vec!["go".to_string()]));
        assert_eq!(merged.city.as_deref(), Some("Beijing"));
        assert_eq!(merged.coordinates, Some(Coordinates::new(116.3, 39.9)));
        assert!(!merged.extra.contains_key("coordinates"));
    }
}

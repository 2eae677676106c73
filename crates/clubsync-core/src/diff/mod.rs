//! Classify the differences between the store and the snapshot.
//!
//! Records are matched by natural key. Matched pairs are compared on their
//! snapshot projections with identity fields removed, so a store record and
//! a file entry that only differ by ID count as identical.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{Club, ClubId, NaturalKey};
use crate::snapshot::SnapshotEntry;

/// Keys that carry identity or bookkeeping rather than club content
const IDENTITY_KEYS: &[&str] = &["id", "_id", "__v", "createdAt", "updatedAt", "sortIndex"];

/// One field whose value differs between the two sides
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDelta {
    pub field: String,
    pub store_value: Value,
    pub file_value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum DiffKind {
    Identical,
    Different { deltas: Vec<FieldDelta> },
    StoreOnly,
    FileOnly,
}

/// Classification of one natural key
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffEntry {
    pub key: NaturalKey,
    /// Name and school as written by the side that holds the record
    pub name: String,
    pub school: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_id: Option<ClubId>,
    #[serde(flatten)]
    pub kind: DiffKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Side {
    Store,
    File,
}

/// Several records on one side sharing a natural key.
///
/// Only the first record in listing order takes part in the diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateGroup {
    pub side: Side,
    pub key: NaturalKey,
    pub count: usize,
    /// Store IDs of every member, empty for file duplicates
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub store_ids: Vec<ClubId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffStats {
    pub store_total: usize,
    pub store_unique: usize,
    pub file_total: usize,
    pub file_unique: usize,
    pub identical: usize,
    pub different: usize,
    pub store_only: usize,
    pub file_only: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffReport {
    pub entries: Vec<DiffEntry>,
    pub duplicates: Vec<DuplicateGroup>,
    pub stats: DiffStats,
}

impl DiffReport {
    /// True when every key is identical on both sides
    #[must_use]
    pub fn is_in_sync(&self) -> bool {
        self.entries
            .iter()
            .all(|entry| entry.kind == DiffKind::Identical)
    }

    /// Entries that are not identical
    pub fn changes(&self) -> impl Iterator<Item = &DiffEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.kind != DiffKind::Identical)
    }
}

#[derive(Default)]
struct Slot<'a> {
    store: Option<&'a Club>,
    store_ids: Vec<ClubId>,
    file: Option<&'a SnapshotEntry>,
    file_count: usize,
}

/// Compare the store listing against the snapshot entries.
#[must_use]
pub fn diff(store: &[Club], file: &[SnapshotEntry]) -> DiffReport {
    let mut slots: BTreeMap<NaturalKey, Slot<'_>> = BTreeMap::new();

    for club in store {
        let slot = slots.entry(club.natural_key()).or_default();
        slot.store.get_or_insert(club);
        slot.store_ids.push(club.id);
    }
    for entry in file {
        let slot = slots.entry(entry.natural_key()).or_default();
        slot.file.get_or_insert(entry);
        slot.file_count += 1;
    }

    let mut report = DiffReport::default();
    report.stats.store_total = store.len();
    report.stats.file_total = file.len();

    for (key, slot) in slots {
        if slot.store_ids.len() > 1 {
            report.duplicates.push(DuplicateGroup {
                side: Side::Store,
                key: key.clone(),
                count: slot.store_ids.len(),
                store_ids: slot.store_ids.clone(),
            });
        }
        if slot.file_count > 1 {
            report.duplicates.push(DuplicateGroup {
                side: Side::File,
                key: key.clone(),
                count: slot.file_count,
                store_ids: Vec::new(),
            });
        }

        let (name, school, store_id, kind) = match (slot.store, slot.file) {
            (Some(club), Some(entry)) => {
                report.stats.store_unique += 1;
                report.stats.file_unique += 1;
                let deltas = field_deltas(
                    &comparable_store(club),
                    &comparable_file(entry),
                );
                let kind = if deltas.is_empty() {
                    report.stats.identical += 1;
                    DiffKind::Identical
                } else {
                    report.stats.different += 1;
                    DiffKind::Different { deltas }
                };
                (
                    club.fields.name.clone(),
                    club.fields.school.clone(),
                    Some(club.id),
                    kind,
                )
            }
            (Some(club), None) => {
                report.stats.store_unique += 1;
                report.stats.store_only += 1;
                (
                    club.fields.name.clone(),
                    club.fields.school.clone(),
                    Some(club.id),
                    DiffKind::StoreOnly,
                )
            }
            (None, Some(entry)) => {
                report.stats.file_unique += 1;
                report.stats.file_only += 1;
                (
                    entry.name.clone(),
                    entry.school.clone(),
                    None,
                    DiffKind::FileOnly,
                )
            }
            (None, None) => continue,
        };

        report.entries.push(DiffEntry {
            key,
            name,
            school,
            store_id,
            kind,
        });
    }

    report
}

fn comparable_store(club: &Club) -> Value {
    strip_identity(serde_json::to_value(SnapshotEntry::from_club(club)).unwrap_or(Value::Null))
}

/// Unknown keys the file carries are file-side metadata and never compared.
fn comparable_file(entry: &SnapshotEntry) -> Value {
    let mut entry = entry.clone();
    entry.id = None;
    entry.extra.clear();
    strip_identity(serde_json::to_value(entry).unwrap_or(Value::Null))
}

/// Remove identity keys at every depth.
fn strip_identity(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(key, _)| !IDENTITY_KEYS.contains(&key.as_str()))
                .map(|(key, value)| (key, strip_identity(value)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(strip_identity).collect()),
        other => other,
    }
}

/// Per-field differences; a key missing on one side compares as `null`.
fn field_deltas(store: &Value, file: &Value) -> Vec<FieldDelta> {
    let (Some(store), Some(file)) = (store.as_object(), file.as_object()) else {
        return if store == file {
            Vec::new()
        } else {
            vec![FieldDelta {
                field: String::new(),
                store_value: store.clone(),
                file_value: file.clone(),
            }]
        };
    };

    let fields: BTreeSet<&String> = store.keys().chain(file.keys()).collect();
    fields
        .into_iter()
        .filter_map(|field| {
            let store_value = store.get(field).unwrap_or(&Value::Null);
            let file_value = file.get(field).unwrap_or(&Value::Null);
            (store_value != file_value).then(|| FieldDelta {
                field: field.clone(),
                store_value: store_value.clone(),
                file_value: file_value.clone(),
            })
        })
        .collect()
}

/// Group items by natural key, keeping first-seen order inside each group.
pub(crate) fn index_by_key<T>(
    items: &[T],
    key: impl Fn(&T) -> NaturalKey,
) -> BTreeMap<NaturalKey, Vec<usize>> {
    let mut index: BTreeMap<NaturalKey, Vec<usize>> = BTreeMap::new();
    for (position, item) in items.iter().enumerate() {
        match index.entry(key(item)) {
            Entry::Occupied(mut slot) => slot.get_mut().push(position),
            Entry::Vacant(slot) => {
                slot.insert(vec![position]);
            }
        }
    }
    index
}

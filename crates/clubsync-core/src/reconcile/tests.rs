use std::path::Path;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;

use super::*;
use crate::models::{sample_fields, ClubFields, ClubId, Coordinates};
use crate::services::DatabaseService;

struct Harness {
    _dir: TempDir,
    store: Arc<DatabaseService>,
    reconciler: Reconciler,
}

impl Harness {
    async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(DatabaseService::open_in_memory().await.unwrap());
        let snapshot = SnapshotFile::new(dir.path().join("public/data/clubs.json"));
        let reconciler = Reconciler::new(store.clone(), snapshot);
        Self {
            _dir: dir,
            store,
            reconciler,
        }
    }

    fn path(&self) -> &Path {
        self.reconciler.snapshot().path()
    }

    fn write_file(&self, value: &serde_json::Value) {
        std::fs::create_dir_all(self.path().parent().unwrap()).unwrap();
        std::fs::write(self.path(), serde_json::to_string_pretty(value).unwrap()).unwrap();
    }

    fn read_file(&self) -> Vec<SnapshotEntry> {
        crate::snapshot::parse_snapshot(&std::fs::read_to_string(self.path()).unwrap()).unwrap()
    }

    async fn add(&self, fields: ClubFields) -> Club {
        self.store.create(&fields).await.unwrap()
    }

    async fn clubs(&self) -> Vec<Club> {
        self.store.find(&ClubFilter::all()).await.unwrap()
    }
}

fn with_tags(name: &str, tags: &[&str]) -> ClubFields {
    let mut fields = sample_fields(name, "State U");
    fields.tags = tags.iter().map(ToString::to_string).collect();
    fields
}

fn entry_json(name: &str, tags: &[&str]) -> serde_json::Value {
    serde_json::to_value(SnapshotEntry::from_fields(&with_tags(name, tags))).unwrap()
}

fn names(clubs: &[Club]) -> Vec<String> {
    let mut names: Vec<_> = clubs.iter().map(|club| club.fields.name.clone()).collect();
    names.sort();
    names
}

#[tokio::test(flavor = "multi_thread")]
async fn merge_brings_one_sided_records_into_both_stores() {
    let harness = Harness::new().await;
    harness.add(with_tags("Go Club", &["go"])).await;
    harness.write_file(&json!([entry_json("Art Club", &["art"])]));

    let report = harness.reconciler.reconcile(Strategy::Merge).await.unwrap();
    assert_eq!(
        report.counts,
        SyncCounts {
            store_added: 1,
            file_added: 1,
            ..SyncCounts::default()
        }
    );
    assert!(report.file_written);

    assert_eq!(names(&harness.clubs().await), vec!["Art Club", "Go Club"]);
    let file_names: Vec<_> = harness.read_file().into_iter().map(|e| e.name).collect();
    assert_eq!(file_names, vec!["Art Club", "Go Club"]);

    let second = harness.reconciler.reconcile(Strategy::Merge).await.unwrap();
    assert_eq!(
        second.counts,
        SyncCounts {
            unchanged: 2,
            ..SyncCounts::default()
        }
    );
    assert!(!second.file_written);
    assert!(harness.reconciler.compare().await.unwrap().is_in_sync());
}

#[tokio::test(flavor = "multi_thread")]
async fn merge_resolves_tag_conflicts_to_the_file_value() {
    let harness = Harness::new().await;
    harness.add(with_tags("Go Club", &["go", "board"])).await;
    harness.write_file(&json!([entry_json("Go Club", &["go"])]));

    let report = harness.reconciler.reconcile(Strategy::Merge).await.unwrap();
    assert_eq!(report.counts.store_updated, 1);

    let clubs = harness.clubs().await;
    assert_eq!(clubs[0].fields.tags, vec!["go".to_string()]);
    assert_eq!(harness.read_file()[0].tags, Some(vec!["go".to_string()]));
}

#[tokio::test(flavor = "multi_thread")]
async fn merge_keeps_file_ids_across_cycles() {
    let harness = Harness::new().await;
    harness.add(with_tags("Go Club", &["go"])).await;
    let mut entry = entry_json("Go Club", &["go"]);
    entry["_id"] = json!("5f1d7c0ffee0000000000001");
    harness.write_file(&json!([entry]));

    for _ in 0..3 {
        harness.reconciler.reconcile(Strategy::Merge).await.unwrap();
        let file = harness.read_file();
        assert_eq!(file.len(), 1);
        assert_eq!(file[0].id.as_deref(), Some("5f1d7c0ffee0000000000001"));
    }

    let raw = std::fs::read_to_string(harness.path()).unwrap();
    assert!(!raw.contains(&harness.clubs().await[0].id.as_str()));
}

#[tokio::test(flavor = "multi_thread")]
async fn merge_matches_store_ids_carried_by_the_file() {
    let harness = Harness::new().await;
    let club = harness.add(with_tags("Go Club", &["go"])).await;
    let mut entry = entry_json("Go Club (Weiqi)", &["go"]);
    entry["id"] = json!(club.id.as_str());
    harness.write_file(&json!([entry]));

    let report = harness.reconciler.reconcile(Strategy::Merge).await.unwrap();
    assert_eq!(report.counts.store_updated, 1);
    assert_eq!(report.counts.file_added, 0);

    let clubs = harness.clubs().await;
    assert_eq!(clubs.len(), 1);
    assert_eq!(clubs[0].id, club.id);
    assert_eq!(clubs[0].fields.name, "Go Club (Weiqi)");
}

#[tokio::test(flavor = "multi_thread")]
async fn merge_fills_missing_file_fields_from_the_store() {
    let harness = Harness::new().await;
    let mut fields = with_tags("Go Club", &["go"]);
    fields.description = "Weekly games".to_string();
    harness.add(fields).await;
    harness.write_file(&json!([{
        "name": "Go Club",
        "school": "State U",
        "tags": ["go", "weiqi"],
        "curator": "alice"
    }]));

    let report = harness.reconciler.reconcile(Strategy::Merge).await.unwrap();
    assert_eq!(report.counts.store_updated, 1);
    assert_eq!(report.counts.file_updated, 1);

    let file = harness.read_file();
    assert_eq!(file[0].description.as_deref(), Some("Weekly games"));
    assert_eq!(
        file[0].tags,
        Some(vec!["go".to_string(), "weiqi".to_string()])
    );
    assert_eq!(file[0].extra.get("curator"), Some(&json!("alice")));
    assert_eq!(file[0].coordinates, Some(Coordinates::new(116.3, 39.9)));
}

#[tokio::test(flavor = "multi_thread")]
async fn merge_keeps_invalid_file_entries_verbatim() {
    let harness = Harness::new().await;
    harness.write_file(&json!([
        {"name": "Ghost Club", "school": "State U", "province": "Beijing"},
        entry_json("Go Club", &[])
    ]));

    let report = harness.reconciler.reconcile(Strategy::Merge).await.unwrap();
    assert_eq!(report.counts.store_added, 1);
    assert_eq!(report.counts.skipped, 1);
    assert_eq!(
        report.failures,
        vec![RecordFailure {
            record: "ghost club|state u".to_string(),
            reason: "missing required field `coordinates`".to_string(),
        }]
    );

    let file = harness.read_file();
    assert_eq!(file.len(), 2);
    assert_eq!(file[0].name, "Ghost Club");
    assert_eq!(file[0].coordinates, None);
}

#[tokio::test(flavor = "multi_thread")]
async fn merge_reports_and_counts_duplicate_file_entries() {
    let harness = Harness::new().await;
    let mut repeat = entry_json("Go Club", &["baduk"]);
    repeat["name"] = json!("go club ");
    harness.write_file(&json!([
        entry_json("Go Club", &["go"]),
        repeat,
        entry_json("Art Club", &[])
    ]));

    let first = harness.reconciler.reconcile(Strategy::Merge).await.unwrap();
    assert_eq!(first.counts.store_added, 2);
    assert_eq!(first.counts.skipped, 1);
    assert_eq!(first.failures.len(), 1);
    assert_eq!(first.failures[0].record, "go club|state u");
    assert_eq!(
        first.duplicates,
        vec![DuplicateGroup {
            side: Side::File,
            key: NaturalKey::new("Go Club", "State U"),
            count: 2,
            store_ids: Vec::new(),
        }]
    );

    let stored = harness.clubs().await;
    assert_eq!(names(&stored), vec!["Art Club", "Go Club"]);
    let go = stored.iter().find(|club| club.fields.name == "Go Club").unwrap();
    assert_eq!(go.fields.tags, vec!["go".to_string()]);

    let second = harness.reconciler.reconcile(Strategy::Merge).await.unwrap();
    assert_eq!(second.counts.unchanged + second.counts.skipped, 3);
    assert_eq!(second.counts.skipped, 1);
    assert_eq!(second.duplicates.len(), 1);
    assert_eq!(harness.read_file().len(), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn merge_creates_a_missing_snapshot() {
    let harness = Harness::new().await;
    harness.add(with_tags("Go Club", &[])).await;

    let report = harness.reconciler.reconcile(Strategy::Merge).await.unwrap();
    assert_eq!(report.counts.file_added, 1);
    assert!(harness.path().exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn merge_aborts_on_unparseable_snapshot() {
    let harness = Harness::new().await;
    harness.add(with_tags("Go Club", &[])).await;
    std::fs::create_dir_all(harness.path().parent().unwrap()).unwrap();
    std::fs::write(harness.path(), "[{\"name\": ").unwrap();

    let error = harness
        .reconciler
        .reconcile(Strategy::Merge)
        .await
        .unwrap_err();
    assert!(matches!(error, ReconcileError::SnapshotUnavailable(_)));
    assert_eq!(error.phase(), SyncPhase::Diff);
    assert_eq!(std::fs::read_to_string(harness.path()).unwrap(), "[{\"name\": ");
}

#[tokio::test(flavor = "multi_thread")]
async fn store_to_file_then_file_to_store_round_trips_field_bags() {
    let harness = Harness::new().await;
    let before = vec![
        harness.add(with_tags("Go Club", &["go"])).await,
        harness.add(with_tags("Art Club", &["art"])).await,
    ];

    let exported = harness
        .reconciler
        .reconcile(Strategy::StoreToFile)
        .await
        .unwrap();
    assert_eq!(exported.counts.file_added, 2);

    let imported = harness
        .reconciler
        .reconcile(Strategy::FileToStore)
        .await
        .unwrap();
    assert_eq!(imported.counts.store_added, 2);

    let after = harness.clubs().await;
    let before_fields: Vec<_> = before.iter().map(|club| club.fields.clone()).collect();
    let after_fields: Vec<_> = after.iter().map(|club| club.fields.clone()).collect();
    assert_eq!(after_fields, before_fields);
    // IDs are regenerated by the replace
    assert_ne!(after[0].id, before[0].id);
}

#[tokio::test(flavor = "multi_thread")]
async fn store_to_file_is_byte_stable() {
    let harness = Harness::new().await;
    harness.add(with_tags("Go Club", &["go"])).await;
    harness.add(with_tags("Art Club", &["art"])).await;

    harness
        .reconciler
        .reconcile(Strategy::StoreToFile)
        .await
        .unwrap();
    let first = std::fs::read(harness.path()).unwrap();

    let report = harness
        .reconciler
        .reconcile(Strategy::StoreToFile)
        .await
        .unwrap();
    assert_eq!(report.counts.unchanged, 2);
    assert_eq!(std::fs::read(harness.path()).unwrap(), first);
}

#[tokio::test(flavor = "multi_thread")]
async fn store_to_file_refuses_an_empty_store() {
    let harness = Harness::new().await;
    harness.write_file(&json!([entry_json("Art Club", &[])]));

    let error = harness
        .reconciler
        .reconcile(Strategy::StoreToFile)
        .await
        .unwrap_err();
    assert!(matches!(error, ReconcileError::EmptyStore));
    assert_eq!(error.phase(), SyncPhase::Precondition);
    assert_eq!(harness.read_file().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn file_to_store_requires_a_snapshot() {
    let harness = Harness::new().await;
    harness.add(with_tags("Go Club", &[])).await;

    let error = harness
        .reconciler
        .reconcile(Strategy::FileToStore)
        .await
        .unwrap_err();
    assert!(matches!(error, ReconcileError::SnapshotMissing(_)));
    assert_eq!(harness.clubs().await.len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn file_to_store_skips_records_without_coordinates() {
    let harness = Harness::new().await;
    harness.add(with_tags("Old Club", &[])).await;
    harness.write_file(&json!([
        entry_json("Go Club", &[]),
        {"name": "Art Club", "school": "State U", "province": "Beijing", "coordinates": [200.0, 10.0]},
        {"name": "Chess Club", "school": "State U", "province": "Beijing"},
    ]));

    let report = harness
        .reconciler
        .reconcile(Strategy::FileToStore)
        .await
        .unwrap();

    assert_eq!(report.counts.store_added, 1);
    assert_eq!(report.counts.skipped, 2);
    assert_eq!(names(&harness.clubs().await), vec!["Go Club"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn upsert_reimport_keeps_store_only_records() {
    let harness = Harness::new().await;
    harness.add(with_tags("Go Club", &["go"])).await;
    harness.write_file(&json!([entry_json("Art Club", &[])]));

    let report = harness.reconciler.reimport(ReimportMode::Upsert).await.unwrap();
    assert_eq!(report.counts.store_added, 1);
    assert!(!report.file_written);
    assert_eq!(names(&harness.clubs().await), vec!["Art Club", "Go Club"]);

    harness.reconciler.reimport(ReimportMode::Full).await.unwrap();
    assert_eq!(names(&harness.clubs().await), vec!["Art Club"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn compare_reports_store_duplicates() {
    let harness = Harness::new().await;
    harness.add(with_tags("Go Club", &[])).await;
    harness.add(with_tags("go club", &[])).await;

    let report = harness.reconciler.compare().await.unwrap();
    assert_eq!(report.duplicates.len(), 1);
    assert_eq!(report.stats.store_total, 2);
    assert_eq!(report.stats.store_only, 1);
}

#[test]
fn validate_entries_lists_every_problem() {
    let entries: Vec<SnapshotEntry> = serde_json::from_value(json!([
        entry_json("Go Club", &[]),
        {"school": "State U"},
        {"name": "Art Club", "school": "State U", "province": "Beijing", "coordinates": [10.0, 95.0]},
    ]))
    .unwrap();

    let failures = validate_entries(&entries);
    assert_eq!(
        failures,
        vec![
            RecordFailure {
                record: "|state u".to_string(),
                reason: "missing required field `name`".to_string(),
            },
            RecordFailure {
                record: "art club|state u".to_string(),
                reason: "coordinates out of range: [10, 95]".to_string(),
            },
        ]
    );
}

#[test]
fn strategy_parses_both_spellings() {
    assert_eq!("storeToFile".parse::<Strategy>(), Ok(Strategy::StoreToFile));
    assert_eq!("file-to-store".parse::<Strategy>(), Ok(Strategy::FileToStore));
    assert!("sideways".parse::<Strategy>().is_err());
    assert_eq!(
        serde_json::to_value(Strategy::StoreToFile).unwrap(),
        json!("storeToFile")
    );
}

/// Store whose writes fail for one club name
struct FlakyStore {
    inner: DatabaseService,
    broken: &'static str,
}

#[async_trait]
impl ClubStore for FlakyStore {
    async fn find(&self, filter: &ClubFilter) -> crate::Result<Vec<Club>> {
        self.inner.find(filter).await
    }

    async fn find_by_natural_key(&self, name: &str, school: &str) -> crate::Result<Option<Club>> {
        self.inner.find_by_natural_key(name, school).await
    }

    async fn find_by_id(&self, id: &ClubId) -> crate::Result<Option<Club>> {
        self.inner.find_by_id(id).await
    }

    async fn create(&self, fields: &ClubFields) -> crate::Result<Club> {
        if fields.name == self.broken {
            return Err(crate::Error::Database("disk I/O error".to_string()));
        }
        self.inner.create(fields).await
    }

    async fn update(&self, id: &ClubId, fields: &ClubFields) -> crate::Result<Club> {
        self.inner.update(id, fields).await
    }

    async fn delete_all(&self, filter: &ClubFilter) -> crate::Result<u64> {
        self.inner.delete_all(filter).await
    }

    async fn count(&self) -> crate::Result<u64> {
        self.inner.count().await
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn store_write_failures_are_per_record() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clubs.json");
    std::fs::write(
        &path,
        serde_json::to_string(&json!([
            entry_json("Broken Club", &[]),
            entry_json("Go Club", &[])
        ]))
        .unwrap(),
    )
    .unwrap();

    let store = Arc::new(FlakyStore {
        inner: DatabaseService::open_in_memory().await.unwrap(),
        broken: "Broken Club",
    });
    let reconciler = Reconciler::new(store.clone(), SnapshotFile::new(&path));

    let report = reconciler.reconcile(Strategy::Merge).await.unwrap();
    assert_eq!(report.counts.store_added, 1);
    assert_eq!(report.counts.skipped, 1);
    assert_eq!(
        report.failures[0].reason,
        "store write failed: Database error: disk I/O error"
    );
    assert_eq!(store.count().await.unwrap(), 1);

    let file = SnapshotFile::new(&path).read_required().await.unwrap();
    assert_eq!(file.len(), 2);
}

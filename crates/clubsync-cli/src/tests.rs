use std::path::PathBuf;

use chrono::Utc;
use clap::Parser;
use clubsync_core::db::{ClubFilter, ClubStore};
use clubsync_core::diff::{diff, DuplicateGroup, Side};
use clubsync_core::reconcile::{ReconcileReport, SyncCounts};
use clubsync_core::services::DatabaseService;
use clubsync_core::vcs::{PullOutcome, PushMethod};
use clubsync_core::{
    Club, ClubFields, Coordinates, NaturalKey, SnapshotEntry, Strategy, SyncResult, SyncSettings,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use crate::cli::{Cli, Commands, CompletionShell, StrategyArg};
use crate::commands::common::{apply_overrides, format_counts, format_diff_lines, SettingsOverrides};
use crate::commands::completions::{render_completions, run_completions};
use crate::commands::export::run_export;
use crate::commands::sync::{format_sync_result, run_sync};
use crate::commands::validate::{run_validate, validate_snapshot};
use crate::error::CliError;

fn fields(name: &str, school: &str, tags: &[&str]) -> ClubFields {
    ClubFields {
        name: name.to_string(),
        school: school.to_string(),
        city: "Nanjing".to_string(),
        province: "Jiangsu".to_string(),
        coordinates: Coordinates::new(118.8, 32.1),
        logo: String::new(),
        short_description: String::new(),
        description: String::new(),
        tags: tags.iter().map(ToString::to_string).collect(),
        external_links: Vec::new(),
    }
}

/// Settings pointing at a fresh directory for both the snapshot and the database
fn temp_settings() -> (TempDir, SyncSettings) {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_string_lossy().to_string();
    let db_path = dir.path().join("data/clubs.db").to_string_lossy().to_string();
    let settings = SyncSettings::from_lookup(|name| match name {
        "CLUBSYNC_REPO_ROOT" => Some(root.clone()),
        "CLUBSYNC_DB_PATH" => Some(db_path.clone()),
        _ => None,
    })
    .unwrap();
    (dir, settings)
}

async fn seed_store(settings: &SyncSettings, clubs: &[ClubFields]) {
    let store = DatabaseService::open_path(&settings.db_path).await.unwrap();
    for club in clubs {
        store.create(club).await.unwrap();
    }
}

fn write_snapshot(settings: &SyncSettings, value: &serde_json::Value) {
    let path = settings.snapshot_path();
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
}

#[test]
fn overrides_take_precedence_over_settings() {
    let (_dir, settings) = temp_settings();
    let overridden = apply_overrides(
        settings.clone(),
        SettingsOverrides {
            repo_root: Some(PathBuf::from("/srv/site")),
            snapshot: None,
            db_path: Some(PathBuf::from("/tmp/other.db")),
        },
    );

    assert_eq!(overridden.repo_root, PathBuf::from("/srv/site"));
    assert_eq!(overridden.snapshot_path, settings.snapshot_path);
    assert_eq!(
        overridden.snapshot_path(),
        PathBuf::from("/srv/site/public/data/clubs.json")
    );
    assert_eq!(overridden.db_path, PathBuf::from("/tmp/other.db"));
}

#[test]
fn sync_command_parses_strategy_names() {
    let cli = Cli::try_parse_from([
        "clubsync",
        "sync",
        "--strategy",
        "store-to-file",
        "--local",
        "-m",
        "Publish clubs",
    ])
    .unwrap();

    match cli.command {
        Commands::Sync {
            strategy,
            message,
            local,
            json,
        } => {
            assert_eq!(strategy, StrategyArg::StoreToFile);
            assert_eq!(Strategy::from(strategy), Strategy::StoreToFile);
            assert_eq!(message.as_deref(), Some("Publish clubs"));
            assert!(local);
            assert!(!json);
        }
        _ => panic!("expected sync command"),
    }

    assert!(Cli::try_parse_from(["clubsync", "sync", "--strategy", "sideways"]).is_err());
}

#[test]
fn diff_lines_describe_each_class() {
    let store = vec![
        Club::new(fields("Go Club", "State U", &["go", "board"]), 0),
        Club::new(fields("Chess Club", "State U", &[]), 1),
        Club::new(fields("Film Club", "State U", &[]), 2),
    ];
    let file = vec![
        SnapshotEntry::from_fields(&fields("Go Club", "State U", &["go"])),
        SnapshotEntry::from_fields(&fields("Chess Club", "State U", &[])),
        SnapshotEntry::from_fields(&fields("Art Club", "State U", &[])),
    ];
    let report = diff(&store, &file);

    let lines = format_diff_lines(&report, false);
    assert_eq!(
        lines.first().unwrap(),
        "database: 3 records (3 unique), snapshot: 3 records (3 unique)"
    );
    assert!(lines.contains(&"~ Go Club | State U".to_string()));
    assert!(lines.contains(&"    tags: database [\"go\",\"board\"] / snapshot [\"go\"]".to_string()));
    assert!(lines.contains(&"+ Film Club | State U (database only)".to_string()));
    assert!(lines.contains(&"- Art Club | State U (snapshot only)".to_string()));
    assert!(!lines.contains(&"= Chess Club | State U".to_string()));
    assert_eq!(
        lines.last().unwrap(),
        "identical 1, different 1, database only 1, snapshot only 1"
    );

    let all = format_diff_lines(&report, true);
    assert!(all.contains(&"= Chess Club | State U".to_string()));
}

#[test]
fn counts_render_on_one_line() {
    let counts = SyncCounts {
        store_added: 1,
        store_updated: 2,
        file_added: 3,
        file_updated: 0,
        unchanged: 5,
        skipped: 1,
    };
    assert_eq!(
        format_counts(&counts),
        "database +1 ~2, snapshot +3 ~0, unchanged 5, skipped 1"
    );
}

#[test]
fn sync_result_lines_mention_pull_push_and_reimport() {
    let now = Utc::now();
    let result = SyncResult {
        job_id: 1,
        strategy: Strategy::Merge,
        commit_message: "Auto-sync approved clubs".to_string(),
        committed: true,
        pushed: true,
        method: Some(PushMethod::ResolvedConflict),
        pull: PullOutcome::ConflictsResolved {
            kept_local: vec!["public/data/clubs.json".to_string()],
            took_remote: Vec::new(),
        },
        counts: SyncCounts::default(),
        failures: Vec::new(),
        file_written: true,
        duplicates: vec![DuplicateGroup {
            side: Side::File,
            key: NaturalKey::new("Go Club", "State U"),
            count: 2,
            store_ids: Vec::new(),
        }],
        reimport: Some(ReconcileReport::default()),
        reimport_error: None,
        started_at: now,
        finished_at: now,
    };

    let lines = format_sync_result(&result);
    assert!(lines.contains(&"Resolved pull conflicts: kept local 1, took remote 0".to_string()));
    assert!(lines.contains(
        &"Committed \"Auto-sync approved clubs\" and pushed (after resolving a rejection)"
            .to_string()
    ));
    assert!(lines.iter().any(|line| line.starts_with("Re-imported:")));
    assert!(lines.contains(&"duplicate in snapshot: go club|state u (2 records)".to_string()));

    let idle = SyncResult {
        committed: false,
        pushed: false,
        method: None,
        pull: PullOutcome::Clean,
        reimport: None,
        ..result
    };
    assert!(format_sync_result(&idle).contains(&"Nothing to commit".to_string()));
}

#[tokio::test(flavor = "multi_thread")]
async fn local_merge_updates_both_sides() {
    let (_dir, settings) = temp_settings();
    seed_store(&settings, &[fields("Go Club", "State U", &["go"])]).await;
    write_snapshot(
        &settings,
        &serde_json::to_value(vec![SnapshotEntry::from_fields(&fields(
            "Art Club",
            "State U",
            &["art"],
        ))])
        .unwrap(),
    );

    run_sync(&settings, Strategy::Merge, None, true, false)
        .await
        .unwrap();

    let written = std::fs::read_to_string(settings.snapshot_path()).unwrap();
    assert!(written.contains("\"Art Club\""));
    assert!(written.contains("\"Go Club\""));

    let store = DatabaseService::open_path(&settings.db_path).await.unwrap();
    assert_eq!(store.count().await.unwrap(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn export_writes_filtered_snapshot() {
    let (dir, settings) = temp_settings();
    let mut elsewhere = fields("Rowing Club", "Lake College", &[]);
    elsewhere.province = "Zhejiang".to_string();
    seed_store(&settings, &[fields("Go Club", "State U", &["go"]), elsewhere]).await;

    let output = dir.path().join("out/export.json");
    run_export(&settings, &ClubFilter::all().province("Jiangsu"), Some(&output))
        .await
        .unwrap();

    let exported = std::fs::read_to_string(&output).unwrap();
    assert!(exported.contains("\"name\": \"Go Club\""));
    assert!(exported.contains("\"coordinates\": [\n      118.8,\n      32.1\n    ]"));
    assert!(!exported.contains("Rowing Club"));
    assert!(!exported.contains("\"id\""));
    assert!(exported.ends_with("]\n"));
}

#[tokio::test(flavor = "multi_thread")]
async fn validate_lists_invalid_and_duplicate_entries() {
    let (_dir, settings) = temp_settings();
    write_snapshot(
        &settings,
        &serde_json::json!([
            {"name": "Go Club", "school": "State U", "city": "Nanjing", "province": "Jiangsu",
             "coordinates": [118.8, 32.1]},
            {"name": "go club ", "school": "State U", "city": "Nanjing", "province": "Jiangsu",
             "coordinates": [118.8, 32.1]},
            {"name": "Lost Club", "school": "State U", "city": "Nanjing",
             "coordinates": [118.8, 32.1]},
            {"name": "Far Club", "school": "State U", "city": "Nanjing", "province": "Jiangsu",
             "coordinates": [32.1, 218.8]}
        ]),
    );

    let summary = validate_snapshot(&settings).await.unwrap();
    assert_eq!(summary.total, 4);
    assert_eq!(summary.problems.len(), 3);
    assert!(summary
        .problems
        .iter()
        .any(|problem| problem.record.starts_with("lost club") && problem.reason.contains("province")));
    assert!(summary
        .problems
        .iter()
        .any(|problem| problem.record.starts_with("far club")));
    assert!(summary
        .problems
        .iter()
        .any(|problem| problem.reason == "2 entries share this name and school"));

    let error = run_validate(&settings, false).await.unwrap_err();
    assert!(matches!(error, CliError::InvalidSnapshot(3)));
}

#[tokio::test(flavor = "multi_thread")]
async fn validate_requires_snapshot() {
    let (_dir, settings) = temp_settings();
    let error = validate_snapshot(&settings).await.unwrap_err();
    assert!(matches!(error, CliError::Snapshot(_)));
}

#[test]
fn completions_use_binary_name() {
    let script = String::from_utf8(render_completions(CompletionShell::Bash)).unwrap();
    assert!(script.contains("_clubsync()"));
    assert!(script.contains("complete -F _clubsync"));

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("completions/clubsync.fish");
    run_completions(CompletionShell::Fish, Some(&output)).unwrap();
    assert!(std::fs::read_to_string(output)
        .unwrap()
        .contains("complete -c clubsync"));
}

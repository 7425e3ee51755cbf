use std::fs;
use std::io;
use std::path::PathBuf;

use serde_json::Value;
use uuid::Uuid;

use super::{Batch, Collection, CommitStage, SnapshotHealth, Store, MANIFEST_FILE};
use crate::clock::parse_date;
use crate::domain::candidature::{Candidature, CandidatureStatus};
use crate::domain::problem::{Priority, Problem, ProblemType};

fn unique_dir() -> PathBuf {
    let root = std::env::temp_dir().join(format!("maville-store-test-{}", Uuid::now_v7()));
    fs::create_dir_all(&root).expect("temp dir should be creatable");
    root
}

fn problem(id: u64, location: &str) -> Problem {
    Problem {
        id,
        location: location.to_string(),
        district: "Centre-ville".to_string(),
        problem_type: ProblemType::RoadWorks,
        description: "Deep pothole in the right lane".to_string(),
        priority: Priority::High,
        resolved: false,
        reporter_email: "ana@example.com".to_string(),
        reported_at: "2026-10-01T09:00:00Z".to_string(),
        resolved_at: None,
    }
}

fn rejected_candidature(id: u64) -> Candidature {
    Candidature {
        id,
        provider_neq: "1234567890".to_string(),
        problem_ids: vec![1, 2],
        description: "Resurface both lanes".to_string(),
        estimated_cost: 18250.75,
        planned_start: parse_date("2027-03-01").expect("valid date"),
        planned_end: parse_date("2027-03-09").expect("valid date"),
        submitted_at: "2026-10-02T09:00:00Z".to_string(),
        status: CandidatureStatus::Rejected,
        rejection_comment: Some("Budget insufficient".to_string()),
    }
}

fn failing_at(target: CommitStage) -> impl FnMut(CommitStage) -> io::Result<()> {
    move |stage| {
        if stage == target {
            Err(io::Error::new(io::ErrorKind::Other, "simulated crash"))
        } else {
            Ok(())
        }
    }
}

#[test]
fn missing_snapshot_loads_as_empty_collection() {
    let root = unique_dir();
    let store = Store::open(&root).expect("store should open");

    let problems: Vec<Problem> = store.load_all();
    assert!(problems.is_empty());
    assert_eq!(store.inspect(Collection::Problems), SnapshotHealth::Missing);

    let _ = fs::remove_dir_all(root);
}

#[test]
fn saved_collections_reload_identically() {
    let root = unique_dir();
    let store = Store::open(&root).expect("store should open");

    let problems = vec![problem(1, "Main St"), problem(2, "Rue Ontario")];
    let candidatures = vec![rejected_candidature(7)];
    store.save_all(&problems).expect("problems should save");
    store
        .save_all(&candidatures)
        .expect("candidatures should save");

    let reopened = Store::open(&root).expect("store should reopen");
    let loaded_problems: Vec<Problem> = reopened.load_all();
    let loaded_candidatures: Vec<Candidature> = reopened.load_all();
    assert_eq!(loaded_problems, problems);
    assert_eq!(loaded_candidatures, candidatures);
    assert_eq!(
        loaded_candidatures[0].rejection_comment.as_deref(),
        Some("Budget insufficient")
    );
    assert_eq!(
        reopened.inspect(Collection::Problems),
        SnapshotHealth::Readable { records: 2 }
    );

    let raw = fs::read_to_string(root.join("problems.json")).expect("snapshot should exist");
    let envelope: Value = serde_json::from_str(&raw).expect("snapshot should be JSON");
    assert_eq!(envelope["schema_version"], 1);
    assert_eq!(envelope["collection"], "problems");
    assert_eq!(envelope["record_count"], 2);
    assert_eq!(envelope["records"][1]["location"], "Rue Ontario");

    let _ = fs::remove_dir_all(root);
}

#[test]
fn failed_write_keeps_previous_snapshot() {
    let root = unique_dir();
    let store = Store::open(&root).expect("store should open");
    let original = vec![problem(1, "Main St")];
    store.save_all(&original).expect("initial save should succeed");

    let mut batch = Batch::new();
    batch
        .put(&[problem(1, "Main St"), problem(2, "Rue Ontario")])
        .expect("batch should encode");
    let err = store
        .commit_with(batch, &mut failing_at(CommitStage::Staged(0)))
        .expect_err("simulated failure should surface");
    assert!(err.to_string().contains("simulated crash"));

    let loaded: Vec<Problem> = store.load_all();
    assert_eq!(loaded, original);
    assert!(store.stray_temps().expect("listing temps").is_empty());

    let _ = fs::remove_dir_all(root);
}

#[test]
fn multi_collection_commit_fails_cleanly_before_manifest() {
    let root = unique_dir();
    let store = Store::open(&root).expect("store should open");
    store
        .save_all(&[problem(1, "Main St")])
        .expect("initial save should succeed");

    let mut batch = Batch::new();
    batch.put(&[problem(1, "Main St"), problem(2, "Rue Ontario")]).expect("encode problems");
    batch.put(&[rejected_candidature(1)]).expect("encode candidatures");
    store
        .commit_with(batch, &mut failing_at(CommitStage::ManifestWritten))
        .expect_err("simulated failure should surface");

    assert!(!store.pending_manifest());
    let problems: Vec<Problem> = store.load_all();
    let candidatures: Vec<Candidature> = store.load_all();
    assert_eq!(problems.len(), 1);
    assert!(candidatures.is_empty());
    assert!(store.stray_temps().expect("listing temps").is_empty());

    let _ = fs::remove_dir_all(root);
}

#[test]
fn interrupted_commit_rolls_forward_on_recovery() {
    let root = unique_dir();
    let store = Store::open(&root).expect("store should open");
    store
        .save_all(&[problem(1, "Main St")])
        .expect("initial save should succeed");

    let mut batch = Batch::new();
    batch.put(&[problem(1, "Main St"), problem(2, "Rue Ontario")]).expect("encode problems");
    batch.put(&[rejected_candidature(1)]).expect("encode candidatures");
    store
        .commit_with(batch, &mut failing_at(CommitStage::BeforeRename))
        .expect_err("simulated crash should surface");
    assert!(root.join(MANIFEST_FILE).exists());

    let reopened = Store::open(&root).expect("store should reopen");
    let summary = reopened.recover().expect("recovery should succeed");
    assert_eq!(summary.rolled_forward, 2);
    assert_eq!(summary.removed_temps, 0);
    assert!(!reopened.pending_manifest());

    let problems: Vec<Problem> = reopened.load_all();
    let candidatures: Vec<Candidature> = reopened.load_all();
    assert_eq!(problems.len(), 2);
    assert_eq!(candidatures, vec![rejected_candidature(1)]);

    let _ = fs::remove_dir_all(root);
}

#[test]
fn corrupt_snapshot_loads_empty_and_is_preserved_on_overwrite() {
    let root = unique_dir();
    let store = Store::open(&root).expect("store should open");
    fs::write(root.join("problems.json"), "{ not json").expect("write corrupt file");

    let loaded: Vec<Problem> = store.load_all();
    assert!(loaded.is_empty());
    assert!(matches!(
        store.inspect(Collection::Problems),
        SnapshotHealth::Unreadable { .. }
    ));

    store
        .save_all(&[problem(1, "Main St")])
        .expect("save over corrupt file should succeed");
    let preserved = fs::read_dir(&root)
        .expect("list data dir")
        .filter_map(Result::ok)
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("problems.corrupt-"))
        .count();
    assert_eq!(preserved, 1);
    let reloaded: Vec<Problem> = store.load_all();
    assert_eq!(reloaded.len(), 1);

    let _ = fs::remove_dir_all(root);
}

#[test]
fn checksum_mismatch_is_treated_as_unreadable() {
    let root = unique_dir();
    let store = Store::open(&root).expect("store should open");
    store
        .save_all(&[problem(1, "Main St")])
        .expect("save should succeed");

    let path = root.join("problems.json");
    let raw = fs::read_to_string(&path).expect("read snapshot");
    fs::write(&path, raw.replace("Main St", "Side St")).expect("tamper snapshot");

    let loaded: Vec<Problem> = store.load_all();
    assert!(loaded.is_empty());
    match store.inspect(Collection::Problems) {
        SnapshotHealth::Unreadable { reason } => assert!(reason.contains("checksum")),
        other => panic!("unexpected health: {:?}", other),
    }

    let _ = fs::remove_dir_all(root);
}

#[test]
fn recovery_removes_stray_temp_files() {
    let root = unique_dir();
    let store = Store::open(&root).expect("store should open");
    fs::write(root.join(".problems.json.abc.tmp"), "partial").expect("write temp");

    let summary = store.recover().expect("recovery should succeed");
    assert_eq!(summary.removed_temps, 1);
    assert!(store.stray_temps().expect("listing temps").is_empty());

    let _ = fs::remove_dir_all(root);
}

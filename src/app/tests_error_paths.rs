use std::fs;

use super::tests::{draft, open_app, register_provider, report, seeded, unique_workspace, NEQ, REPORTER};
use super::{App, ErrorKind, NewProblem, NewProvider};
use crate::clock::today_utc;
use crate::config::EngineConfig;
use crate::locks::procfs_available;
use crate::domain::candidature::CandidatureStatus;
use crate::domain::problem::{Priority, ProblemType};
use crate::notify::{Recipient, SubscriptionKind};

#[test]
fn candidature_on_missing_problem_is_refused_and_nothing_is_written() {
    let (root, app) = seeded();
    let before = fs::read(root.join("candidatures.json")).ok();

    let err = app
        .submit_candidature(draft(vec![1, 42]))
        .expect_err("missing problem should be refused");
    assert_eq!(err.kind(), ErrorKind::ReferentialIntegrity);
    assert!(err.to_string().contains("problem #42"));

    assert!(app.list_candidatures().is_empty());
    assert_eq!(fs::read(root.join("candidatures.json")).ok(), before);
    let stpm = app
        .notifications_for(&Recipient::stpm(), false)
        .expect("stpm notifications should list");
    assert!(stpm.iter().all(|n| n.change_kind != "candidature_submitted"));

    let _ = fs::remove_dir_all(root);
}

#[test]
fn candidature_from_unregistered_provider_is_refused() {
    let (root, app) = seeded();
    let mut unknown = draft(vec![1]);
    unknown.provider_neq = "9999999999".to_string();
    let err = app
        .submit_candidature(unknown)
        .expect_err("unknown provider should be refused");
    assert_eq!(err.kind(), ErrorKind::ReferentialIntegrity);

    let _ = fs::remove_dir_all(root);
}

#[test]
fn candidature_fields_are_validated_one_by_one() {
    let (root, app) = seeded();
    let today = today_utc();

    let mut cases = Vec::new();
    let mut start_today = draft(vec![1]);
    start_today.planned_start = today;
    cases.push(("planned_start", start_today));
    let mut negative = draft(vec![1]);
    negative.estimated_cost = -1.0;
    cases.push(("estimated_cost", negative));
    let mut short = draft(vec![1]);
    short.description = "  too short  ".to_string();
    cases.push(("description", short));
    let mut inverted = draft(vec![1]);
    inverted.planned_end = inverted.planned_start - time::Duration::days(1);
    cases.push(("planned_end", inverted));
    let mut repeated = draft(vec![1, 1]);
    repeated.description = "Two passes on the same hole".to_string();
    cases.push(("problem_ids", repeated));
    cases.push(("problem_ids", draft(Vec::new())));
    let mut bad_neq = draft(vec![1]);
    bad_neq.provider_neq = "12345".to_string();
    cases.push(("provider_neq", bad_neq));

    for (field, input) in cases {
        let err = app
            .submit_candidature(input)
            .expect_err("invalid candidature should be refused");
        assert_eq!(err.kind(), ErrorKind::Validation, "field {}", field);
        assert_eq!(err.field(), Some(field));
    }
    assert!(app.list_candidatures().is_empty());

    let _ = fs::remove_dir_all(root);
}

#[test]
fn candidature_cannot_target_a_resolved_problem() {
    let (root, app) = seeded();
    app.resolve_problem(1).expect("resolve should succeed");
    let err = app
        .submit_candidature(draft(vec![1]))
        .expect_err("resolved problem should be refused");
    assert_eq!(err.field(), Some("problem_ids"));

    let _ = fs::remove_dir_all(root);
}

#[test]
fn rejection_without_comment_is_a_validation_error() {
    let (root, app) = seeded();
    let candidature = app
        .submit_candidature(draft(vec![1]))
        .expect("candidature should be submitted");

    for comment in [None, Some(""), Some("   ")] {
        let err = app
            .reject_candidature(candidature.id, comment)
            .expect_err("blank comment should be refused");
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.field(), Some("comment"));
    }
    let stored = app
        .find_candidature(candidature.id)
        .expect("candidature should exist");
    assert_eq!(stored.status, CandidatureStatus::Submitted);
    assert!(stored.rejection_comment.is_none());

    let _ = fs::remove_dir_all(root);
}

#[test]
fn terminal_candidatures_refuse_further_transitions() {
    let (root, app) = seeded();
    let approved = app
        .submit_candidature(draft(vec![1]))
        .expect("candidature should be submitted");
    app.approve_candidature(approved.id)
        .expect("approval should succeed");

    let err = app
        .reject_candidature(approved.id, Some("Changed our mind"))
        .expect_err("approved -> rejected is illegal");
    assert_eq!(err.kind(), ErrorKind::Validation);
    let err = app
        .approve_candidature(approved.id)
        .expect_err("double approval is illegal");
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(app.list_projects().len(), 1);

    let rejected = app
        .submit_candidature(draft(vec![1]))
        .expect("competing candidature should be accepted");
    app.reject_candidature(rejected.id, Some("Budget insufficient"))
        .expect("rejection should succeed");
    for result in [
        app.approve_candidature(rejected.id).map(|_| ()),
        app.withdraw_candidature(rejected.id).map(|_| ()),
        app.update_candidature(rejected.id, draft(vec![1])).map(|_| ()),
    ] {
        let err = result.expect_err("rejected candidature is terminal");
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
    let stored = app
        .find_candidature(rejected.id)
        .expect("candidature should exist");
    assert_eq!(stored.status, CandidatureStatus::Rejected);

    let _ = fs::remove_dir_all(root);
}

#[test]
fn resolved_problem_stays_resolved() {
    let (root, app) = seeded();
    let resolved = app.resolve_problem(1).expect("resolve should succeed");
    let err = app
        .resolve_problem(1)
        .expect_err("second resolution is illegal");
    assert_eq!(err.kind(), ErrorKind::Validation);
    let err = app
        .set_priority(1, Priority::High)
        .expect_err("priority of a resolved problem is frozen");
    assert_eq!(err.field(), Some("priority"));
    assert_eq!(app.find_problem(1).expect("problem should exist"), resolved);

    let _ = fs::remove_dir_all(root);
}

#[test]
fn project_transitions_follow_the_lifecycle() {
    let (root, app) = seeded();
    let candidature = app
        .submit_candidature(draft(vec![1]))
        .expect("candidature should be submitted");
    let project = app
        .approve_candidature(candidature.id)
        .expect("approval should succeed")
        .project;

    assert!(app.complete_project(project.id).is_err());
    assert!(app.suspend_project(project.id).is_err());
    assert!(app.resume_project(project.id).is_err());
    app.cancel_project(project.id).expect("cancel should succeed");
    let err = app
        .start_project(project.id)
        .expect_err("cancelled project is terminal");
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(!app.find_problem(1).expect("problem should exist").resolved);

    let _ = fs::remove_dir_all(root);
}

#[test]
fn lookups_of_unknown_records_are_not_found() {
    let (root, app) = seeded();
    assert_eq!(
        app.find_problem(77).expect_err("missing problem").kind(),
        ErrorKind::NotFound
    );
    assert_eq!(
        app.approve_candidature(77)
            .expect_err("missing candidature")
            .kind(),
        ErrorKind::NotFound
    );
    assert_eq!(
        app.start_project(77).expect_err("missing project").kind(),
        ErrorKind::NotFound
    );
    assert_eq!(
        app.mark_notification_read(77)
            .expect_err("missing notification")
            .kind(),
        ErrorKind::NotFound
    );
    assert_eq!(
        app.find_provider("0000000000")
            .expect_err("missing provider")
            .kind(),
        ErrorKind::NotFound
    );

    let _ = fs::remove_dir_all(root);
}

#[test]
fn registration_rejects_duplicates_and_malformed_keys() {
    let (root, app) = seeded();
    let duplicate = NewProvider {
        neq: NEQ.to_string(),
        business_name: "Other Co".to_string(),
        contact_name: String::new(),
        phone: String::new(),
        email: "other@co.ca".to_string(),
    };
    let err = app
        .register_provider(duplicate.clone())
        .expect_err("duplicate NEQ should be refused");
    assert_eq!(err.field(), Some("neq"));

    let malformed = NewProvider {
        neq: "12345abcde".to_string(),
        ..duplicate
    };
    let err = app
        .register_provider(malformed)
        .expect_err("malformed NEQ should be refused");
    assert_eq!(err.field(), Some("neq"));
    assert_eq!(app.list_providers().len(), 1);

    let _ = fs::remove_dir_all(root);
}

#[test]
fn unregistered_reporter_is_a_referential_error() {
    let root = unique_workspace();
    let app = open_app(&root);
    register_provider(&app, NEQ);
    let err = app
        .report_problem(NewProblem {
            id: None,
            location: "Main St".to_string(),
            problem_type: ProblemType::RoadWorks,
            description: "Pothole".to_string(),
            reporter_email: REPORTER.to_string(),
        })
        .expect_err("unregistered reporter should be refused");
    assert_eq!(err.kind(), ErrorKind::ReferentialIntegrity);
    assert!(app.list_problems().is_empty());

    let _ = fs::remove_dir_all(root);
}

#[test]
fn subscriptions_need_a_registered_party() {
    let (root, app) = seeded();
    let err = app
        .subscribe(
            &Recipient::resident("ghost@example.com"),
            SubscriptionKind::Location,
            "Main",
        )
        .expect_err("unknown resident should be refused");
    assert_eq!(err.kind(), ErrorKind::ReferentialIntegrity);

    let err = app
        .subscribe(&Recipient::stpm(), SubscriptionKind::District, "Verdun")
        .expect_err("STPM cannot subscribe");
    assert_eq!(err.field(), Some("subscriber"));

    let err = app
        .subscribe(
            &Recipient::provider(NEQ),
            SubscriptionKind::ProblemType,
            "volcano",
        )
        .expect_err("unknown problem type should be refused");
    assert_eq!(err.kind(), ErrorKind::Validation);

    let created = app
        .subscribe(&Recipient::provider(NEQ), SubscriptionKind::ProblemType, "Road works")
        .expect("subscribe should succeed");
    assert_eq!(created.map(|s| s.value), Some("road_works".to_string()));
    let again = app
        .subscribe(&Recipient::provider(NEQ), SubscriptionKind::ProblemType, "road_works")
        .expect("duplicate subscribe should succeed");
    assert!(again.is_none());
    assert!(app
        .unsubscribe(&Recipient::provider(NEQ), SubscriptionKind::ProblemType, "road works")
        .expect("unsubscribe should succeed"));

    let _ = fs::remove_dir_all(root);
}

#[test]
fn held_data_lock_fails_the_write_without_touching_disk() {
    let (root, app) = seeded();
    drop(app);
    let mut config = EngineConfig::default().with_data_dir(&root);
    config.locking.timeout_ms = 30;

    // A live holder: this very process.
    fs::write(config.lock_path(), format!("{}\n", std::process::id()))
        .expect("foreign lock should be writable");
    let app = App::open(config.clone()).expect("open should not wait for the writer lock");
    assert_eq!(app.find_problem(1).expect("reads work while locked").id, 1);

    let err = app
        .report_problem(NewProblem {
            id: None,
            location: "Rue Ontario".to_string(),
            problem_type: ProblemType::Underground,
            description: "Sewer smell".to_string(),
            reporter_email: REPORTER.to_string(),
        })
        .expect_err("locked data directory should refuse writes");
    assert_eq!(err.kind(), ErrorKind::StorageIo);
    assert_eq!(app.list_problems().len(), 1);

    fs::remove_file(config.lock_path()).expect("foreign lock should be removable");
    report(&app, ProblemType::Underground, "Rue Ontario");
    assert_eq!(app.list_problems().len(), 2);

    let _ = fs::remove_dir_all(root);
}

#[test]
fn lock_left_by_a_crashed_writer_does_not_block_recovery_or_writes() {
    if !procfs_available() {
        return;
    }
    let (root, app) = seeded();
    drop(app);
    let mut config = EngineConfig::default().with_data_dir(&root);
    config.locking.timeout_ms = 30;
    fs::write(config.lock_path(), format!("{}\n", u32::MAX)).expect("stale lock should be writable");
    let stray = root.join(".problems.json.crashed.tmp");
    fs::write(&stray, "{").expect("stray temp should be writable");

    let app = App::open(config.clone()).expect("stale lock should not block open");
    assert!(!config.lock_path().exists());
    assert!(app.store().stray_temps().expect("scan temps").is_empty());

    report(&app, ProblemType::Underground, "Rue Ontario");
    assert_eq!(app.list_problems().len(), 2);

    let _ = fs::remove_dir_all(root);
}

#[test]
fn explicit_problem_ids_are_honoured_unless_taken() {
    let (root, app) = seeded();
    let new_problem = |id: Option<u64>| NewProblem {
        id,
        location: "Rue Ontario".to_string(),
        problem_type: ProblemType::Underground,
        description: "Sewer smell".to_string(),
        reporter_email: REPORTER.to_string(),
    };

    let err = app
        .report_problem(new_problem(Some(1)))
        .expect_err("taken id should be refused");
    assert_eq!(err.kind(), ErrorKind::Consistency);
    assert_eq!(app.list_problems().len(), 1);

    let explicit = app
        .report_problem(new_problem(Some(50)))
        .expect("free id should be accepted");
    assert_eq!(explicit.id, 50);
    let next = app
        .report_problem(new_problem(None))
        .expect("allocation should continue");
    assert_eq!(next.id, 51);

    let _ = fs::remove_dir_all(root);
}

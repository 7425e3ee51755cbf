use std::path::{Path, PathBuf};
use std::sync::Arc;

use uuid::Uuid;

use super::{App, CandidatureDraft, NewProblem, NewProvider, NewResident};
use crate::clock::today_utc;
use crate::config::EngineConfig;
use crate::domain::candidature::CandidatureStatus;
use crate::domain::problem::{Priority, ProblemType};
use crate::domain::project::ProjectStatus;
use crate::notify::{
    ChangeEvent, ChangeKind, EntityType, NotificationIntent, Recipient, RecipientClass,
    SubscriptionKind,
};
use crate::store::Store;

pub(super) const NEQ: &str = "1234567890";
pub(super) const REPORTER: &str = "ana@example.com";

pub(super) fn unique_workspace() -> PathBuf {
    let root = std::env::temp_dir().join(format!("maville-app-test-{}", Uuid::now_v7()));
    std::fs::create_dir_all(&root).expect("workspace should be creatable");
    root
}

pub(super) fn open_app(root: &Path) -> App {
    App::open(EngineConfig::default().with_data_dir(root)).expect("app should open")
}

pub(super) fn register_resident(app: &App, email: &str) {
    app.register_resident(NewResident {
        email: email.to_string(),
        first_name: "Ana".to_string(),
        last_name: "Roy".to_string(),
        phone: "514-555-0199".to_string(),
        address: "12 Rue Ontario".to_string(),
    })
    .expect("resident should register");
}

pub(super) fn register_provider(app: &App, neq: &str) {
    app.register_provider(NewProvider {
        neq: neq.to_string(),
        business_name: "Pavage Nord".to_string(),
        contact_name: "Luc Tremblay".to_string(),
        phone: "514-555-0101".to_string(),
        email: "luc@pavage.ca".to_string(),
    })
    .expect("provider should register");
}

pub(super) fn report(app: &App, problem_type: ProblemType, location: &str) -> u64 {
    app.report_problem(NewProblem {
        id: None,
        location: location.to_string(),
        problem_type,
        description: "Deep pothole in the right lane".to_string(),
        reporter_email: REPORTER.to_string(),
    })
    .expect("problem should be reported")
    .id
}

pub(super) fn draft(problem_ids: Vec<u64>) -> CandidatureDraft {
    let start = today_utc() + time::Duration::days(30);
    CandidatureDraft {
        provider_neq: NEQ.to_string(),
        problem_ids,
        description: "Resurface the damaged section".to_string(),
        estimated_cost: 12500.0,
        planned_start: start,
        planned_end: start + time::Duration::days(5),
    }
}

/// Resident, provider and one open road-works problem (#1).
pub(super) fn seeded() -> (PathBuf, App) {
    let root = unique_workspace();
    let app = open_app(&root);
    register_resident(&app, REPORTER);
    register_provider(&app, NEQ);
    report(&app, ProblemType::RoadWorks, "Main St");
    (root, app)
}

#[test]
fn approval_creates_project_and_notifies_provider_and_stpm() {
    let (root, app) = seeded();
    let candidature = app
        .submit_candidature(draft(vec![1]))
        .expect("candidature should be submitted");
    assert_eq!(candidature.status, CandidatureStatus::Submitted);

    let approval = app
        .approve_candidature(candidature.id)
        .expect("approval should succeed");
    assert_eq!(approval.candidature.status, CandidatureStatus::Approved);
    assert_eq!(approval.project.problem_ids, vec![1]);
    assert_eq!(approval.project.provider_neq, NEQ);
    assert_eq!(approval.project.candidature_id, candidature.id);
    assert_eq!(approval.project.status, ProjectStatus::Planned);

    let stored = app
        .find_candidature(candidature.id)
        .expect("candidature should be stored");
    assert_eq!(stored.status, CandidatureStatus::Approved);
    assert_eq!(app.list_projects().len(), 1);

    let to_provider = app
        .notifications_for(&Recipient::provider(NEQ), false)
        .expect("provider notifications should list");
    assert!(to_provider
        .iter()
        .any(|n| n.change_kind == "candidature_approved" && n.entity_id == candidature.id));
    let to_stpm = app
        .notifications_for(&Recipient::stpm(), false)
        .expect("stpm notifications should list");
    assert!(to_stpm
        .iter()
        .any(|n| n.change_kind == "candidature_approved"));
    assert!(app.store().load_all::<NotificationIntent>().is_empty());

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn rejection_persists_the_exact_comment() {
    let (root, app) = seeded();
    let candidature = app
        .submit_candidature(draft(vec![1]))
        .expect("candidature should be submitted");

    let rejected = app
        .reject_candidature(candidature.id, Some("Budget insufficient"))
        .expect("rejection should succeed");
    assert_eq!(rejected.status, CandidatureStatus::Rejected);

    let reopened = open_app(&root);
    let stored = reopened
        .find_candidature(candidature.id)
        .expect("candidature should reload");
    assert_eq!(stored.rejection_comment.as_deref(), Some("Budget insufficient"));
    let to_provider = reopened
        .notifications_for(&Recipient::provider(NEQ), false)
        .expect("provider notifications should list");
    assert_eq!(to_provider.len(), 1);
    assert!(to_provider[0].message.contains("Budget insufficient"));

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn subscription_on_problem_type_yields_exactly_one_notification() {
    let root = unique_workspace();
    let app = open_app(&root);
    register_resident(&app, REPORTER);
    register_resident(&app, "ben@example.com");
    let ben = Recipient::resident("ben@example.com");
    app.subscribe(&ben, SubscriptionKind::ProblemType, "road works")
        .expect("subscribe should succeed")
        .expect("subscription should be new");

    report(&app, ProblemType::RoadWorks, "Main St");
    let received = app
        .notifications_for(&ben, false)
        .expect("notifications should list");
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].change_kind, "problem_reported");
    assert_eq!(received[0].recipient, ben);

    report(&app, ProblemType::Landscaping, "Parc Lafontaine");
    let received = app
        .notifications_for(&ben, false)
        .expect("notifications should list");
    assert_eq!(received.len(), 1);

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn reporter_is_subscribed_to_their_district() {
    let (root, app) = seeded();
    let subscriptions = app
        .subscriptions_for(&Recipient::resident(REPORTER))
        .expect("subscriptions should list");
    assert_eq!(subscriptions.len(), 1);
    assert_eq!(subscriptions[0].kind, SubscriptionKind::District);
    assert_eq!(subscriptions[0].value, "Centre-ville");
    assert_eq!(
        app.notifications_for(&Recipient::stpm(), false)
            .expect("stpm notifications should list")
            .len(),
        1
    );

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn completing_a_project_resolves_its_problems() {
    let (root, app) = seeded();
    let second = report(&app, ProblemType::RoadWorks, "Main St and 5th");
    app.set_priority(second, Priority::High)
        .expect("priority should update");
    let candidature = app
        .submit_candidature(draft(vec![1, second]))
        .expect("candidature should be submitted");
    let project = app
        .approve_candidature(candidature.id)
        .expect("approval should succeed")
        .project;
    assert_eq!(project.priority, Priority::High);

    app.start_project(project.id).expect("start should succeed");
    app.suspend_project(project.id).expect("suspend should succeed");
    app.resume_project(project.id).expect("resume should succeed");
    let done = app
        .complete_project(project.id)
        .expect("completion should succeed");
    assert_eq!(done.status, ProjectStatus::Completed);
    assert_eq!(done.actual_end, Some(today_utc()));

    for id in [1, second] {
        let problem = app.find_problem(id).expect("problem should exist");
        assert!(problem.resolved);
        assert!(problem.resolved_at.is_some());
    }

    let reporter = app
        .notifications_for(&Recipient::resident(REPORTER), false)
        .expect("reporter notifications should list");
    let resolved = reporter
        .iter()
        .filter(|n| n.change_kind == "problem_resolved")
        .count();
    assert_eq!(resolved, 2);
    let to_provider = app
        .notifications_for(&Recipient::provider(NEQ), true)
        .expect("provider notifications should list");
    assert!(to_provider
        .iter()
        .any(|n| n.change_kind == "project_status_changed" && n.message.contains("completed")));

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn records_and_identifiers_survive_restart() {
    let (root, app) = seeded();
    report(&app, ProblemType::Landscaping, "Parc Laurier, Plateau-Mont-Royal");
    let candidature = app
        .submit_candidature(draft(vec![1, 2]))
        .expect("candidature should be submitted");
    drop(app);

    let reopened = open_app(&root);
    let problems = reopened.list_problems();
    assert_eq!(problems.len(), 2);
    assert_eq!(problems[1].district, "Plateau");
    assert_eq!(
        reopened
            .find_candidature(candidature.id)
            .expect("candidature should reload"),
        candidature
    );
    assert_eq!(report(&reopened, ProblemType::Underground, "Rue Ontario"), 3);

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn concurrent_submissions_receive_distinct_ids() {
    let (root, app) = seeded();
    let app = Arc::new(app);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let app = Arc::clone(&app);
            std::thread::spawn(move || {
                app.submit_candidature(draft(vec![1]))
                    .expect("concurrent submission should succeed")
                    .id
            })
        })
        .collect();
    let mut ids: Vec<u64> = handles
        .into_iter()
        .map(|handle| handle.join().expect("thread should finish"))
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, (1..=8).collect::<Vec<u64>>());
    assert_eq!(app.list_candidatures().len(), 8);

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn live_receiver_sees_committed_notifications() {
    let (root, app) = seeded();
    let mut live = app.live_receiver();
    app.submit_candidature(draft(vec![1]))
        .expect("candidature should be submitted");

    let message = live.try_recv().expect("a live message should be published");
    assert_eq!(message.recipient_class, RecipientClass::Stpm);
    assert_eq!(message.payload["change_kind"], "candidature_submitted");

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn pending_outbox_is_drained_on_open() {
    let root = unique_workspace();
    let store = Store::open(&root).expect("store should open");
    let event = ChangeEvent::new(
        EntityType::Problem,
        9,
        ChangeKind::ProblemReported,
        "2026-10-01T09:00:00Z",
    );
    let intent = NotificationIntent::new(Recipient::stpm(), &event, "New problem #9".to_string());
    store
        .save_all(&[intent.clone()])
        .expect("outbox should save");

    let app = open_app(&root);
    let to_stpm = app
        .notifications_for(&Recipient::stpm(), false)
        .expect("stpm notifications should list");
    assert_eq!(to_stpm.len(), 1);
    assert_eq!(to_stpm[0].intent_id, intent.id);
    assert!(app.store().load_all::<NotificationIntent>().is_empty());
    drop(app);

    store
        .save_all(&[intent])
        .expect("replayed outbox should save");
    let reopened = open_app(&root);
    assert_eq!(
        reopened
            .notifications_for(&Recipient::stpm(), false)
            .expect("stpm notifications should list")
            .len(),
        1
    );

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn notifications_can_be_marked_read() {
    let (root, app) = seeded();
    app.submit_candidature(draft(vec![1]))
        .expect("candidature should be submitted");
    let stpm = Recipient::stpm();
    let unread = app
        .notifications_for(&stpm, true)
        .expect("unread notifications should list");
    assert_eq!(unread.len(), 2);

    let first = app
        .mark_notification_read(unread[0].id)
        .expect("mark read should succeed");
    assert!(first.read);
    assert_eq!(app.mark_all_read(&stpm).expect("mark all should succeed"), 1);
    assert!(app
        .notifications_for(&stpm, true)
        .expect("unread notifications should list")
        .is_empty());

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn withdrawn_and_updated_candidatures_keep_their_identity() {
    let (root, app) = seeded();
    let candidature = app
        .submit_candidature(draft(vec![1]))
        .expect("candidature should be submitted");
    let mut revised = draft(vec![1]);
    revised.estimated_cost = 9800.0;
    revised.description = "Resurface and repaint the crossing".to_string();
    let updated = app
        .update_candidature(candidature.id, revised)
        .expect("update should succeed");
    assert_eq!(updated.id, candidature.id);
    assert_eq!(updated.estimated_cost, 9800.0);
    assert_eq!(updated.submitted_at, candidature.submitted_at);

    let withdrawn = app
        .withdraw_candidature(candidature.id)
        .expect("withdraw should succeed");
    assert_eq!(withdrawn.status, CandidatureStatus::Withdrawn);
    assert!(app.list_projects().is_empty());

    let _ = std::fs::remove_dir_all(root);
}

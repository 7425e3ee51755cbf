use std::collections::BTreeSet;

use serde::Serialize;
use time::Date;
use tracing::info;

use crate::domain::candidature::{Candidature, CandidatureStatus};
use crate::domain::location::district_of;
use crate::domain::party::{
    is_valid_email, is_valid_neq, is_valid_phone, normalize_email, Provider, Resident,
};
use crate::domain::problem::{Priority, Problem, ProblemType};
use crate::domain::project::{Project, ProjectStatus};
use crate::domain::InvalidTransition;
use crate::integrity::{Catalog, IntegrityError};
use crate::notify::{attr, ChangeEvent, ChangeKind, EntityType, Recipient, SubscriptionKind};
use crate::store::Collection;

use super::{App, AppError, Mutation};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProblem {
    /// Explicit identifier, e.g. a ticket number carried over from an earlier
    /// register. `None` allocates the next free one.
    pub id: Option<u64>,
    pub location: String,
    pub problem_type: ProblemType,
    pub description: String,
    pub reporter_email: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProvider {
    pub neq: String,
    pub business_name: String,
    pub contact_name: String,
    pub phone: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewResident {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub address: String,
}

/// Submitted or revised candidature fields.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidatureDraft {
    pub provider_neq: String,
    pub problem_ids: Vec<u64>,
    pub description: String,
    pub estimated_cost: f64,
    pub planned_start: Date,
    pub planned_end: Date,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Approval {
    pub candidature: Candidature,
    pub project: Project,
}

impl App {
    pub fn report_problem(&self, input: NewProblem) -> Result<Problem, AppError> {
        let location = required("location", &input.location)?;
        let description = required("description", &input.description)?;
        let reporter_email = normalize_email(&input.reporter_email);
        if !is_valid_email(&reporter_email) {
            return Err(AppError::validation(
                "reporter_email",
                format!("'{}' is not a valid email address", input.reporter_email),
            ));
        }
        let auto_subscribe = self.config.notifications.auto_subscribe_reporter;
        let start = self.config.ids.start;

        let problem = self.mutate("report_problem", |m| {
            if m.catalog.resident(&reporter_email).is_none() {
                return Err(IntegrityError::MissingResident(reporter_email.clone()).into());
            }
            let id = m
                .catalog
                .allocator(Collection::Problems, start)?
                .assign(input.id)?;
            let problem = Problem {
                id,
                district: district_of(&location),
                location,
                problem_type: input.problem_type,
                description,
                priority: Priority::default(),
                resolved: false,
                reporter_email: reporter_email.clone(),
                reported_at: m.now.clone(),
                resolved_at: None,
            };
            m.catalog.insert_problem(problem.clone())?;
            m.touch(Collection::Problems);
            m.emit(problem_event(&problem, ChangeKind::ProblemReported, &m.now));
            if auto_subscribe {
                m.subscribe_after_commit(
                    Recipient::resident(&reporter_email),
                    SubscriptionKind::District,
                    problem.district.clone(),
                );
            }
            Ok(problem)
        })?;

        info!(
            problem_id = problem.id,
            problem_type = %problem.problem_type,
            district = %problem.district,
            "problem reported"
        );
        Ok(problem)
    }

    pub fn set_priority(&self, problem_id: u64, priority: Priority) -> Result<Problem, AppError> {
        self.mutate("set_priority", |m| {
            let now = m.now.clone();
            let problem = m
                .catalog
                .problem_mut(problem_id)
                .ok_or_else(|| AppError::not_found("problem", problem_id))?;
            if problem.resolved {
                return Err(AppError::validation(
                    "priority",
                    format!("problem #{} is already resolved", problem_id),
                ));
            }
            if problem.priority == priority {
                return Ok(problem.clone());
            }
            problem.priority = priority;
            let problem = problem.clone();
            m.touch(Collection::Problems);
            m.emit(problem_event(&problem, ChangeKind::PriorityChanged, &now));
            Ok(problem)
        })
    }

    pub fn resolve_problem(&self, problem_id: u64) -> Result<Problem, AppError> {
        self.mutate("resolve_problem", |m| {
            if m.catalog.problem(problem_id).is_none() {
                return Err(AppError::not_found("problem", problem_id));
            }
            resolve_in(m, problem_id)?;
            m.catalog
                .problem(problem_id)
                .cloned()
                .ok_or_else(|| AppError::not_found("problem", problem_id))
        })
    }

    pub fn register_provider(&self, input: NewProvider) -> Result<Provider, AppError> {
        let neq = input.neq.trim().to_string();
        if !is_valid_neq(&neq) {
            return Err(AppError::validation(
                "neq",
                format!("'{}' must be exactly 10 digits", input.neq),
            ));
        }
        let business_name = required("business_name", &input.business_name)?;
        let email = normalize_email(&input.email);
        if !is_valid_email(&email) {
            return Err(AppError::validation(
                "email",
                format!("'{}' is not a valid email address", input.email),
            ));
        }
        let phone = optional_phone(&input.phone)?;
        let provider = Provider {
            neq,
            business_name,
            contact_name: input.contact_name.trim().to_string(),
            phone,
            email,
        };

        self.mutate("register_provider", |m| {
            if m.catalog.provider(&provider.neq).is_some() {
                return Err(AppError::validation(
                    "neq",
                    format!("provider {} is already registered", provider.neq),
                ));
            }
            m.catalog.insert_provider(provider.clone())?;
            m.touch(Collection::Providers);
            Ok(())
        })?;
        info!(neq = %provider.neq, "provider registered");
        Ok(provider)
    }

    pub fn register_resident(&self, input: NewResident) -> Result<Resident, AppError> {
        let email = normalize_email(&input.email);
        if !is_valid_email(&email) {
            return Err(AppError::validation(
                "email",
                format!("'{}' is not a valid email address", input.email),
            ));
        }
        let resident = Resident {
            email,
            first_name: required("first_name", &input.first_name)?,
            last_name: required("last_name", &input.last_name)?,
            phone: optional_phone(&input.phone)?,
            address: input.address.trim().to_string(),
        };

        self.mutate("register_resident", |m| {
            if m.catalog.resident(&resident.email).is_some() {
                return Err(AppError::validation(
                    "email",
                    format!("resident {} is already registered", resident.email),
                ));
            }
            m.catalog.insert_resident(resident.clone())?;
            m.touch(Collection::Residents);
            Ok(())
        })?;
        info!(email = %resident.email, "resident registered");
        Ok(resident)
    }

    pub fn submit_candidature(&self, draft: CandidatureDraft) -> Result<Candidature, AppError> {
        let start = self.config.ids.start;
        let min_len = self.config.validation.min_description_length;

        let candidature = self.mutate("submit_candidature", |m| {
            let draft = validate_draft(draft, m.today, min_len)?;
            check_targets(&m.catalog, &draft)?;
            let id = m.catalog.allocator(Collection::Candidatures, start)?.next_id()?;
            let candidature = Candidature {
                id,
                provider_neq: draft.provider_neq,
                problem_ids: draft.problem_ids,
                description: draft.description,
                estimated_cost: draft.estimated_cost,
                planned_start: draft.planned_start,
                planned_end: draft.planned_end,
                submitted_at: m.now.clone(),
                status: CandidatureStatus::Submitted,
                rejection_comment: None,
            };
            m.catalog.insert_candidature(candidature.clone())?;
            m.touch(Collection::Candidatures);
            let event = candidature_event(&m.catalog, &candidature, ChangeKind::CandidatureSubmitted, &m.now);
            m.emit(event);
            Ok(candidature)
        })?;

        info!(
            candidature_id = candidature.id,
            neq = %candidature.provider_neq,
            problems = ?candidature.problem_ids,
            "candidature submitted"
        );
        Ok(candidature)
    }

    /// Revises a candidature still awaiting review.
    pub fn update_candidature(
        &self,
        candidature_id: u64,
        draft: CandidatureDraft,
    ) -> Result<Candidature, AppError> {
        let min_len = self.config.validation.min_description_length;
        self.mutate("update_candidature", |m| {
            let draft = validate_draft(draft, m.today, min_len)?;
            let current = m
                .catalog
                .candidature(candidature_id)
                .ok_or_else(|| AppError::not_found("candidature", candidature_id))?;
            if current.status != CandidatureStatus::Submitted {
                return Err(AppError::validation(
                    "status",
                    format!(
                        "candidature #{} is {} and can no longer be updated",
                        candidature_id, current.status
                    ),
                ));
            }
            if current.provider_neq != draft.provider_neq {
                return Err(AppError::validation(
                    "provider_neq",
                    format!("candidature #{} belongs to another provider", candidature_id),
                ));
            }
            check_targets(&m.catalog, &draft)?;

            let candidature = m
                .catalog
                .candidature_mut(candidature_id)
                .ok_or_else(|| AppError::not_found("candidature", candidature_id))?;
            candidature.problem_ids = draft.problem_ids;
            candidature.description = draft.description;
            candidature.estimated_cost = draft.estimated_cost;
            candidature.planned_start = draft.planned_start;
            candidature.planned_end = draft.planned_end;
            let candidature = candidature.clone();
            m.touch(Collection::Candidatures);
            let event = candidature_event(&m.catalog, &candidature, ChangeKind::CandidatureUpdated, &m.now);
            m.emit(event);
            Ok(candidature)
        })
    }

    pub fn withdraw_candidature(&self, candidature_id: u64) -> Result<Candidature, AppError> {
        self.mutate("withdraw_candidature", |m| {
            let candidature = m
                .catalog
                .candidature_mut(candidature_id)
                .ok_or_else(|| AppError::not_found("candidature", candidature_id))?;
            candidature.transition(CandidatureStatus::Withdrawn)?;
            let candidature = candidature.clone();
            m.touch(Collection::Candidatures);
            let event = candidature_event(&m.catalog, &candidature, ChangeKind::CandidatureWithdrawn, &m.now);
            m.emit(event);
            Ok(candidature)
        })
    }

    /// Approves a candidature and creates its project in the same commit.
    /// Competing candidatures on the same problems are left untouched.
    pub fn approve_candidature(&self, candidature_id: u64) -> Result<Approval, AppError> {
        let start = self.config.ids.start;
        let approval = self.mutate("approve_candidature", |m| {
            let mut candidature = m
                .catalog
                .candidature(candidature_id)
                .cloned()
                .ok_or_else(|| AppError::not_found("candidature", candidature_id))?;
            candidature.transition(CandidatureStatus::Approved)?;
            if m.catalog.project_for_candidature(candidature_id).is_some() {
                return Err(AppError::Consistency(format!(
                    "candidature #{} already has a project",
                    candidature_id
                )));
            }

            let project_id = m.catalog.allocator(Collection::Projects, start)?.next_id()?;
            let project = m
                .catalog
                .project_from_candidature(&candidature, project_id, &m.now)?;
            if let Some(stored) = m.catalog.candidature_mut(candidature_id) {
                stored.status = candidature.status;
            }
            m.catalog.insert_project(project.clone())?;
            m.touch(Collection::Candidatures);
            m.touch(Collection::Projects);

            let approved = candidature_event(&m.catalog, &candidature, ChangeKind::CandidatureApproved, &m.now);
            m.emit(approved);
            m.emit(project_event(&project, ChangeKind::ProjectCreated, &m.now));
            Ok(Approval {
                candidature,
                project,
            })
        })?;

        info!(
            candidature_id,
            project_id = approval.project.id,
            neq = %approval.project.provider_neq,
            "candidature approved"
        );
        Ok(approval)
    }

    /// Rejection needs a non-blank comment, stored exactly as given.
    pub fn reject_candidature(
        &self,
        candidature_id: u64,
        comment: Option<&str>,
    ) -> Result<Candidature, AppError> {
        let comment = match comment {
            Some(comment) if !comment.trim().is_empty() => comment.to_string(),
            _ => {
                return Err(AppError::validation(
                    "comment",
                    "a rejection comment is required",
                ))
            }
        };

        self.mutate("reject_candidature", |m| {
            let candidature = m
                .catalog
                .candidature_mut(candidature_id)
                .ok_or_else(|| AppError::not_found("candidature", candidature_id))?;
            candidature.reject(&comment)?;
            let candidature = candidature.clone();
            m.touch(Collection::Candidatures);
            let event = candidature_event(&m.catalog, &candidature, ChangeKind::CandidatureRejected, &m.now)
                .with(attr::COMMENT, comment.clone());
            m.emit(event);
            Ok(candidature)
        })
    }

    pub fn start_project(&self, project_id: u64) -> Result<Project, AppError> {
        self.transition_project("start_project", project_id, None, ProjectStatus::InProgress)
    }

    pub fn suspend_project(&self, project_id: u64) -> Result<Project, AppError> {
        self.transition_project("suspend_project", project_id, None, ProjectStatus::Suspended)
    }

    /// Only a suspended project can be resumed; use `start_project` otherwise.
    pub fn resume_project(&self, project_id: u64) -> Result<Project, AppError> {
        self.transition_project(
            "resume_project",
            project_id,
            Some(ProjectStatus::Suspended),
            ProjectStatus::InProgress,
        )
    }

    /// Completing a project resolves every referenced problem still open.
    pub fn complete_project(&self, project_id: u64) -> Result<Project, AppError> {
        self.transition_project("complete_project", project_id, None, ProjectStatus::Completed)
    }

    pub fn cancel_project(&self, project_id: u64) -> Result<Project, AppError> {
        self.transition_project("cancel_project", project_id, None, ProjectStatus::Cancelled)
    }

    fn transition_project(
        &self,
        operation: &'static str,
        project_id: u64,
        required: Option<ProjectStatus>,
        next: ProjectStatus,
    ) -> Result<Project, AppError> {
        let project = self.mutate(operation, |m| {
            let (today, now) = (m.today, m.now.clone());
            let project = m
                .catalog
                .project_mut(project_id)
                .ok_or_else(|| AppError::not_found("project", project_id))?;
            if required.is_some_and(|required| project.status != required) {
                return Err(InvalidTransition {
                    entity: "project",
                    id: project_id,
                    from: project.status.as_str(),
                    to: next.as_str(),
                }
                .into());
            }
            project.transition(next, today, &now)?;
            let project = project.clone();
            m.touch(Collection::Projects);
            m.emit(project_event(&project, ChangeKind::ProjectStatusChanged, &now));

            if next == ProjectStatus::Completed {
                for problem_id in &project.problem_ids {
                    let problem = m.catalog.problem(*problem_id).ok_or_else(|| {
                        AppError::Consistency(format!(
                            "project #{} references missing problem #{}",
                            project.id, problem_id
                        ))
                    })?;
                    if !problem.resolved {
                        resolve_in(m, *problem_id)?;
                    }
                }
            }
            Ok(project)
        })?;

        info!(project_id, status = %project.status, "project status changed");
        Ok(project)
    }
}

fn resolve_in(m: &mut Mutation, problem_id: u64) -> Result<(), AppError> {
    let now = m.now.clone();
    let problem = m
        .catalog
        .problem_mut(problem_id)
        .ok_or_else(|| AppError::not_found("problem", problem_id))?;
    problem.resolve(&now)?;
    let problem = problem.clone();
    m.touch(Collection::Problems);
    m.emit(problem_event(&problem, ChangeKind::ProblemResolved, &now));
    Ok(())
}

fn required(field: &'static str, raw: &str) -> Result<String, AppError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation(field, "must not be empty"));
    }
    Ok(trimmed.to_string())
}

fn optional_phone(raw: &str) -> Result<String, AppError> {
    let trimmed = raw.trim();
    if !trimmed.is_empty() && !is_valid_phone(trimmed) {
        return Err(AppError::validation(
            "phone",
            format!("'{}' is not a valid phone number", raw),
        ));
    }
    Ok(trimmed.to_string())
}

fn validate_draft(
    draft: CandidatureDraft,
    today: Date,
    min_description_length: usize,
) -> Result<CandidatureDraft, AppError> {
    let provider_neq = draft.provider_neq.trim().to_string();
    if !is_valid_neq(&provider_neq) {
        return Err(AppError::validation(
            "provider_neq",
            format!("'{}' must be exactly 10 digits", draft.provider_neq),
        ));
    }
    if draft.problem_ids.is_empty() {
        return Err(AppError::validation(
            "problem_ids",
            "at least one problem must be targeted",
        ));
    }
    let mut seen = BTreeSet::new();
    if let Some(repeated) = draft.problem_ids.iter().find(|id| !seen.insert(**id)) {
        return Err(AppError::validation(
            "problem_ids",
            format!("problem #{} is listed more than once", repeated),
        ));
    }
    let description = draft.description.trim().to_string();
    if description.chars().count() < min_description_length {
        return Err(AppError::validation(
            "description",
            format!(
                "must be at least {} characters long",
                min_description_length
            ),
        ));
    }
    if !draft.estimated_cost.is_finite() || draft.estimated_cost < 0.0 {
        return Err(AppError::validation(
            "estimated_cost",
            "must be a non-negative amount",
        ));
    }
    if draft.planned_start <= today {
        return Err(AppError::validation(
            "planned_start",
            "must be strictly after today",
        ));
    }
    if draft.planned_end < draft.planned_start {
        return Err(AppError::validation(
            "planned_end",
            "must not precede the planned start",
        ));
    }
    Ok(CandidatureDraft {
        provider_neq,
        description,
        ..draft
    })
}

fn check_targets(catalog: &Catalog, draft: &CandidatureDraft) -> Result<(), AppError> {
    catalog.check_candidature_refs(&draft.provider_neq, &draft.problem_ids)?;
    for problem_id in &draft.problem_ids {
        if catalog.problem(*problem_id).is_some_and(|problem| problem.resolved) {
            return Err(AppError::validation(
                "problem_ids",
                format!("problem #{} is already resolved", problem_id),
            ));
        }
    }
    Ok(())
}

fn problem_event(problem: &Problem, kind: ChangeKind, at: &str) -> ChangeEvent {
    ChangeEvent::new(EntityType::Problem, problem.id, kind, at)
        .with(attr::PROBLEM_TYPE, problem.problem_type.as_str())
        .with(attr::LOCATION, problem.location.clone())
        .with(attr::DISTRICT, problem.district.clone())
        .with(attr::PRIORITY, problem.priority.as_str())
        .with(attr::REPORTER_EMAIL, problem.reporter_email.clone())
}

/// Candidature events carry the first targeted problem's location.
fn candidature_event(
    catalog: &Catalog,
    candidature: &Candidature,
    kind: ChangeKind,
    at: &str,
) -> ChangeEvent {
    let mut event = ChangeEvent::new(EntityType::Candidature, candidature.id, kind, at)
        .with(attr::PROVIDER_NEQ, candidature.provider_neq.clone())
        .with(attr::STATUS, candidature.status.as_str());
    if let Some(problem) = candidature
        .problem_ids
        .first()
        .and_then(|id| catalog.problem(*id))
    {
        event = event
            .with(attr::PROBLEM_TYPE, problem.problem_type.as_str())
            .with(attr::LOCATION, problem.location.clone())
            .with(attr::DISTRICT, problem.district.clone());
    }
    event
}

fn project_event(project: &Project, kind: ChangeKind, at: &str) -> ChangeEvent {
    ChangeEvent::new(EntityType::Project, project.id, kind, at)
        .with(attr::PROBLEM_TYPE, project.work_type.as_str())
        .with(attr::LOCATION, project.location.clone())
        .with(attr::DISTRICT, project.district.clone())
        .with(attr::PRIORITY, project.priority.as_str())
        .with(attr::STATUS, project.status.as_str())
        .with(attr::PROVIDER_NEQ, project.provider_neq.clone())
}

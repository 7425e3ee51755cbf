use serde::Serialize;

use crate::config::PageBounds;
use crate::domain::candidature::{Candidature, CandidatureStatus};
use crate::domain::problem::{Priority, Problem, ProblemType};
use crate::domain::project::{Project, ProjectStatus};

/// Problem filter. Resolved problems are hidden unless `include_resolved`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProblemFilter {
    pub include_resolved: bool,
    pub problem_type: Option<ProblemType>,
    pub priority: Option<Priority>,
    pub district: Option<String>,
    pub reporter_email: Option<String>,
    pub query: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidatureFilter {
    pub provider_neq: Option<String>,
    pub status: Option<CandidatureStatus>,
    pub problem_id: Option<u64>,
}

/// Project filter. Finished projects are hidden unless `include_finished`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectFilter {
    pub include_finished: bool,
    pub provider_neq: Option<String>,
    pub status: Option<ProjectStatus>,
    pub district: Option<String>,
    pub work_type: Option<ProblemType>,
}

pub fn filter_problems(problems: Vec<Problem>, filter: &ProblemFilter) -> Vec<Problem> {
    let district = normalize_scalar(filter.district.as_deref());
    let reporter = normalize_scalar(filter.reporter_email.as_deref());
    let query = normalize_scalar(filter.query.as_deref());

    problems
        .into_iter()
        .filter(|problem| filter.include_resolved || !problem.resolved)
        .filter(|problem| filter.problem_type.map_or(true, |kind| problem.problem_type == kind))
        .filter(|problem| filter.priority.map_or(true, |priority| problem.priority == priority))
        .filter(|problem| matches_exact(&problem.district, district.as_deref()))
        .filter(|problem| matches_exact(&problem.reporter_email, reporter.as_deref()))
        .filter(|problem| match query.as_deref() {
            Some(query) => {
                problem.location.to_lowercase().contains(query)
                    || problem.description.to_lowercase().contains(query)
            }
            None => true,
        })
        .collect()
}

pub fn filter_candidatures(
    candidatures: Vec<Candidature>,
    filter: &CandidatureFilter,
) -> Vec<Candidature> {
    let provider = normalize_scalar(filter.provider_neq.as_deref());
    candidatures
        .into_iter()
        .filter(|candidature| matches_exact(&candidature.provider_neq, provider.as_deref()))
        .filter(|candidature| filter.status.map_or(true, |status| candidature.status == status))
        .filter(|candidature| filter.problem_id.map_or(true, |id| candidature.targets(id)))
        .collect()
}

pub fn filter_projects(projects: Vec<Project>, filter: &ProjectFilter) -> Vec<Project> {
    let provider = normalize_scalar(filter.provider_neq.as_deref());
    let district = normalize_scalar(filter.district.as_deref());
    projects
        .into_iter()
        .filter(|project| {
            filter.include_finished
                || filter.status.is_some_and(ProjectStatus::is_terminal)
                || !project.status.is_terminal()
        })
        .filter(|project| filter.status.map_or(true, |status| project.status == status))
        .filter(|project| matches_exact(&project.provider_neq, provider.as_deref()))
        .filter(|project| matches_exact(&project.district, district.as_deref()))
        .filter(|project| filter.work_type.map_or(true, |kind| project.work_type == kind))
        .collect()
}

/// One page of results; `page` is zero-based.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub page_size: usize,
    pub total_items: usize,
    pub total_pages: usize,
}

/// Page size falls back to the default and is capped at the maximum.
pub fn paginate<T>(items: Vec<T>, page: usize, page_size: Option<usize>, bounds: PageBounds) -> Page<T> {
    let page_size = match page_size {
        Some(0) | None => bounds.default_page_size,
        Some(size) => size.min(bounds.max_page_size),
    }
    .max(1);
    let total_items = items.len();
    let total_pages = total_items.div_ceil(page_size);
    let items = items
        .into_iter()
        .skip(page.saturating_mul(page_size))
        .take(page_size)
        .collect();
    Page {
        items,
        page,
        page_size,
        total_items,
        total_pages,
    }
}

fn matches_exact(actual: &str, expected: Option<&str>) -> bool {
    expected.map_or(true, |expected| actual.trim().to_lowercase() == expected)
}

fn normalize_scalar(raw: Option<&str>) -> Option<String> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

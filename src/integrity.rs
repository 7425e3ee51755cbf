//! In-memory view of every collection with key indices.
//!
//! Cross-collection links are plain identifiers or business keys resolved
//! against indices rebuilt on each load, never live pointers.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::hash::Hash;

use crate::domain::candidature::{Candidature, CandidatureStatus};
use crate::domain::party::{Provider, Resident};
use crate::domain::problem::Problem;
use crate::domain::project::{Project, ProjectStatus};
use crate::ids::{IdAllocator, IdError};
use crate::store::{Collection, Record, Store};

#[derive(Debug, Default, Clone)]
pub struct Catalog {
    problems: Vec<Problem>,
    candidatures: Vec<Candidature>,
    projects: Vec<Project>,
    providers: Vec<Provider>,
    residents: Vec<Resident>,
    problem_index: HashMap<u64, usize>,
    candidature_index: HashMap<u64, usize>,
    project_index: HashMap<u64, usize>,
    provider_index: HashMap<String, usize>,
    resident_index: HashMap<String, usize>,
    duplicates: Vec<(Collection, String)>,
}

impl Catalog {
    pub fn load(store: &Store) -> Self {
        Self::from_parts(
            store.load_all(),
            store.load_all(),
            store.load_all(),
            store.load_all(),
            store.load_all(),
        )
    }

    pub fn from_parts(
        problems: Vec<Problem>,
        candidatures: Vec<Candidature>,
        projects: Vec<Project>,
        providers: Vec<Provider>,
        residents: Vec<Resident>,
    ) -> Self {
        let mut duplicates = Vec::new();
        let problem_index = index_by(&problems, |p| p.id, &mut duplicates);
        let candidature_index = index_by(&candidatures, |c| c.id, &mut duplicates);
        let project_index = index_by(&projects, |p| p.id, &mut duplicates);
        let provider_index = index_by(&providers, |p| p.neq.clone(), &mut duplicates);
        let resident_index = index_by(&residents, |r| r.email.clone(), &mut duplicates);
        Self {
            problems,
            candidatures,
            projects,
            providers,
            residents,
            problem_index,
            candidature_index,
            project_index,
            provider_index,
            resident_index,
            duplicates,
        }
    }

    pub fn problems(&self) -> &[Problem] {
        &self.problems
    }

    pub fn candidatures(&self) -> &[Candidature] {
        &self.candidatures
    }

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn providers(&self) -> &[Provider] {
        &self.providers
    }

    pub fn residents(&self) -> &[Resident] {
        &self.residents
    }

    pub fn problem(&self, id: u64) -> Option<&Problem> {
        self.problem_index.get(&id).map(|&at| &self.problems[at])
    }

    pub fn problem_mut(&mut self, id: u64) -> Option<&mut Problem> {
        self.problem_index
            .get(&id)
            .copied()
            .map(|at| &mut self.problems[at])
    }

    pub fn candidature(&self, id: u64) -> Option<&Candidature> {
        self.candidature_index
            .get(&id)
            .map(|&at| &self.candidatures[at])
    }

    pub fn candidature_mut(&mut self, id: u64) -> Option<&mut Candidature> {
        self.candidature_index
            .get(&id)
            .copied()
            .map(|at| &mut self.candidatures[at])
    }

    pub fn project(&self, id: u64) -> Option<&Project> {
        self.project_index.get(&id).map(|&at| &self.projects[at])
    }

    pub fn project_mut(&mut self, id: u64) -> Option<&mut Project> {
        self.project_index
            .get(&id)
            .copied()
            .map(|at| &mut self.projects[at])
    }

    pub fn project_for_candidature(&self, candidature_id: u64) -> Option<&Project> {
        self.projects
            .iter()
            .find(|project| project.candidature_id == candidature_id)
    }

    pub fn provider(&self, neq: &str) -> Option<&Provider> {
        self.provider_index.get(neq).map(|&at| &self.providers[at])
    }

    pub fn resident(&self, email: &str) -> Option<&Resident> {
        self.resident_index.get(email).map(|&at| &self.residents[at])
    }

    pub fn insert_problem(&mut self, problem: Problem) -> Result<(), IntegrityError> {
        insert_indexed(&mut self.problems, &mut self.problem_index, problem.id, problem)
    }

    pub fn insert_candidature(&mut self, candidature: Candidature) -> Result<(), IntegrityError> {
        insert_indexed(
            &mut self.candidatures,
            &mut self.candidature_index,
            candidature.id,
            candidature,
        )
    }

    pub fn insert_project(&mut self, project: Project) -> Result<(), IntegrityError> {
        insert_indexed(&mut self.projects, &mut self.project_index, project.id, project)
    }

    pub fn insert_provider(&mut self, provider: Provider) -> Result<(), IntegrityError> {
        insert_indexed(
            &mut self.providers,
            &mut self.provider_index,
            provider.neq.clone(),
            provider,
        )
    }

    pub fn insert_resident(&mut self, resident: Resident) -> Result<(), IntegrityError> {
        insert_indexed(
            &mut self.residents,
            &mut self.resident_index,
            resident.email.clone(),
            resident,
        )
    }

    /// Keys seen more than once while building the indices.
    pub fn duplicate_keys(&self) -> &[(Collection, String)] {
        &self.duplicates
    }

    pub fn allocator(&self, collection: Collection, start: u64) -> Result<IdAllocator, IdError> {
        let name = collection.as_str();
        match collection {
            Collection::Problems => IdAllocator::from_existing(name, self.problem_index.keys().copied(), start),
            Collection::Candidatures => {
                IdAllocator::from_existing(name, self.candidature_index.keys().copied(), start)
            }
            Collection::Projects => IdAllocator::from_existing(name, self.project_index.keys().copied(), start),
            _ => IdAllocator::from_existing(name, std::iter::empty(), start),
        }
    }

    /// A candidature may only point at a registered provider and existing problems.
    pub fn check_candidature_refs(
        &self,
        provider_neq: &str,
        problem_ids: &[u64],
    ) -> Result<(), IntegrityError> {
        if self.provider(provider_neq).is_none() {
            return Err(IntegrityError::MissingProvider(provider_neq.to_string()));
        }
        if let Some(missing) = problem_ids.iter().find(|id| self.problem(**id).is_none()) {
            return Err(IntegrityError::MissingProblem(*missing));
        }
        Ok(())
    }

    /// Builds the project an approved candidature authorizes. Keys are copied;
    /// location, district and work type come from the first targeted problem
    /// and priority is the highest among them.
    pub fn project_from_candidature(
        &self,
        candidature: &Candidature,
        id: u64,
        now: &str,
    ) -> Result<Project, IntegrityError> {
        let mut targeted = Vec::with_capacity(candidature.problem_ids.len());
        for problem_id in &candidature.problem_ids {
            let problem = self
                .problem(*problem_id)
                .ok_or(IntegrityError::MissingProblem(*problem_id))?;
            targeted.push(problem);
        }
        let first = targeted
            .first()
            .ok_or(IntegrityError::MissingProblem(0))?;
        let priority = targeted
            .iter()
            .map(|problem| problem.priority)
            .max()
            .unwrap_or_default();

        Ok(Project {
            id,
            candidature_id: candidature.id,
            provider_neq: candidature.provider_neq.clone(),
            problem_ids: candidature.problem_ids.clone(),
            description: candidature.description.clone(),
            cost: candidature.estimated_cost,
            location: first.location.clone(),
            district: first.district.clone(),
            work_type: first.problem_type,
            priority,
            planned_start: candidature.planned_start,
            planned_end: candidature.planned_end,
            actual_start: None,
            actual_end: None,
            status: ProjectStatus::Planned,
            created_at: now.to_string(),
            updated_at: now.to_string(),
        })
    }

    /// Every reference that does not resolve, plus cross-record rule breaks.
    pub fn dangling_references(&self) -> Vec<String> {
        let mut issues = Vec::new();
        for problem in &self.problems {
            if self.resident(&problem.reporter_email).is_none() {
                issues.push(format!(
                    "problem #{} references missing resident '{}'",
                    problem.id, problem.reporter_email
                ));
            }
        }
        for candidature in &self.candidatures {
            if let Err(err) =
                self.check_candidature_refs(&candidature.provider_neq, &candidature.problem_ids)
            {
                issues.push(format!("candidature #{}: {}", candidature.id, err));
            }
            if candidature.status == CandidatureStatus::Approved
                && self.project_for_candidature(candidature.id).is_none()
            {
                issues.push(format!(
                    "candidature #{} is approved but has no project",
                    candidature.id
                ));
            }
        }
        for project in &self.projects {
            if self.candidature(project.candidature_id).is_none() {
                issues.push(format!(
                    "project #{}: {}",
                    project.id,
                    IntegrityError::MissingCandidature(project.candidature_id)
                ));
            }
            if let Err(err) = self.check_candidature_refs(&project.provider_neq, &project.problem_ids) {
                issues.push(format!("project #{}: {}", project.id, err));
            }
            if project.status == ProjectStatus::Completed {
                for problem_id in &project.problem_ids {
                    if self.problem(*problem_id).is_some_and(|problem| !problem.resolved) {
                        issues.push(format!(
                            "project #{} is completed but problem #{} is unresolved",
                            project.id, problem_id
                        ));
                    }
                }
            }
        }
        issues
    }
}

fn index_by<R, K, F>(
    records: &[R],
    key: F,
    duplicates: &mut Vec<(Collection, String)>,
) -> HashMap<K, usize>
where
    R: Record,
    K: Hash + Eq,
    F: Fn(&R) -> K,
{
    let mut index = HashMap::with_capacity(records.len());
    for (at, record) in records.iter().enumerate() {
        match index.entry(key(record)) {
            Entry::Occupied(_) => duplicates.push((R::COLLECTION, record.key())),
            Entry::Vacant(slot) => {
                slot.insert(at);
            }
        }
    }
    index
}

fn insert_indexed<R, K>(
    records: &mut Vec<R>,
    index: &mut HashMap<K, usize>,
    key: K,
    record: R,
) -> Result<(), IntegrityError>
where
    R: Record,
    K: Hash + Eq,
{
    match index.entry(key) {
        Entry::Occupied(_) => Err(IntegrityError::DuplicateKey {
            collection: R::COLLECTION,
            key: record.key(),
        }),
        Entry::Vacant(slot) => {
            slot.insert(records.len());
            records.push(record);
            Ok(())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityError {
    MissingProblem(u64),
    MissingProvider(String),
    MissingResident(String),
    MissingCandidature(u64),
    DuplicateKey { collection: Collection, key: String },
}

impl fmt::Display for IntegrityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrityError::MissingProblem(id) => write!(f, "problem #{} does not exist", id),
            IntegrityError::MissingProvider(neq) => {
                write!(f, "provider with NEQ '{}' is not registered", neq)
            }
            IntegrityError::MissingResident(email) => {
                write!(f, "resident '{}' is not registered", email)
            }
            IntegrityError::MissingCandidature(id) => {
                write!(f, "candidature #{} does not exist", id)
            }
            IntegrityError::DuplicateKey { collection, key } => {
                write!(f, "key '{}' already exists in {}", key, collection)
            }
        }
    }
}

impl Error for IntegrityError {}

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::Date;

use super::problem::{Priority, ProblemType};
use super::{normalize_token, InvalidTransition, ParseValueError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Planned,
    InProgress,
    Suspended,
    Completed,
    Cancelled,
}

impl ProjectStatus {
    pub const ALL: [ProjectStatus; 5] = [
        ProjectStatus::Planned,
        ProjectStatus::InProgress,
        ProjectStatus::Suspended,
        ProjectStatus::Completed,
        ProjectStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProjectStatus::Planned => "planned",
            ProjectStatus::InProgress => "in_progress",
            ProjectStatus::Suspended => "suspended",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ProjectStatus::Completed | ProjectStatus::Cancelled)
    }

    pub fn can_transition_to(self, next: ProjectStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == ProjectStatus::Cancelled {
            return true;
        }
        matches!(
            (self, next),
            (ProjectStatus::Planned, ProjectStatus::InProgress)
                | (ProjectStatus::InProgress, ProjectStatus::Suspended)
                | (ProjectStatus::Suspended, ProjectStatus::InProgress)
                | (ProjectStatus::InProgress, ProjectStatus::Completed)
        )
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectStatus {
    type Err = ParseValueError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = normalize_token(value);
        match normalized.as_str() {
            "planned" | "approuve" | "approuvé" => Ok(ProjectStatus::Planned),
            "in_progress" | "en_cours" | "started" => Ok(ProjectStatus::InProgress),
            "suspended" | "suspendu" => Ok(ProjectStatus::Suspended),
            "completed" | "termine" | "terminé" => Ok(ProjectStatus::Completed),
            "cancelled" | "canceled" | "annule" | "annulé" => Ok(ProjectStatus::Cancelled),
            _ => Err(ParseValueError::new(
                "project status",
                value,
                &Self::ALL.map(ProjectStatus::as_str),
            )),
        }
    }
}

/// Work authorized by an approved candidature. Keys are copied, not shared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: u64,
    pub candidature_id: u64,
    pub provider_neq: String,
    pub problem_ids: Vec<u64>,
    pub description: String,
    pub cost: f64,
    pub location: String,
    pub district: String,
    pub work_type: ProblemType,
    pub priority: Priority,
    #[serde(with = "crate::clock::iso_date")]
    pub planned_start: Date,
    #[serde(with = "crate::clock::iso_date")]
    pub planned_end: Date,
    #[serde(
        default,
        with = "crate::clock::iso_date_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub actual_start: Option<Date>,
    #[serde(
        default,
        with = "crate::clock::iso_date_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub actual_end: Option<Date>,
    pub status: ProjectStatus,
    pub created_at: String,
    pub updated_at: String,
}

impl Project {
    pub fn transition(
        &mut self,
        next: ProjectStatus,
        today: Date,
        now: &str,
    ) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                entity: "project",
                id: self.id,
                from: self.status.as_str(),
                to: next.as_str(),
            });
        }
        match next {
            ProjectStatus::InProgress if self.actual_start.is_none() => {
                self.actual_start = Some(today);
            }
            ProjectStatus::Completed => self.actual_end = Some(today),
            _ => {}
        }
        self.status = next;
        self.updated_at = now.to_string();
        Ok(())
    }
}

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::Date;

use super::{normalize_token, InvalidTransition, ParseValueError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidatureStatus {
    Submitted,
    Approved,
    Rejected,
    Withdrawn,
}

impl CandidatureStatus {
    pub const ALL: [CandidatureStatus; 4] = [
        CandidatureStatus::Submitted,
        CandidatureStatus::Approved,
        CandidatureStatus::Rejected,
        CandidatureStatus::Withdrawn,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CandidatureStatus::Submitted => "submitted",
            CandidatureStatus::Approved => "approved",
            CandidatureStatus::Rejected => "rejected",
            CandidatureStatus::Withdrawn => "withdrawn",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, CandidatureStatus::Submitted)
    }

    /// Every decision is final: only a submitted candidature moves, and only
    /// to a terminal status.
    pub fn can_transition_to(self, next: CandidatureStatus) -> bool {
        !self.is_terminal() && next.is_terminal()
    }
}

impl fmt::Display for CandidatureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CandidatureStatus {
    type Err = ParseValueError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match normalize_token(value).as_str() {
            "submitted" | "soumise" => Ok(CandidatureStatus::Submitted),
            "approved" | "approuvee" | "approuvée" => Ok(CandidatureStatus::Approved),
            "rejected" | "rejetee" | "rejetée" => Ok(CandidatureStatus::Rejected),
            "withdrawn" | "cancelled" | "annulee" | "annulée" => {
                Ok(CandidatureStatus::Withdrawn)
            }
            _ => Err(ParseValueError::new(
                "candidature status",
                value,
                &Self::ALL.map(CandidatureStatus::as_str),
            )),
        }
    }
}

/// A provider's bid on one or more problems.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidature {
    pub id: u64,
    pub provider_neq: String,
    pub problem_ids: Vec<u64>,
    pub description: String,
    pub estimated_cost: f64,
    #[serde(with = "crate::clock::iso_date")]
    pub planned_start: Date,
    #[serde(with = "crate::clock::iso_date")]
    pub planned_end: Date,
    pub submitted_at: String,
    pub status: CandidatureStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_comment: Option<String>,
}

impl Candidature {
    pub fn transition(&mut self, next: CandidatureStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                entity: "candidature",
                id: self.id,
                from: self.status.as_str(),
                to: next.as_str(),
            });
        }
        self.status = next;
        Ok(())
    }

    /// Rejection carries the comment; the caller validates it is non-blank.
    pub fn reject(&mut self, comment: &str) -> Result<(), InvalidTransition> {
        self.transition(CandidatureStatus::Rejected)?;
        self.rejection_comment = Some(comment.to_string());
        Ok(())
    }

    pub fn targets(&self, problem_id: u64) -> bool {
        self.problem_ids.contains(&problem_id)
    }
}

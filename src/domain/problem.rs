use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{normalize_token, InvalidTransition, ParseValueError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemType {
    RoadWorks,
    GasElectricity,
    ConstructionRenovation,
    Landscaping,
    PublicTransit,
    SignageLighting,
    Underground,
    Residential,
    UrbanMaintenance,
    TelecomNetworks,
}

impl ProblemType {
    pub const ALL: [ProblemType; 10] = [
        ProblemType::RoadWorks,
        ProblemType::GasElectricity,
        ProblemType::ConstructionRenovation,
        ProblemType::Landscaping,
        ProblemType::PublicTransit,
        ProblemType::SignageLighting,
        ProblemType::Underground,
        ProblemType::Residential,
        ProblemType::UrbanMaintenance,
        ProblemType::TelecomNetworks,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProblemType::RoadWorks => "road_works",
            ProblemType::GasElectricity => "gas_electricity",
            ProblemType::ConstructionRenovation => "construction_renovation",
            ProblemType::Landscaping => "landscaping",
            ProblemType::PublicTransit => "public_transit",
            ProblemType::SignageLighting => "signage_lighting",
            ProblemType::Underground => "underground",
            ProblemType::Residential => "residential",
            ProblemType::UrbanMaintenance => "urban_maintenance",
            ProblemType::TelecomNetworks => "telecom_networks",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ProblemType::RoadWorks => "road works",
            ProblemType::GasElectricity => "gas or electricity works",
            ProblemType::ConstructionRenovation => "construction or renovation",
            ProblemType::Landscaping => "landscaping maintenance",
            ProblemType::PublicTransit => "public transit works",
            ProblemType::SignageLighting => "signage and lighting",
            ProblemType::Underground => "underground works",
            ProblemType::Residential => "residential works",
            ProblemType::UrbanMaintenance => "urban maintenance",
            ProblemType::TelecomNetworks => "telecom network maintenance",
        }
    }
}

impl fmt::Display for ProblemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProblemType {
    type Err = ParseValueError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = normalize_token(value);
        Self::ALL
            .into_iter()
            .find(|kind| normalized == kind.as_str() || normalized == normalize_token(kind.label()))
            .or(match normalized.as_str() {
                "road" | "roadworks" => Some(ProblemType::RoadWorks),
                "landscaping_works" => Some(ProblemType::Landscaping),
                _ => None,
            })
            .ok_or_else(|| {
                ParseValueError::new("problem type", value, &Self::ALL.map(ProblemType::as_str))
            })
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::Low, Priority::Medium, Priority::High];

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = ParseValueError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match normalize_token(value).as_str() {
            "low" | "faible" => Ok(Priority::Low),
            "medium" | "moyenne" => Ok(Priority::Medium),
            "high" | "elevee" | "élevée" => Ok(Priority::High),
            _ => Err(ParseValueError::new(
                "priority",
                value,
                &Self::ALL.map(Priority::as_str),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProblemState {
    Open,
    Resolved,
}

impl ProblemState {
    pub fn as_str(self) -> &'static str {
        match self {
            ProblemState::Open => "open",
            ProblemState::Resolved => "resolved",
        }
    }

    pub fn can_transition_to(self, next: ProblemState) -> bool {
        matches!((self, next), (ProblemState::Open, ProblemState::Resolved))
    }
}

/// A reported public-works issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    pub id: u64,
    pub location: String,
    pub district: String,
    pub problem_type: ProblemType,
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub resolved: bool,
    pub reporter_email: String,
    pub reported_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<String>,
}

impl Problem {
    pub fn state(&self) -> ProblemState {
        if self.resolved {
            ProblemState::Resolved
        } else {
            ProblemState::Open
        }
    }

    pub fn transition(&mut self, next: ProblemState, at: &str) -> Result<(), InvalidTransition> {
        let current = self.state();
        if !current.can_transition_to(next) {
            return Err(InvalidTransition {
                entity: "problem",
                id: self.id,
                from: current.as_str(),
                to: next.as_str(),
            });
        }
        self.resolved = true;
        self.resolved_at = Some(at.to_string());
        Ok(())
    }

    pub fn resolve(&mut self, at: &str) -> Result<(), InvalidTransition> {
        self.transition(ProblemState::Resolved, at)
    }
}

//! Subscriptions, change events and notification fan-out.
//!
//! The engine builds a [`ChangeEvent`] for every committed transition and asks
//! [`matcher::plan`] for the resulting [`NotificationIntent`]s. Intents ride in
//! the outbox collection of the same atomic commit, then [`Emitter::deliver`]
//! persists them into SQLite and forwards them to the live channel.

pub mod emitter;
pub mod live;
pub mod matcher;
pub mod store;

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{normalize_token, ParseValueError};

pub use emitter::Emitter;
pub use live::LiveMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientClass {
    Resident,
    Provider,
    Stpm,
}

impl RecipientClass {
    pub fn as_str(self) -> &'static str {
        match self {
            RecipientClass::Resident => "resident",
            RecipientClass::Provider => "provider",
            RecipientClass::Stpm => "stpm",
        }
    }
}

impl fmt::Display for RecipientClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecipientClass {
    type Err = ParseValueError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match normalize_token(value).as_str() {
            "resident" | "citizen" => Ok(RecipientClass::Resident),
            "provider" | "prestataire" => Ok(RecipientClass::Provider),
            "stpm" => Ok(RecipientClass::Stpm),
            _ => Err(ParseValueError::new(
                "recipient class",
                value,
                &["resident", "provider", "stpm"],
            )),
        }
    }
}

/// A notification addressee. STPM is a class without a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Recipient {
    pub class: RecipientClass,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl Recipient {
    pub fn resident(email: &str) -> Self {
        Self {
            class: RecipientClass::Resident,
            key: Some(email.to_string()),
        }
    }

    pub fn provider(neq: &str) -> Self {
        Self {
            class: RecipientClass::Provider,
            key: Some(neq.to_string()),
        }
    }

    pub fn stpm() -> Self {
        Self {
            class: RecipientClass::Stpm,
            key: None,
        }
    }

    pub fn key_or_empty(&self) -> &str {
        self.key.as_deref().unwrap_or("")
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "{}:{}", self.class, key),
            None => write!(f, "{}", self.class),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionKind {
    ProblemType,
    Location,
    District,
}

impl SubscriptionKind {
    pub const ALL: [SubscriptionKind; 3] = [
        SubscriptionKind::ProblemType,
        SubscriptionKind::Location,
        SubscriptionKind::District,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SubscriptionKind::ProblemType => "problem_type",
            SubscriptionKind::Location => "location",
            SubscriptionKind::District => "district",
        }
    }
}

impl fmt::Display for SubscriptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionKind {
    type Err = ParseValueError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match normalize_token(value).as_str() {
            "problem_type" | "type" | "type_travaux" => Ok(SubscriptionKind::ProblemType),
            "location" | "street" | "rue" => Ok(SubscriptionKind::Location),
            "district" | "quartier" => Ok(SubscriptionKind::District),
            _ => Err(ParseValueError::new(
                "subscription kind",
                value,
                &Self::ALL.map(SubscriptionKind::as_str),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: i64,
    pub subscriber: Recipient,
    pub kind: SubscriptionKind,
    pub value: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Problem,
    Candidature,
    Project,
}

impl EntityType {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Problem => "problem",
            EntityType::Candidature => "candidature",
            EntityType::Project => "project",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    ProblemReported,
    PriorityChanged,
    ProblemResolved,
    CandidatureSubmitted,
    CandidatureUpdated,
    CandidatureApproved,
    CandidatureRejected,
    CandidatureWithdrawn,
    ProjectCreated,
    ProjectStatusChanged,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::ProblemReported => "problem_reported",
            ChangeKind::PriorityChanged => "priority_changed",
            ChangeKind::ProblemResolved => "problem_resolved",
            ChangeKind::CandidatureSubmitted => "candidature_submitted",
            ChangeKind::CandidatureUpdated => "candidature_updated",
            ChangeKind::CandidatureApproved => "candidature_approved",
            ChangeKind::CandidatureRejected => "candidature_rejected",
            ChangeKind::CandidatureWithdrawn => "candidature_withdrawn",
            ChangeKind::ProjectCreated => "project_created",
            ChangeKind::ProjectStatusChanged => "project_status_changed",
        }
    }

    /// Kinds fanned out to matching subscriptions.
    pub fn fans_out(self) -> bool {
        matches!(
            self,
            ChangeKind::ProblemReported
                | ChangeKind::PriorityChanged
                | ChangeKind::ProblemResolved
                | ChangeKind::ProjectCreated
                | ChangeKind::ProjectStatusChanged
        )
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub mod attr {
    pub const PROBLEM_TYPE: &str = "problem_type";
    pub const LOCATION: &str = "location";
    pub const DISTRICT: &str = "district";
    pub const PRIORITY: &str = "priority";
    pub const STATUS: &str = "status";
    pub const PROVIDER_NEQ: &str = "provider_neq";
    pub const REPORTER_EMAIL: &str = "reporter_email";
    pub const COMMENT: &str = "comment";
}

/// A committed transition, as seen by the matcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub entity_type: EntityType,
    pub entity_id: u64,
    pub change_kind: ChangeKind,
    pub attributes: BTreeMap<String, String>,
    pub occurred_at: String,
}

impl ChangeEvent {
    pub fn new(entity_type: EntityType, entity_id: u64, change_kind: ChangeKind, at: &str) -> Self {
        Self {
            entity_type,
            entity_id,
            change_kind,
            attributes: BTreeMap::new(),
            occurred_at: at.to_string(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// A notification decided but not yet persisted. Lives in the outbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationIntent {
    pub id: String,
    pub recipient: Recipient,
    pub message: String,
    pub entity_type: EntityType,
    pub entity_id: u64,
    pub change_kind: ChangeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    pub created_at: String,
}

impl NotificationIntent {
    pub fn new(recipient: Recipient, event: &ChangeEvent, message: String) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            recipient,
            message,
            entity_type: event.entity_type,
            entity_id: event.entity_id,
            change_kind: event.change_kind,
            district: event.attribute(attr::DISTRICT).map(str::to_string),
            created_at: event.occurred_at.clone(),
        }
    }
}

/// A persisted notification. Only `read` ever changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub intent_id: String,
    pub recipient: Recipient,
    pub message: String,
    pub entity_type: String,
    pub entity_id: u64,
    pub change_kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    pub created_at: String,
    pub read: bool,
}

#[derive(Debug)]
pub enum NotifyError {
    Sqlite(rusqlite::Error),
    Invalid { field: &'static str, message: String },
}

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifyError::Sqlite(err) => write!(f, "notification store error: {}", err),
            NotifyError::Invalid { field, message } => {
                write!(f, "invalid {}: {}", field, message)
            }
        }
    }
}

impl Error for NotifyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            NotifyError::Sqlite(err) => Some(err),
            NotifyError::Invalid { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for NotifyError {
    fn from(value: rusqlite::Error) -> Self {
        NotifyError::Sqlite(value)
    }
}

use std::collections::BTreeSet;
use std::error::Error;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use time::Date;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::clock::{now_utc_rfc3339, today_utc};
use crate::config::{ConfigError, EngineConfig};
use crate::domain::candidature::Candidature;
use crate::domain::party::{Provider, Resident};
use crate::domain::problem::Problem;
use crate::domain::project::Project;
use crate::domain::{InvalidTransition, ParseValueError};
use crate::ids::IdError;
use crate::integrity::{Catalog, IntegrityError};
use crate::listing::{self, CandidatureFilter, ProblemFilter, ProjectFilter};
use crate::locks::{FileLock, LockError};
use crate::notify::{
    matcher, ChangeEvent, Emitter, LiveMessage, Notification, NotificationIntent, NotifyError,
    Recipient, RecipientClass, Subscription, SubscriptionKind,
};
use crate::store::{Batch, Collection, Store, StoreError};

mod workflow;

pub use workflow::{CandidatureDraft, NewProblem, NewProvider, NewResident};

/// The lifecycle engine. Every write runs load, validate, mutate, commit and
/// emit inside one critical section; reads load fresh snapshots unguarded.
pub struct App {
    config: EngineConfig,
    store: Store,
    emitter: Emitter,
    write_lock: Mutex<()>,
}

/// Working state of one write operation.
pub(crate) struct Mutation {
    pub(crate) catalog: Catalog,
    pub(crate) now: String,
    pub(crate) today: Date,
    dirty: BTreeSet<Collection>,
    events: Vec<ChangeEvent>,
    follow_up: Vec<(Recipient, SubscriptionKind, String)>,
}

impl Mutation {
    fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            now: now_utc_rfc3339(),
            today: today_utc(),
            dirty: BTreeSet::new(),
            events: Vec::new(),
            follow_up: Vec::new(),
        }
    }

    pub(crate) fn touch(&mut self, collection: Collection) {
        self.dirty.insert(collection);
    }

    pub(crate) fn emit(&mut self, event: ChangeEvent) {
        self.events.push(event);
    }

    /// Subscription created once the commit is durable.
    pub(crate) fn subscribe_after_commit(
        &mut self,
        subscriber: Recipient,
        kind: SubscriptionKind,
        value: String,
    ) {
        self.follow_up.push((subscriber, kind, value));
    }
}

impl App {
    pub fn open(config: EngineConfig) -> Result<Self, AppError> {
        config.validate()?;
        let store = Store::open(&config.data_dir)?;
        let emitter = Emitter::open(
            &config.notifications_db_path(),
            config.notifications.live_capacity,
        )?;
        let app = Self {
            config,
            store,
            emitter,
            write_lock: Mutex::new(()),
        };

        // Recovery runs only when the writer lock is free; opening never waits.
        match FileLock::try_acquire(&app.config.lock_path())? {
            Some(_lock) => {
                let summary = app.store.recover()?;
                if summary.rolled_forward > 0 || summary.removed_temps > 0 {
                    info!(
                        rolled_forward = summary.rolled_forward,
                        removed_temps = summary.removed_temps,
                        "recovered data directory"
                    );
                }
                let pending: Vec<NotificationIntent> = app.store.load_all();
                app.drain_outbox(pending);
            }
            None => debug!("data directory held by another writer; skipping recovery"),
        }

        debug!(data_dir = %app.config.data_dir.display(), "engine opened");
        Ok(app)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[cfg(test)]
    pub(crate) fn store(&self) -> &Store {
        &self.store
    }

    /// Runs one write operation under the in-process mutex and the data
    /// directory lock. Nothing is written and nothing is emitted unless
    /// `apply` succeeds and the batch commits.
    pub(crate) fn mutate<T>(
        &self,
        operation: &'static str,
        apply: impl FnOnce(&mut Mutation) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let _lock = FileLock::acquire(&self.config.lock_path(), self.config.lock_timeout())?;
        self.store.recover()?;

        let mut mutation = Mutation::new(Catalog::load(&self.store));
        let value = apply(&mut mutation)?;
        if mutation.dirty.is_empty() {
            return Ok(value);
        }

        let mut outbox: Vec<NotificationIntent> = self.store.load_all();
        if !mutation.events.is_empty() {
            let subscriptions = self.emitter.all_subscriptions()?;
            for event in &mutation.events {
                outbox.extend(matcher::plan(event, &subscriptions));
            }
        }

        let mut batch = Batch::new();
        for collection in &mutation.dirty {
            match collection {
                Collection::Problems => batch.put(mutation.catalog.problems())?,
                Collection::Candidatures => batch.put(mutation.catalog.candidatures())?,
                Collection::Projects => batch.put(mutation.catalog.projects())?,
                Collection::Providers => batch.put(mutation.catalog.providers())?,
                Collection::Residents => batch.put(mutation.catalog.residents())?,
                Collection::Outbox => continue,
            };
        }
        if !outbox.is_empty() {
            batch.put(&outbox)?;
        }
        self.store.commit(batch)?;
        info!(
            operation,
            collections = ?mutation.dirty.iter().map(|c| c.as_str()).collect::<Vec<_>>(),
            notifications = outbox.len(),
            "committed"
        );

        self.drain_outbox(outbox);
        for (subscriber, kind, wanted) in mutation.follow_up {
            if let Err(err) = self.emitter.subscribe(&subscriber, kind, &wanted) {
                warn!(subscriber = %subscriber, kind = %kind, error = %err, "automatic subscription failed");
            }
        }
        Ok(value)
    }

    /// Moves committed intents into the notification store. Failures leave
    /// the outbox in place for the next drain.
    fn drain_outbox(&self, intents: Vec<NotificationIntent>) {
        if intents.is_empty() {
            return;
        }
        match self.emitter.deliver(&intents) {
            Ok(stored) => {
                debug!(delivered = stored.len(), pending = intents.len(), "outbox drained");
                if let Err(err) = self.store.save_all::<NotificationIntent>(&[]) {
                    warn!(error = %err, "failed to clear outbox; entries will be replayed");
                }
            }
            Err(err) => {
                warn!(pending = intents.len(), error = %err, "outbox drain failed; will retry");
            }
        }
    }

    fn catalog(&self) -> Catalog {
        Catalog::load(&self.store)
    }

    pub fn list_problems(&self) -> Vec<Problem> {
        self.catalog().problems().to_vec()
    }

    pub fn find_problem(&self, id: u64) -> Result<Problem, AppError> {
        self.catalog()
            .problem(id)
            .cloned()
            .ok_or_else(|| AppError::not_found("problem", id))
    }

    pub fn filter_problems(&self, filter: &ProblemFilter) -> Vec<Problem> {
        listing::filter_problems(self.list_problems(), filter)
    }

    pub fn list_candidatures(&self) -> Vec<Candidature> {
        self.catalog().candidatures().to_vec()
    }

    pub fn find_candidature(&self, id: u64) -> Result<Candidature, AppError> {
        self.catalog()
            .candidature(id)
            .cloned()
            .ok_or_else(|| AppError::not_found("candidature", id))
    }

    pub fn filter_candidatures(&self, filter: &CandidatureFilter) -> Vec<Candidature> {
        listing::filter_candidatures(self.list_candidatures(), filter)
    }

    pub fn list_projects(&self) -> Vec<Project> {
        self.catalog().projects().to_vec()
    }

    pub fn find_project(&self, id: u64) -> Result<Project, AppError> {
        self.catalog()
            .project(id)
            .cloned()
            .ok_or_else(|| AppError::not_found("project", id))
    }

    pub fn filter_projects(&self, filter: &ProjectFilter) -> Vec<Project> {
        listing::filter_projects(self.list_projects(), filter)
    }

    pub fn list_providers(&self) -> Vec<Provider> {
        self.catalog().providers().to_vec()
    }

    pub fn find_provider(&self, neq: &str) -> Result<Provider, AppError> {
        self.catalog()
            .provider(neq.trim())
            .cloned()
            .ok_or_else(|| AppError::not_found("provider", neq))
    }

    pub fn list_residents(&self) -> Vec<Resident> {
        self.catalog().residents().to_vec()
    }

    pub fn find_resident(&self, email: &str) -> Result<Resident, AppError> {
        let email = crate::domain::party::normalize_email(email);
        self.catalog()
            .resident(&email)
            .cloned()
            .ok_or_else(|| AppError::not_found("resident", &email))
    }

    /// Registers a standing interest. Returns `None` for a duplicate.
    pub fn subscribe(
        &self,
        subscriber: &Recipient,
        kind: SubscriptionKind,
        value: &str,
    ) -> Result<Option<Subscription>, AppError> {
        let subscriber = self.registered_party(subscriber)?;
        let value = match kind {
            SubscriptionKind::ProblemType => value
                .parse::<crate::domain::problem::ProblemType>()?
                .as_str()
                .to_string(),
            SubscriptionKind::Location | SubscriptionKind::District => value.trim().to_string(),
        };
        let created = self.emitter.subscribe(&subscriber, kind, &value)?;
        if let Some(subscription) = &created {
            info!(subscriber = %subscriber, kind = %kind, value = %subscription.value, "subscribed");
        }
        Ok(created)
    }

    pub fn unsubscribe(
        &self,
        subscriber: &Recipient,
        kind: SubscriptionKind,
        value: &str,
    ) -> Result<bool, AppError> {
        let subscriber = normalize_recipient(subscriber);
        let value = match kind {
            SubscriptionKind::ProblemType => value
                .parse::<crate::domain::problem::ProblemType>()?
                .as_str()
                .to_string(),
            SubscriptionKind::Location | SubscriptionKind::District => value.trim().to_string(),
        };
        Ok(self.emitter.unsubscribe(&subscriber, kind, &value)?)
    }

    pub fn subscriptions_for(&self, subscriber: &Recipient) -> Result<Vec<Subscription>, AppError> {
        Ok(self
            .emitter
            .subscriptions_for(&normalize_recipient(subscriber))?)
    }

    pub fn notifications_for(
        &self,
        recipient: &Recipient,
        unread_only: bool,
    ) -> Result<Vec<Notification>, AppError> {
        Ok(self
            .emitter
            .notifications_for(&normalize_recipient(recipient), unread_only)?)
    }

    pub fn mark_notification_read(&self, id: i64) -> Result<Notification, AppError> {
        self.emitter
            .mark_read(id)?
            .ok_or_else(|| AppError::not_found("notification", id))
    }

    pub fn mark_all_read(&self, recipient: &Recipient) -> Result<usize, AppError> {
        Ok(self.emitter.mark_all_read(&normalize_recipient(recipient))?)
    }

    pub fn live_receiver(&self) -> broadcast::Receiver<LiveMessage> {
        self.emitter.live().subscribe()
    }

    fn registered_party(&self, subscriber: &Recipient) -> Result<Recipient, AppError> {
        let subscriber = normalize_recipient(subscriber);
        let key = subscriber.key.clone().unwrap_or_default();
        let catalog = self.catalog();
        match subscriber.class {
            RecipientClass::Stpm => Err(AppError::validation(
                "subscriber",
                "STPM receives notifications without subscribing",
            )),
            RecipientClass::Resident if catalog.resident(&key).is_none() => {
                Err(IntegrityError::MissingResident(key).into())
            }
            RecipientClass::Provider if catalog.provider(&key).is_none() => {
                Err(IntegrityError::MissingProvider(key).into())
            }
            _ => Ok(subscriber),
        }
    }
}

fn normalize_recipient(recipient: &Recipient) -> Recipient {
    match recipient.class {
        RecipientClass::Resident => Recipient::resident(&crate::domain::party::normalize_email(
            recipient.key_or_empty(),
        )),
        RecipientClass::Provider => Recipient::provider(recipient.key_or_empty().trim()),
        RecipientClass::Stpm => Recipient::stpm(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    ReferentialIntegrity,
    NotFound,
    StorageIo,
    Consistency,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::ReferentialIntegrity => "referential_integrity",
            ErrorKind::NotFound => "not_found",
            ErrorKind::StorageIo => "storage_io",
            ErrorKind::Consistency => "consistency",
        }
    }
}

#[derive(Debug)]
pub enum AppError {
    Validation { field: &'static str, message: String },
    Parse(ParseValueError),
    InvalidTransition(InvalidTransition),
    Integrity(IntegrityError),
    NotFound { entity: &'static str, key: String },
    Store(StoreError),
    Lock(LockError),
    Notify(NotifyError),
    Config(ConfigError),
    Id(IdError),
    Consistency(String),
}

impl AppError {
    pub(crate) fn validation(field: &'static str, message: impl Into<String>) -> Self {
        AppError::Validation {
            field,
            message: message.into(),
        }
    }

    pub(crate) fn not_found(entity: &'static str, key: impl fmt::Display) -> Self {
        AppError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Validation { .. }
            | AppError::Parse(_)
            | AppError::InvalidTransition(_)
            | AppError::Config(_)
            | AppError::Notify(NotifyError::Invalid { .. }) => ErrorKind::Validation,
            AppError::Integrity(IntegrityError::DuplicateKey { .. }) => ErrorKind::Consistency,
            AppError::Integrity(_) => ErrorKind::ReferentialIntegrity,
            AppError::NotFound { .. } => ErrorKind::NotFound,
            AppError::Store(_) | AppError::Lock(_) | AppError::Notify(_) => ErrorKind::StorageIo,
            AppError::Id(_) | AppError::Consistency(_) => ErrorKind::Consistency,
        }
    }

    /// Offending input field, for validation failures.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            AppError::Validation { field, .. } => Some(*field),
            AppError::Notify(NotifyError::Invalid { field, .. }) => Some(*field),
            AppError::Parse(err) => Some(err.kind()),
            _ => None,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation { field, message } => write!(f, "invalid {}: {}", field, message),
            AppError::Parse(err) => write!(f, "{}", err),
            AppError::InvalidTransition(err) => write!(f, "{}", err),
            AppError::Integrity(err) => write!(f, "referential integrity error: {}", err),
            AppError::NotFound { entity, key } => write!(f, "{} '{}' not found", entity, key),
            AppError::Store(err) => write!(f, "{}", err),
            AppError::Lock(err) => write!(f, "{}", err),
            AppError::Notify(err) => write!(f, "{}", err),
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Id(err) => write!(f, "consistency error: {}", err),
            AppError::Consistency(message) => write!(f, "consistency error: {}", message),
        }
    }
}

impl Error for AppError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AppError::Parse(err) => Some(err),
            AppError::InvalidTransition(err) => Some(err),
            AppError::Integrity(err) => Some(err),
            AppError::Store(err) => Some(err),
            AppError::Lock(err) => Some(err),
            AppError::Notify(err) => Some(err),
            AppError::Config(err) => Some(err),
            AppError::Id(err) => Some(err),
            AppError::Validation { .. } | AppError::NotFound { .. } | AppError::Consistency(_) => {
                None
            }
        }
    }
}

impl From<ParseValueError> for AppError {
    fn from(value: ParseValueError) -> Self {
        AppError::Parse(value)
    }
}

impl From<InvalidTransition> for AppError {
    fn from(value: InvalidTransition) -> Self {
        AppError::InvalidTransition(value)
    }
}

impl From<IntegrityError> for AppError {
    fn from(value: IntegrityError) -> Self {
        AppError::Integrity(value)
    }
}

impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        AppError::Store(value)
    }
}

impl From<LockError> for AppError {
    fn from(value: LockError) -> Self {
        AppError::Lock(value)
    }
}

impl From<NotifyError> for AppError {
    fn from(value: NotifyError) -> Self {
        AppError::Notify(value)
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        AppError::Config(value)
    }
}

impl From<IdError> for AppError {
    fn from(value: IdError) -> Self {
        AppError::Id(value)
    }
}

#[cfg(test)]
mod tests;
#[cfg(test)]
mod tests_error_paths;

use std::collections::BTreeSet;
use std::str::FromStr;

use crate::domain::problem::ProblemType;

use super::{
    attr, ChangeEvent, ChangeKind, NotificationIntent, Recipient, Subscription, SubscriptionKind,
};

pub fn subscription_matches(subscription: &Subscription, event: &ChangeEvent) -> bool {
    let wanted = subscription.value.trim();
    if wanted.is_empty() {
        return false;
    }
    match subscription.kind {
        SubscriptionKind::ProblemType => {
            let Some(actual) = event.attribute(attr::PROBLEM_TYPE) else {
                return false;
            };
            match (ProblemType::from_str(wanted), ProblemType::from_str(actual)) {
                (Ok(wanted), Ok(actual)) => wanted == actual,
                _ => false,
            }
        }
        SubscriptionKind::Location => event
            .attribute(attr::LOCATION)
            .is_some_and(|location| location.to_lowercase().contains(&wanted.to_lowercase())),
        SubscriptionKind::District => event
            .attribute(attr::DISTRICT)
            .is_some_and(|district| district.trim().to_lowercase() == wanted.to_lowercase()),
    }
}

/// Subscribers with at least one matching subscription, each listed once.
pub fn matching_subscribers(subscriptions: &[Subscription], event: &ChangeEvent) -> Vec<Recipient> {
    let mut seen = BTreeSet::new();
    subscriptions
        .iter()
        .filter(|subscription| subscription_matches(subscription, event))
        .filter(|subscription| seen.insert(subscription.subscriber.clone()))
        .map(|subscription| subscription.subscriber.clone())
        .collect()
}

/// Recipients notified regardless of subscriptions.
pub fn fixed_recipients(event: &ChangeEvent) -> Vec<Recipient> {
    let provider = event.attribute(attr::PROVIDER_NEQ).map(Recipient::provider);
    match event.change_kind {
        ChangeKind::ProblemReported
        | ChangeKind::CandidatureSubmitted
        | ChangeKind::CandidatureUpdated
        | ChangeKind::CandidatureWithdrawn => vec![Recipient::stpm()],
        ChangeKind::CandidatureApproved => provider
            .into_iter()
            .chain(std::iter::once(Recipient::stpm()))
            .collect(),
        ChangeKind::CandidatureRejected => provider.into_iter().collect(),
        ChangeKind::ProblemResolved => event
            .attribute(attr::REPORTER_EMAIL)
            .map(Recipient::resident)
            .into_iter()
            .collect(),
        ChangeKind::ProjectStatusChanged
            if matches!(event.attribute(attr::STATUS), Some("completed" | "cancelled")) =>
        {
            std::iter::once(Recipient::stpm()).chain(provider).collect()
        }
        ChangeKind::ProjectStatusChanged
        | ChangeKind::ProjectCreated
        | ChangeKind::PriorityChanged => Vec::new(),
    }
}

/// Every notification one event produces: fixed recipients first, then
/// subscription matches, at most one intent per recipient.
pub fn plan(event: &ChangeEvent, subscriptions: &[Subscription]) -> Vec<NotificationIntent> {
    let mut seen = BTreeSet::new();
    let mut recipients = Vec::new();
    for recipient in fixed_recipients(event) {
        if seen.insert(recipient.clone()) {
            recipients.push(recipient);
        }
    }

    if event.change_kind.fans_out() {
        // Reporters are not told about their own report.
        let reporter = match event.change_kind {
            ChangeKind::ProblemReported => event.attribute(attr::REPORTER_EMAIL).map(Recipient::resident),
            _ => None,
        };
        for recipient in matching_subscribers(subscriptions, event) {
            if Some(&recipient) == reporter.as_ref() {
                continue;
            }
            if seen.insert(recipient.clone()) {
                recipients.push(recipient);
            }
        }
    }

    let message = describe(event);
    recipients
        .into_iter()
        .map(|recipient| NotificationIntent::new(recipient, event, message.clone()))
        .collect()
}

pub fn describe(event: &ChangeEvent) -> String {
    let id = event.entity_id;
    let location = event.attribute(attr::LOCATION).unwrap_or("unknown location");
    let work = event
        .attribute(attr::PROBLEM_TYPE)
        .and_then(|raw| ProblemType::from_str(raw).ok())
        .map_or("work", ProblemType::label);
    match event.change_kind {
        ChangeKind::ProblemReported => {
            format!("New problem #{} reported at {} ({})", id, location, work)
        }
        ChangeKind::PriorityChanged => format!(
            "Priority of problem #{} at {} set to {}",
            id,
            location,
            event.attribute(attr::PRIORITY).unwrap_or("unknown")
        ),
        ChangeKind::ProblemResolved => format!("Problem #{} at {} has been resolved", id, location),
        ChangeKind::CandidatureSubmitted => format!(
            "Candidature #{} submitted by provider {}",
            id,
            event.attribute(attr::PROVIDER_NEQ).unwrap_or("unknown")
        ),
        ChangeKind::CandidatureUpdated => format!("Candidature #{} was updated", id),
        ChangeKind::CandidatureApproved => format!("Candidature #{} has been approved", id),
        ChangeKind::CandidatureRejected => format!(
            "Candidature #{} has been rejected: {}",
            id,
            event.attribute(attr::COMMENT).unwrap_or("")
        ),
        ChangeKind::CandidatureWithdrawn => format!("Candidature #{} was withdrawn", id),
        ChangeKind::ProjectCreated => {
            format!("Project #{} planned at {} ({})", id, location, work)
        }
        ChangeKind::ProjectStatusChanged => format!(
            "Project #{} at {} is now {}",
            id,
            location,
            event.attribute(attr::STATUS).unwrap_or("unknown")
        ),
    }
}

//! Reconcile a domain's webhooks against a desired mapping.
//!
//! ```text
//! current (API) + desired (config) → plan_changes() → apply_changes() → API
//! ```

use std::collections::{BTreeMap, HashMap};

use tracing::{info, warn};

use crate::api::{ApiError, MailgunClient};

/// One change to bring a webhook kind in line with the desired mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookChange {
    /// Kind is not configured yet
    Create { kind: String, urls: Vec<String> },
    /// Kind exists but points elsewhere
    Update { kind: String, urls: Vec<String> },
    /// Kind exists but is no longer wanted (prune only)
    Delete { kind: String },
}

impl WebhookChange {
    pub fn kind(&self) -> &str {
        match self {
            WebhookChange::Create { kind, .. }
            | WebhookChange::Update { kind, .. }
            | WebhookChange::Delete { kind } => kind,
        }
    }

    fn action(&self) -> &'static str {
        match self {
            WebhookChange::Create { .. } => "create",
            WebhookChange::Update { .. } => "update",
            WebhookChange::Delete { .. } => "delete",
        }
    }
}

/// Outcome of applying one change.
#[derive(Debug)]
pub struct ChangeResult {
    pub change: WebhookChange,
    pub result: Result<(), ApiError>,
}

/// Compute the changes needed to move from `current` to `desired`.
///
/// The list endpoint reports a single URL per kind, so a kind is left alone
/// only when its desired URLs are exactly that one URL. Changes come out
/// sorted by kind, creates/updates first, then deletes.
pub fn plan_changes(
    current: &HashMap<String, String>,
    desired: &BTreeMap<String, Vec<String>>,
    prune: bool,
) -> Vec<WebhookChange> {
    let mut changes: Vec<WebhookChange> = desired
        .iter()
        .filter_map(|(kind, urls)| match current.get(kind) {
            None => Some(WebhookChange::Create {
                kind: kind.clone(),
                urls: urls.clone(),
            }),
            Some(existing) if urls.len() == 1 && &urls[0] == existing => None,
            Some(_) => Some(WebhookChange::Update {
                kind: kind.clone(),
                urls: urls.clone(),
            }),
        })
        .collect();

    if prune {
        let mut stale: Vec<&String> = current
            .keys()
            .filter(|kind| !desired.contains_key(*kind))
            .collect();
        stale.sort();
        changes.extend(
            stale
                .into_iter()
                .map(|kind| WebhookChange::Delete { kind: kind.clone() }),
        );
    }

    changes
}

/// Apply every change concurrently and collect the per-change outcome.
pub async fn apply_changes(client: &MailgunClient, changes: Vec<WebhookChange>) -> Vec<ChangeResult> {
    let futures: Vec<_> = changes
        .into_iter()
        .map(|change| async move {
            let result = match &change {
                WebhookChange::Create { kind, urls } => client.create_webhook(kind, urls).await,
                WebhookChange::Update { kind, urls } => client.update_webhook(kind, urls).await,
                WebhookChange::Delete { kind } => client.delete_webhook(kind).await,
            };

            match &result {
                Ok(()) => info!(
                    kind = %change.kind(),
                    action = change.action(),
                    "webhook_sync_change_applied"
                ),
                Err(e) => warn!(
                    kind = %change.kind(),
                    action = change.action(),
                    status_code = ?e.status(),
                    error = %e,
                    "webhook_sync_change_failed"
                ),
            }

            ChangeResult { change, result }
        })
        .collect();

    futures::future::join_all(futures).await
}

//! Mailgun webhook sync - applies the configured webhook mapping to a domain.
//!
//! Reads the desired `kind=url` mapping from `MAILGUN_WEBHOOKS`, compares it
//! with what the domain currently has and creates, updates or (with
//! `MAILGUN_WEBHOOKS_PRUNE`) deletes webhooks to match.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mailgun_webhooks::{apply_changes, plan_changes, Config, MailgunClient, WebhookChange};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    tracing::info!("webhook_sync_starting");

    // Load configuration from environment
    let config = Config::from_env();
    info!(
        api_base = %config.mailgun_api_base,
        mailgun_domain = ?config.mailgun_domain,
        api_key_set = config.mailgun_api_key.is_some(),
        desired_kinds = config.webhooks.len(),
        prune = config.prune_webhooks,
        "config_loaded"
    );

    let api_key = config
        .mailgun_api_key
        .clone()
        .context("MAILGUN_API_KEY is not set")?;
    let domain = config
        .mailgun_domain
        .clone()
        .context("MAILGUN_DOMAIN is not set")?;

    let client = MailgunClient::new(
        &config.mailgun_api_base,
        domain,
        api_key,
        Duration::from_millis(config.request_timeout_ms),
    )
    .context("Failed to create Mailgun client")?;

    let current = client
        .get_webhooks()
        .await
        .context("Failed to list webhooks")?;

    info!(
        domain = %client.domain(),
        configured_kinds = current.len(),
        "webhooks_listed"
    );

    let changes = plan_changes(&current, &config.webhooks, config.prune_webhooks);
    if changes.is_empty() {
        info!("webhooks_in_sync");
        return Ok(());
    }

    info!(change_count = changes.len(), "webhook_sync_applying");

    let results = apply_changes(&client, changes).await;
    let failed = results.iter().filter(|r| r.result.is_err()).count();

    // Read back what Mailgun now reports for every kind we wrote.
    for outcome in results.iter().filter(|r| r.result.is_ok()) {
        if let WebhookChange::Create { kind, .. } | WebhookChange::Update { kind, .. } =
            &outcome.change
        {
            match client.get_webhook_by_type(kind).await {
                Ok(url) => info!(kind = %kind, url = %url, "webhook_confirmed"),
                Err(e) => warn!(kind = %kind, error = %e, "webhook_confirm_failed"),
            }
        }
    }

    info!(
        applied = results.len() - failed,
        failed = failed,
        "webhook_sync_complete"
    );

    if failed > 0 {
        bail!("{} webhook change(s) failed", failed);
    }

    Ok(())
}

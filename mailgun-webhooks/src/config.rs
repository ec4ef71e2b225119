//! Configuration module for environment variable parsing.
//!
//! Both binaries read their settings from the environment; nothing is loaded
//! from files.

use std::collections::BTreeMap;
use std::env;

use tracing::warn;

/// Default Mailgun API base (US region).
pub const DEFAULT_API_BASE: &str = "https://api.mailgun.net/v3";

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Mailgun account API key (basic auth password, and signing key fallback)
    pub mailgun_api_key: Option<String>,

    /// Sending domain whose webhooks are managed
    pub mailgun_domain: Option<String>,

    /// API base URL, e.g. `https://api.eu.mailgun.net/v3`
    pub mailgun_api_base: String,

    /// Dedicated webhook signing key, if different from the API key
    pub mailgun_signing_key: Option<String>,

    /// Maximum age in seconds for webhook timestamps; `None` disables the check
    pub mailgun_signature_max_age: Option<u64>,

    /// HTTP request timeout in milliseconds
    pub request_timeout_ms: u64,

    /// Port for the webhook receiver to listen on
    pub port: u16,

    /// Desired webhook URLs keyed by webhook kind
    pub webhooks: BTreeMap<String, Vec<String>>,

    /// Delete configured webhooks whose kind is not listed in `webhooks`
    pub prune_webhooks: bool,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Config {
            mailgun_api_key: non_empty_var("MAILGUN_API_KEY"),

            mailgun_domain: non_empty_var("MAILGUN_DOMAIN"),

            mailgun_api_base: non_empty_var("MAILGUN_API_BASE")
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),

            mailgun_signing_key: non_empty_var("MAILGUN_SIGNING_KEY"),

            mailgun_signature_max_age: parse_max_age("MAILGUN_SIGNATURE_MAX_AGE"),

            request_timeout_ms: env::var("REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10_000),

            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),

            webhooks: parse_webhooks("MAILGUN_WEBHOOKS"),

            prune_webhooks: parse_bool("MAILGUN_WEBHOOKS_PRUNE", false),
        }
    }

    /// Key used to verify inbound webhook signatures.
    ///
    /// Mailgun signs callbacks with the account API key unless a separate
    /// webhook signing key has been provisioned.
    pub fn signing_key(&self) -> Option<&str> {
        self.mailgun_signing_key
            .as_deref()
            .or(self.mailgun_api_key.as_deref())
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse a boolean flag such as "true", "1" or "yes".
/// Parse a replay window in seconds. Unset or empty disables the check; a
/// zero or unparsable value also disables it but is logged.
fn parse_max_age(name: &str) -> Option<u64> {
    let raw = non_empty_var(name)?;
    match raw.parse::<u64>() {
        Ok(age) if age > 0 => Some(age),
        _ => {
            warn!(
                env_var = name,
                value = %raw,
                "Invalid signature max age, freshness check disabled"
            );
            None
        }
    }
}

fn parse_bool(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" | "" => false,
            _ => {
                warn!(env_var = name, value = %raw, "Invalid boolean, using default");
                default
            }
        },
        Err(_) => default,
    }
}

/// Parse a comma-separated list of strings.
fn parse_csv(name: &str) -> Option<Vec<String>> {
    env::var(name).ok().map(|raw| {
        raw.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}

/// Parse `kind=url` entries; a kind listed more than once collects every URL.
fn parse_webhooks(name: &str) -> BTreeMap<String, Vec<String>> {
    let mut hooks: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for entry in parse_csv(name).unwrap_or_default() {
        match entry.split_once('=') {
            Some((kind, url)) if !kind.trim().is_empty() && !url.trim().is_empty() => {
                hooks
                    .entry(kind.trim().to_string())
                    .or_default()
                    .push(url.trim().to_string());
            }
            _ => {
                warn!(env_var = name, entry = %entry, "Invalid webhook entry, skipping");
            }
        }
    }

    hooks
}

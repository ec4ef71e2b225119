//! Response envelopes for the Mailgun webhooks API.
//!
//! Mailgun wraps every webhook response in a fixed envelope:
//! - list: `{"webhooks": {"clicked": {"url": "..."}, ...}}`
//! - single: `{"webhook": {"url": "..."}}`

use std::collections::HashMap;

use serde::Deserialize;

/// A single configured webhook target.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WebhookTarget {
    pub url: String,
}

/// Envelope returned by `GET /domains/{domain}/webhooks`.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookListEnvelope {
    #[serde(default)]
    pub webhooks: HashMap<String, WebhookTarget>,
}

impl WebhookListEnvelope {
    /// Flatten the envelope into a kind → URL mapping.
    pub fn into_urls(self) -> HashMap<String, String> {
        self.webhooks
            .into_iter()
            .map(|(kind, target)| (kind, target.url))
            .collect()
    }
}

/// Envelope returned by `GET /domains/{domain}/webhooks/{kind}`.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEnvelope {
    pub webhook: WebhookTarget,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_envelope_into_urls() {
        let json = r#"{
            "webhooks": {
                "clicked": {"url": "https://example.com/clicked"},
                "opened": {"url": "https://example.com/opened"}
            }
        }"#;

        let urls = serde_json::from_str::<WebhookListEnvelope>(json)
            .unwrap()
            .into_urls();

        assert_eq!(urls.len(), 2);
        assert_eq!(urls["clicked"], "https://example.com/clicked");
        assert_eq!(urls["opened"], "https://example.com/opened");
    }

    #[test]
    fn test_list_envelope_empty() {
        assert!(serde_json::from_str::<WebhookListEnvelope>(r#"{"webhooks": {}}"#)
            .unwrap()
            .into_urls()
            .is_empty());
        assert!(serde_json::from_str::<WebhookListEnvelope>("{}")
            .unwrap()
            .into_urls()
            .is_empty());
    }

    #[test]
    fn test_list_envelope_rejects_untyped_entries() {
        let json = r#"{"webhooks": {"clicked": "https://example.com"}}"#;

        assert!(serde_json::from_str::<WebhookListEnvelope>(json).is_err());
    }

    #[test]
    fn test_single_envelope_ignores_extra_fields() {
        let json = r#"{"webhook": {"url": "https://example.com/hook", "urls": ["https://example.com/hook"]}}"#;

        let envelope: WebhookEnvelope = serde_json::from_str(json).unwrap();

        assert_eq!(envelope.webhook.url, "https://example.com/hook");
    }
}

//! Async client for the Mailgun webhooks API.
//!
//! Every call is a single request against
//! `{api_base}/domains/{domain}/webhooks[/{kind}]`, authenticated with HTTP
//! basic auth (`api` / API key). Non-2xx responses and undecodable bodies are
//! returned to the caller as errors; nothing is retried.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};
use url::Url;

use super::error::ApiError;
use super::types::{WebhookEnvelope, WebhookListEnvelope};

/// Basic auth user name Mailgun expects alongside the API key.
const BASIC_AUTH_USER: &str = "api";

/// Mailgun webhooks API client for one sending domain.
#[derive(Clone)]
pub struct MailgunClient {
    client: Client,
    api_base: Url,
    domain: String,
    api_key: String,
}

impl MailgunClient {
    /// Create a client for `domain` against the given API base URL.
    pub fn new(
        api_base: &str,
        domain: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let api_base = Url::parse(api_base)?;
        if api_base.cannot_be_a_base() {
            return Err(ApiError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase));
        }

        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .build()?;

        Ok(Self {
            client,
            api_base,
            domain: domain.into(),
            api_key: api_key.into(),
        })
    }

    /// Domain whose webhooks this client manages.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Return every webhook configured for the domain, keyed by kind.
    ///
    /// A domain without webhooks yields an empty map, not an error.
    pub async fn get_webhooks(&self) -> Result<HashMap<String, String>, ApiError> {
        let url = self.webhooks_url(None)?;
        let envelope: WebhookListEnvelope = self.fetch_json(self.client.get(url)).await?;
        let hooks = envelope.into_urls();

        debug!(domain = %self.domain, count = hooks.len(), "mailgun_webhooks_listed");
        Ok(hooks)
    }

    /// Install a new webhook of the given kind.
    pub async fn create_webhook(&self, kind: &str, urls: &[String]) -> Result<(), ApiError> {
        let url = self.webhooks_url(None)?;
        let mut form: Vec<(&str, &str)> = Vec::with_capacity(urls.len() + 1);
        form.push(("id", kind));
        form.extend(urls.iter().map(|u| ("url", u.as_str())));

        self.execute(self.client.post(url).form(&form)).await?;

        info!(domain = %self.domain, kind = %kind, url_count = urls.len(), "mailgun_webhook_created");
        Ok(())
    }

    /// Remove the webhook of the given kind.
    pub async fn delete_webhook(&self, kind: &str) -> Result<(), ApiError> {
        let url = self.webhooks_url(Some(kind))?;

        self.execute(self.client.delete(url)).await?;

        info!(domain = %self.domain, kind = %kind, "mailgun_webhook_deleted");
        Ok(())
    }

    /// Return the URL currently assigned to the given webhook kind.
    pub async fn get_webhook_by_type(&self, kind: &str) -> Result<String, ApiError> {
        let url = self.webhooks_url(Some(kind))?;
        let envelope: WebhookEnvelope = self.fetch_json(self.client.get(url)).await?;

        debug!(domain = %self.domain, kind = %kind, "mailgun_webhook_fetched");
        Ok(envelope.webhook.url)
    }

    /// Replace the URLs of an existing webhook.
    pub async fn update_webhook(&self, kind: &str, urls: &[String]) -> Result<(), ApiError> {
        let url = self.webhooks_url(Some(kind))?;
        let form: Vec<(&str, &str)> = urls.iter().map(|u| ("url", u.as_str())).collect();

        self.execute(self.client.put(url).form(&form)).await?;

        info!(domain = %self.domain, kind = %kind, url_count = urls.len(), "mailgun_webhook_updated");
        Ok(())
    }

    fn webhooks_url(&self, kind: Option<&str>) -> Result<Url, ApiError> {
        let mut url = self.api_base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?;
            segments
                .pop_if_empty()
                .extend(["domains", self.domain.as_str(), "webhooks"]);
            if let Some(kind) = kind {
                segments.push(kind);
            }
        }
        Ok(url)
    }

    async fn fetch_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let body = self.execute(request).await?;
        serde_json::from_str(&body).map_err(|e| {
            warn!(
                domain = %self.domain,
                error = %e,
                body_preview = %body.chars().take(200).collect::<String>(),
                "mailgun_response_decode_failed"
            );
            ApiError::Decode(e)
        })
    }

    /// Send an authenticated request and return the body of a 2xx response.
    async fn execute(&self, request: RequestBuilder) -> Result<String, ApiError> {
        let response = request
            .basic_auth(BASIC_AUTH_USER, Some(&self.api_key))
            .send()
            .await?;

        let status = response.status();
        let url = response.url().to_string();
        let body = response.text().await?;

        if !status.is_success() {
            warn!(
                url = %url,
                status_code = status.as_u16(),
                "mailgun_unexpected_status"
            );
            return Err(ApiError::UnexpectedStatus {
                status: status.as_u16(),
                url,
                body,
            });
        }

        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{basic_auth, body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const DOMAIN: &str = "mg.example.com";
    const API_KEY: &str = "key-abc";

    async fn client_for(server: &MockServer) -> MailgunClient {
        MailgunClient::new(
            &format!("{}/v3", server.uri()),
            DOMAIN,
            API_KEY,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_webhooks_url() {
        let client =
            MailgunClient::new("https://api.mailgun.net/v3/", DOMAIN, API_KEY, Duration::from_secs(1))
                .unwrap();

        assert_eq!(
            client.webhooks_url(None).unwrap().as_str(),
            "https://api.mailgun.net/v3/domains/mg.example.com/webhooks"
        );
        assert_eq!(
            client.webhooks_url(Some("clicked")).unwrap().as_str(),
            "https://api.mailgun.net/v3/domains/mg.example.com/webhooks/clicked"
        );
    }

    #[test]
    fn test_webhooks_url_escapes_kind() {
        let client =
            MailgunClient::new("https://api.mailgun.net/v3", DOMAIN, API_KEY, Duration::from_secs(1))
                .unwrap();

        let url = client.webhooks_url(Some("a/b?c")).unwrap();

        assert_eq!(url.path(), "/v3/domains/mg.example.com/webhooks/a%2Fb%3Fc");
        assert!(url.query().is_none());
    }

    #[test]
    fn test_new_rejects_invalid_base() {
        assert!(matches!(
            MailgunClient::new("not a url", DOMAIN, API_KEY, Duration::from_secs(1)),
            Err(ApiError::Url(_))
        ));
        assert!(matches!(
            MailgunClient::new("mailto:ops@example.com", DOMAIN, API_KEY, Duration::from_secs(1)),
            Err(ApiError::Url(_))
        ));
    }

    #[tokio::test]
    async fn test_get_webhooks() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v3/domains/mg.example.com/webhooks"))
            .and(basic_auth("api", API_KEY))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "webhooks": {
                    "clicked": {"url": "https://hooks.example.com/clicked"},
                    "delivered": {"url": "https://hooks.example.com/delivered"}
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let hooks = client_for(&server).await.get_webhooks().await.unwrap();

        assert_eq!(hooks.len(), 2);
        assert_eq!(hooks["clicked"], "https://hooks.example.com/clicked");
        assert_eq!(hooks["delivered"], "https://hooks.example.com/delivered");
    }

    #[tokio::test]
    async fn test_get_webhooks_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v3/domains/mg.example.com/webhooks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"webhooks": {}})))
            .mount(&server)
            .await;

        let hooks = client_for(&server).await.get_webhooks().await.unwrap();

        assert!(hooks.is_empty());
    }

    #[tokio::test]
    async fn test_create_webhook_sends_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/domains/mg.example.com/webhooks"))
            .and(basic_auth("api", API_KEY))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string(
                "id=clicked&url=https%3A%2F%2Fa.example.com%2Fhook&url=https%3A%2F%2Fb.example.com%2Fhook",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": "Webhook has been created"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let urls = vec![
            "https://a.example.com/hook".to_string(),
            "https://b.example.com/hook".to_string(),
        ];

        client_for(&server)
            .await
            .create_webhook("clicked", &urls)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_delete_webhook() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v3/domains/mg.example.com/webhooks/opened"))
            .and(basic_auth("api", API_KEY))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": "Webhook has been deleted"
            })))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server).await.delete_webhook("opened").await.unwrap();
    }

    #[tokio::test]
    async fn test_get_webhook_by_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v3/domains/mg.example.com/webhooks/delivered"))
            .and(basic_auth("api", API_KEY))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "webhook": {"url": "https://hooks.example.com/delivered"}
            })))
            .mount(&server)
            .await;

        let url = client_for(&server)
            .await
            .get_webhook_by_type("delivered")
            .await
            .unwrap();

        assert_eq!(url, "https://hooks.example.com/delivered");
    }

    #[tokio::test]
    async fn test_update_webhook_sends_form() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v3/domains/mg.example.com/webhooks/clicked"))
            .and(basic_auth("api", API_KEY))
            .and(body_string("url=https%3A%2F%2Fnew.example.com%2Fhook"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": "Webhook has been updated"
            })))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .await
            .update_webhook("clicked", &["https://new.example.com/hook".to_string()])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unexpected_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v3/domains/mg.example.com/webhooks/bounce"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({"message": "Webhook not found"})),
            )
            .mount(&server)
            .await;

        let err = client_for(&server)
            .await
            .get_webhook_by_type("bounce")
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(404));
        match err {
            ApiError::UnexpectedStatus { url, body, .. } => {
                assert!(url.ends_with("/v3/domains/mg.example.com/webhooks/bounce"));
                assert!(body.contains("Webhook not found"));
            }
            other => panic!("Expected UnexpectedStatus, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unauthorized_write_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Forbidden"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .await
            .delete_webhook("clicked")
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(401));
    }

    #[tokio::test]
    async fn test_malformed_envelope_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v3/domains/mg.example.com/webhooks"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = client_for(&server).await.get_webhooks().await.unwrap_err();

        assert!(matches!(err, ApiError::Decode(_)));
        assert_eq!(err.status(), None);
    }

    #[tokio::test]
    async fn test_transport_error() {
        // Nothing listens on the discard port.
        let client =
            MailgunClient::new("http://127.0.0.1:9/v3", DOMAIN, API_KEY, Duration::from_secs(2))
                .unwrap();

        let err = client.get_webhooks().await.unwrap_err();

        assert!(matches!(err, ApiError::Http(_)));
    }
}

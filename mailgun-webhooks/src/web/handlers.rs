//! Webhook endpoint handlers.
//!
//! Mailgun posts callbacks in two shapes:
//! 1. Legacy form bodies with `timestamp`, `token` and `signature` as
//!    top-level fields, either urlencoded or multipart (stored-message and
//!    route forwards carry attachments)
//! 2. JSON event bodies carrying the same three fields under `signature`
//!
//! Both are checked against the configured signing key before anything else
//! looks at the payload.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    extract::{FromRequest, Multipart, Query, Request, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    Form, Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::web::signature::{is_timestamp_fresh, SignatureVerifier};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub verifier: Arc<SignatureVerifier>,
    /// Reject callbacks older than this many seconds; `None` disables the check
    pub max_age_seconds: Option<u64>,
}

impl AppState {
    pub fn new(verifier: SignatureVerifier, max_age_seconds: Option<u64>) -> Self {
        Self {
            verifier: Arc::new(verifier),
            max_age_seconds,
        }
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Mailgun Webhooks
// =============================================================================

/// The three signed fields of a Mailgun callback.
///
/// Missing fields default to empty strings and simply fail verification.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignatureFields {
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub signature: String,
}

impl SignatureFields {
    /// Fill fields missing from `self` with those of `fallback`.
    pub fn or(self, fallback: SignatureFields) -> SignatureFields {
        let pick = |primary: String, secondary: String| {
            if primary.is_empty() {
                secondary
            } else {
                primary
            }
        };
        SignatureFields {
            timestamp: pick(self.timestamp, fallback.timestamp),
            token: pick(self.token, fallback.token),
            signature: pick(self.signature, fallback.signature),
        }
    }
}

/// JSON event body sent by Mailgun's event webhooks.
#[derive(Debug, Deserialize)]
pub struct MailgunEvent {
    #[serde(default)]
    pub signature: SignatureFields,
    #[serde(default, rename = "event-data")]
    pub event_data: Option<serde_json::Value>,
}

impl MailgunEvent {
    /// The `event` name from `event-data`, e.g. "delivered".
    pub fn event_name(&self) -> Option<&str> {
        self.event_data
            .as_ref()
            .and_then(|data| data.get("event"))
            .and_then(|event| event.as_str())
    }
}

/// Webhook response.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
}

impl WebhookResponse {
    fn status(status: &'static str) -> Self {
        Self {
            status,
            event: None,
        }
    }
}

type Rejection = (StatusCode, Json<WebhookResponse>);

/// Check freshness (if configured) and the HMAC signature.
fn authenticate(state: &AppState, fields: &SignatureFields) -> Result<(), Rejection> {
    if let Some(max_age) = state.max_age_seconds {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        if !is_timestamp_fresh(&fields.timestamp, max_age, now) {
            warn!(
                timestamp = %fields.timestamp,
                current_time = now,
                max_age_seconds = max_age,
                "mailgun_signature_stale"
            );
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(WebhookResponse::status("unauthorized")),
            ));
        }
    }

    match state
        .verifier
        .verify(&fields.timestamp, &fields.token, &fields.signature)
    {
        Ok(true) => Ok(()),
        Ok(false) => {
            warn!(timestamp = %fields.timestamp, "mailgun_signature_invalid");
            Err((
                StatusCode::UNAUTHORIZED,
                Json(WebhookResponse::status("unauthorized")),
            ))
        }
        Err(e) => {
            warn!(error = %e, "mailgun_signature_malformed");
            Err((
                StatusCode::BAD_REQUEST,
                Json(WebhookResponse::status("bad_signature")),
            ))
        }
    }
}

fn is_multipart(request: &Request) -> bool {
    request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.trim_start().to_ascii_lowercase().starts_with("multipart/form-data"))
        .unwrap_or(false)
}

/// Read the signed fields from a urlencoded or multipart body.
///
/// Multipart parts other than the three signed fields (message parts,
/// attachments) are skipped unread.
async fn read_form_fields(request: Request) -> Result<SignatureFields, Response> {
    if !is_multipart(&request) {
        let Form(fields) = Form::<SignatureFields>::from_request(request, &())
            .await
            .map_err(IntoResponse::into_response)?;
        return Ok(fields);
    }

    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(IntoResponse::into_response)?;
    let mut fields = SignatureFields::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(IntoResponse::into_response)?
    {
        let target = match field.name() {
            Some("timestamp") => &mut fields.timestamp,
            Some("token") => &mut fields.token,
            Some("signature") => &mut fields.signature,
            _ => continue,
        };
        *target = field.text().await.map_err(IntoResponse::into_response)?;
    }

    Ok(fields)
}

/// Form Mailgun webhook endpoint.
///
/// Accepts urlencoded and multipart bodies. Fields absent from the body are
/// taken from the query string; body values win when both are present.
pub async fn mailgun_webhook(
    State(state): State<AppState>,
    Query(query): Query<SignatureFields>,
    request: Request,
) -> Response {
    let multipart = is_multipart(&request);
    let form = match read_form_fields(request).await {
        Ok(body) => body.or(query),
        Err(rejection) => {
            warn!(multipart = multipart, "mailgun_webhook_body_rejected");
            return rejection;
        }
    };

    info!(
        multipart = multipart,
        has_signature = !form.signature.is_empty(),
        "mailgun_webhook_received"
    );

    if let Err(rejection) = authenticate(&state, &form) {
        return rejection.into_response();
    }

    info!("mailgun_webhook_verified");

    (StatusCode::OK, Json(WebhookResponse::status("verified"))).into_response()
}

/// JSON Mailgun event webhook endpoint.
pub async fn mailgun_event_webhook(
    State(state): State<AppState>,
    Json(event): Json<MailgunEvent>,
) -> impl IntoResponse {
    let event_name = event.event_name().map(str::to_string);
    info!(
        event = ?event_name,
        has_signature = !event.signature.signature.is_empty(),
        "mailgun_event_received"
    );

    if let Err(rejection) = authenticate(&state, &event.signature) {
        return rejection;
    }

    info!(event = ?event_name, "mailgun_event_verified");

    (
        StatusCode::OK,
        Json(WebhookResponse {
            status: "verified",
            event: event_name,
        }),
    )
}

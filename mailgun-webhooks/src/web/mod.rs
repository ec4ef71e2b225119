//! Web server module for receiving signed Mailgun callbacks.
//!
//! Every callback is authenticated against the signing key before it is
//! acknowledged:
//! - 200 when the signature matches
//! - 401 when it does not (or the timestamp is stale)
//! - 400 when the signature is not hex at all

pub mod handlers;
pub mod signature;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub use handlers::{
    health, mailgun_event_webhook, mailgun_webhook, AppState, HealthResponse, MailgunEvent,
    SignatureFields, WebhookResponse,
};
pub use signature::{
    is_timestamp_fresh, verify_mailgun_signature, SignatureError, SignatureVerifier,
};

/// Largest callback body accepted; Mailgun messages are capped at 25 MiB.
const MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

/// Build the receiver's router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/webhooks/mailgun",
            post(mailgun_webhook).layer(DefaultBodyLimit::max(MAX_BODY_BYTES)),
        )
        .route("/webhooks/mailgun/events", post(mailgun_event_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

//! Mailgun webhooks API.
//!
//! Typed wrappers over the five webhook endpoints of a sending domain:
//! list, create, delete, fetch by kind and update.

pub mod client;
pub mod error;
pub mod types;

pub use client::MailgunClient;
pub use error::ApiError;
pub use types::{WebhookEnvelope, WebhookListEnvelope, WebhookTarget};

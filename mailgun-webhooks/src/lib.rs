//! Mailgun webhooks - configuration client and signed-callback receiver.
//!
//! This library provides shared modules for the two binaries:
//! - `mailgun-webhooks`: Syncs a domain's webhooks with the configured mapping
//! - `mailgun-webhooks-web`: Receives callbacks and verifies their signatures
//!
//! ## Architecture
//!
//! ```text
//! Config → sync → MailgunClient → Mailgun API
//! Mailgun → web server → SignatureVerifier → 200 / 401 / 400
//! ```

pub mod api;
pub mod config;
pub mod sync;
pub mod web;

// Re-export commonly used types
pub use api::{ApiError, MailgunClient};
pub use config::Config;
pub use sync::{apply_changes, plan_changes, ChangeResult, WebhookChange};
pub use web::{verify_mailgun_signature, AppState, SignatureError, SignatureVerifier};

//! Webhook outbound adapters.
//!
//! This module provides a thin HTTP implementation of the `WebhookSender`
//! port.

mod http_sender;

pub use http_sender::{HttpWebhookSender, WEBHOOK_TIMEOUT};

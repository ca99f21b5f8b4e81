//! Driven port for outbound webhook delivery.

use async_trait::async_trait;
use serde_json::Value;

use super::define_port_error;

/// One delivery attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookDelivery {
    /// Destination URL.
    pub webhook: String,
    /// JSON body posted verbatim.
    pub data: Value,
}

define_port_error! {
    /// Reasons a delivery attempt did not succeed.
    ///
    /// The retry state machine treats every variant the same way; the split
    /// only exists for logging.
    pub enum WebhookSendError {
        /// Endpoint answered with something other than `200 OK`.
        Rejected { status: u16 } => "webhook responded with status {status}",
        /// Connection or protocol failure before a response arrived.
        Transport { message: String } => "webhook transport failed: {message}",
        /// Call exceeded the fixed timeout.
        Timeout { message: String } => "webhook call timed out: {message}",
        /// Request could not be built.
        Encode { message: String } => "webhook request could not be built: {message}",
    }
}

/// Port for posting a schedule payload to its webhook.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WebhookSender: Send + Sync {
    /// Post once; `Ok` only for a `200 OK` response.
    async fn send(&self, delivery: &WebhookDelivery) -> Result<(), WebhookSendError>;
}

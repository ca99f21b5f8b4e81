//! Scripted webhook sender recording every attempt.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::domain::ports::{WebhookDelivery, WebhookSendError, WebhookSender};

/// Sender that replays scripted results, then falls back to a fixed one.
pub struct ScriptedWebhookSender {
    script: Mutex<VecDeque<Result<(), WebhookSendError>>>,
    fallback: Result<(), WebhookSendError>,
    deliveries: Mutex<Vec<WebhookDelivery>>,
}

impl ScriptedWebhookSender {
    /// Replay `script` in order, then answer with `fallback`.
    pub fn scripted(
        script: Vec<Result<(), WebhookSendError>>,
        fallback: Result<(), WebhookSendError>,
    ) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            deliveries: Mutex::new(Vec::new()),
        }
    }

    /// Every attempt succeeds.
    pub fn accepting() -> Self {
        Self::scripted(Vec::new(), Ok(()))
    }

    /// Every attempt is answered with `status`.
    pub fn rejecting(status: u16) -> Self {
        Self::scripted(Vec::new(), Err(WebhookSendError::rejected(status)))
    }

    fn lock_deliveries(&self) -> MutexGuard<'_, Vec<WebhookDelivery>> {
        self.deliveries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Attempts made so far.
    pub fn deliveries(&self) -> Vec<WebhookDelivery> {
        self.lock_deliveries().clone()
    }

    /// Number of attempts made so far.
    pub fn attempts(&self) -> usize {
        self.lock_deliveries().len()
    }
}

#[async_trait]
impl WebhookSender for ScriptedWebhookSender {
    async fn send(&self, delivery: &WebhookDelivery) -> Result<(), WebhookSendError> {
        self.lock_deliveries().push(delivery.clone());
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

//! Retry state machine run once per fired timer.
//!
//! ```text
//! Pending --timer expires--> Delivering --200 OK------------> Delivered  (record + timer removed)
//!    ^                           |
//!    |                           +--failure, budget left----> RetryScheduled (retry += 1, re-armed)
//!    +---------------------------+
//! Pending --timer expires, retry >= limit----------------> Exhausted  (record + timer removed)
//! ```
//!
//! A record is removed only on `Delivered` or `Exhausted`; every other path
//! leaves it with exactly one armed timer. There is no per-schedule locking:
//! an API mutation racing a firing on the same identity can lose an update.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::ports::{
    ScheduleRepository, ScheduleRepositoryError, TimerStore, TimerStoreError, WebhookDelivery,
    WebhookSender,
};
use crate::domain::retry::{FiringAdmission, RetryPolicy};
use crate::domain::ScheduleIdentity;

/// Delay used to re-arm a record that was found without a timer.
pub const ORPHAN_REARM_DELAY: Duration = Duration::from_secs(1);

/// Terminal or intermediate state reached by one firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FiringOutcome {
    /// No record behind the timer (already deleted or a duplicate notification).
    Vanished,
    /// Webhook accepted the payload; record and timer removed.
    Delivered,
    /// Delivery failed and the timer was re-armed.
    RetryScheduled {
        /// Attempts recorded after this failure.
        retry: u32,
        /// Delay the timer was armed with.
        delay: Duration,
    },
    /// Retry budget spent; record and timer removed without delivering.
    Exhausted {
        /// Attempts recorded when the budget ran out.
        retry: u32,
    },
}

/// Store failure that aborted a firing.
///
/// The record is left as it was before the failing step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FiringError {
    /// The record could not be read or decoded.
    #[error("failed to load schedule record: {0}")]
    Load(ScheduleRepositoryError),
    /// The retry counter could not be written back.
    #[error("failed to persist retry state: {0}")]
    Persist(ScheduleRepositoryError),
    /// The record could not be removed.
    #[error("failed to delete schedule record: {0}")]
    Delete(ScheduleRepositoryError),
    /// The timer could not be armed or cancelled.
    #[error("failed to update schedule timer: {0}")]
    Timer(TimerStoreError),
}

/// Port bundle required by the delivery worker.
#[derive(Clone)]
pub struct DeliveryWorkerPorts {
    /// Record store.
    pub records: Arc<dyn ScheduleRepository>,
    /// Timer store.
    pub timers: Arc<dyn TimerStore>,
    /// Outbound webhook adapter.
    pub sender: Arc<dyn WebhookSender>,
}

impl DeliveryWorkerPorts {
    /// Build a strongly-typed worker port bundle.
    pub fn new(
        records: Arc<dyn ScheduleRepository>,
        timers: Arc<dyn TimerStore>,
        sender: Arc<dyn WebhookSender>,
    ) -> Self {
        Self {
            records,
            timers,
            sender,
        }
    }
}

/// Executes the retry state machine for fired schedules.
pub struct DeliveryWorker {
    records: Arc<dyn ScheduleRepository>,
    timers: Arc<dyn TimerStore>,
    sender: Arc<dyn WebhookSender>,
    policy: RetryPolicy,
}

impl DeliveryWorker {
    /// Build a worker over the given ports.
    /// ```rust,ignore
    /// let worker = DeliveryWorker::new(ports, policy);
    /// let outcome = worker.fire(&identity).await?;
    /// ```
    pub fn new(ports: DeliveryWorkerPorts, policy: RetryPolicy) -> Self {
        Self {
            records: ports.records,
            timers: ports.timers,
            sender: ports.sender,
            policy,
        }
    }

    /// Retry policy in force.
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Handle one fired timer for `identity`.
    ///
    /// # Errors
    ///
    /// Returns [`FiringError`] when a store call fails; delivery failures are
    /// not errors and surface as [`FiringOutcome::RetryScheduled`].
    pub async fn fire(&self, identity: &ScheduleIdentity) -> Result<FiringOutcome, FiringError> {
        let Some(record) = self
            .records
            .get(identity)
            .await
            .map_err(FiringError::Load)?
        else {
            debug!("timer fired for a schedule that no longer exists");
            return Ok(FiringOutcome::Vanished);
        };

        if self.policy.admit(&record) == FiringAdmission::Exhausted {
            self.teardown(identity).await?;
            info!(
                retry = record.retry,
                limit = %self.policy.limit(),
                "retry budget exhausted, schedule removed"
            );
            return Ok(FiringOutcome::Exhausted {
                retry: record.retry,
            });
        }

        let delivery = WebhookDelivery {
            webhook: record.webhook.clone(),
            data: record.data.clone(),
        };
        match self.sender.send(&delivery).await {
            Ok(()) => {
                self.teardown(identity).await?;
                info!(webhook = %record.webhook, "webhook delivered, schedule removed");
                Ok(FiringOutcome::Delivered)
            }
            Err(error) => {
                let (updated, delay) = self.policy.after_failure(&record);
                warn!(
                    %error,
                    attempt = updated.retry,
                    limit = %self.policy.limit(),
                    retry_in_secs = delay.as_secs(),
                    "webhook delivery failed"
                );
                self.records
                    .put(identity, &updated)
                    .await
                    .map_err(FiringError::Persist)?;
                self.timers
                    .arm(identity, delay)
                    .await
                    .map_err(FiringError::Timer)?;
                Ok(FiringOutcome::RetryScheduled {
                    retry: updated.retry,
                    delay,
                })
            }
        }
    }

    /// Arm a short timer for every record that has none.
    ///
    /// Covers records whose expiry notification was missed while no
    /// subscriber was connected. Returns how many timers were armed.
    ///
    /// # Errors
    ///
    /// Fails on the first store error; timers armed before it stay armed.
    pub async fn rearm_orphans(&self) -> Result<usize, FiringError> {
        let records = self
            .records
            .list(None)
            .await
            .map_err(FiringError::Load)?;

        let mut rearmed = 0;
        for (identity, _) in records {
            let remaining = self
                .timers
                .remaining(&identity)
                .await
                .map_err(FiringError::Timer)?;
            if remaining.is_none() {
                self.timers
                    .arm(&identity, ORPHAN_REARM_DELAY)
                    .await
                    .map_err(FiringError::Timer)?;
                info!(schedule = %identity, "re-armed orphaned schedule");
                rearmed += 1;
            }
        }
        Ok(rearmed)
    }

    // Timer first so it never outlives its record.
    async fn teardown(&self, identity: &ScheduleIdentity) -> Result<(), FiringError> {
        self.timers
            .cancel(identity)
            .await
            .map_err(FiringError::Timer)?;
        self.records
            .delete(identity)
            .await
            .map_err(FiringError::Delete)?;
        Ok(())
    }
}

//! Driven port for expiring timer keys and their expiry notifications.
//!
//! A timer carries no payload; it exists only so the backing store reports
//! its expiry. Notifications are at-least-once while subscribed and are lost
//! for good while nobody is listening.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use super::define_port_error;
use crate::domain::ScheduleIdentity;

/// Stream of raw expired key names, foreign keys included.
pub type ExpirationStream = BoxStream<'static, String>;

define_port_error! {
    /// Errors surfaced by timer store adapters.
    pub enum TimerStoreError {
        /// The backing store could not be reached.
        Connection { message: String } => "timer store connection failed: {message}",
        /// The store rejected or failed a command.
        Command { message: String } => "timer store command failed: {message}",
        /// The expiry notification subscription could not be established.
        Subscription { message: String } => "expiry subscription failed: {message}",
    }
}

/// Port for arming, cancelling, and observing schedule timers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TimerStore: Send + Sync {
    /// Create or overwrite the timer so it expires after `delay`.
    async fn arm(&self, identity: &ScheduleIdentity, delay: Duration)
    -> Result<(), TimerStoreError>;

    /// Remove the timer if present.
    async fn cancel(&self, identity: &ScheduleIdentity) -> Result<(), TimerStoreError>;

    /// Time left before the timer fires, or `None` when no timer is armed.
    async fn remaining(
        &self,
        identity: &ScheduleIdentity,
    ) -> Result<Option<Duration>, TimerStoreError>;

    /// Number of armed timers in the namespace.
    async fn armed_count(&self) -> Result<u64, TimerStoreError>;

    /// Remove every timer in the namespace, returning how many were removed.
    async fn purge(&self) -> Result<u64, TimerStoreError>;

    /// Open a new subscription to expired key names.
    async fn subscribe_expirations(&self) -> Result<ExpirationStream, TimerStoreError>;
}

//! Domain ports and supporting types for the hexagonal boundary.

mod macros;
pub(crate) use macros::define_port_error;

mod schedule_repository;
mod timer_store;
mod webhook_sender;

#[cfg(test)]
pub use schedule_repository::MockScheduleRepository;
pub use schedule_repository::{ScheduleRepository, ScheduleRepositoryError};
#[cfg(test)]
pub use timer_store::MockTimerStore;
pub use timer_store::{ExpirationStream, TimerStore, TimerStoreError};
#[cfg(test)]
pub use webhook_sender::MockWebhookSender;
pub use webhook_sender::{WebhookDelivery, WebhookSendError, WebhookSender};

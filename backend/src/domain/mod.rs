//! Scheduling domain: identities, key layout, retry policy, and use cases.
//!
//! Purpose: Hold everything that decides *what* happens to a schedule,
//! independent of the store and transport adapters that decide *how*.
//!
//! Public surface:
//! - Error (alias to `error::Error`): transport-agnostic failure payload.
//! - ScheduleIdentity / ScheduleRecord: addressing and persisted payload.
//! - KeyCodec: record/timer key layout.
//! - RetryPolicy: retry budget and interval.
//! - DeliveryWorker: the retry state machine run per fired timer.
//! - DispatchLoop: consumer of timer expiry notifications.
//! - ScheduleService: create/get/patch/delete/list use cases.

pub mod delivery_worker;
pub mod dispatch;
pub mod error;
pub mod keys;
pub mod ports;
pub mod retry;
pub mod schedule;
pub mod schedule_service;

pub use self::delivery_worker::{
    DeliveryWorker, DeliveryWorkerPorts, FiringError, FiringOutcome, ORPHAN_REARM_DELAY,
};
pub use self::dispatch::{DispatchLoop, InFlightDeliveries, RESUBSCRIBE_DELAY};
pub use self::error::{Error, ErrorCode, ErrorValidationError};
pub use self::keys::{DEFAULT_KEY_NAMESPACE, KeyCodec, KeyNamespaceError, TimerKeyMatch};
pub use self::retry::{
    FiringAdmission, RetryLimit, RetryPolicy, RetryPolicyError, UNLIMITED_RETRIES,
};
pub use self::schedule::{
    DEFAULT_SCHEDULE_TYPE, MAX_TTL_SECONDS, NewSchedule, ScheduleId, ScheduleIdentity, SchedulePatch,
    ScheduleRecord, ScheduleType, ScheduleValidationError, ScheduleView,
};
pub use self::schedule_service::{PurgeSummary, ScheduleService, ScheduleStats};

/// Convenient API result alias.
///
/// # Examples
/// ```
/// use webhook_scheduler::domain::{ApiResult, Error};
///
/// fn handler() -> ApiResult<()> {
///     Err(Error::unauthorized("missing token"))
/// }
/// assert!(handler().is_err());
/// ```
pub type ApiResult<T> = Result<T, Error>;

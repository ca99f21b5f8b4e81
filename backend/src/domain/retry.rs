//! Retry policy applied when a schedule fires.
//!
//! The policy is pure: it decides whether a firing may attempt delivery and
//! how to rewrite the record after a failed attempt. Persistence and timer
//! re-arming stay with the delivery worker.

use std::time::Duration;

use thiserror::Error;

use super::schedule::ScheduleRecord;

/// Configuration value meaning "retry forever".
pub const UNLIMITED_RETRIES: i64 = -1;

/// Rejected retry configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetryPolicyError {
    /// Negative limits other than the unlimited sentinel are meaningless.
    #[error("retry limit must be >= 0 or -1 for unlimited, got {value}")]
    InvalidLimit { value: i64 },
    /// Re-arming with a zero interval would fire immediately in a loop.
    #[error("retry interval must be at least 1 second")]
    ZeroInterval,
}

/// Upper bound on delivery attempts recorded against one schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryLimit {
    /// Stop once `retry` reaches this value.
    Limited(u32),
    /// Never give up.
    Unlimited,
}

impl RetryLimit {
    /// Interpret a configured retry count.
    ///
    /// ```
    /// use webhook_scheduler::domain::RetryLimit;
    ///
    /// assert_eq!(RetryLimit::from_setting(-1), Ok(RetryLimit::Unlimited));
    /// assert_eq!(RetryLimit::from_setting(3), Ok(RetryLimit::Limited(3)));
    /// assert!(RetryLimit::from_setting(-2).is_err());
    /// ```
    pub fn from_setting(value: i64) -> Result<Self, RetryPolicyError> {
        if value == UNLIMITED_RETRIES {
            return Ok(Self::Unlimited);
        }
        u32::try_from(value)
            .map(Self::Limited)
            .map_err(|_| RetryPolicyError::InvalidLimit { value })
    }

    /// Whether a record with `retry` attempts behind it is out of budget.
    pub fn is_exhausted(self, retry: u32) -> bool {
        match self {
            Self::Limited(max) => retry >= max,
            Self::Unlimited => false,
        }
    }
}

impl std::fmt::Display for RetryLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Limited(max) => write!(f, "{max}"),
            Self::Unlimited => f.write_str("unlimited"),
        }
    }
}

/// What a firing is allowed to do with the record it loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FiringAdmission {
    /// Attempt delivery.
    Deliver,
    /// Retry budget spent; delete without delivering.
    Exhausted,
}

/// Process-wide retry behaviour shared by every schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    limit: RetryLimit,
    interval: Duration,
}

impl RetryPolicy {
    /// Build a policy; the interval must be at least one second.
    pub fn new(limit: RetryLimit, interval: Duration) -> Result<Self, RetryPolicyError> {
        if interval.as_secs() == 0 {
            return Err(RetryPolicyError::ZeroInterval);
        }
        Ok(Self { limit, interval })
    }

    /// Build a policy from raw configuration values.
    pub fn from_settings(retries: i64, retry_seconds: u64) -> Result<Self, RetryPolicyError> {
        Self::new(
            RetryLimit::from_setting(retries)?,
            Duration::from_secs(retry_seconds),
        )
    }

    /// Configured limit.
    pub fn limit(&self) -> RetryLimit {
        self.limit
    }

    /// Delay used to re-arm the timer after a failed delivery.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Decide whether a loaded record may be delivered.
    pub fn admit(&self, record: &ScheduleRecord) -> FiringAdmission {
        if self.limit.is_exhausted(record.retry) {
            FiringAdmission::Exhausted
        } else {
            FiringAdmission::Deliver
        }
    }

    /// Record rewritten after a failed attempt, and the delay to re-arm with.
    ///
    /// The schedule's own `ttl` is not reused; every retry
    /// waits the same configured interval.
    pub fn after_failure(&self, record: &ScheduleRecord) -> (ScheduleRecord, Duration) {
        (record.with_failed_attempt(), self.interval)
    }
}

#[cfg(test)]
mod tests {
    //! Retry budget arithmetic.

    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn record(retry: u32) -> ScheduleRecord {
        ScheduleRecord {
            webhook: "https://example.com".to_owned(),
            ttl: 600,
            retry,
            data: json!(null),
        }
    }

    #[rstest]
    #[case(0, 0, FiringAdmission::Exhausted)]
    #[case(2, 0, FiringAdmission::Deliver)]
    #[case(2, 1, FiringAdmission::Deliver)]
    #[case(2, 2, FiringAdmission::Exhausted)]
    #[case(2, 7, FiringAdmission::Exhausted)]
    fn limited_policy_admission(
        #[case] max: i64,
        #[case] retry: u32,
        #[case] expected: FiringAdmission,
    ) {
        let policy = RetryPolicy::from_settings(max, 1).expect("policy");
        assert_eq!(policy.admit(&record(retry)), expected);
    }

    #[rstest]
    fn unlimited_policy_always_delivers() {
        let policy = RetryPolicy::from_settings(UNLIMITED_RETRIES, 1).expect("policy");
        assert_eq!(policy.admit(&record(u32::MAX)), FiringAdmission::Deliver);
    }

    #[rstest]
    fn failure_uses_interval_not_ttl() {
        let policy = RetryPolicy::from_settings(5, 3).expect("policy");
        let (updated, delay) = policy.after_failure(&record(1));
        assert_eq!(updated.retry, 2);
        assert_eq!(updated.ttl, 600);
        assert_eq!(delay, Duration::from_secs(3));
    }

    #[rstest]
    #[case(-2)]
    #[case(i64::MIN)]
    fn rejects_negative_limits(#[case] value: i64) {
        assert_eq!(
            RetryLimit::from_setting(value),
            Err(RetryPolicyError::InvalidLimit { value })
        );
    }

    #[rstest]
    fn rejects_zero_interval() {
        assert_eq!(
            RetryPolicy::from_settings(1, 0),
            Err(RetryPolicyError::ZeroInterval)
        );
    }
}

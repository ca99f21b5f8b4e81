//! Schedule identity, persisted record, and mutation inputs.
//!
//! A schedule is addressed by `(type, id)`. The type is a free-form
//! namespace chosen by the caller; the id is 128 random bits generated at
//! creation. Both appear verbatim inside store keys, so they are restricted to
//! characters that cannot collide with key separators or glob patterns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use url::Url;

/// Schedule type used when the caller does not supply one.
pub const DEFAULT_SCHEDULE_TYPE: &str = "default";

/// Longest accepted delay: ten years.
pub const MAX_TTL_SECONDS: u64 = 10 * 365 * 24 * 60 * 60;

/// Validation failures for schedule identities and payloads.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleValidationError {
    /// Schedule type was blank.
    #[error("schedule type must not be empty")]
    EmptyType,
    /// Schedule type contains a separator, whitespace, or glob character.
    #[error("schedule type contains reserved character {found:?}")]
    InvalidType { found: char },
    /// Schedule id was blank.
    #[error("schedule id must not be empty")]
    EmptyId,
    /// Schedule id contains a character outside the URL-safe alphabet.
    #[error("schedule id contains invalid character {found:?}")]
    InvalidId { found: char },
    /// Webhook destination was blank.
    #[error("webhook must not be empty")]
    EmptyWebhook,
    /// Webhook destination is not an absolute http(s) URL.
    #[error("webhook is not a valid http(s) URL: {reason}")]
    InvalidWebhook { reason: String },
    /// Delay must be at least one second.
    #[error("ttl must be at least 1 second, got {ttl}")]
    TtlTooSmall { ttl: i64 },
    /// Delay exceeds what the timer store accepts.
    #[error("ttl must be at most {max} seconds, got {ttl}")]
    TtlTooLarge { ttl: i64, max: u64 },
    /// Payload is required at creation.
    #[error("data is required")]
    MissingData,
}

fn is_reserved_type_char(c: char) -> bool {
    c == ':' || c.is_whitespace() || matches!(c, '*' | '?' | '[' | ']' | '\\')
}

/// Free-form namespace grouping related schedules.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScheduleType(String);

impl ScheduleType {
    /// Validate and wrap a schedule type.
    ///
    /// ```
    /// use webhook_scheduler::domain::ScheduleType;
    ///
    /// assert!(ScheduleType::new("reminders").is_ok());
    /// assert!(ScheduleType::new("a:b").is_err());
    /// ```
    pub fn new(value: impl Into<String>) -> Result<Self, ScheduleValidationError> {
        let raw = value.into();
        if raw.is_empty() {
            return Err(ScheduleValidationError::EmptyType);
        }
        if let Some(found) = raw.chars().find(|c| is_reserved_type_char(*c)) {
            return Err(ScheduleValidationError::InvalidType { found });
        }
        Ok(Self(raw))
    }

    /// Borrow the type as a string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Default for ScheduleType {
    fn default() -> Self {
        Self(DEFAULT_SCHEDULE_TYPE.to_owned())
    }
}

impl std::fmt::Display for ScheduleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for ScheduleType {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Random schedule token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScheduleId(String);

impl ScheduleId {
    /// Generate a fresh id from 128 bits of OS-seeded randomness.
    pub fn generate() -> Self {
        let bytes: [u8; 16] = rand::random();
        Self(hex::encode(bytes))
    }

    /// Validate an externally supplied id.
    pub fn new(value: impl Into<String>) -> Result<Self, ScheduleValidationError> {
        let raw = value.into();
        if raw.is_empty() {
            return Err(ScheduleValidationError::EmptyId);
        }
        if let Some(found) = raw
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_')))
        {
            return Err(ScheduleValidationError::InvalidId { found });
        }
        Ok(Self(raw))
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for ScheduleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical identity of one schedule.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScheduleIdentity {
    schedule_type: ScheduleType,
    id: ScheduleId,
}

impl ScheduleIdentity {
    /// Pair a type with an id.
    pub fn new(schedule_type: ScheduleType, id: ScheduleId) -> Self {
        Self { schedule_type, id }
    }

    /// Issue a new identity with a freshly generated id.
    pub fn generate(schedule_type: ScheduleType) -> Self {
        Self::new(schedule_type, ScheduleId::generate())
    }

    /// Schedule namespace.
    pub fn schedule_type(&self) -> &ScheduleType {
        &self.schedule_type
    }

    /// Random token.
    pub fn id(&self) -> &ScheduleId {
        &self.id
    }
}

impl std::fmt::Display for ScheduleIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.schedule_type, self.id)
    }
}

/// Persisted schedule payload stored under the record key.
///
/// Serialised as `{"webhook", "ttl", "retry", "data"}`; `data` is forwarded
/// verbatim as the webhook body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRecord {
    /// Destination URL.
    pub webhook: String,
    /// Originally requested delay in seconds.
    pub ttl: u64,
    /// Delivery attempts already made.
    #[serde(default)]
    pub retry: u32,
    /// Opaque payload.
    pub data: Value,
}

impl ScheduleRecord {
    /// Copy of this record with the retry counter advanced by one.
    pub fn with_failed_attempt(&self) -> Self {
        Self {
            retry: self.retry.saturating_add(1),
            ..self.clone()
        }
    }
}

fn validate_webhook(raw: &str) -> Result<(), ScheduleValidationError> {
    if raw.trim().is_empty() {
        return Err(ScheduleValidationError::EmptyWebhook);
    }
    let url = Url::parse(raw).map_err(|error| ScheduleValidationError::InvalidWebhook {
        reason: error.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ScheduleValidationError::InvalidWebhook {
            reason: format!("unsupported scheme {other}"),
        }),
    }
}

fn validate_ttl(ttl: i64) -> Result<u64, ScheduleValidationError> {
    let seconds = u64::try_from(ttl)
        .ok()
        .filter(|value| *value >= 1)
        .ok_or(ScheduleValidationError::TtlTooSmall { ttl })?;
    if seconds > MAX_TTL_SECONDS {
        return Err(ScheduleValidationError::TtlTooLarge {
            ttl,
            max: MAX_TTL_SECONDS,
        });
    }
    Ok(seconds)
}

/// Validated creation request.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSchedule {
    schedule_type: ScheduleType,
    record: ScheduleRecord,
}

impl NewSchedule {
    /// Validate creation input; the retry counter always starts at zero.
    ///
    /// ```
    /// use serde_json::json;
    /// use webhook_scheduler::domain::{NewSchedule, ScheduleType};
    ///
    /// let request = NewSchedule::new(
    ///     ScheduleType::default(),
    ///     "https://example.com/hook",
    ///     30,
    ///     Some(json!({"order": 7})),
    /// )
    /// .expect("valid request");
    /// assert_eq!(request.record().retry, 0);
    /// ```
    pub fn new(
        schedule_type: ScheduleType,
        webhook: impl Into<String>,
        ttl: i64,
        data: Option<Value>,
    ) -> Result<Self, ScheduleValidationError> {
        let webhook = webhook.into();
        validate_webhook(&webhook)?;
        let ttl = validate_ttl(ttl)?;
        let data = data
            .filter(|value| !value.is_null())
            .ok_or(ScheduleValidationError::MissingData)?;
        Ok(Self {
            schedule_type,
            record: ScheduleRecord {
                webhook,
                ttl,
                retry: 0,
                data,
            },
        })
    }

    /// Namespace the schedule will be created under.
    pub fn schedule_type(&self) -> &ScheduleType {
        &self.schedule_type
    }

    /// Record that will be persisted.
    pub fn record(&self) -> &ScheduleRecord {
        &self.record
    }

    /// Split into its parts.
    pub fn into_parts(self) -> (ScheduleType, ScheduleRecord) {
        (self.schedule_type, self.record)
    }
}

/// Partial update of a stored schedule.
///
/// Absent, empty, non-positive, or null fields mean "unchanged". The retry
/// counter cannot be patched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchedulePatch {
    /// Replacement webhook, ignored when blank.
    pub webhook: Option<String>,
    /// Replacement delay, ignored when not positive.
    pub ttl: Option<i64>,
    /// Replacement payload, ignored when null.
    pub data: Option<Value>,
}

impl SchedulePatch {
    /// Apply the patch to `record`, validating any replaced fields.
    pub fn apply(self, record: &ScheduleRecord) -> Result<ScheduleRecord, ScheduleValidationError> {
        let mut updated = record.clone();
        if let Some(webhook) = self.webhook.filter(|w| !w.is_empty()) {
            validate_webhook(&webhook)?;
            updated.webhook = webhook;
        }
        if let Some(ttl) = self.ttl.filter(|t| *t > 0) {
            updated.ttl = validate_ttl(ttl)?;
        }
        if let Some(data) = self.data.filter(|d| !d.is_null()) {
            updated.data = data;
        }
        Ok(updated)
    }
}

/// Read model returned by the schedule service.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleView {
    /// Public reference (the timer key) accepted by get/patch/delete.
    pub reference: String,
    /// Logical identity.
    pub identity: ScheduleIdentity,
    /// Stored record.
    pub record: ScheduleRecord,
    /// When the armed timer will fire, if one is armed.
    pub expires: Option<DateTime<Utc>>,
}

impl From<ScheduleValidationError> for crate::domain::Error {
    fn from(error: ScheduleValidationError) -> Self {
        Self::invalid_request(error.to_string())
    }
}

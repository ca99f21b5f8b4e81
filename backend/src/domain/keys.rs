//! Store key layout binding a schedule record to its expiring timer.
//!
//! ```text
//! record key: {namespace}:{type}:{id}        payload, no expiry
//! timer key:  {namespace}-ref:{type}:{id}    empty value, TTL = delay
//! ```
//!
//! The two namespaces are disjoint, so each key can be derived from the other.
//! The keyspace is shared with whatever else lives in the store and the expiry
//! notification channel reports every expired key, so decoding never fails
//! loudly: anything that does not match the timer layout is simply not ours.

use thiserror::Error;

use super::schedule::{ScheduleId, ScheduleIdentity, ScheduleType};

/// Namespace used when none is configured.
pub const DEFAULT_KEY_NAMESPACE: &str = "rsch";

const TIMER_SUFFIX: &str = "-ref";

/// Result of matching an arbitrary key name against the timer layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerKeyMatch {
    /// The key is one of our timers.
    Recognized(ScheduleIdentity),
    /// Foreign or malformed key.
    NotRecognized,
}

/// Rejected namespace configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyNamespaceError {
    /// Namespace was blank.
    #[error("key namespace must not be empty")]
    Empty,
    /// Namespace contains a separator, whitespace, or glob character.
    #[error("key namespace contains reserved character {found:?}")]
    Reserved { found: char },
}

/// Deterministic, reversible mapping between identities and store keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCodec {
    record_namespace: String,
    timer_namespace: String,
}

impl Default for KeyCodec {
    fn default() -> Self {
        Self {
            record_namespace: DEFAULT_KEY_NAMESPACE.to_owned(),
            timer_namespace: format!("{DEFAULT_KEY_NAMESPACE}{TIMER_SUFFIX}"),
        }
    }
}

impl KeyCodec {
    /// Build a codec for `namespace`.
    ///
    /// ```
    /// use webhook_scheduler::domain::KeyCodec;
    ///
    /// let codec = KeyCodec::new("jobs").expect("valid namespace");
    /// assert_eq!(codec.timer_namespace(), "jobs-ref");
    /// ```
    pub fn new(namespace: impl Into<String>) -> Result<Self, KeyNamespaceError> {
        let namespace = namespace.into();
        if namespace.is_empty() {
            return Err(KeyNamespaceError::Empty);
        }
        if let Some(found) = namespace
            .chars()
            .find(|c| *c == ':' || c.is_whitespace() || matches!(c, '*' | '?' | '[' | ']'))
        {
            return Err(KeyNamespaceError::Reserved { found });
        }
        Ok(Self {
            timer_namespace: format!("{namespace}{TIMER_SUFFIX}"),
            record_namespace: namespace,
        })
    }

    /// Namespace prefix for record keys.
    pub fn record_namespace(&self) -> &str {
        &self.record_namespace
    }

    /// Namespace prefix for timer keys.
    pub fn timer_namespace(&self) -> &str {
        &self.timer_namespace
    }

    /// Record key holding the schedule payload.
    pub fn record_key(&self, identity: &ScheduleIdentity) -> String {
        format!(
            "{}:{}:{}",
            self.record_namespace,
            identity.schedule_type(),
            identity.id()
        )
    }

    /// Timer key whose expiry fires the schedule.
    pub fn timer_key(&self, identity: &ScheduleIdentity) -> String {
        format!(
            "{}:{}:{}",
            self.timer_namespace,
            identity.schedule_type(),
            identity.id()
        )
    }

    /// Decode a notification key into an identity.
    ///
    /// ```
    /// use webhook_scheduler::domain::{KeyCodec, TimerKeyMatch};
    ///
    /// let codec = KeyCodec::default();
    /// assert!(matches!(
    ///     codec.decode_timer_key("rsch-ref:default:abc123"),
    ///     TimerKeyMatch::Recognized(_)
    /// ));
    /// assert_eq!(codec.decode_timer_key("session:42"), TimerKeyMatch::NotRecognized);
    /// ```
    pub fn decode_timer_key(&self, raw: &str) -> TimerKeyMatch {
        match decode_under(&self.timer_namespace, raw) {
            Some(identity) => TimerKeyMatch::Recognized(identity),
            None => TimerKeyMatch::NotRecognized,
        }
    }

    /// Decode a record key into an identity.
    pub fn decode_record_key(&self, raw: &str) -> Option<ScheduleIdentity> {
        decode_under(&self.record_namespace, raw)
    }

    /// Record key that pairs with `timer_key`, if it is one of ours.
    pub fn record_key_for_timer(&self, timer_key: &str) -> Option<String> {
        match self.decode_timer_key(timer_key) {
            TimerKeyMatch::Recognized(identity) => Some(self.record_key(&identity)),
            TimerKeyMatch::NotRecognized => None,
        }
    }

    /// Resolve a caller-supplied reference.
    ///
    /// Accepts either the full timer key returned at creation or a bare id,
    /// which is assumed to live under the default type.
    pub fn parse_reference(&self, raw: &str) -> Option<ScheduleIdentity> {
        if let TimerKeyMatch::Recognized(identity) = self.decode_timer_key(raw) {
            return Some(identity);
        }
        ScheduleId::new(raw)
            .ok()
            .map(|id| ScheduleIdentity::new(ScheduleType::default(), id))
    }

    /// Glob matching record keys, optionally restricted to one type.
    pub fn record_pattern(&self, filter: Option<&ScheduleType>) -> String {
        pattern_under(&self.record_namespace, filter)
    }

    /// Glob matching timer keys, optionally restricted to one type.
    pub fn timer_pattern(&self, filter: Option<&ScheduleType>) -> String {
        pattern_under(&self.timer_namespace, filter)
    }
}

fn decode_under(namespace: &str, raw: &str) -> Option<ScheduleIdentity> {
    let rest = raw.strip_prefix(namespace)?.strip_prefix(':')?;
    let (schedule_type, id) = rest.split_once(':')?;
    let schedule_type = ScheduleType::new(schedule_type).ok()?;
    let id = ScheduleId::new(id).ok()?;
    Some(ScheduleIdentity::new(schedule_type, id))
}

fn pattern_under(namespace: &str, filter: Option<&ScheduleType>) -> String {
    match filter {
        Some(schedule_type) => format!("{namespace}:{schedule_type}:*"),
        None => format!("{namespace}:*:*"),
    }
}

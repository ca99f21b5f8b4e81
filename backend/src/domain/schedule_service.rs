//! Schedule use cases driven by the HTTP adapter.
//!
//! Every mutation writes the record first and arms the timer second, so a
//! timer never fires for a record that was never written. A create whose timer
//! cannot be armed removes its record again, so the orphan sweep never picks
//! up a schedule the caller was told had failed. Store failures are mapped to
//! [`Error`] and returned to the caller; nothing here is retried.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use mockable::Clock;
use serde::Serialize;
use tracing::{info, warn};

use crate::domain::dispatch::InFlightDeliveries;
use crate::domain::ports::{
    ScheduleRepository, ScheduleRepositoryError, TimerStore, TimerStoreError,
};
use crate::domain::{
    Error, KeyCodec, NewSchedule, SchedulePatch, ScheduleIdentity, ScheduleRecord, ScheduleType,
    ScheduleView,
};

const NOT_FOUND_MESSAGE: &str = "Schedule not found.";
const UNAVAILABLE_MESSAGE: &str = "Schedule store unavailable.";

/// Counts returned by [`ScheduleService::purge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PurgeSummary {
    /// Records removed.
    pub records: u64,
    /// Timers removed.
    pub timers: u64,
}

/// Point-in-time service statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScheduleStats {
    /// Stored records.
    pub records: u64,
    /// Armed timers.
    pub armed_timers: u64,
    /// Firings executing right now.
    pub in_flight: usize,
    /// Seconds since the service was built.
    pub uptime_seconds: i64,
}

/// Create, inspect, mutate, and remove schedules.
#[derive(Clone)]
pub struct ScheduleService {
    records: Arc<dyn ScheduleRepository>,
    timers: Arc<dyn TimerStore>,
    codec: KeyCodec,
    clock: Arc<dyn Clock>,
    in_flight: InFlightDeliveries,
    started_at: DateTime<Utc>,
}

impl ScheduleService {
    /// Build a service over the given stores.
    pub fn new(
        records: Arc<dyn ScheduleRepository>,
        timers: Arc<dyn TimerStore>,
        codec: KeyCodec,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let started_at = clock.utc();
        Self {
            records,
            timers,
            codec,
            clock,
            in_flight: InFlightDeliveries::new(),
            started_at,
        }
    }

    /// Report in-flight firings from `gauge` in [`ScheduleService::stats`].
    #[must_use]
    pub fn with_in_flight(mut self, gauge: InFlightDeliveries) -> Self {
        self.in_flight = gauge;
        self
    }

    /// Key layout in use.
    pub fn codec(&self) -> &KeyCodec {
        &self.codec
    }

    /// Persist a new schedule and arm its timer.
    ///
    /// Returns the public reference (the timer key).
    pub async fn create(&self, request: NewSchedule) -> Result<String, Error> {
        let (schedule_type, record) = request.into_parts();
        let identity = ScheduleIdentity::generate(schedule_type);
        self.records
            .put(&identity, &record)
            .await
            .map_err(map_repository_error)?;
        if let Err(error) = self
            .timers
            .arm(&identity, Duration::from_secs(record.ttl))
            .await
        {
            if let Err(cleanup) = self.records.delete(&identity).await {
                warn!(schedule = %identity, error = %cleanup, "failed to discard unarmed schedule");
            }
            return Err(map_timer_error(error));
        }
        info!(schedule = %identity, ttl = record.ttl, "schedule created");
        Ok(self.codec.timer_key(&identity))
    }

    /// Load one schedule.
    pub async fn get(&self, reference: &str) -> Result<ScheduleView, Error> {
        let identity = self.resolve(reference)?;
        let record = self.load(&identity).await?;
        self.view(identity, record).await
    }

    /// Apply `patch` and re-arm the timer to the resulting ttl.
    ///
    /// An empty patch still re-arms the timer.
    pub async fn patch(&self, reference: &str, patch: SchedulePatch) -> Result<ScheduleView, Error> {
        let identity = self.resolve(reference)?;
        let current = self.load(&identity).await?;
        let updated = patch.apply(&current)?;
        self.records
            .put(&identity, &updated)
            .await
            .map_err(map_repository_error)?;
        self.timers
            .arm(&identity, Duration::from_secs(updated.ttl))
            .await
            .map_err(map_timer_error)?;
        info!(schedule = %identity, ttl = updated.ttl, "schedule updated");
        self.view(identity, updated).await
    }

    /// Remove a schedule and its timer.
    pub async fn delete(&self, reference: &str) -> Result<(), Error> {
        let identity = self.resolve(reference)?;
        self.timers
            .cancel(&identity)
            .await
            .map_err(map_timer_error)?;
        let existed = self
            .records
            .delete(&identity)
            .await
            .map_err(map_repository_error)?;
        if !existed {
            return Err(Error::not_found(NOT_FOUND_MESSAGE));
        }
        info!(schedule = %identity, "schedule deleted");
        Ok(())
    }

    /// List schedules, optionally restricted to one type.
    pub async fn list(&self, filter: Option<ScheduleType>) -> Result<Vec<ScheduleView>, Error> {
        let entries = self
            .records
            .list(filter)
            .await
            .map_err(map_repository_error)?;
        let mut views = Vec::with_capacity(entries.len());
        for (identity, record) in entries {
            views.push(self.view(identity, record).await?);
        }
        Ok(views)
    }

    /// Remove every schedule in the namespace.
    pub async fn purge(&self) -> Result<PurgeSummary, Error> {
        let timers = self.timers.purge().await.map_err(map_timer_error)?;
        let records = self.records.purge().await.map_err(map_repository_error)?;
        info!(records, timers, "schedules purged");
        Ok(PurgeSummary { records, timers })
    }

    /// Current counts and uptime.
    pub async fn stats(&self) -> Result<ScheduleStats, Error> {
        let records = self
            .records
            .list(None)
            .await
            .map_err(map_repository_error)?;
        let armed_timers = self.timers.armed_count().await.map_err(map_timer_error)?;
        Ok(ScheduleStats {
            records: records.len() as u64,
            armed_timers,
            in_flight: self.in_flight.current(),
            uptime_seconds: (self.clock.utc() - self.started_at).num_seconds(),
        })
    }

    fn resolve(&self, reference: &str) -> Result<ScheduleIdentity, Error> {
        self.codec
            .parse_reference(reference)
            .ok_or_else(|| Error::not_found(NOT_FOUND_MESSAGE))
    }

    async fn load(&self, identity: &ScheduleIdentity) -> Result<ScheduleRecord, Error> {
        self.records
            .get(identity)
            .await
            .map_err(map_repository_error)?
            .ok_or_else(|| Error::not_found(NOT_FOUND_MESSAGE))
    }

    async fn view(
        &self,
        identity: ScheduleIdentity,
        record: ScheduleRecord,
    ) -> Result<ScheduleView, Error> {
        let remaining = self
            .timers
            .remaining(&identity)
            .await
            .map_err(map_timer_error)?;
        let now = self.clock.utc();
        let expires = remaining
            .and_then(|left| TimeDelta::from_std(left).ok())
            .and_then(|left| now.checked_add_signed(left));
        Ok(ScheduleView {
            reference: self.codec.timer_key(&identity),
            identity,
            record,
            expires,
        })
    }
}

fn map_repository_error(error: ScheduleRepositoryError) -> Error {
    match error {
        ScheduleRepositoryError::Connection { message } => {
            warn!(%message, "schedule store unavailable");
            Error::service_unavailable(UNAVAILABLE_MESSAGE)
        }
        ScheduleRepositoryError::Query { message } => {
            Error::internal(format!("schedule store error: {message}"))
        }
        ScheduleRepositoryError::Decode { message } => {
            Error::internal(format!("stored schedule is malformed: {message}"))
        }
    }
}

fn map_timer_error(error: TimerStoreError) -> Error {
    match error {
        TimerStoreError::Connection { message } => {
            warn!(%message, "timer store unavailable");
            Error::service_unavailable(UNAVAILABLE_MESSAGE)
        }
        TimerStoreError::Command { message } | TimerStoreError::Subscription { message } => {
            Error::internal(format!("timer store error: {message}"))
        }
    }
}

#[cfg(test)]
#[path = "schedule_service_tests.rs"]
mod tests;

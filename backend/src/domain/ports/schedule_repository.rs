//! Driven port for persisted schedule records.
//!
//! Records live under their record key with no expiry attached. The port
//! works in identities; key layout is the adapter's concern.

use async_trait::async_trait;

use super::define_port_error;
use crate::domain::{ScheduleIdentity, ScheduleRecord, ScheduleType};

define_port_error! {
    /// Errors surfaced by record store adapters.
    pub enum ScheduleRepositoryError {
        /// The backing store could not be reached.
        Connection { message: String } => "schedule store connection failed: {message}",
        /// The store rejected or failed a command.
        Query { message: String } => "schedule store query failed: {message}",
        /// A stored record could not be decoded or encoded.
        Decode { message: String } => "schedule record is malformed: {message}",
    }
}

/// Port for reading and writing schedule records.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    /// Upsert `record` without expiry.
    async fn put(
        &self,
        identity: &ScheduleIdentity,
        record: &ScheduleRecord,
    ) -> Result<(), ScheduleRepositoryError>;

    /// Load a record, returning `None` when it does not exist.
    async fn get(
        &self,
        identity: &ScheduleIdentity,
    ) -> Result<Option<ScheduleRecord>, ScheduleRepositoryError>;

    /// Delete a record, reporting whether it existed.
    async fn delete(&self, identity: &ScheduleIdentity) -> Result<bool, ScheduleRepositoryError>;

    /// Enumerate records, optionally restricted to one type.
    ///
    /// Entries that disappear or fail to decode mid-scan are skipped; an empty
    /// result is not an error.
    async fn list(
        &self,
        filter: Option<ScheduleType>,
    ) -> Result<Vec<(ScheduleIdentity, ScheduleRecord)>, ScheduleRepositoryError>;

    /// Delete every record in the namespace, returning how many were removed.
    async fn purge(&self) -> Result<u64, ScheduleRepositoryError>;
}

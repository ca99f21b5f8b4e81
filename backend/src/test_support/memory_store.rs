//! In-memory record and timer store with manually driven expiry.
//!
//! Timers never expire on their own; tests call [`InMemoryScheduleStore::expire`]
//! to remove a timer and publish its key exactly as the backing store would.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::broadcast;

use crate::domain::ports::{
    ExpirationStream, ScheduleRepository, ScheduleRepositoryError, TimerStore, TimerStoreError,
};
use crate::domain::{KeyCodec, ScheduleIdentity, ScheduleRecord, ScheduleType};

const EXPIRATION_BUFFER: usize = 256;

#[derive(Default)]
struct StoreState {
    records: HashMap<ScheduleIdentity, ScheduleRecord>,
    malformed: HashSet<ScheduleIdentity>,
    timers: HashMap<ScheduleIdentity, Duration>,
}

/// Shared fake backing both the record and timer ports.
pub struct InMemoryScheduleStore {
    codec: KeyCodec,
    state: Mutex<StoreState>,
    expirations: Mutex<broadcast::Sender<String>>,
    fail_record_writes: AtomicBool,
    fail_record_reads: AtomicBool,
}

impl Default for InMemoryScheduleStore {
    fn default() -> Self {
        Self::with_codec(KeyCodec::default())
    }
}

impl InMemoryScheduleStore {
    /// Empty store using the default key layout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty store publishing timer keys in `codec`'s layout.
    pub fn with_codec(codec: KeyCodec) -> Self {
        let (expirations, _) = broadcast::channel(EXPIRATION_BUFFER);
        Self {
            codec,
            state: Mutex::new(StoreState::default()),
            expirations: Mutex::new(expirations),
            fail_record_writes: AtomicBool::new(false),
            fail_record_reads: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn channel(&self) -> MutexGuard<'_, broadcast::Sender<String>> {
        self.expirations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed a record directly.
    pub fn insert_record(&self, identity: ScheduleIdentity, record: ScheduleRecord) {
        let mut state = self.lock();
        state.malformed.remove(&identity);
        state.records.insert(identity, record);
    }

    /// Seed a record that fails to decode on read.
    pub fn insert_malformed(&self, identity: ScheduleIdentity) {
        self.lock().malformed.insert(identity);
    }

    /// Seed an armed timer directly.
    pub fn insert_timer(&self, identity: ScheduleIdentity, delay: Duration) {
        self.lock().timers.insert(identity, delay);
    }

    /// Current record, if any.
    pub fn record(&self, identity: &ScheduleIdentity) -> Option<ScheduleRecord> {
        self.lock().records.get(identity).cloned()
    }

    /// Delay the timer was last armed with, if it is armed.
    pub fn timer(&self, identity: &ScheduleIdentity) -> Option<Duration> {
        self.lock().timers.get(identity).copied()
    }

    /// Number of stored records.
    pub fn record_count(&self) -> usize {
        self.lock().records.len()
    }

    /// Make subsequent record writes fail with a query error.
    pub fn fail_record_writes(&self, fail: bool) {
        self.fail_record_writes.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent record reads fail with a connection error.
    pub fn fail_record_reads(&self, fail: bool) {
        self.fail_record_reads.store(fail, Ordering::SeqCst);
    }

    /// Expire the timer for `identity` now.
    ///
    /// Returns `false` when no timer was armed, in which case nothing is
    /// published.
    pub fn expire(&self, identity: &ScheduleIdentity) -> bool {
        let removed = self.lock().timers.remove(identity).is_some();
        if removed {
            self.publish_raw(self.codec.timer_key(identity));
        }
        removed
    }

    /// Publish an arbitrary expired key name to current subscribers.
    pub fn publish_raw(&self, key: impl Into<String>) {
        // No subscriber means the notification is lost, as with the real store.
        let _ = self.channel().send(key.into());
    }

    /// End every open expiry stream, as a dropped connection would.
    pub fn disconnect_subscribers(&self) {
        let (replacement, _) = broadcast::channel(EXPIRATION_BUFFER);
        *self.channel() = replacement;
    }

    /// Number of live expiry subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.channel().receiver_count()
    }

    /// Wait until at least one subscriber is listening.
    pub async fn wait_for_subscriber(&self) {
        while self.subscriber_count() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl ScheduleRepository for InMemoryScheduleStore {
    async fn put(
        &self,
        identity: &ScheduleIdentity,
        record: &ScheduleRecord,
    ) -> Result<(), ScheduleRepositoryError> {
        if self.fail_record_writes.load(Ordering::SeqCst) {
            return Err(ScheduleRepositoryError::query("injected write failure"));
        }
        self.insert_record(identity.clone(), record.clone());
        Ok(())
    }

    async fn get(
        &self,
        identity: &ScheduleIdentity,
    ) -> Result<Option<ScheduleRecord>, ScheduleRepositoryError> {
        if self.fail_record_reads.load(Ordering::SeqCst) {
            return Err(ScheduleRepositoryError::connection("injected read failure"));
        }
        let state = self.lock();
        if state.malformed.contains(identity) {
            return Err(ScheduleRepositoryError::decode("injected malformed record"));
        }
        Ok(state.records.get(identity).cloned())
    }

    async fn delete(&self, identity: &ScheduleIdentity) -> Result<bool, ScheduleRepositoryError> {
        let mut state = self.lock();
        let malformed = state.malformed.remove(identity);
        Ok(state.records.remove(identity).is_some() || malformed)
    }

    async fn list(
        &self,
        filter: Option<ScheduleType>,
    ) -> Result<Vec<(ScheduleIdentity, ScheduleRecord)>, ScheduleRepositoryError> {
        if self.fail_record_reads.load(Ordering::SeqCst) {
            return Err(ScheduleRepositoryError::connection("injected read failure"));
        }
        let state = self.lock();
        let mut entries = state
            .records
            .iter()
            .filter(|(identity, _)| {
                filter
                    .as_ref()
                    .is_none_or(|wanted| identity.schedule_type() == wanted)
            })
            .map(|(identity, record)| (identity.clone(), record.clone()))
            .collect::<Vec<_>>();
        entries.sort_by(|(a, _), (b, _)| a.to_string().cmp(&b.to_string()));
        Ok(entries)
    }

    async fn purge(&self) -> Result<u64, ScheduleRepositoryError> {
        let mut state = self.lock();
        let removed = state.records.len() + state.malformed.len();
        state.records.clear();
        state.malformed.clear();
        Ok(removed as u64)
    }
}

#[async_trait]
impl TimerStore for InMemoryScheduleStore {
    async fn arm(
        &self,
        identity: &ScheduleIdentity,
        delay: Duration,
    ) -> Result<(), TimerStoreError> {
        self.insert_timer(identity.clone(), delay);
        Ok(())
    }

    async fn cancel(&self, identity: &ScheduleIdentity) -> Result<(), TimerStoreError> {
        self.lock().timers.remove(identity);
        Ok(())
    }

    async fn remaining(
        &self,
        identity: &ScheduleIdentity,
    ) -> Result<Option<Duration>, TimerStoreError> {
        Ok(self.timer(identity))
    }

    async fn armed_count(&self) -> Result<u64, TimerStoreError> {
        Ok(self.lock().timers.len() as u64)
    }

    async fn purge(&self) -> Result<u64, TimerStoreError> {
        let mut state = self.lock();
        let removed = state.timers.len() as u64;
        state.timers.clear();
        Ok(removed)
    }

    async fn subscribe_expirations(&self) -> Result<ExpirationStream, TimerStoreError> {
        let receiver = self.channel().subscribe();
        let stream = futures_util::stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(key) => return Some((key, receiver)),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(stream.boxed())
    }
}

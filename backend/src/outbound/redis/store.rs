//! Pooled Redis adapter for schedule records and timers.

use std::time::Duration;

use async_trait::async_trait;
use bb8_redis::bb8::{Pool, PooledConnection};
use bb8_redis::redis::aio::MultiplexedConnection;
use bb8_redis::redis::{self, AsyncCommands, Client, RedisError};
use bb8_redis::RedisConnectionManager;
use futures_util::StreamExt;
use thiserror::Error;
use tracing::{info, warn};

use super::error_mapping::{
    repository_error, repository_pool_error, timer_error, timer_pool_error,
};
use super::keyspace::{KeyspaceError, database_index, expired_channel};
use crate::domain::ports::{
    ExpirationStream, ScheduleRepository, ScheduleRepositoryError, TimerStore, TimerStoreError,
};
use crate::domain::{KeyCodec, ScheduleIdentity, ScheduleRecord, ScheduleType};

const NOTIFY_KEYSPACE_EVENTS: &str = "notify-keyspace-events";
// Keyevent notifications for expired keys only.
const EXPIRED_EVENTS: &str = "Ex";

/// Failure establishing the adapter at startup.
#[derive(Debug, Error)]
pub enum RedisConnectError {
    /// Connection URL is malformed.
    #[error(transparent)]
    Keyspace(#[from] KeyspaceError),
    /// Client or pool could not be created or reached.
    #[error("redis connection failed: {0}")]
    Connection(#[from] RedisError),
}

/// Record and timer store over one Redis database.
#[derive(Clone)]
pub struct RedisScheduleStore {
    pool: Pool<RedisConnectionManager>,
    client: Client,
    codec: KeyCodec,
    channel: String,
}

impl RedisScheduleStore {
    /// Connect, verify the server answers, and enable expiry notifications.
    ///
    /// A server that refuses `CONFIG SET` (common on managed offerings) only
    /// produces a warning; notifications must then be enabled server-side.
    ///
    /// # Errors
    ///
    /// Returns [`RedisConnectError`] when the URL is invalid or the server
    /// cannot be reached.
    pub async fn connect(url: &str, codec: KeyCodec) -> Result<Self, RedisConnectError> {
        let db = database_index(url)?;
        let client = Client::open(url)?;
        let manager = RedisConnectionManager::new(url)?;
        let pool = Pool::builder().build(manager).await?;
        let store = Self {
            pool,
            client,
            codec,
            channel: expired_channel(db),
        };
        store.enable_expiry_events().await?;
        info!(db, channel = %store.channel, "connected to redis");
        Ok(store)
    }

    async fn enable_expiry_events(&self) -> Result<(), RedisError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = redis::cmd("PING").query_async(&mut conn).await?;
        let configured: Result<(), RedisError> = redis::cmd("CONFIG")
            .arg("SET")
            .arg(NOTIFY_KEYSPACE_EVENTS)
            .arg(EXPIRED_EVENTS)
            .query_async(&mut conn)
            .await;
        if let Err(error) = configured {
            warn!(%error, "could not enable keyspace notifications, expecting server config");
        }
        Ok(())
    }

    async fn records_conn(
        &self,
    ) -> Result<PooledConnection<'_, RedisConnectionManager>, ScheduleRepositoryError> {
        self.pool.get().await.map_err(repository_pool_error)
    }

    async fn timers_conn(
        &self,
    ) -> Result<PooledConnection<'_, RedisConnectionManager>, TimerStoreError> {
        self.pool.get().await.map_err(timer_pool_error)
    }
}

#[async_trait]
impl ScheduleRepository for RedisScheduleStore {
    async fn put(
        &self,
        identity: &ScheduleIdentity,
        record: &ScheduleRecord,
    ) -> Result<(), ScheduleRepositoryError> {
        let payload = serde_json::to_string(record)
            .map_err(|error| ScheduleRepositoryError::decode(error.to_string()))?;
        let mut conn = self.records_conn().await?;
        conn.set::<_, _, ()>(self.codec.record_key(identity), payload)
            .await
            .map_err(|error| repository_error(&error))
    }

    async fn get(
        &self,
        identity: &ScheduleIdentity,
    ) -> Result<Option<ScheduleRecord>, ScheduleRepositoryError> {
        let mut conn = self.records_conn().await?;
        let payload: Option<String> = conn
            .get(self.codec.record_key(identity))
            .await
            .map_err(|error| repository_error(&error))?;
        payload
            .map(|raw| decode_record(&raw))
            .transpose()
    }

    async fn delete(&self, identity: &ScheduleIdentity) -> Result<bool, ScheduleRepositoryError> {
        let mut conn = self.records_conn().await?;
        let removed: u64 = conn
            .del(self.codec.record_key(identity))
            .await
            .map_err(|error| repository_error(&error))?;
        Ok(removed > 0)
    }

    async fn list(
        &self,
        filter: Option<ScheduleType>,
    ) -> Result<Vec<(ScheduleIdentity, ScheduleRecord)>, ScheduleRepositoryError> {
        let mut conn = self.records_conn().await?;
        let keys = scan_keys(&mut conn, self.codec.record_pattern(filter.as_ref()))
            .await
            .map_err(|error| repository_error(&error))?;

        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(identity) = self.codec.decode_record_key(&key) else {
                warn!(key, "skipping key outside the record layout");
                continue;
            };
            let payload: Option<String> = conn
                .get(key.as_str())
                .await
                .map_err(|error| repository_error(&error))?;
            // Deleted between SCAN and GET.
            let Some(raw) = payload else { continue };
            match decode_record(&raw) {
                Ok(record) => entries.push((identity, record)),
                Err(error) => warn!(key, %error, "skipping undecodable schedule record"),
            }
        }
        Ok(entries)
    }

    async fn purge(&self) -> Result<u64, ScheduleRepositoryError> {
        let mut conn = self.records_conn().await?;
        delete_matching(&mut conn, self.codec.record_pattern(None))
            .await
            .map_err(|error| repository_error(&error))
    }
}

#[async_trait]
impl TimerStore for RedisScheduleStore {
    async fn arm(
        &self,
        identity: &ScheduleIdentity,
        delay: Duration,
    ) -> Result<(), TimerStoreError> {
        let mut conn = self.timers_conn().await?;
        conn.set_ex::<_, _, ()>(self.codec.timer_key(identity), "", delay.as_secs().max(1))
            .await
            .map_err(|error| timer_error(&error))
    }

    async fn cancel(&self, identity: &ScheduleIdentity) -> Result<(), TimerStoreError> {
        let mut conn = self.timers_conn().await?;
        conn.del::<_, ()>(self.codec.timer_key(identity))
            .await
            .map_err(|error| timer_error(&error))
    }

    async fn remaining(
        &self,
        identity: &ScheduleIdentity,
    ) -> Result<Option<Duration>, TimerStoreError> {
        let mut conn = self.timers_conn().await?;
        let millis: i64 = conn
            .pttl(self.codec.timer_key(identity))
            .await
            .map_err(|error| timer_error(&error))?;
        Ok(remaining_from_pttl(millis))
    }

    async fn armed_count(&self) -> Result<u64, TimerStoreError> {
        let mut conn = self.timers_conn().await?;
        let keys = scan_keys(&mut conn, self.codec.timer_pattern(None))
            .await
            .map_err(|error| timer_error(&error))?;
        Ok(keys.len() as u64)
    }

    async fn purge(&self) -> Result<u64, TimerStoreError> {
        let mut conn = self.timers_conn().await?;
        delete_matching(&mut conn, self.codec.timer_pattern(None))
            .await
            .map_err(|error| timer_error(&error))
    }

    async fn subscribe_expirations(&self) -> Result<ExpirationStream, TimerStoreError> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|error| TimerStoreError::subscription(error.to_string()))?;
        pubsub
            .subscribe(&self.channel)
            .await
            .map_err(|error| TimerStoreError::subscription(error.to_string()))?;
        let stream = pubsub.into_on_message().filter_map(|message| async move {
            match message.get_payload::<String>() {
                Ok(key) => Some(key),
                Err(error) => {
                    warn!(%error, "dropping unreadable expiry notification");
                    None
                }
            }
        });
        Ok(stream.boxed())
    }
}

async fn delete_matching(
    conn: &mut MultiplexedConnection,
    pattern: String,
) -> Result<u64, RedisError> {
    let keys = scan_keys(conn, pattern).await?;
    if keys.is_empty() {
        return Ok(0);
    }
    conn.del(keys).await
}

// SCAN may repeat a key across batches; the result is sorted and unique.
async fn scan_keys(
    conn: &mut MultiplexedConnection,
    pattern: String,
) -> Result<Vec<String>, RedisError> {
    let mut keys = Vec::new();
    {
        let mut iter = conn.scan_match::<_, String>(pattern).await?;
        while let Some(key) = iter.next_item().await {
            keys.push(key?);
        }
    }
    keys.sort_unstable();
    keys.dedup();
    Ok(keys)
}

fn decode_record(raw: &str) -> Result<ScheduleRecord, ScheduleRepositoryError> {
    serde_json::from_str(raw).map_err(|error| ScheduleRepositoryError::decode(error.to_string()))
}

// PTTL answers -2 for a missing key and -1 for a key without expiry.
fn remaining_from_pttl(millis: i64) -> Option<Duration> {
    u64::try_from(millis).ok().map(Duration::from_millis)
}

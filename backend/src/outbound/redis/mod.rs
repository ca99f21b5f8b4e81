//! Redis outbound adapters.
//!
//! One adapter backs both the record and timer ports: records are plain
//! string keys holding JSON, timers are empty keys with a TTL, and expiry is
//! observed through keyspace event notifications on a dedicated pub/sub
//! connection.

mod error_mapping;
mod keyspace;
mod store;

pub use keyspace::{KeyspaceError, database_index, expired_channel};
pub use store::{RedisConnectError, RedisScheduleStore};

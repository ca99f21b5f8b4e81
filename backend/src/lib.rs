//! Delayed webhook scheduler.
//!
//! Callers register a webhook to be POSTed after a delay. Each schedule is a
//! persistent record plus an expiring timer key in Redis; when the timer
//! expires the dispatch loop delivers the webhook and either tears the
//! schedule down or re-arms the timer for a retry.

pub mod config;
pub mod domain;
pub mod inbound;
pub mod middleware;
pub mod outbound;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use middleware::Trace;

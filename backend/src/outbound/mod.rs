//! Outbound adapters implementing domain ports for external infrastructure.
//!
//! - **redis**: record store, timer store, and expiry feed over one Redis
//!   database
//! - **webhook**: reqwest-backed webhook delivery
//!
//! Adapters are thin translators that convert between domain types and
//! infrastructure-specific representations. They contain no business logic.

pub mod redis;
pub mod webhook;

//! Test utilities for the scheduler crate.
//!
//! Shared by unit tests (in `src/`) and integration tests (in `tests/`, via
//! the `test-support` feature). None of this is wired into the binary.

mod clock;
mod memory_store;
mod webhook;

pub use clock::MutableClock;
pub use memory_store::InMemoryScheduleStore;
pub use webhook::ScriptedWebhookSender;

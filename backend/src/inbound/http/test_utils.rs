//! Test helpers for inbound HTTP components.

use std::sync::Arc;

use mockable::DefaultClock;

use super::state::HttpState;
use crate::domain::{KeyCodec, ScheduleService};
use crate::test_support::InMemoryScheduleStore;

/// HTTP state over a fresh in-memory store, returned alongside the store.
pub fn http_state(token: &str) -> (HttpState, Arc<InMemoryScheduleStore>) {
    let store = Arc::new(InMemoryScheduleStore::new());
    let service = ScheduleService::new(
        store.clone(),
        store.clone(),
        KeyCodec::default(),
        Arc::new(DefaultClock),
    );
    (HttpState::new(Arc::new(service), token), store)
}

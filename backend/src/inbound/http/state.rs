//! Shared HTTP adapter state.
//!
//! HTTP handlers accept this state via `actix_web::web::Data` so they only
//! depend on the schedule use cases and remain testable without I/O.

use std::sync::Arc;

use crate::domain::ScheduleService;

/// Dependency bundle for HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    /// Schedule use cases.
    pub schedules: Arc<ScheduleService>,
    api_token: Arc<str>,
}

impl HttpState {
    /// Bundle the service with the token every protected route requires.
    pub fn new(schedules: Arc<ScheduleService>, api_token: impl Into<Arc<str>>) -> Self {
        Self {
            schedules,
            api_token: api_token.into(),
        }
    }

    /// Whether `presented` matches the configured token exactly.
    pub fn accepts_token(&self, presented: &str) -> bool {
        *self.api_token == *presented
    }
}

//! Translate Redis and pool failures into port errors.

use bb8_redis::bb8::RunError;
use bb8_redis::redis::RedisError;

use crate::domain::ports::{ScheduleRepositoryError, TimerStoreError};

fn is_connection_failure(error: &RedisError) -> bool {
    error.is_io_error()
        || error.is_connection_refusal()
        || error.is_connection_dropped()
        || error.is_timeout()
}

pub(super) fn repository_error(error: &RedisError) -> ScheduleRepositoryError {
    if is_connection_failure(error) {
        ScheduleRepositoryError::connection(error.to_string())
    } else {
        ScheduleRepositoryError::query(error.to_string())
    }
}

pub(super) fn repository_pool_error(error: RunError<RedisError>) -> ScheduleRepositoryError {
    match error {
        RunError::User(inner) => repository_error(&inner),
        RunError::TimedOut => ScheduleRepositoryError::connection("timed out waiting for a connection"),
    }
}

pub(super) fn timer_error(error: &RedisError) -> TimerStoreError {
    if is_connection_failure(error) {
        TimerStoreError::connection(error.to_string())
    } else {
        TimerStoreError::command(error.to_string())
    }
}

pub(super) fn timer_pool_error(error: RunError<RedisError>) -> TimerStoreError {
    match error {
        RunError::User(inner) => timer_error(&inner),
        RunError::TimedOut => TimerStoreError::connection("timed out waiting for a connection"),
    }
}

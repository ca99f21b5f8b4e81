//! Keyspace notification channel derived from the connection URL.

use thiserror::Error;
use url::Url;

/// Connection URL could not be interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyspaceError {
    /// Not a URL at all.
    #[error("invalid redis url: {message}")]
    InvalidUrl { message: String },
    /// Path or `db` parameter is not a database number.
    #[error("invalid redis database index {found:?}")]
    InvalidDatabase { found: String },
}

/// Database number selected by `url`, defaulting to `0`.
///
/// TCP URLs carry it as the path (`redis://host:6379/2`); unix socket URLs
/// carry it as the `db` query parameter.
///
/// ```
/// use webhook_scheduler::outbound::redis::database_index;
///
/// assert_eq!(database_index("redis://localhost:6379/3"), Ok(3));
/// assert_eq!(database_index("redis://localhost"), Ok(0));
/// ```
pub fn database_index(url: &str) -> Result<u32, KeyspaceError> {
    let parsed = Url::parse(url).map_err(|error| KeyspaceError::InvalidUrl {
        message: error.to_string(),
    })?;
    let from_query = parsed
        .query_pairs()
        .find(|(name, _)| name == "db")
        .map(|(_, value)| value.into_owned());
    let raw = match parsed.scheme() {
        "redis+unix" | "unix" => from_query.unwrap_or_default(),
        _ => parsed.path().trim_start_matches('/').to_owned(),
    };
    if raw.is_empty() {
        return Ok(0);
    }
    raw.parse()
        .map_err(|_| KeyspaceError::InvalidDatabase { found: raw })
}

/// Channel publishing names of keys expired in database `db`.
pub fn expired_channel(db: u32) -> String {
    format!("__keyevent@{db}__:expired")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("redis://127.0.0.1:6379", 0)]
    #[case("redis://127.0.0.1:6379/", 0)]
    #[case("redis://:secret@cache.internal:6380/7", 7)]
    #[case("rediss://cache.internal/12", 12)]
    #[case("redis+unix:///var/run/redis.sock?db=4", 4)]
    #[case("unix:///var/run/redis.sock", 0)]
    fn reads_database_from_url(#[case] url: &str, #[case] expected: u32) {
        assert_eq!(database_index(url), Ok(expected));
    }

    #[rstest]
    #[case("redis://localhost/primary")]
    #[case("redis://localhost/-1")]
    fn rejects_non_numeric_database(#[case] url: &str) {
        assert!(matches!(
            database_index(url),
            Err(KeyspaceError::InvalidDatabase { .. })
        ));
    }

    #[test]
    fn rejects_garbage_url() {
        assert!(matches!(
            database_index("not a url"),
            Err(KeyspaceError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn channel_names_the_database() {
        assert_eq!(expired_channel(5), "__keyevent@5__:expired");
    }
}

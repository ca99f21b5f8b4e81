//! Optional Redis adapter smoke tests gated by SCHEDULER_TEST_REDIS_URL.
//! Use `cargo test -- --ignored` with the variable pointing at a disposable
//! server, e.g. `SCHEDULER_TEST_REDIS_URL=redis://127.0.0.1:6379/15`.

use std::time::Duration;

use futures_util::StreamExt;
use serde_json::json;
use uuid::Uuid;

use webhook_scheduler::domain::ports::{ScheduleRepository, TimerStore};
use webhook_scheduler::domain::{KeyCodec, ScheduleIdentity, ScheduleRecord, ScheduleType};
use webhook_scheduler::outbound::redis::RedisScheduleStore;

const REDIS_URL_VAR: &str = "SCHEDULER_TEST_REDIS_URL";

/// Connect under a namespace unique to the calling test.
async fn connect() -> Option<(RedisScheduleStore, KeyCodec)> {
    let Ok(url) = std::env::var(REDIS_URL_VAR) else {
        eprintln!("SKIP-REDIS: set {REDIS_URL_VAR} to run");
        return None;
    };
    let codec = KeyCodec::new(format!("smoke{}", Uuid::new_v4().simple()))
        .expect("generated namespace is valid");
    let store = RedisScheduleStore::connect(&url, codec.clone())
        .await
        .expect("redis should be reachable");
    Some((store, codec))
}

fn record(ttl: u64) -> ScheduleRecord {
    ScheduleRecord {
        webhook: "https://hooks.test/fire".to_owned(),
        ttl,
        retry: 0,
        data: json!({ "order": 7 }),
    }
}

fn identity(kind: &str) -> ScheduleIdentity {
    ScheduleIdentity::generate(ScheduleType::new(kind).expect("valid type"))
}

#[tokio::test]
#[ignore = "requires a Redis server; opt-in via SCHEDULER_TEST_REDIS_URL"]
async fn records_round_trip_and_purge() {
    let Some((store, _codec)) = connect().await else {
        return;
    };
    let first = identity("invoice");
    let second = identity("reminder");
    store.put(&first, &record(60)).await.expect("put first");
    store.put(&second, &record(120)).await.expect("put second");

    let fetched = store.get(&first).await.expect("get");
    assert_eq!(fetched, Some(record(60)));

    let invoices = store
        .list(Some(first.schedule_type().clone()))
        .await
        .expect("list filtered");
    assert_eq!(invoices, vec![(first.clone(), record(60))]);
    assert_eq!(store.list(None).await.expect("list all").len(), 2);

    assert!(store.delete(&second).await.expect("delete"));
    assert!(!store.delete(&second).await.expect("repeat delete"));

    let purged = ScheduleRepository::purge(&store).await.expect("purge");
    assert_eq!(purged, 1);
    assert_eq!(store.get(&first).await.expect("get after purge"), None);
}

#[tokio::test]
#[ignore = "requires a Redis server; opt-in via SCHEDULER_TEST_REDIS_URL"]
async fn timers_report_remaining_time_until_cancelled() {
    let Some((store, _codec)) = connect().await else {
        return;
    };
    let armed = identity("invoice");
    store
        .arm(&armed, Duration::from_secs(60))
        .await
        .expect("arm");

    let remaining = store
        .remaining(&armed)
        .await
        .expect("remaining")
        .expect("timer is armed");
    assert!(remaining <= Duration::from_secs(60));
    assert!(remaining > Duration::from_secs(50));
    assert_eq!(store.armed_count().await.expect("count"), 1);

    store.cancel(&armed).await.expect("cancel");
    assert_eq!(store.remaining(&armed).await.expect("remaining"), None);

    store
        .arm(&armed, Duration::from_secs(60))
        .await
        .expect("re-arm");
    assert_eq!(TimerStore::purge(&store).await.expect("purge"), 1);
    assert_eq!(store.armed_count().await.expect("count"), 0);
}

#[tokio::test]
#[ignore = "requires a Redis server; opt-in via SCHEDULER_TEST_REDIS_URL"]
async fn expired_timer_is_announced() {
    let Some((store, codec)) = connect().await else {
        return;
    };
    let mut expirations = store.subscribe_expirations().await.expect("subscribe");
    let armed = identity("invoice");
    store.arm(&armed, Duration::from_secs(1)).await.expect("arm");

    let expected = codec.timer_key(&armed);
    // Other tests share the database, so skip their expiries.
    let announced = tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(key) = expirations.next().await {
            if key == expected {
                return true;
            }
        }
        false
    })
    .await
    .expect("expiry should be announced within the timeout");
    assert!(announced, "expiry feed ended before the timer fired");
}

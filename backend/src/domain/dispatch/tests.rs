//! Dispatch loop behaviour against the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rstest::rstest;
use serde_json::json;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;

use super::{DispatchLoop, InFlightDeliveries};
use crate::domain::delivery_worker::{DeliveryWorker, DeliveryWorkerPorts, ORPHAN_REARM_DELAY};
use crate::domain::ports::{WebhookDelivery, WebhookSendError, WebhookSender};
use crate::domain::{KeyCodec, RetryPolicy, ScheduleIdentity, ScheduleRecord, ScheduleType};
use crate::test_support::{InMemoryScheduleStore, ScriptedWebhookSender};

const WAIT_LIMIT: Duration = Duration::from_secs(5);

fn record() -> ScheduleRecord {
    ScheduleRecord {
        webhook: "https://hooks.example.com/fire".to_owned(),
        ttl: 10,
        retry: 0,
        data: json!({"id": 1}),
    }
}

async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT_LIMIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Sender that blocks every call until released.
#[derive(Default)]
struct GatedSender {
    gate: Notify,
}

#[async_trait]
impl WebhookSender for GatedSender {
    async fn send(&self, _delivery: &WebhookDelivery) -> Result<(), WebhookSendError> {
        self.gate.notified().await;
        Ok(())
    }
}

struct Running {
    in_flight: InFlightDeliveries,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl Running {
    async fn stop(self) {
        let _ = self.stop.send(());
        tokio::time::timeout(WAIT_LIMIT, self.handle)
            .await
            .expect("loop stopped")
            .expect("loop task");
    }
}

fn start(
    store: Arc<InMemoryScheduleStore>,
    sender: Arc<dyn WebhookSender>,
    configure: impl FnOnce(DispatchLoop) -> DispatchLoop,
) -> Running {
    let worker = Arc::new(DeliveryWorker::new(
        DeliveryWorkerPorts::new(store.clone(), store.clone(), sender),
        RetryPolicy::from_settings(3, 1).expect("policy"),
    ));
    let dispatch = configure(
        DispatchLoop::new(KeyCodec::default(), store.clone(), worker)
            .with_resubscribe_delay(Duration::from_millis(10)),
    );
    let in_flight = dispatch.in_flight();
    let (stop, stopped) = oneshot::channel::<()>();
    let handle = tokio::spawn(dispatch.run(async move {
        let _ = stopped.await;
    }));
    Running {
        in_flight,
        stop,
        handle,
    }
}

#[rstest]
#[tokio::test]
async fn expired_timer_delivers_and_removes_schedule() {
    let store = Arc::new(InMemoryScheduleStore::new());
    let sender = Arc::new(ScriptedWebhookSender::accepting());
    let identity = ScheduleIdentity::generate(ScheduleType::default());
    store.insert_record(identity.clone(), record());
    store.insert_timer(identity.clone(), Duration::from_secs(10));

    let running = start(store.clone(), sender.clone(), |d| d);
    store.wait_for_subscriber().await;
    assert!(store.expire(&identity));

    eventually(|| store.record(&identity).is_none()).await;
    assert_eq!(sender.attempts(), 1);
    running.stop().await;
}

#[rstest]
#[case::foreign("session:42")]
#[case::record_key("rsch:default:0123abcd")]
#[case::other_namespace("jobs-ref:default:0123abcd")]
#[case::missing_id("rsch-ref:default")]
#[tokio::test]
async fn foreign_keys_are_ignored(#[case] key: &str) {
    let store = Arc::new(InMemoryScheduleStore::new());
    let sender = Arc::new(ScriptedWebhookSender::accepting());
    let ours = ScheduleIdentity::generate(ScheduleType::default());
    store.insert_record(ours.clone(), record());
    store.insert_timer(ours.clone(), Duration::from_secs(10));

    let running = start(store.clone(), sender.clone(), |d| d.with_orphan_recovery(false));
    store.wait_for_subscriber().await;
    store.publish_raw(key);
    store.expire(&ours);

    eventually(|| store.record(&ours).is_none()).await;
    assert_eq!(sender.attempts(), 1);
    running.stop().await;
}

#[rstest]
#[tokio::test]
async fn lost_subscription_is_restored_and_orphans_rearmed() {
    let store = Arc::new(InMemoryScheduleStore::new());
    let sender = Arc::new(ScriptedWebhookSender::accepting());
    let running = start(store.clone(), sender.clone(), |d| d);
    store.wait_for_subscriber().await;

    store.disconnect_subscribers();
    let orphan = ScheduleIdentity::generate(ScheduleType::new("billing").expect("type"));
    store.insert_record(orphan.clone(), record());

    store.wait_for_subscriber().await;
    eventually(|| store.timer(&orphan) == Some(ORPHAN_REARM_DELAY)).await;

    store.expire(&orphan);
    eventually(|| store.record(&orphan).is_none()).await;
    assert_eq!(sender.attempts(), 1);
    running.stop().await;
}

#[rstest]
#[tokio::test]
async fn startup_sweep_can_be_disabled() {
    let store = Arc::new(InMemoryScheduleStore::new());
    let orphan = ScheduleIdentity::generate(ScheduleType::default());
    store.insert_record(orphan.clone(), record());

    let running = start(
        store.clone(),
        Arc::new(ScriptedWebhookSender::accepting()),
        |d| d.with_orphan_recovery(false),
    );
    store.wait_for_subscriber().await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(store.timer(&orphan).is_none());
    running.stop().await;
}

#[rstest]
#[tokio::test]
async fn shutdown_waits_for_in_flight_firings() {
    let store = Arc::new(InMemoryScheduleStore::new());
    let sender = Arc::new(GatedSender::default());
    let identity = ScheduleIdentity::generate(ScheduleType::default());
    store.insert_record(identity.clone(), record());
    store.insert_timer(identity.clone(), Duration::from_secs(10));

    let running = start(store.clone(), sender.clone(), |d| d);
    store.wait_for_subscriber().await;
    store.expire(&identity);
    let gauge = running.in_flight.clone();
    eventually(|| gauge.current() == 1).await;

    let Running { stop, handle, .. } = running;
    let _ = stop.send(());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!handle.is_finished(), "loop must wait for the firing");

    sender.gate.notify_one();
    tokio::time::timeout(WAIT_LIMIT, handle)
        .await
        .expect("drained")
        .expect("loop task");
    assert_eq!(gauge.current(), 0);
    assert!(store.record(&identity).is_none());
}

#[rstest]
#[tokio::test]
async fn concurrency_limit_caps_parallel_firings() {
    let store = Arc::new(InMemoryScheduleStore::new());
    let sender = Arc::new(GatedSender::default());
    let first = ScheduleIdentity::generate(ScheduleType::default());
    let second = ScheduleIdentity::generate(ScheduleType::default());
    for identity in [&first, &second] {
        store.insert_record(identity.clone(), record());
        store.insert_timer(identity.clone(), Duration::from_secs(10));
    }

    let running = start(store.clone(), sender.clone(), |d| {
        d.with_concurrency_limit(Some(1))
    });
    store.wait_for_subscriber().await;
    store.expire(&first);
    store.expire(&second);

    let gauge = running.in_flight.clone();
    eventually(|| gauge.current() == 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(gauge.current(), 1);

    sender.gate.notify_one();
    eventually(|| store.record_count() == 1).await;
    sender.gate.notify_one();
    eventually(|| store.record_count() == 0).await;
    running.stop().await;
}

//! Dispatch loop turning timer expiry notifications into firings.
//!
//! The loop owns one expiry subscription at a time. Every recognised timer key
//! is handed to the [`DeliveryWorker`] on its own task, so a slow webhook never
//! delays other schedules. When the subscription ends the loop backs off,
//! subscribes again, and re-arms records whose notification was missed in the
//! gap. On shutdown it stops reading notifications and waits for in-flight
//! firings to finish.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::domain::delivery_worker::DeliveryWorker;
use crate::domain::ports::{ExpirationStream, TimerStore};
use crate::domain::{KeyCodec, ScheduleIdentity, TimerKeyMatch};

/// Pause between a lost subscription and the next attempt.
pub const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);

/// Shared gauge of firings currently executing.
#[derive(Debug, Clone, Default)]
pub struct InFlightDeliveries(Arc<AtomicUsize>);

impl InFlightDeliveries {
    /// Fresh gauge at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Firings executing right now.
    pub fn current(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn enter(&self) -> InFlightGuard {
        self.0.fetch_add(1, Ordering::SeqCst);
        InFlightGuard(Arc::clone(&self.0))
    }
}

struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Long-running consumer of timer expiry notifications.
pub struct DispatchLoop {
    codec: KeyCodec,
    timers: Arc<dyn TimerStore>,
    worker: Arc<DeliveryWorker>,
    limiter: Option<Arc<Semaphore>>,
    in_flight: InFlightDeliveries,
    recover_orphans: bool,
    resubscribe_delay: Duration,
}

impl DispatchLoop {
    /// Build a loop with unbounded concurrency and orphan recovery enabled.
    pub fn new(codec: KeyCodec, timers: Arc<dyn TimerStore>, worker: Arc<DeliveryWorker>) -> Self {
        Self {
            codec,
            timers,
            worker,
            limiter: None,
            in_flight: InFlightDeliveries::new(),
            recover_orphans: true,
            resubscribe_delay: RESUBSCRIBE_DELAY,
        }
    }

    /// Cap concurrent firings; `None` leaves them unbounded.
    #[must_use]
    pub fn with_concurrency_limit(mut self, limit: Option<usize>) -> Self {
        self.limiter = limit.map(|permits| Arc::new(Semaphore::new(permits.max(1))));
        self
    }

    /// Report executing firings through `gauge`.
    #[must_use]
    pub fn with_in_flight(mut self, gauge: InFlightDeliveries) -> Self {
        self.in_flight = gauge;
        self
    }

    /// Toggle the orphan sweep run after every (re)subscription.
    #[must_use]
    pub fn with_orphan_recovery(mut self, enabled: bool) -> Self {
        self.recover_orphans = enabled;
        self
    }

    /// Override the pause between subscription attempts.
    #[must_use]
    pub fn with_resubscribe_delay(mut self, delay: Duration) -> Self {
        self.resubscribe_delay = delay;
        self
    }

    /// Gauge of executing firings.
    pub fn in_flight(&self) -> InFlightDeliveries {
        self.in_flight.clone()
    }

    /// Consume notifications until `shutdown` resolves, then drain.
    pub async fn run<F>(self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);
        let mut firings = JoinSet::new();

        'subscription: loop {
            let subscribed = tokio::select! {
                () = &mut shutdown => break 'subscription,
                subscribed = self.timers.subscribe_expirations() => subscribed,
            };
            match subscribed {
                Ok(stream) => {
                    info!("subscribed to timer expirations");
                    if self.recover_orphans {
                        self.sweep_orphans().await;
                    }
                    if self.consume(stream, &mut firings, &mut shutdown).await {
                        break 'subscription;
                    }
                    warn!("expiry subscription ended, resubscribing");
                }
                Err(error) => warn!(%error, "expiry subscription failed"),
            }

            tokio::select! {
                () = &mut shutdown => break 'subscription,
                () = tokio::time::sleep(self.resubscribe_delay) => {}
            }
        }

        if !firings.is_empty() {
            info!(pending = firings.len(), "draining in-flight firings");
        }
        while let Some(joined) = firings.join_next().await {
            log_join(joined);
        }
        info!("dispatch loop stopped");
    }

    // Returns `true` when shutdown was requested, `false` when the stream ended.
    async fn consume<F>(
        &self,
        mut stream: ExpirationStream,
        firings: &mut JoinSet<()>,
        shutdown: &mut std::pin::Pin<&mut F>,
    ) -> bool
    where
        F: Future<Output = ()> + Send,
    {
        loop {
            tokio::select! {
                () = shutdown.as_mut() => return true,
                Some(joined) = firings.join_next(), if !firings.is_empty() => log_join(joined),
                next = stream.next() => match next {
                    Some(key) => self.dispatch(&key, firings),
                    None => return false,
                },
            }
        }
    }

    fn dispatch(&self, key: &str, firings: &mut JoinSet<()>) {
        let identity = match self.codec.decode_timer_key(key) {
            TimerKeyMatch::Recognized(identity) => identity,
            TimerKeyMatch::NotRecognized => {
                debug!(key, "ignoring foreign expired key");
                return;
            }
        };
        let span = info_span!("firing", schedule = %identity);
        let worker = Arc::clone(&self.worker);
        let limiter = self.limiter.clone();
        let in_flight = self.in_flight.clone();
        firings.spawn(
            async move {
                let Some(_permit) = admit(limiter).await else {
                    return;
                };
                let _guard = in_flight.enter();
                fire(&worker, &identity).await;
            }
            .instrument(span),
        );
    }

    async fn sweep_orphans(&self) {
        match self.worker.rearm_orphans().await {
            Ok(0) => debug!("no orphaned schedules"),
            Ok(count) => info!(count, "re-armed orphaned schedules"),
            Err(error) => error!(%error, "orphan recovery failed"),
        }
    }
}

// `Some(None)` means unbounded; `None` means the limiter was closed.
async fn admit(limiter: Option<Arc<Semaphore>>) -> Option<Option<OwnedSemaphorePermit>> {
    match limiter {
        None => Some(None),
        Some(semaphore) => match semaphore.acquire_owned().await {
            Ok(permit) => Some(Some(permit)),
            Err(_) => {
                warn!("delivery limiter closed, firing skipped");
                None
            }
        },
    }
}

async fn fire(worker: &DeliveryWorker, identity: &ScheduleIdentity) {
    match worker.fire(identity).await {
        Ok(outcome) => debug!(?outcome, "firing finished"),
        Err(error) => error!(%error, "firing aborted"),
    }
}

fn log_join(joined: Result<(), JoinError>) {
    if let Err(error) = joined {
        error!(%error, "firing task failed");
    }
}

#[cfg(test)]
mod tests;

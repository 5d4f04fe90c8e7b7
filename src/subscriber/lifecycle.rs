//! Subscriber lifecycle: start, listen loop, dispatch, shutdown.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use futures::{FutureExt, StreamExt};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::bus::{BusError, BusMessage, BusSubscription};
use crate::protocol::{self, SyncEvent};
use crate::resilience::retry::{retry, RetryConfig};
use crate::storage::StorageError;

use super::{SubscriberError, SubscriberState, SyncSubscriber, SyncTarget};

impl SyncSubscriber {
    /// Start the listening loop. Calling it again is a no-op.
    ///
    /// With `wait_for_ready`, blocks until the subscription is live or the
    /// configured ready timeout passes ([`SubscriberError::Timeout`]).
    #[tracing::instrument(skip(self))]
    pub async fn start(self: &Arc<Self>, wait_for_ready: bool) -> Result<(), SubscriberError> {
        if *self.shutdown.borrow() {
            return Err(SubscriberError::Stopped);
        }
        {
            let mut task = self.task.lock();
            if task.is_none() {
                info!(topics = ?self.topics.all(), "Starting sync subscriber");
                self.set_state(SubscriberState::Connecting);
                let this = Arc::clone(self);
                *task = Some(tokio::spawn(async move { this.run().await }));
            }
        }
        if wait_for_ready {
            self.wait_until_subscribed(self.ready_timeout).await?;
        }
        Ok(())
    }

    /// Wait up to `timeout` for the `Subscribed` state.
    pub async fn wait_until_subscribed(&self, timeout: Duration) -> Result<(), SubscriberError> {
        let mut rx = self.state_rx.clone();
        let reached = tokio::time::timeout(timeout, async {
            rx.wait_for(|s| matches!(s, SubscriberState::Subscribed | SubscriberState::Stopped))
                .await
                .map(|state| *state)
        })
        .await;

        match reached {
            Ok(Ok(SubscriberState::Subscribed)) => Ok(()),
            Ok(_) => Err(SubscriberError::Stopped),
            Err(_) => {
                warn!(?timeout, state = %self.state(), "Subscriber not ready in time");
                Err(SubscriberError::Timeout(timeout))
            }
        }
    }

    /// Stop the loop and drop the subscription. The subscriber cannot be
    /// restarted afterwards.
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Subscriber task ended abnormally");
            }
        }
        self.set_state(SubscriberState::Stopped);
        info!("Sync subscriber stopped");
    }

    async fn run(self: Arc<Self>) {
        let mut shutdown_rx = self.shutdown.subscribe();
        let mut attempt = 0u64;

        loop {
            if attempt > 0 {
                crate::metrics::record_reconnect();
            }
            attempt += 1;
            self.set_state(SubscriberState::Connecting);

            let subscribed = tokio::select! {
                _ = shutdown_rx.wait_for(|stop| *stop) => return,
                result = self.subscribe_with_retry() => result,
            };
            let mut subscription = match subscribed {
                Ok(subscription) => subscription,
                Err(e) => {
                    warn!(error = %e, "Subscribe failed");
                    self.set_state(SubscriberState::Disconnected);
                    if self.pause(&mut shutdown_rx).await {
                        return;
                    }
                    continue;
                }
            };

            self.set_state(SubscriberState::Subscribed);
            info!(attempt, "Sync subscriber listening");

            loop {
                let next = tokio::select! {
                    _ = shutdown_rx.wait_for(|stop| *stop) => return,
                    next = subscription.next() => next,
                };
                match next {
                    Some(Ok(message)) => self.handle_message(message).await,
                    Some(Err(BusError::Lagged(dropped))) => {
                        warn!(dropped, "Subscriber fell behind; remote events were missed");
                        crate::metrics::record_error("bus", "receive", "lagged");
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Subscription failed");
                        break;
                    }
                    None => {
                        warn!("Subscription closed by the bus");
                        break;
                    }
                }
            }

            self.set_state(SubscriberState::Disconnected);
            crate::metrics::record_connection_error("bus");
            if self.pause(&mut shutdown_rx).await {
                return;
            }
        }
    }

    async fn subscribe_with_retry(&self) -> Result<BusSubscription, BusError> {
        let topics = self.topics.all();
        retry("bus_subscribe", &RetryConfig::reconnect(self.reconnect_delay), || {
            let bus = Arc::clone(&self.bus);
            let topics = topics.clone();
            async move { bus.subscribe(&topics).await }
        })
        .await
    }

    /// Sleep out the reconnect delay. Returns true if shutdown was requested.
    async fn pause(&self, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            _ = shutdown_rx.wait_for(|stop| *stop) => true,
            _ = tokio::time::sleep(self.reconnect_delay) => false,
        }
    }

    pub(super) async fn handle_message(&self, message: BusMessage) {
        match protocol::decode(&self.topics, &message.topic, &message.payload) {
            Ok(event) => self.dispatch(&event).await,
            Err(e) => {
                let kind = self.topics.kind_of(&message.topic).map_or("unknown", |k| k.as_str());
                warn!(topic = %message.topic, error = %e, "Dropping malformed sync message");
                crate::metrics::record_protocol_error(kind);
            }
        }
    }

    /// Apply `event` to every live target except its origin. A failing or
    /// panicking target does not stop delivery to the others.
    pub(super) async fn dispatch(&self, event: &SyncEvent) {
        let targets = self.live_targets();
        let mut applied = 0usize;

        for target in &targets {
            let outcome = AssertUnwindSafe(apply_event(target.as_ref(), event))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(count)) => applied += count,
                Ok(Err(e)) => {
                    warn!(origin_id = target.origin_id(), kind = %event.kind(), error = %e, "Failed to apply remote event");
                    crate::metrics::record_error("local", "apply_remote", "storage");
                }
                Err(_) => {
                    error!(origin_id = target.origin_id(), kind = %event.kind(), "Cache instance panicked applying remote event");
                    crate::metrics::record_error("local", "apply_remote", "panic");
                }
            }
        }

        if applied > 0 {
            crate::metrics::record_remote_apply(event.kind().as_str(), applied);
        }
        debug!(kind = %event.kind(), records = event.len(), targets = targets.len(), applied, "Dispatched remote event");
    }
}

/// Apply one event to one target, skipping records it produced itself.
async fn apply_event(target: &dyn SyncTarget, event: &SyncEvent) -> Result<usize, StorageError> {
    let own_id = target.origin_id();
    match event {
        SyncEvent::Write(records) => {
            let mut applied = 0;
            for record in records.iter().filter(|r| r.origin_id != own_id) {
                target.apply_remote_write(&record.key, record.entry.clone()).await?;
                applied += 1;
            }
            Ok(applied)
        }
        SyncEvent::Delete(delete) if delete.origin_id != own_id => {
            target.apply_remote_delete(&delete.key).await?;
            Ok(1)
        }
        SyncEvent::Clear(clear) if clear.origin_id != own_id => {
            target.apply_remote_clear().await?;
            Ok(1)
        }
        SyncEvent::Delete(_) | SyncEvent::Clear(_) => Ok(0),
    }
}

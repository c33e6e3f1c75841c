use super::WriteReactionHandler;
use crate::{
    events::{BusWriteEvent, BusWriteFeed},
    health::{HealthCheckResult, HealthChecker},
};
use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{Mutex, mpsc::Receiver, watch},
    task::{JoinHandle, JoinSet},
    time::timeout,
};
use tracing::{error, info, warn};

/// Delivers bus write events to the write-reaction handler.
///
/// Each event runs as its own task so a slow merge never holds up the next
/// one. Stopping the listener hands every event already queued to the
/// handler, then waits up to the drain timeout for in-flight reactions.
pub struct WriteReactionListener {
    handler: Arc<WriteReactionHandler>,
    feed: BusWriteFeed,
    drain_timeout: Duration,
    stop_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl WriteReactionListener {
    pub fn new(
        handler: Arc<WriteReactionHandler>,
        feed: BusWriteFeed,
        drain_timeout: Duration,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);

        Self {
            handler,
            feed,
            drain_timeout,
            stop_tx,
            task: Mutex::new(None),
        }
    }

    /// Subscribe to the feed and start delivering events.
    /// Events published after this returns are guaranteed to be seen.
    pub async fn start(&self) {
        let mut task = self.task.lock().await;
        if task.is_some() {
            warn!("Write reaction listener already running");
            return;
        }

        let receiver = self.feed.subscribe();
        let stop_rx = self.stop_tx.subscribe();
        let handler = self.handler.clone();
        let drain_timeout = self.drain_timeout;

        *task = Some(tokio::spawn(async move {
            run_listener(handler, receiver, stop_rx, drain_timeout).await;
        }));

        info!("Write reaction listener started");
    }

    pub async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop receiving events and wait for in-flight reactions
    pub async fn stop(&self) {
        let Some(handle) = self.task.lock().await.take() else {
            return;
        };

        info!("Stopping write reaction listener...");
        self.stop_tx.send_replace(true);

        if let Err(e) = handle.await {
            error!("Write reaction listener failed during shutdown: {}", e);
        }
        info!("Write reaction listener stopped");
    }
}

/// Reports whether bus writes are currently being turned into statistics
pub struct ListenerHealthChecker {
    listener: Arc<WriteReactionListener>,
    feed: BusWriteFeed,
}

impl ListenerHealthChecker {
    pub fn new(listener: Arc<WriteReactionListener>, feed: BusWriteFeed) -> Self {
        Self { listener, feed }
    }
}

#[async_trait]
impl HealthChecker for ListenerHealthChecker {
    fn name(&self) -> &str {
        "reactions"
    }

    async fn check(&self) -> HealthCheckResult {
        if self.listener.is_running().await {
            HealthCheckResult::healthy_with_details(serde_json::json!({
                "subscribers": self.feed.subscriber_count()
            }))
        } else {
            HealthCheckResult::degraded("Write reaction listener is not running".to_string())
        }
    }
}

async fn run_listener(
    handler: Arc<WriteReactionHandler>,
    mut receiver: Receiver<BusWriteEvent>,
    mut stop_rx: watch::Receiver<bool>,
    drain_timeout: Duration,
) {
    let mut reactions = JoinSet::new();

    loop {
        tokio::select! {
            received = receiver.recv() => match received {
                Some(event) => spawn_reaction(&mut reactions, &handler, event),
                None => {
                    info!("Bus write feed closed");
                    break;
                }
            },
            _ = stop_rx.changed() => break,
        }

        while let Some(result) = reactions.try_join_next() {
            if let Err(e) = result {
                error!("Write reaction task failed: {}", e);
            }
        }
    }

    // Writes already queued were committed and still have to be counted
    receiver.close();
    let mut queued = 0;
    while let Ok(event) = receiver.try_recv() {
        spawn_reaction(&mut reactions, &handler, event);
        queued += 1;
    }
    if queued > 0 {
        info!("Handing {} queued bus writes to reactions before stopping", queued);
    }

    let in_flight = reactions.len();
    if in_flight == 0 {
        return;
    }

    info!("Waiting for {} in-flight write reactions", in_flight);
    let drained = timeout(drain_timeout, async {
        while let Some(result) = reactions.join_next().await {
            if let Err(e) = result {
                error!("Write reaction task failed: {}", e);
            }
        }
    })
    .await;

    if drained.is_err() {
        error!(
            "Timeout waiting for write reactions, aborting {} tasks",
            reactions.len()
        );
        reactions.abort_all();
    }
}

fn spawn_reaction(
    reactions: &mut JoinSet<()>,
    handler: &Arc<WriteReactionHandler>,
    event: BusWriteEvent,
) {
    let handler = handler.clone();
    reactions.spawn(async move {
        handler.handle(&event).await;
    });
}

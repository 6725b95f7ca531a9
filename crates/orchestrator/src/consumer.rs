//! Bus consumer: feeds completion events into the [`Engine`].
//!
//! One task per message, bounded by a semaphore. Runs as a bus [`Worker`] so
//! the [`WorkerRunner`](matchflow_bus::WorkerRunner) drives health pings and
//! shutdown.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use matchflow_bus::{BusError, EventSubscriber, Worker};
use tokio::sync::{watch, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::{Engine, EventOutcome};

/// Pause after a failed receive before trying again.
const RECV_BACKOFF: Duration = Duration::from_millis(200);

pub struct EventConsumer {
    name: String,
    engine: Arc<Engine>,
    subscriber: Arc<dyn EventSubscriber>,
    max_in_flight: usize,
    permits: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
    receive_loop: Mutex<Option<JoinHandle<()>>>,
}

impl EventConsumer {
    pub fn new(
        name: impl Into<String>,
        engine: Arc<Engine>,
        subscriber: Arc<dyn EventSubscriber>,
        max_in_flight: usize,
    ) -> Self {
        let max_in_flight = max_in_flight.max(1);
        let (shutdown, _) = watch::channel(false);
        Self {
            name: name.into(),
            engine,
            subscriber,
            max_in_flight,
            permits: Arc::new(Semaphore::new(max_in_flight)),
            shutdown,
            receive_loop: Mutex::new(None),
        }
    }

    /// Handlers currently running.
    pub fn in_flight(&self) -> usize {
        self.max_in_flight - self.permits.available_permits()
    }

    async fn run(
        engine: Arc<Engine>,
        subscriber: Arc<dyn EventSubscriber>,
        permits: Arc<Semaphore>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            let permit = tokio::select! {
                _ = shutdown.changed() => break,
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let message = tokio::select! {
                _ = shutdown.changed() => break,
                received = subscriber.recv() => received,
            };

            match message {
                Ok(message) => {
                    let engine = engine.clone();
                    tokio::spawn(async move {
                        let outcome = engine.handle_message(&message).await;
                        log_outcome(&message.topic, &outcome);
                        drop(permit);
                    });
                }
                Err(e) => {
                    warn!(error = %e, "failed to receive event");
                    drop(permit);
                    tokio::time::sleep(RECV_BACKOFF).await;
                }
            }
        }
        debug!("receive loop exited");
    }
}

fn log_outcome(event_type: &str, outcome: &EventOutcome) {
    match outcome {
        EventOutcome::Applied(report) if report.advanced() => {
            debug!(event_type, job_id = %report.job_id, end = %report.end, "event advanced job");
        }
        EventOutcome::Applied(_) | EventOutcome::Duplicate | EventOutcome::UnknownJob => {}
        EventOutcome::Rejected(e) => debug!(event_type, error = %e, "event rejected"),
        EventOutcome::StorageFailed(e) => {
            warn!(event_type, error = %e, "event not recorded, awaiting redelivery")
        }
        EventOutcome::Failed(e) => warn!(event_type, error = %e, "event handling failed"),
    }
}

#[async_trait]
impl Worker for EventConsumer {
    async fn start(&self) -> Result<(), BusError> {
        let event_types = self.engine.registry().event_types();
        for event_type in &event_types {
            self.subscriber.subscribe(event_type).await?;
        }
        info!(worker = %self.name, topics = event_types.len(), max_in_flight = self.max_in_flight, "subscribed to completion events");

        let handle = tokio::spawn(Self::run(
            self.engine.clone(),
            self.subscriber.clone(),
            self.permits.clone(),
            self.shutdown.subscribe(),
        ));
        *self.receive_loop.lock().await = Some(handle);
        Ok(())
    }

    async fn stop(&self) -> Result<(), BusError> {
        // send_replace succeeds even when the loop already exited.
        self.shutdown.send_replace(true);
        if let Some(handle) = self.receive_loop.lock().await.take() {
            if let Err(e) = handle.await {
                warn!(worker = %self.name, error = %e, "receive loop panicked");
            }
        }

        let in_flight = self.in_flight();
        if in_flight > 0 {
            info!(worker = %self.name, in_flight, "waiting for in-flight events");
        }
        let all = u32::try_from(self.max_in_flight).unwrap_or(u32::MAX);
        let _drained = self
            .permits
            .acquire_many(all)
            .await
            .map_err(|e| BusError::Worker(e.to_string()))?;
        info!(worker = %self.name, "consumer drained");
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

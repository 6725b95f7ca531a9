//! Worker trait and lifecycle management.
//!
//! Provides the [`Worker`] trait for long-running bus participants,
//! [`WorkerBuilder`] for fluent configuration, and [`WorkerRunner`] for
//! driving the lifecycle with health pings and graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::error::BusError;
use crate::message::Message;
use crate::messages::events::{WorkerHealth, WorkerStatus};
use crate::messages::topics::WORKER_HEALTH;
use crate::traits::EventPublisher;

// ── Worker trait ─────────────────────────────────────────────────────

/// A long-running process that participates in the bus.
///
/// Implementors define their startup/shutdown logic. The [`WorkerRunner`] handles
/// health pings, signal handling, and waiting for shutdown.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Called once when the worker starts. Set up subscriptions, spawn loops.
    async fn start(&self) -> Result<(), BusError>;

    /// Called once during graceful shutdown. Drain in-flight work.
    async fn stop(&self) -> Result<(), BusError>;

    /// Human-readable name for this worker (used in health pings and logging).
    fn name(&self) -> &str;
}

// ── WorkerBuilder ────────────────────────────────────────────────────

/// Fluent builder for a [`WorkerRunnerConfig`].
///
/// # Example
/// ```ignore
/// let config = WorkerBuilder::new("phase-orchestrator")
///     .health_interval(Duration::from_secs(10))
///     .build();
/// WorkerRunner::run(worker, publisher, config, None).await?;
/// ```
pub struct WorkerBuilder {
    name: String,
    health_interval: Duration,
    shutdown_timeout: Duration,
}

impl WorkerBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            health_interval: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(5),
        }
    }

    /// Set the interval between health pings (default: 30s).
    pub fn health_interval(mut self, interval: Duration) -> Self {
        self.health_interval = interval;
        self
    }

    /// Set the maximum time to wait for in-flight work during shutdown (default: 5s).
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn build(self) -> WorkerRunnerConfig {
        WorkerRunnerConfig {
            name: self.name,
            health_interval: self.health_interval,
            shutdown_timeout: self.shutdown_timeout,
        }
    }
}

// ── WorkerRunnerConfig ───────────────────────────────────────────────

/// Configuration produced by [`WorkerBuilder`], consumed by [`WorkerRunner`].
#[derive(Debug, Clone)]
pub struct WorkerRunnerConfig {
    pub name: String,
    pub health_interval: Duration,
    pub shutdown_timeout: Duration,
}

// ── WorkerRunner ─────────────────────────────────────────────────────

/// Runs a [`Worker`] with automatic health pings and graceful shutdown.
///
/// Three concurrent pieces:
/// 1. **Health ping loop**: publishes [`WorkerHealth`] at the configured interval
/// 2. **Signal handler**: SIGINT/SIGTERM or a programmatic [`Notify`]
/// 3. **Worker lifecycle**: `start()`, wait for shutdown, `stop()`
pub struct WorkerRunner;

impl WorkerRunner {
    /// Run a worker to completion.
    ///
    /// Returns once a shutdown signal arrives and the worker has been stopped.
    pub async fn run(
        worker: Arc<dyn Worker>,
        publisher: Arc<dyn EventPublisher>,
        config: WorkerRunnerConfig,
        shutdown_notify: Option<Arc<Notify>>,
    ) -> Result<(), BusError> {
        let worker_name = config.name.clone();
        info!(worker = %worker_name, "starting worker");

        worker.start().await?;
        info!(worker = %worker_name, "worker started");

        Self::publish_health(&*publisher, &worker_name, WorkerStatus::Healthy).await;

        let shutdown = Arc::new(Notify::new());

        let health_publisher = publisher.clone();
        let health_name = worker_name.clone();
        let health_interval = config.health_interval;
        let health_handle = tokio::spawn(async move {
            Self::health_loop(&*health_publisher, &health_name, health_interval).await;
        });

        let sig_shutdown = shutdown.clone();
        let sig_name = worker_name.clone();
        let signal_handle = tokio::spawn(async move {
            Self::wait_for_shutdown(shutdown_notify).await;
            info!(worker = %sig_name, "shutdown signal received");
            // notify_one stores a permit, so the wakeup is not lost if the
            // main task has not reached `notified()` yet.
            sig_shutdown.notify_one();
        });

        shutdown.notified().await;

        health_handle.abort();
        signal_handle.abort();

        info!(worker = %worker_name, timeout = ?config.shutdown_timeout, "stopping worker");
        match tokio::time::timeout(config.shutdown_timeout, worker.stop()).await {
            Ok(Ok(())) => {
                info!(worker = %worker_name, "worker stopped gracefully");
            }
            Ok(Err(e)) => {
                warn!(worker = %worker_name, error = %e, "worker stop returned error");
            }
            Err(_) => {
                warn!(worker = %worker_name, "worker stop timed out, forcing shutdown");
            }
        }

        Self::publish_health(&*publisher, &worker_name, WorkerStatus::Unhealthy).await;

        info!(worker = %worker_name, "worker shutdown complete");
        Ok(())
    }

    /// Publish healthy pings forever; the runner aborts this task on shutdown.
    async fn health_loop(publisher: &dyn EventPublisher, worker_name: &str, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        // Skip the immediate first tick (the initial ping was already sent).
        ticker.tick().await;

        loop {
            ticker.tick().await;
            Self::publish_health(publisher, worker_name, WorkerStatus::Healthy).await;
        }
    }

    async fn publish_health(
        publisher: &dyn EventPublisher,
        worker_name: &str,
        status: WorkerStatus,
    ) {
        let health = WorkerHealth {
            worker_id: worker_name.to_string(),
            status,
        };

        match Message::new(WORKER_HEALTH, &health) {
            Ok(msg) => {
                if let Err(e) = publisher.publish(msg).await {
                    warn!(worker = %worker_name, error = %e, "failed to publish health ping");
                }
            }
            Err(e) => {
                warn!(worker = %worker_name, error = %e, "failed to serialize health ping");
            }
        }
    }

    async fn wait_for_shutdown(external: Option<Arc<Notify>>) {
        match external {
            Some(notify) => {
                tokio::select! {
                    _ = Self::os_signal() => {}
                    _ = notify.notified() => {}
                }
            }
            None => {
                Self::os_signal().await;
            }
        }
    }

    /// Wait for SIGINT or SIGTERM (Unix) or Ctrl+C elsewhere.
    async fn os_signal() {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
                (Ok(mut sigint), Ok(mut sigterm)) => {
                    tokio::select! {
                        _ = sigint.recv() => {}
                        _ = sigterm.recv() => {}
                    }
                }
                (Err(e), _) | (_, Err(e)) => {
                    warn!(error = %e, "failed to register unix signal handlers, falling back to ctrl_c");
                    Self::ctrl_c().await;
                }
            }
        }

        #[cfg(not(unix))]
        {
            Self::ctrl_c().await;
        }
    }

    async fn ctrl_c() {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl_c");
            std::future::pending::<()>().await;
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

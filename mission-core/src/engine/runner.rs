//! Event Processor
//!
//! Background loop that claims due expiration events one at a time:
//! - sleeps the idle interval when nothing is due
//! - sleeps the busy interval after handling an event
//! - logs pass failures and keeps going

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::MissionEngine;

/// Background event processor
pub struct EventProcessor {
    engine: Arc<MissionEngine>,
}

impl EventProcessor {
    pub fn new(engine: Arc<MissionEngine>) -> Self {
        Self { engine }
    }

    /// Spawn the processing loop
    pub fn start(self) -> ProcessorHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let running = Arc::new(RwLock::new(true));
        let running_clone = running.clone();

        let idle = self.engine.config().engine.idle_poll_interval();
        let busy = self.engine.config().engine.busy_poll_interval();
        let engine = self.engine;

        let task = tokio::spawn(async move {
            info!(
                "Event processor started (idle {:?}, busy {:?})",
                idle, busy
            );
            let mut pause = Duration::ZERO;

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Event processor received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(pause) => {
                        pause = if *running_clone.read().await {
                            Self::run_pass(&engine, idle, busy).await
                        } else {
                            idle
                        };
                    }
                }
            }

            info!("Event processor stopped");
        });

        ProcessorHandle {
            shutdown_tx,
            running,
            task,
        }
    }

    /// Handle at most one due event and pick the next sleep
    async fn run_pass(engine: &MissionEngine, idle: Duration, busy: Duration) -> Duration {
        match engine.process_next_event(Utc::now()).await {
            Ok(Some(disposition)) => {
                debug!("Event pass finished: {:?}", disposition);
                busy
            }
            Ok(None) => idle,
            Err(e) => {
                error!("Error processing events: {}", e);
                idle
            }
        }
    }
}

/// Processor handle
pub struct ProcessorHandle {
    shutdown_tx: mpsc::Sender<()>,
    running: Arc<RwLock<bool>>,
    task: JoinHandle<()>,
}

impl ProcessorHandle {
    /// Stop the processor and wait for the current pass to finish
    pub async fn stop(self) {
        *self.running.write().await = false;
        if self.shutdown_tx.send(()).await.is_err() {
            debug!("Event processor already stopped");
        }
        if let Err(e) = self.task.await {
            error!("Event processor task ended abnormally: {}", e);
        }
    }

    /// Pause the processor
    pub async fn pause(&self) {
        *self.running.write().await = false;
    }

    /// Resume the processor
    pub async fn resume(&self) {
        *self.running.write().await = true;
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }
}

use std::io;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use serde_json::Value as JsonValue;

use retailops_events::{EventBus, EventEnvelope, Subscription};

use crate::projections::RetailReadModels;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Stops and joins a worker thread.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// Keeps [`RetailReadModels`] up to date with everything published on a bus.
///
/// Envelopes already applied synchronously by the service are skipped by the
/// projection cursors.
#[derive(Debug)]
pub struct ReadModelWorker;

impl ReadModelWorker {
    pub fn spawn<B>(bus: &B, read_models: Arc<RetailReadModels>) -> io::Result<WorkerHandle>
    where
        B: EventBus<EventEnvelope<JsonValue>>,
    {
        Self::spawn_with(bus, read_models, |_| {})
    }

    /// Like [`spawn`](Self::spawn); `on_applied` runs after every envelope has
    /// been offered to the read models.
    pub fn spawn_with<B, F>(bus: &B, read_models: Arc<RetailReadModels>, on_applied: F) -> io::Result<WorkerHandle>
    where
        B: EventBus<EventEnvelope<JsonValue>>,
        F: FnMut(&EventEnvelope<JsonValue>) + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel();
        let subscription = bus.subscribe();

        let join = thread::Builder::new()
            .name("read-model-worker".to_string())
            .spawn(move || run(subscription, shutdown_rx, &read_models, on_applied))?;

        Ok(WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }
}

fn run(
    subscription: Subscription<EventEnvelope<JsonValue>>,
    shutdown: mpsc::Receiver<()>,
    read_models: &RetailReadModels,
    mut on_applied: impl FnMut(&EventEnvelope<JsonValue>),
) {
    tracing::debug!("read model worker started");
    loop {
        if shutdown.try_recv().is_ok() {
            break;
        }
        match subscription.recv_timeout(POLL_INTERVAL) {
            Ok(envelope) => {
                read_models.apply(&envelope);
                on_applied(&envelope);
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    tracing::debug!("read model worker stopped");
}

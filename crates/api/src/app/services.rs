use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use chrono::NaiveDate;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt};

use retailops_core::{AggregateId, TenantId};
use retailops_events::{EventEnvelope, InMemoryEventBus};
use retailops_infra::{
    aggregates::StreamAggregate,
    command_dispatcher::{CommandDispatcher, DispatchError},
    event_store::{EventStore, EventStoreError, InMemoryEventStore, PostgresEventStore, StoredEvent},
    projections::RetailReadModels,
    workers::{ReadModelWorker, WorkerHandle},
    workflows::with_conflict_retry,
};
use retailops_insights::{InsightError, ItemSalesHistory, ItemVelocity, SalesHistorySnapshot, StockVelocityJob};
use retailops_locations::LocationId;

use crate::config::DatabaseConfig;

/// Realtime message broadcasted via SSE.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RealtimeMessage {
    pub tenant_id: TenantId,
    pub topic: String,
    pub payload: JsonValue,
}

const REALTIME_CAPACITY: usize = 1024;
const SSE_KEEP_ALIVE: Duration = Duration::from_secs(15);

pub type SharedStore = Arc<dyn EventStore>;
pub type SharedBus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

// Type-erased dispatcher shared by the in-memory and Postgres backends.
pub type Dispatcher = CommandDispatcher<SharedStore, SharedBus>;

#[derive(Debug, Error)]
pub enum ServicesError {
    #[error("failed to start read model worker: {0}")]
    Worker(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] EventStoreError),
}

/// Event store, bus, read models and the realtime feed behind the HTTP layer.
pub struct AppServices {
    dispatcher: Dispatcher,
    read_models: Arc<RetailReadModels>,
    realtime_tx: broadcast::Sender<RealtimeMessage>,
    worker: Option<WorkerHandle>,
}

impl AppServices {
    pub fn in_memory() -> Result<Self, ServicesError> {
        tracing::info!("using in-memory event store");
        Self::assemble(Arc::new(InMemoryEventStore::new()), Arc::new(RetailReadModels::new()))
    }

    /// Connect to Postgres and rebuild the read models from the full history.
    pub async fn persistent(database: &DatabaseConfig) -> Result<Self, ServicesError> {
        let store = PostgresEventStore::connect(&database.url, database.max_connections).await?;
        let history = store.load_all_async().await?;

        let read_models = Arc::new(RetailReadModels::new());
        let report = read_models.rebuild(&history);
        if report.failed_projections > 0 {
            tracing::warn!(
                failed_projections = report.failed_projections,
                "some read models could not be rebuilt from the stored history"
            );
        }
        tracing::info!(events = report.events, "using postgres event store");

        Self::assemble(Arc::new(store), read_models)
    }

    fn assemble(store: SharedStore, read_models: Arc<RetailReadModels>) -> Result<Self, ServicesError> {
        let bus: SharedBus = Arc::new(InMemoryEventBus::new());
        let (realtime_tx, _) = broadcast::channel(REALTIME_CAPACITY);

        let tx = realtime_tx.clone();
        let worker = ReadModelWorker::spawn_with(&bus, read_models.clone(), move |envelope| {
            // Lossy: nobody listening is fine.
            let _ = tx.send(projection_updated(envelope));
        })?;

        Ok(Self {
            dispatcher: CommandDispatcher::new(store, bus),
            read_models,
            realtime_tx,
            worker: Some(worker),
        })
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn read_models(&self) -> &RetailReadModels {
        &self.read_models
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RealtimeMessage> {
        self.realtime_tx.subscribe()
    }

    /// Run a workflow and apply its committed events to the read models
    /// before returning, so the caller can read its own writes.
    pub fn run<F>(&self, op: F) -> Result<Vec<StoredEvent>, DispatchError>
    where
        F: FnOnce(&Dispatcher) -> Result<Vec<StoredEvent>, DispatchError>,
    {
        let committed = op(&self.dispatcher)?;
        self.read_models.apply_stored(&committed);
        Ok(committed)
    }

    /// Single-stream command with concurrency retry and read-your-writes.
    pub fn execute<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        command: A::Command,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: StreamAggregate,
    {
        self.run(|d| with_conflict_retry(|| d.dispatch::<A>(tenant_id, aggregate_id, command.clone())))
    }

    /// Stock-velocity forecast for every (shop, product) that sold in the
    /// window ending at `as_of`.
    pub fn stock_velocity(
        &self,
        tenant_id: TenantId,
        location_id: Option<LocationId>,
        as_of: NaiveDate,
        window_days: u32,
    ) -> Result<Vec<ItemVelocity>, InsightError> {
        let items = self
            .read_models
            .dashboard
            .units_history(tenant_id, location_id, as_of, window_days)
            .into_iter()
            .map(|h| {
                let on_hand = self
                    .read_models
                    .inventory
                    .get(tenant_id, h.shop_id, h.product_id)
                    .map_or(0, |level| level.on_hand);
                ItemSalesHistory {
                    location_id: h.shop_id.0,
                    product_id: h.product_id.0,
                    on_hand,
                    daily_units: h.daily_units,
                }
            })
            .collect();

        let snapshot = SalesHistorySnapshot {
            tenant_id,
            as_of,
            window_days,
            items,
        };
        StockVelocityJob::new(tenant_id, snapshot).forecast()
    }
}

impl Drop for AppServices {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.shutdown();
        }
    }
}

fn projection_updated(envelope: &EventEnvelope<JsonValue>) -> RealtimeMessage {
    RealtimeMessage {
        tenant_id: envelope.tenant_id(),
        topic: format!("{}.projection_updated", envelope.aggregate_type()),
        payload: serde_json::json!({
            "aggregate_id": envelope.aggregate_id().to_string(),
            "event_type": envelope.event_type(),
            "sequence_number": envelope.sequence_number(),
        }),
    }
}

/// SSE stream of realtime messages for one tenant. Lagged receivers skip
/// the messages they missed.
pub fn tenant_sse_stream(
    services: Arc<AppServices>,
    tenant_id: TenantId,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let stream = BroadcastStream::new(services.subscribe()).filter_map(move |msg| {
        let msg = msg.ok().filter(|m| m.tenant_id == tenant_id)?;
        let data = serde_json::to_string(&msg).ok()?;
        Some(Ok(SseEvent::default().event(msg.topic).data(data)))
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(SSE_KEEP_ALIVE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use retailops_locations::{Location, LocationCommand, LocationKind, OpenLocation};

    fn open_shop(services: &AppServices, tenant_id: TenantId) -> LocationId {
        let location_id = LocationId::new(AggregateId::new());
        services
            .execute::<Location>(
                tenant_id,
                location_id.0,
                LocationCommand::OpenLocation(OpenLocation {
                    tenant_id,
                    location_id,
                    kind: LocationKind::Shop,
                    code: "s1".to_string(),
                    name: "High Street".to_string(),
                    address: None,
                    occurred_at: Utc::now(),
                }),
            )
            .unwrap();
        location_id
    }

    #[test]
    fn execute_reads_its_own_writes() {
        let services = AppServices::in_memory().unwrap();
        let tenant_id = TenantId::new();
        let shop = open_shop(&services, tenant_id);

        let view = services.read_models().locations.get(tenant_id, &shop).unwrap();
        assert_eq!(view.code, "S1");
    }

    #[test]
    fn worker_broadcasts_projection_updates() {
        let services = AppServices::in_memory().unwrap();
        let mut rx = services.subscribe();
        let tenant_id = TenantId::new();
        open_shop(&services, tenant_id);

        let mut received = None;
        for _ in 0..50 {
            if let Ok(msg) = rx.try_recv() {
                received = Some(msg);
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        let msg = received.expect("no realtime message");
        assert_eq!(msg.tenant_id, tenant_id);
        assert_eq!(msg.topic, format!("{}.projection_updated", retailops_locations::AGGREGATE_TYPE));
    }

    #[test]
    fn velocity_is_empty_without_sales() {
        let services = AppServices::in_memory().unwrap();
        let out = services
            .stock_velocity(TenantId::new(), None, Utc::now().date_naive(), 14)
            .unwrap();
        assert!(out.is_empty());
    }
}

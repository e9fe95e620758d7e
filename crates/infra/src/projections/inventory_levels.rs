use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use retailops_core::TenantId;
use retailops_events::EventEnvelope;
use retailops_inventory::{InventoryEvent, InventoryRecordId, StockMovement};
use retailops_locations::LocationId;
use retailops_products::ProductId;

use super::cursor::{ProjectionError, StreamCursors, decode, ensure_matches};
use super::Projection;
use crate::read_model::{InMemoryTenantStore, TenantStore};

/// Quantity of one product at one location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockLevel {
    pub location_id: LocationId,
    pub product_id: ProductId,
    pub on_hand: i64,
    pub reorder_level: Option<i64>,
    pub last_movement: Option<StockMovement>,
    pub updated_at: DateTime<Utc>,
}

impl StockLevel {
    /// At or below the reorder level.
    pub fn is_low(&self) -> bool {
        self.reorder_level.is_some_and(|level| self.on_hand <= level)
    }
}

#[derive(Debug)]
pub struct InventoryLevelsProjection<S>
where
    S: TenantStore<InventoryRecordId, StockLevel>,
{
    store: S,
    cursors: StreamCursors,
}

impl InventoryLevelsProjection<InMemoryTenantStore<InventoryRecordId, StockLevel>> {
    pub fn in_memory() -> Self {
        Self::new(InMemoryTenantStore::new())
    }
}

impl<S> InventoryLevelsProjection<S>
where
    S: TenantStore<InventoryRecordId, StockLevel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, tenant_id: TenantId, location_id: LocationId, product_id: ProductId) -> Option<StockLevel> {
        self.store
            .get(tenant_id, &InventoryRecordId::for_pair(location_id, product_id))
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<StockLevel> {
        let mut out = self.store.list(tenant_id);
        sort_levels(&mut out);
        out
    }

    pub fn by_location(&self, tenant_id: TenantId, location_id: LocationId) -> Vec<StockLevel> {
        let mut out: Vec<_> = self
            .store
            .list(tenant_id)
            .into_iter()
            .filter(|s| s.location_id == location_id)
            .collect();
        sort_levels(&mut out);
        out
    }

    /// Records with `on_hand <= reorder_level`, optionally for one location.
    pub fn low_stock(&self, tenant_id: TenantId, location_id: Option<LocationId>) -> Vec<StockLevel> {
        let mut out: Vec<_> = self
            .store
            .list(tenant_id)
            .into_iter()
            .filter(|s| s.is_low() && location_id.is_none_or(|l| s.location_id == l))
            .collect();
        sort_levels(&mut out);
        out
    }
}

fn sort_levels(levels: &mut [StockLevel]) {
    levels.sort_by_key(|s| (s.location_id.0, s.product_id.0));
}

impl<S> Projection for InventoryLevelsProjection<S>
where
    S: TenantStore<InventoryRecordId, StockLevel>,
{
    fn name(&self) -> &'static str {
        "inventory_levels"
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != retailops_inventory::AGGREGATE_TYPE {
            return Ok(());
        }
        let tenant_id = envelope.tenant_id();

        self.cursors.apply_in_order(envelope, |envelope| {
            let event: InventoryEvent = decode(envelope)?;
            let (event_tenant, record_id, at) = match &event {
                InventoryEvent::RecordOpened(e) => (e.tenant_id, e.record_id, e.occurred_at),
                InventoryEvent::StockAdjusted(e) => (e.tenant_id, e.record_id, e.occurred_at),
                InventoryEvent::ReorderLevelSet(e) => (e.tenant_id, e.record_id, e.occurred_at),
            };
            ensure_matches(envelope, event_tenant, record_id.0)?;

            let mut level = self.store.get(tenant_id, &record_id).unwrap_or(StockLevel {
                location_id: event.location_id(),
                product_id: event.product_id(),
                on_hand: 0,
                reorder_level: None,
                last_movement: None,
                updated_at: at,
            });
            match event {
                InventoryEvent::RecordOpened(_) => {}
                InventoryEvent::StockAdjusted(e) => {
                    level.on_hand = e.on_hand_after;
                    level.last_movement = Some(e.movement);
                }
                InventoryEvent::ReorderLevelSet(e) => level.reorder_level = e.level,
            }
            level.updated_at = at;
            self.store.upsert(tenant_id, record_id, level);
            Ok(())
        })
    }

    fn reset(&self, tenants: &[TenantId]) {
        self.cursors.clear();
        for t in tenants {
            self.store.clear_tenant(*t);
        }
    }
}

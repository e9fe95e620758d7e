//! Read models built from committed events.
//!
//! Every projection here is tenant-isolated, applies each stream in sequence
//! order (per-stream cursor) and can be rebuilt from `EventStore::load_all`.

pub mod catalog;
pub mod cursor;
pub mod dashboard;
pub mod inventory_levels;
pub mod invoice_register;
pub mod locations;
pub mod sales_ledger;
pub mod transfer_register;

use std::collections::BTreeSet;

use serde_json::Value as JsonValue;

use retailops_core::TenantId;
use retailops_events::EventEnvelope;

use crate::event_store::StoredEvent;

pub use catalog::{CatalogProjection, ProductView};
pub use cursor::{ProjectionError, StreamCursors};
pub use dashboard::{
    DailyProductSales, DailyRevenue, DailyShopSales, DashboardOverview, DashboardProjection, DashboardQuery,
    DashboardTotals, ProductSummary, ProductUnitsHistory, ShopSummary,
};
pub use inventory_levels::{InventoryLevelsProjection, StockLevel};
pub use invoice_register::{InvoiceRegisterProjection, InvoiceView};
pub use locations::{LocationDirectoryProjection, LocationView};
pub use sales_ledger::{SaleView, SalesLedgerProjection};
pub use transfer_register::{TransferRegisterProjection, TransferView};

/// A read model fed with committed envelopes.
pub trait Projection: Send + Sync {
    fn name(&self) -> &'static str;

    /// Apply one envelope. Envelopes of other aggregate types are ignored.
    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError>;

    /// Drop all state for `tenants` and forget stream positions.
    fn reset(&self, tenants: &[TenantId]);
}

/// Reset `projection` and replay `events` through it in stream order.
///
/// Returns the number of envelopes applied before the first failure.
pub fn rebuild_from_scratch(projection: &dyn Projection, events: &[StoredEvent]) -> Result<usize, ProjectionError> {
    let tenants: Vec<TenantId> = events
        .iter()
        .map(|e| e.tenant_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    projection.reset(&tenants);

    let mut ordered: Vec<&StoredEvent> = events.iter().collect();
    ordered.sort_by_key(|e| (e.tenant_id, e.aggregate_id, e.sequence_number));

    for (applied, event) in ordered.into_iter().enumerate() {
        if let Err(err) = projection.apply_envelope(&event.to_envelope()) {
            tracing::warn!(
                projection = projection.name(),
                applied,
                error = %err,
                "projection rebuild stopped"
            );
            return Err(err);
        }
    }
    Ok(events.len())
}

/// Summary of a full read-model rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RebuildReport {
    pub events: usize,
    pub failed_projections: usize,
}

/// The in-memory read models of the retail service.
#[derive(Debug)]
pub struct RetailReadModels {
    pub catalog: CatalogProjection<crate::read_model::InMemoryTenantStore<retailops_products::ProductId, ProductView>>,
    pub locations: LocationDirectoryProjection<
        crate::read_model::InMemoryTenantStore<retailops_locations::LocationId, LocationView>,
    >,
    pub inventory: InventoryLevelsProjection<
        crate::read_model::InMemoryTenantStore<retailops_inventory::InventoryRecordId, StockLevel>,
    >,
    pub sales: SalesLedgerProjection<crate::read_model::InMemoryTenantStore<retailops_sales::SaleId, SaleView>>,
    pub invoices: InvoiceRegisterProjection<
        crate::read_model::InMemoryTenantStore<retailops_invoicing::SupplierInvoiceId, InvoiceView>,
    >,
    pub transfers: TransferRegisterProjection<
        crate::read_model::InMemoryTenantStore<retailops_transfers::TransferId, TransferView>,
    >,
    pub dashboard: DashboardProjection<
        crate::read_model::InMemoryTenantStore<dashboard::ShopDayKey, DailyShopSales>,
        crate::read_model::InMemoryTenantStore<dashboard::ProductDayKey, DailyProductSales>,
    >,
}

impl Default for RetailReadModels {
    fn default() -> Self {
        Self::new()
    }
}

impl RetailReadModels {
    pub fn new() -> Self {
        Self {
            catalog: CatalogProjection::in_memory(),
            locations: LocationDirectoryProjection::in_memory(),
            inventory: InventoryLevelsProjection::in_memory(),
            sales: SalesLedgerProjection::in_memory(),
            invoices: InvoiceRegisterProjection::in_memory(),
            transfers: TransferRegisterProjection::in_memory(),
            dashboard: DashboardProjection::in_memory(),
        }
    }

    fn all(&self) -> [&dyn Projection; 7] {
        [
            &self.catalog,
            &self.locations,
            &self.inventory,
            &self.sales,
            &self.invoices,
            &self.transfers,
            &self.dashboard,
        ]
    }

    /// Feed one envelope to every projection. Failures are logged; envelopes
    /// delivered ahead of their predecessor are held by the projection cursors.
    pub fn apply(&self, envelope: &EventEnvelope<JsonValue>) {
        for projection in self.all() {
            if let Err(err) = projection.apply_envelope(envelope) {
                tracing::warn!(
                    projection = projection.name(),
                    tenant_id = %envelope.tenant_id(),
                    aggregate_id = %envelope.aggregate_id(),
                    sequence_number = envelope.sequence_number(),
                    error = %err,
                    "projection failed to apply event"
                );
            }
        }
    }

    pub fn apply_stored(&self, events: &[StoredEvent]) {
        for event in events {
            self.apply(&event.to_envelope());
        }
    }

    /// Rebuild every projection from a full event history.
    pub fn rebuild(&self, events: &[StoredEvent]) -> RebuildReport {
        let mut report = RebuildReport {
            events: events.len(),
            failed_projections: 0,
        };
        for projection in self.all() {
            if rebuild_from_scratch(projection, events).is_err() {
                report.failed_projections += 1;
            }
        }
        tracing::info!(
            events = report.events,
            failed_projections = report.failed_projections,
            "read models rebuilt"
        );
        report
    }
}

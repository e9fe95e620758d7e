use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use retailops_core::{TenantId, UserId};
use retailops_events::EventEnvelope;
use retailops_locations::LocationId;
use retailops_sales::{PaymentMethod, SaleEvent, SaleId, SaleLine, SaleStatus};

use super::cursor::{ProjectionError, StreamCursors, decode, ensure_matches};
use super::Projection;
use crate::read_model::{InMemoryTenantStore, TenantStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaleView {
    pub sale_id: SaleId,
    pub shop_id: LocationId,
    pub cashier_id: Option<UserId>,
    pub payment: PaymentMethod,
    pub lines: Vec<SaleLine>,
    pub subtotal: u64,
    pub discount: u64,
    pub total: u64,
    pub total_cost: u64,
    pub units: i64,
    pub status: SaleStatus,
    pub sold_at: DateTime<Utc>,
    pub voided_at: Option<DateTime<Utc>>,
    pub void_reason: Option<String>,
}

#[derive(Debug)]
pub struct SalesLedgerProjection<S>
where
    S: TenantStore<SaleId, SaleView>,
{
    store: S,
    cursors: StreamCursors,
}

impl SalesLedgerProjection<InMemoryTenantStore<SaleId, SaleView>> {
    pub fn in_memory() -> Self {
        Self::new(InMemoryTenantStore::new())
    }
}

impl<S> SalesLedgerProjection<S>
where
    S: TenantStore<SaleId, SaleView>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, tenant_id: TenantId, sale_id: &SaleId) -> Option<SaleView> {
        self.store.get(tenant_id, sale_id)
    }

    /// Newest first, optionally one shop only.
    pub fn list(&self, tenant_id: TenantId, shop_id: Option<LocationId>) -> Vec<SaleView> {
        let mut out: Vec<_> = self
            .store
            .list(tenant_id)
            .into_iter()
            .filter(|s| shop_id.is_none_or(|id| s.shop_id == id))
            .collect();
        out.sort_by(|a, b| b.sold_at.cmp(&a.sold_at).then_with(|| b.sale_id.0.cmp(&a.sale_id.0)));
        out
    }
}

impl<S> Projection for SalesLedgerProjection<S>
where
    S: TenantStore<SaleId, SaleView>,
{
    fn name(&self) -> &'static str {
        "sales_ledger"
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != retailops_sales::AGGREGATE_TYPE {
            return Ok(());
        }
        let tenant_id = envelope.tenant_id();

        self.cursors.apply_in_order(envelope, |envelope| {
            match decode::<SaleEvent>(envelope)? {
                SaleEvent::SaleRecorded(e) => {
                    ensure_matches(envelope, e.tenant_id, e.sale_id.0)?;
                    let units = e.lines.iter().map(|l| l.quantity).sum();
                    self.store.upsert(
                        tenant_id,
                        e.sale_id,
                        SaleView {
                            sale_id: e.sale_id,
                            shop_id: e.shop_id,
                            cashier_id: e.cashier_id,
                            payment: e.payment,
                            lines: e.lines,
                            subtotal: e.subtotal,
                            discount: e.discount,
                            total: e.total,
                            total_cost: e.total_cost,
                            units,
                            status: SaleStatus::Completed,
                            sold_at: e.occurred_at,
                            voided_at: None,
                            void_reason: None,
                        },
                    );
                }
                SaleEvent::SaleVoided(e) => {
                    ensure_matches(envelope, e.tenant_id, e.sale_id.0)?;
                    if let Some(mut view) = self.store.get(tenant_id, &e.sale_id) {
                        view.status = SaleStatus::Voided;
                        view.voided_at = Some(e.occurred_at);
                        view.void_reason = e.reason;
                        self.store.upsert(tenant_id, e.sale_id, view);
                    }
                }
            }
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

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use retailops_core::TenantId;
use retailops_events::EventEnvelope;
use retailops_invoicing::{InvoiceEvent, InvoiceLine, InvoiceStatus, SupplierInvoiceId};
use retailops_locations::LocationId;

use super::cursor::{ProjectionError, StreamCursors, decode, ensure_matches};
use super::Projection;
use crate::read_model::{InMemoryTenantStore, TenantStore};

/// Supplier invoice as listed in the purchasing register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceView {
    pub invoice_id: SupplierInvoiceId,
    pub warehouse_id: LocationId,
    pub supplier: String,
    pub reference: String,
    pub invoice_date: NaiveDate,
    pub lines: Vec<InvoiceLine>,
    pub total: u64,
    pub status: InvoiceStatus,
    pub posted_at: DateTime<Utc>,
    pub voided_at: Option<DateTime<Utc>>,
    pub void_reason: Option<String>,
}

#[derive(Debug)]
pub struct InvoiceRegisterProjection<S>
where
    S: TenantStore<SupplierInvoiceId, InvoiceView>,
{
    store: S,
    cursors: StreamCursors,
}

impl InvoiceRegisterProjection<InMemoryTenantStore<SupplierInvoiceId, InvoiceView>> {
    pub fn in_memory() -> Self {
        Self::new(InMemoryTenantStore::new())
    }
}

impl<S> InvoiceRegisterProjection<S>
where
    S: TenantStore<SupplierInvoiceId, InvoiceView>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, tenant_id: TenantId, invoice_id: &SupplierInvoiceId) -> Option<InvoiceView> {
        self.store.get(tenant_id, invoice_id)
    }

    /// Latest invoice date first.
    pub fn list(&self, tenant_id: TenantId, warehouse_id: Option<LocationId>) -> Vec<InvoiceView> {
        let mut out: Vec<_> = self
            .store
            .list(tenant_id)
            .into_iter()
            .filter(|i| warehouse_id.is_none_or(|id| i.warehouse_id == id))
            .collect();
        out.sort_by(|a, b| {
            b.invoice_date
                .cmp(&a.invoice_date)
                .then_with(|| b.posted_at.cmp(&a.posted_at))
        });
        out
    }

    /// A posted (not voided) invoice with the same supplier and reference.
    /// Both are compared case-insensitively after trimming.
    pub fn find_posted(&self, tenant_id: TenantId, supplier: &str, reference: &str) -> Option<InvoiceView> {
        let (supplier, reference) = (supplier.trim(), reference.trim());
        self.store.list(tenant_id).into_iter().find(|i| {
            i.status == InvoiceStatus::Posted
                && i.supplier.eq_ignore_ascii_case(supplier)
                && i.reference.eq_ignore_ascii_case(reference)
        })
    }
}

impl<S> Projection for InvoiceRegisterProjection<S>
where
    S: TenantStore<SupplierInvoiceId, InvoiceView>,
{
    fn name(&self) -> &'static str {
        "invoice_register"
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != retailops_invoicing::AGGREGATE_TYPE {
            return Ok(());
        }
        let tenant_id = envelope.tenant_id();

        self.cursors.apply_in_order(envelope, |envelope| {
            match decode::<InvoiceEvent>(envelope)? {
                InvoiceEvent::InvoicePosted(e) => {
                    ensure_matches(envelope, e.tenant_id, e.invoice_id.0)?;
                    self.store.upsert(
                        tenant_id,
                        e.invoice_id,
                        InvoiceView {
                            invoice_id: e.invoice_id,
                            warehouse_id: e.warehouse_id,
                            supplier: e.supplier,
                            reference: e.reference,
                            invoice_date: e.invoice_date,
                            lines: e.lines,
                            total: e.total,
                            status: InvoiceStatus::Posted,
                            posted_at: e.occurred_at,
                            voided_at: None,
                            void_reason: None,
                        },
                    );
                }
                InvoiceEvent::InvoiceVoided(e) => {
                    ensure_matches(envelope, e.tenant_id, e.invoice_id.0)?;
                    if let Some(mut view) = self.store.get(tenant_id, &e.invoice_id) {
                        view.status = InvoiceStatus::Voided;
                        view.voided_at = Some(e.occurred_at);
                        view.void_reason = e.reason;
                        self.store.upsert(tenant_id, e.invoice_id, view);
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

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use retailops_core::TenantId;
use retailops_events::EventEnvelope;
use retailops_products::{ProductEvent, ProductId, ProductStatus};

use super::cursor::{ProjectionError, StreamCursors, decode, ensure_matches};
use super::Projection;
use crate::read_model::{InMemoryTenantStore, TenantStore};

/// Queryable product read model (catalog).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductView {
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub category: Option<String>,
    pub barcode: Option<String>,
    pub status: ProductStatus,
    pub price: u64,
    /// Weighted average cost.
    pub unit_cost: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct CatalogProjection<S>
where
    S: TenantStore<ProductId, ProductView>,
{
    store: S,
    cursors: StreamCursors,
}

impl CatalogProjection<InMemoryTenantStore<ProductId, ProductView>> {
    pub fn in_memory() -> Self {
        Self::new(InMemoryTenantStore::new())
    }
}

impl<S> CatalogProjection<S>
where
    S: TenantStore<ProductId, ProductView>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, tenant_id: TenantId, product_id: &ProductId) -> Option<ProductView> {
        self.store.get(tenant_id, product_id)
    }

    /// All products of a tenant, ordered by SKU.
    pub fn list(&self, tenant_id: TenantId) -> Vec<ProductView> {
        let mut products = self.store.list(tenant_id);
        products.sort_by(|a, b| a.sku.cmp(&b.sku));
        products
    }

    /// SKUs are compared case-insensitively.
    pub fn find_by_sku(&self, tenant_id: TenantId, sku: &str) -> Option<ProductView> {
        let sku = sku.trim();
        self.store
            .list(tenant_id)
            .into_iter()
            .find(|p| p.sku.eq_ignore_ascii_case(sku))
    }

    fn update(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        at: DateTime<Utc>,
        f: impl FnOnce(&mut ProductView),
    ) {
        if let Some(mut view) = self.store.get(tenant_id, &product_id) {
            f(&mut view);
            view.updated_at = at;
            self.store.upsert(tenant_id, product_id, view);
        }
    }
}

impl<S> Projection for CatalogProjection<S>
where
    S: TenantStore<ProductId, ProductView>,
{
    fn name(&self) -> &'static str {
        "catalog"
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != retailops_products::AGGREGATE_TYPE {
            return Ok(());
        }
        let tenant_id = envelope.tenant_id();

        self.cursors.apply_in_order(envelope, |envelope| {
            let event: ProductEvent = decode(envelope)?;
            match event {
                ProductEvent::ProductCreated(e) => {
                    ensure_matches(envelope, e.tenant_id, e.product_id.0)?;
                    self.store.upsert(
                        tenant_id,
                        e.product_id,
                        ProductView {
                            product_id: e.product_id,
                            sku: e.sku,
                            name: e.name,
                            category: e.category,
                            barcode: e.barcode,
                            status: ProductStatus::Draft,
                            price: e.price,
                            unit_cost: 0,
                            created_at: e.occurred_at,
                            updated_at: e.occurred_at,
                        },
                    );
                }
                ProductEvent::ProductUpdated(e) => {
                    ensure_matches(envelope, e.tenant_id, e.product_id.0)?;
                    self.update(tenant_id, e.product_id, e.occurred_at, |v| {
                        v.name = e.name;
                        v.category = e.category;
                        v.barcode = e.barcode;
                    });
                }
                ProductEvent::PriceChanged(e) => {
                    ensure_matches(envelope, e.tenant_id, e.product_id.0)?;
                    self.update(tenant_id, e.product_id, e.occurred_at, |v| v.price = e.price);
                }
                ProductEvent::ProductActivated(e) => {
                    ensure_matches(envelope, e.tenant_id, e.product_id.0)?;
                    self.update(tenant_id, e.product_id, e.occurred_at, |v| v.status = ProductStatus::Active);
                }
                ProductEvent::ProductArchived(e) => {
                    ensure_matches(envelope, e.tenant_id, e.product_id.0)?;
                    self.update(tenant_id, e.product_id, e.occurred_at, |v| v.status = ProductStatus::Archived);
                }
                ProductEvent::CostRecalculated(e) => {
                    ensure_matches(envelope, e.tenant_id, e.product_id.0)?;
                    self.update(tenant_id, e.product_id, e.occurred_at, |v| v.unit_cost = e.new_cost);
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

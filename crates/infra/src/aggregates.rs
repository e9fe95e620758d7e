//! Binding of domain aggregates to event streams.

use serde::Serialize;
use serde::de::DeserializeOwned;

use retailops_core::{Aggregate, AggregateId, DomainError};
use retailops_inventory::{InventoryRecord, InventoryRecordId};
use retailops_invoicing::{SupplierInvoice, SupplierInvoiceId};
use retailops_locations::{Location, LocationId};
use retailops_products::{Product, ProductId};
use retailops_sales::{Sale, SaleId};
use retailops_transfers::{Transfer, TransferId};

/// An aggregate that can be stored as a stream: it names its stream type and
/// can be created empty from a raw stream id.
pub trait StreamAggregate:
    Aggregate<Error = DomainError, Event: retailops_events::Event + Serialize + DeserializeOwned>
{
    const AGGREGATE_TYPE: &'static str;

    fn empty_for(aggregate_id: AggregateId) -> Self;
}

impl StreamAggregate for Location {
    const AGGREGATE_TYPE: &'static str = retailops_locations::AGGREGATE_TYPE;

    fn empty_for(aggregate_id: AggregateId) -> Self {
        Location::empty(LocationId::new(aggregate_id))
    }
}

impl StreamAggregate for Product {
    const AGGREGATE_TYPE: &'static str = retailops_products::AGGREGATE_TYPE;

    fn empty_for(aggregate_id: AggregateId) -> Self {
        Product::empty(ProductId::new(aggregate_id))
    }
}

impl StreamAggregate for InventoryRecord {
    const AGGREGATE_TYPE: &'static str = retailops_inventory::AGGREGATE_TYPE;

    fn empty_for(aggregate_id: AggregateId) -> Self {
        InventoryRecord::empty(InventoryRecordId(aggregate_id))
    }
}

impl StreamAggregate for Sale {
    const AGGREGATE_TYPE: &'static str = retailops_sales::AGGREGATE_TYPE;

    fn empty_for(aggregate_id: AggregateId) -> Self {
        Sale::empty(SaleId::new(aggregate_id))
    }
}

impl StreamAggregate for SupplierInvoice {
    const AGGREGATE_TYPE: &'static str = retailops_invoicing::AGGREGATE_TYPE;

    fn empty_for(aggregate_id: AggregateId) -> Self {
        SupplierInvoice::empty(SupplierInvoiceId::new(aggregate_id))
    }
}

impl StreamAggregate for Transfer {
    const AGGREGATE_TYPE: &'static str = retailops_transfers::AGGREGATE_TYPE;

    fn empty_for(aggregate_id: AggregateId) -> Self {
        Transfer::empty(TransferId::new(aggregate_id))
    }
}

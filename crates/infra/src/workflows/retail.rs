//! Retail workflows: sales, supplier invoices, transfers and stock corrections.
//!
//! Stock moves in the same unit as the document that moves it: a sale
//! decrements the shop, voiding it returns the units, an invoice receives
//! into the warehouse and recalculates weighted average cost.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value as JsonValue;
use tracing::instrument;

use retailops_core::{TenantId, UserId};
use retailops_events::{EventBus, EventEnvelope};
use retailops_inventory::{
    AdjustStock, InventoryCommand, InventoryRecord, InventoryRecordId, IssueStock, ReceiveStock, SetReorderLevel,
    StockMovement,
};
use retailops_invoicing::{
    InvoiceCommand, InvoiceEvent, InvoicePosted, InvoiceVoided, NewInvoiceLine, PostInvoice, SupplierInvoice,
    SupplierInvoiceId, VoidInvoice,
};
use retailops_locations::{Location, LocationId, LocationKind};
use retailops_products::{ApplyReceiptCost, Product, ProductCommand, ProductId, ProductStatus, ReverseReceiptCost};
use retailops_sales::{
    NewSaleLine, PaymentMethod, RecordSale, Sale, SaleCommand, SaleEvent, SaleId, SaleVoided, VoidSale,
};
use retailops_transfers::{
    CancelTransfer, DispatchTransfer, ReceiveTransfer, Transfer, TransferCancelled, TransferCommand,
    TransferEvent, TransferId, TransferLine, TransferReceived,
};

use super::with_conflict_retry;
use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::{EventStore, StoredEvent};
use crate::unit_of_work::UnitOfWork;

/// A till line. `unit_price` defaults to the product's current price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaleLineInput {
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSaleInput {
    pub sale_id: SaleId,
    pub shop_id: LocationId,
    pub cashier_id: Option<UserId>,
    pub payment: PaymentMethod,
    pub lines: Vec<SaleLineInput>,
    pub discount: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceInput {
    pub invoice_id: SupplierInvoiceId,
    pub warehouse_id: LocationId,
    pub supplier: String,
    pub reference: String,
    pub invoice_date: Option<NaiveDate>,
    pub lines: Vec<NewInvoiceLine>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferInput {
    pub transfer_id: TransferId,
    pub from: LocationId,
    pub to: LocationId,
    pub lines: Vec<TransferLine>,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Record a sale and decrement the shop's stock for every line.
#[instrument(
    skip(dispatcher, input),
    fields(tenant_id = %tenant_id, sale_id = %input.sale_id, shop_id = %input.shop_id, lines = input.lines.len()),
    err
)]
pub fn record_sale<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    tenant_id: TenantId,
    input: &RecordSaleInput,
) -> Result<Vec<StoredEvent>, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    with_conflict_retry(|| {
        let mut uow = dispatcher.begin(tenant_id);

        let shop: Location = uow.load(input.shop_id.0)?;
        shop.ensure_active(LocationKind::Shop)?;

        let mut lines = Vec::with_capacity(input.lines.len());
        for line in &input.lines {
            let product: Product = uow.load(line.product_id.0)?;
            product.ensure_sellable()?;
            lines.push(NewSaleLine {
                product_id: line.product_id,
                quantity: line.quantity,
                unit_price: line.unit_price.unwrap_or(product.price()),
                unit_cost: product.unit_cost(),
            });
        }

        uow.execute::<Sale>(
            input.sale_id.0,
            SaleCommand::RecordSale(RecordSale {
                tenant_id,
                sale_id: input.sale_id,
                shop_id: input.shop_id,
                cashier_id: input.cashier_id,
                payment: input.payment,
                lines: lines.clone(),
                discount: input.discount,
                occurred_at: input.occurred_at,
            }),
        )?;

        for line in &lines {
            issue(
                &mut uow,
                input.shop_id,
                line.product_id,
                line.quantity,
                StockMovement::Sale { sale_id: input.sale_id.0 },
                input.occurred_at,
            )?;
        }

        uow.commit()
    })
}

/// Void a sale and return every line's quantity to the shop.
#[instrument(skip(dispatcher, reason), fields(tenant_id = %tenant_id, sale_id = %sale_id), err)]
pub fn void_sale<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    tenant_id: TenantId,
    sale_id: SaleId,
    reason: Option<String>,
    occurred_at: DateTime<Utc>,
) -> Result<Vec<StoredEvent>, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    with_conflict_retry(|| {
        let mut uow = dispatcher.begin(tenant_id);

        let events = uow.execute::<Sale>(
            sale_id.0,
            SaleCommand::VoidSale(VoidSale {
                tenant_id,
                sale_id,
                reason: reason.clone(),
                occurred_at,
            }),
        )?;
        let voided: SaleVoided = events
            .into_iter()
            .find_map(|e| match e {
                SaleEvent::SaleVoided(v) => Some(v),
                _ => None,
            })
            .ok_or_else(|| DispatchError::InvariantViolation("void produced no SaleVoided event".to_string()))?;

        for line in &voided.lines {
            receive(
                &mut uow,
                voided.shop_id,
                line.product_id,
                line.quantity,
                StockMovement::SaleVoided { sale_id: sale_id.0 },
                occurred_at,
            )?;
        }

        uow.commit()
    })
}

/// Post a supplier invoice: blend each line into the product's weighted
/// average cost against the warehouse stock before receipt, then receive it.
#[instrument(
    skip(dispatcher, input),
    fields(tenant_id = %tenant_id, invoice_id = %input.invoice_id, warehouse_id = %input.warehouse_id),
    err
)]
pub fn post_invoice<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    tenant_id: TenantId,
    input: &InvoiceInput,
) -> Result<Vec<StoredEvent>, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    with_conflict_retry(|| {
        let mut uow = dispatcher.begin(tenant_id);

        let warehouse: Location = uow.load(input.warehouse_id.0)?;
        warehouse.ensure_active(LocationKind::Warehouse)?;
        for line in &input.lines {
            ensure_receivable(&uow.load::<Product>(line.product_id.0)?)?;
        }

        let events = uow.execute::<SupplierInvoice>(
            input.invoice_id.0,
            InvoiceCommand::PostInvoice(PostInvoice {
                tenant_id,
                invoice_id: input.invoice_id,
                warehouse_id: input.warehouse_id,
                supplier: input.supplier.clone(),
                reference: input.reference.clone(),
                invoice_date: input.invoice_date,
                lines: input.lines.clone(),
                occurred_at: input.occurred_at,
            }),
        )?;
        let posted: InvoicePosted = events
            .into_iter()
            .find_map(|e| match e {
                InvoiceEvent::InvoicePosted(p) => Some(p),
                _ => None,
            })
            .ok_or_else(|| DispatchError::InvariantViolation("post produced no InvoicePosted event".to_string()))?;

        for line in &posted.lines {
            let record: InventoryRecord =
                uow.load(InventoryRecordId::for_pair(posted.warehouse_id, line.product_id).0)?;
            uow.execute::<Product>(
                line.product_id.0,
                ProductCommand::ApplyReceiptCost(ApplyReceiptCost {
                    tenant_id,
                    product_id: line.product_id,
                    on_hand_before: record.on_hand(),
                    quantity: line.quantity,
                    unit_cost: line.unit_cost,
                    reference: input.invoice_id.0,
                    occurred_at: input.occurred_at,
                }),
            )?;
            receive(
                &mut uow,
                posted.warehouse_id,
                line.product_id,
                line.quantity,
                StockMovement::InvoiceReceipt { invoice_id: input.invoice_id.0 },
                input.occurred_at,
            )?;
        }

        uow.commit()
    })
}

/// Void a supplier invoice: issue its units back out of the warehouse
/// (fails when they were already sold or moved) and reverse the cost.
#[instrument(skip(dispatcher, reason), fields(tenant_id = %tenant_id, invoice_id = %invoice_id), err)]
pub fn void_invoice<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    tenant_id: TenantId,
    invoice_id: SupplierInvoiceId,
    reason: Option<String>,
    occurred_at: DateTime<Utc>,
) -> Result<Vec<StoredEvent>, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    with_conflict_retry(|| {
        let mut uow = dispatcher.begin(tenant_id);

        let events = uow.execute::<SupplierInvoice>(
            invoice_id.0,
            InvoiceCommand::VoidInvoice(VoidInvoice {
                tenant_id,
                invoice_id,
                reason: reason.clone(),
                occurred_at,
            }),
        )?;
        let voided: InvoiceVoided = events
            .into_iter()
            .find_map(|e| match e {
                InvoiceEvent::InvoiceVoided(v) => Some(v),
                _ => None,
            })
            .ok_or_else(|| DispatchError::InvariantViolation("void produced no InvoiceVoided event".to_string()))?;

        for line in &voided.lines {
            let record: InventoryRecord =
                uow.load(InventoryRecordId::for_pair(voided.warehouse_id, line.product_id).0)?;
            let on_hand_before = record.on_hand();
            issue(
                &mut uow,
                voided.warehouse_id,
                line.product_id,
                line.quantity,
                StockMovement::InvoiceVoided { invoice_id: invoice_id.0 },
                occurred_at,
            )?;
            uow.execute::<Product>(
                line.product_id.0,
                ProductCommand::ReverseReceiptCost(ReverseReceiptCost {
                    tenant_id,
                    product_id: line.product_id,
                    on_hand_before,
                    quantity: line.quantity,
                    unit_cost: line.unit_cost,
                    reference: invoice_id.0,
                    occurred_at,
                }),
            )?;
        }

        uow.commit()
    })
}

/// Send stock from one location to another; the source is decremented now,
/// the destination when the transfer is received.
#[instrument(
    skip(dispatcher, input),
    fields(tenant_id = %tenant_id, transfer_id = %input.transfer_id, from = %input.from, to = %input.to),
    err
)]
pub fn dispatch_transfer<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    tenant_id: TenantId,
    input: &TransferInput,
) -> Result<Vec<StoredEvent>, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    with_conflict_retry(|| {
        let mut uow = dispatcher.begin(tenant_id);

        uow.load::<Location>(input.from.0)?.ensure_open()?;
        uow.load::<Location>(input.to.0)?.ensure_open()?;
        for line in &input.lines {
            ensure_product_exists(&uow.load::<Product>(line.product_id.0)?)?;
        }

        uow.execute::<Transfer>(
            input.transfer_id.0,
            TransferCommand::DispatchTransfer(DispatchTransfer {
                tenant_id,
                transfer_id: input.transfer_id,
                from: input.from,
                to: input.to,
                lines: input.lines.clone(),
                note: input.note.clone(),
                occurred_at: input.occurred_at,
            }),
        )?;

        for line in &input.lines {
            issue(
                &mut uow,
                input.from,
                line.product_id,
                line.quantity,
                StockMovement::TransferOut { transfer_id: input.transfer_id.0 },
                input.occurred_at,
            )?;
        }

        uow.commit()
    })
}

/// Book an in-transit transfer into its destination.
#[instrument(skip(dispatcher), fields(tenant_id = %tenant_id, transfer_id = %transfer_id), err)]
pub fn receive_transfer<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    tenant_id: TenantId,
    transfer_id: TransferId,
    occurred_at: DateTime<Utc>,
) -> Result<Vec<StoredEvent>, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    with_conflict_retry(|| {
        let mut uow = dispatcher.begin(tenant_id);

        let events = uow.execute::<Transfer>(
            transfer_id.0,
            TransferCommand::ReceiveTransfer(ReceiveTransfer {
                tenant_id,
                transfer_id,
                occurred_at,
            }),
        )?;
        let received: TransferReceived = events
            .into_iter()
            .find_map(|e| match e {
                TransferEvent::TransferReceived(r) => Some(r),
                _ => None,
            })
            .ok_or_else(|| {
                DispatchError::InvariantViolation("receive produced no TransferReceived event".to_string())
            })?;

        uow.load::<Location>(received.to.0)?.ensure_open()?;
        for line in &received.lines {
            receive(
                &mut uow,
                received.to,
                line.product_id,
                line.quantity,
                StockMovement::TransferIn { transfer_id: transfer_id.0 },
                occurred_at,
            )?;
        }

        uow.commit()
    })
}

/// Cancel an in-transit transfer and restore the source stock.
#[instrument(skip(dispatcher, reason), fields(tenant_id = %tenant_id, transfer_id = %transfer_id), err)]
pub fn cancel_transfer<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    tenant_id: TenantId,
    transfer_id: TransferId,
    reason: Option<String>,
    occurred_at: DateTime<Utc>,
) -> Result<Vec<StoredEvent>, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    with_conflict_retry(|| {
        let mut uow = dispatcher.begin(tenant_id);

        let events = uow.execute::<Transfer>(
            transfer_id.0,
            TransferCommand::CancelTransfer(CancelTransfer {
                tenant_id,
                transfer_id,
                reason: reason.clone(),
                occurred_at,
            }),
        )?;
        let cancelled: TransferCancelled = events
            .into_iter()
            .find_map(|e| match e {
                TransferEvent::TransferCancelled(c) => Some(c),
                _ => None,
            })
            .ok_or_else(|| {
                DispatchError::InvariantViolation("cancel produced no TransferCancelled event".to_string())
            })?;

        for line in &cancelled.lines {
            receive(
                &mut uow,
                cancelled.from,
                line.product_id,
                line.quantity,
                StockMovement::TransferCancelled { transfer_id: transfer_id.0 },
                occurred_at,
            )?;
        }

        uow.commit()
    })
}

/// Manual stock correction at an open location.
#[instrument(
    skip(dispatcher, note),
    fields(tenant_id = %tenant_id, location_id = %location_id, product_id = %product_id, delta),
    err
)]
pub fn adjust_stock<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    tenant_id: TenantId,
    location_id: LocationId,
    product_id: ProductId,
    delta: i64,
    note: Option<String>,
    occurred_at: DateTime<Utc>,
) -> Result<Vec<StoredEvent>, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    with_conflict_retry(|| {
        let mut uow = dispatcher.begin(tenant_id);

        uow.load::<Location>(location_id.0)?.ensure_open()?;
        ensure_product_exists(&uow.load::<Product>(product_id.0)?)?;

        uow.execute::<InventoryRecord>(
            InventoryRecordId::for_pair(location_id, product_id).0,
            InventoryCommand::AdjustStock(AdjustStock {
                tenant_id,
                location_id,
                product_id,
                delta,
                note: note.clone(),
                occurred_at,
            }),
        )?;

        uow.commit()
    })
}

/// Set (or clear) the low-stock threshold of a product at a location.
#[instrument(skip(dispatcher), fields(tenant_id = %tenant_id, location_id = %location_id, product_id = %product_id), err)]
pub fn set_reorder_level<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    tenant_id: TenantId,
    location_id: LocationId,
    product_id: ProductId,
    level: Option<i64>,
    occurred_at: DateTime<Utc>,
) -> Result<Vec<StoredEvent>, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    with_conflict_retry(|| {
        let mut uow = dispatcher.begin(tenant_id);

        if !uow.load::<Location>(location_id.0)?.exists() {
            return Err(DispatchError::NotFound);
        }
        ensure_product_exists(&uow.load::<Product>(product_id.0)?)?;

        uow.execute::<InventoryRecord>(
            InventoryRecordId::for_pair(location_id, product_id).0,
            InventoryCommand::SetReorderLevel(SetReorderLevel {
                tenant_id,
                location_id,
                product_id,
                level,
                occurred_at,
            }),
        )?;

        uow.commit()
    })
}

fn issue<S, B>(
    uow: &mut UnitOfWork<'_, S, B>,
    location_id: LocationId,
    product_id: ProductId,
    quantity: i64,
    movement: StockMovement,
    occurred_at: DateTime<Utc>,
) -> Result<(), DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let tenant_id = uow.tenant_id();
    uow.execute::<InventoryRecord>(
        InventoryRecordId::for_pair(location_id, product_id).0,
        InventoryCommand::IssueStock(IssueStock {
            tenant_id,
            location_id,
            product_id,
            quantity,
            movement,
            occurred_at,
        }),
    )?;
    Ok(())
}

fn receive<S, B>(
    uow: &mut UnitOfWork<'_, S, B>,
    location_id: LocationId,
    product_id: ProductId,
    quantity: i64,
    movement: StockMovement,
    occurred_at: DateTime<Utc>,
) -> Result<(), DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let tenant_id = uow.tenant_id();
    uow.execute::<InventoryRecord>(
        InventoryRecordId::for_pair(location_id, product_id).0,
        InventoryCommand::ReceiveStock(ReceiveStock {
            tenant_id,
            location_id,
            product_id,
            quantity,
            movement,
            occurred_at,
        }),
    )?;
    Ok(())
}

fn ensure_product_exists(product: &Product) -> Result<(), DispatchError> {
    if product.exists() { Ok(()) } else { Err(DispatchError::NotFound) }
}

fn ensure_receivable(product: &Product) -> Result<(), DispatchError> {
    ensure_product_exists(product)?;
    if product.status() == ProductStatus::Archived {
        return Err(DispatchError::InvariantViolation(format!(
            "product {} is archived and cannot be received",
            product.sku()
        )));
    }
    Ok(())
}

//! End-to-end tests of the retail pipeline:
//! workflow → event store → bus → read models.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::Value as JsonValue;

use retailops_core::{AggregateId, TenantId};
use retailops_events::{EventEnvelope, InMemoryEventBus};
use retailops_inventory::{InventoryRecord, InventoryRecordId};
use retailops_invoicing::{InvoiceStatus, NewInvoiceLine, SupplierInvoiceId};
use retailops_locations::{Location, LocationCommand, LocationId, LocationKind, OpenLocation};
use retailops_products::{ActivateProduct, CreateProduct, Product, ProductCommand, ProductId};
use retailops_sales::{PaymentMethod, SaleId, SaleStatus};
use retailops_transfers::{TransferId, TransferLine, TransferStatus};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::{EventStore, InMemoryEventStore};
use crate::projections::{DashboardQuery, RetailReadModels};
use crate::workers::ReadModelWorker;
use crate::workflows::{
    InvoiceInput, RecordSaleInput, SaleLineInput, TransferInput, adjust_stock, cancel_transfer, dispatch_transfer,
    post_invoice, receive_transfer, record_sale, set_reorder_level, void_invoice, void_sale,
};

type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
type Dispatcher = CommandDispatcher<InMemoryEventStore, Bus>;

struct Harness {
    tenant: TenantId,
    dispatcher: Dispatcher,
    read_models: RetailReadModels,
}

fn at(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, day, 12, 0, 0).unwrap()
}

impl Harness {
    fn new() -> Self {
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        Self {
            tenant: TenantId::new(),
            dispatcher: CommandDispatcher::new(InMemoryEventStore::new(), bus),
            read_models: RetailReadModels::new(),
        }
    }

    fn sync(&self, result: Result<Vec<crate::event_store::StoredEvent>, DispatchError>) -> Result<(), DispatchError> {
        let committed = result?;
        self.read_models.apply_stored(&committed);
        Ok(())
    }

    fn open(&self, kind: LocationKind, code: &str) -> LocationId {
        let id = LocationId::new(AggregateId::new());
        let committed = self
            .dispatcher
            .dispatch::<Location>(
                self.tenant,
                id.0,
                LocationCommand::OpenLocation(OpenLocation {
                    tenant_id: self.tenant,
                    location_id: id,
                    kind,
                    code: code.to_string(),
                    name: format!("{code} location"),
                    address: None,
                    occurred_at: at(1),
                }),
            )
            .unwrap();
        self.read_models.apply_stored(&committed);
        id
    }

    fn product(&self, sku: &str, price: u64) -> ProductId {
        let id = ProductId::new(AggregateId::new());
        let create = ProductCommand::CreateProduct(CreateProduct {
            tenant_id: self.tenant,
            product_id: id,
            sku: sku.to_string(),
            name: sku.to_lowercase(),
            category: None,
            barcode: None,
            price,
            occurred_at: at(1),
        });
        let activate = ProductCommand::ActivateProduct(ActivateProduct {
            tenant_id: self.tenant,
            product_id: id,
            occurred_at: at(1),
        });
        for cmd in [create, activate] {
            let committed = self.dispatcher.dispatch::<Product>(self.tenant, id.0, cmd).unwrap();
            self.read_models.apply_stored(&committed);
        }
        id
    }

    fn on_hand(&self, location: LocationId, product: ProductId) -> i64 {
        self.dispatcher
            .load::<InventoryRecord>(self.tenant, InventoryRecordId::for_pair(location, product).0)
            .unwrap()
            .on_hand()
    }

    fn unit_cost(&self, product: ProductId) -> u64 {
        self.dispatcher.load::<Product>(self.tenant, product.0).unwrap().unit_cost()
    }

    fn invoice(&self, warehouse: LocationId, reference: &str, lines: Vec<NewInvoiceLine>) -> SupplierInvoiceId {
        let id = SupplierInvoiceId::new(AggregateId::new());
        let input = InvoiceInput {
            invoice_id: id,
            warehouse_id: warehouse,
            supplier: "Acme Wholesale".to_string(),
            reference: reference.to_string(),
            invoice_date: None,
            lines,
            occurred_at: at(2),
        };
        self.sync(post_invoice(&self.dispatcher, self.tenant, &input)).unwrap();
        id
    }

    fn sale_input(&self, shop: LocationId, lines: Vec<SaleLineInput>, day: u32) -> RecordSaleInput {
        RecordSaleInput {
            sale_id: SaleId::new(AggregateId::new()),
            shop_id: shop,
            cashier_id: None,
            payment: PaymentMethod::Card,
            lines,
            discount: 0,
            occurred_at: at(day),
        }
    }

    fn event_count(&self) -> usize {
        self.dispatcher.store().load_all().unwrap().len()
    }
}

fn sell(product: ProductId, quantity: i64) -> SaleLineInput {
    SaleLineInput { product_id: product, quantity, unit_price: None }
}

fn stock_in(product: ProductId, quantity: i64, unit_cost: u64) -> NewInvoiceLine {
    NewInvoiceLine { product_id: product, quantity, unit_cost }
}

#[test]
fn sale_decrements_shop_stock_and_void_restores_it() {
    let h = Harness::new();
    let shop = h.open(LocationKind::Shop, "dt1");
    let tea = h.product("TEA-1", 450);
    h.sync(adjust_stock(&h.dispatcher, h.tenant, shop, tea, 10, Some("opening count".into()), at(1)))
        .unwrap();

    let sale = h.sale_input(shop, vec![sell(tea, 3)], 3);
    h.sync(record_sale(&h.dispatcher, h.tenant, &sale)).unwrap();
    assert_eq!(h.on_hand(shop, tea), 7);

    let view = h.read_models.sales.get(h.tenant, &sale.sale_id).unwrap();
    assert_eq!(view.total, 1350);
    assert_eq!(view.lines[0].unit_price, 450);
    assert_eq!(h.read_models.inventory.get(h.tenant, shop, tea).unwrap().on_hand, 7);

    h.sync(void_sale(&h.dispatcher, h.tenant, sale.sale_id, Some("customer return".into()), at(4)))
        .unwrap();
    assert_eq!(h.on_hand(shop, tea), 10);
    assert_eq!(h.read_models.sales.get(h.tenant, &sale.sale_id).unwrap().status, SaleStatus::Voided);

    let err = void_sale(&h.dispatcher, h.tenant, sale.sale_id, None, at(5)).unwrap_err();
    assert!(matches!(err, DispatchError::Conflict(_)));
    assert_eq!(h.on_hand(shop, tea), 10);
}

#[test]
fn failed_sale_leaves_the_store_untouched() {
    let h = Harness::new();
    let shop = h.open(LocationKind::Shop, "dt1");
    let (tea, mug) = (h.product("TEA-1", 450), h.product("MUG-1", 900));
    h.sync(adjust_stock(&h.dispatcher, h.tenant, shop, tea, 5, None, at(1))).unwrap();
    h.sync(adjust_stock(&h.dispatcher, h.tenant, shop, mug, 1, None, at(1))).unwrap();
    let before = h.event_count();

    // The second line cannot be satisfied; the first must not be decremented either.
    let sale = h.sale_input(shop, vec![sell(tea, 2), sell(mug, 2)], 2);
    let err = record_sale(&h.dispatcher, h.tenant, &sale).unwrap_err();
    assert!(matches!(err, DispatchError::InvariantViolation(msg) if msg.contains("insufficient stock")));

    assert_eq!(h.event_count(), before);
    assert_eq!(h.on_hand(shop, tea), 5);
    assert!(h.dispatcher.store().load_stream(h.tenant, sale.sale_id.0).unwrap().is_empty());
}

#[test]
fn sales_require_an_active_shop_and_sellable_products() {
    let h = Harness::new();
    let warehouse = h.open(LocationKind::Warehouse, "wh1");
    let shop = h.open(LocationKind::Shop, "dt1");
    let tea = h.product("TEA-1", 450);

    let at_warehouse = h.sale_input(warehouse, vec![sell(tea, 1)], 2);
    assert!(matches!(
        record_sale(&h.dispatcher, h.tenant, &at_warehouse).unwrap_err(),
        DispatchError::Validation(_)
    ));

    let unknown = h.sale_input(shop, vec![sell(ProductId::new(AggregateId::new()), 1)], 2);
    assert!(matches!(record_sale(&h.dispatcher, h.tenant, &unknown).unwrap_err(), DispatchError::NotFound));
}

#[test]
fn invoices_receive_stock_and_average_the_cost() {
    let h = Harness::new();
    let warehouse = h.open(LocationKind::Warehouse, "wh1");
    let rice = h.product("RICE-5", 1200);

    h.invoice(warehouse, "INV-001", vec![stock_in(rice, 10, 100)]);
    assert_eq!(h.unit_cost(rice), 100);

    let second = h.invoice(warehouse, "INV-002", vec![stock_in(rice, 10, 200)]);
    assert_eq!(h.on_hand(warehouse, rice), 20);
    assert_eq!(h.unit_cost(rice), 150);
    assert_eq!(h.read_models.catalog.get(h.tenant, &rice).unwrap().unit_cost, 150);
    assert!(h.read_models.invoices.find_posted(h.tenant, "acme wholesale", "inv-002").is_some());

    h.sync(void_invoice(&h.dispatcher, h.tenant, second, None, at(3))).unwrap();
    assert_eq!(h.on_hand(warehouse, rice), 10);
    assert_eq!(h.unit_cost(rice), 100);
    assert_eq!(h.read_models.invoices.get(h.tenant, &second).unwrap().status, InvoiceStatus::Voided);
    assert!(h.read_models.invoices.find_posted(h.tenant, "Acme Wholesale", "INV-002").is_none());
}

#[test]
fn invoice_void_fails_once_its_stock_has_moved_on() {
    let h = Harness::new();
    let warehouse = h.open(LocationKind::Warehouse, "wh1");
    let shop = h.open(LocationKind::Shop, "dt1");
    let rice = h.product("RICE-5", 1200);
    let invoice = h.invoice(warehouse, "INV-001", vec![stock_in(rice, 10, 100)]);

    let transfer = TransferInput {
        transfer_id: TransferId::new(AggregateId::new()),
        from: warehouse,
        to: shop,
        lines: vec![TransferLine { product_id: rice, quantity: 8 }],
        note: None,
        occurred_at: at(3),
    };
    h.sync(dispatch_transfer(&h.dispatcher, h.tenant, &transfer)).unwrap();
    let before = h.event_count();

    let err = void_invoice(&h.dispatcher, h.tenant, invoice, None, at(4)).unwrap_err();
    assert!(matches!(err, DispatchError::InvariantViolation(_)));
    assert_eq!(h.event_count(), before);
    assert_eq!(h.read_models.invoices.get(h.tenant, &invoice).unwrap().status, InvoiceStatus::Posted);
}

#[test]
fn transfers_move_stock_in_two_steps() {
    let h = Harness::new();
    let warehouse = h.open(LocationKind::Warehouse, "wh1");
    let shop = h.open(LocationKind::Shop, "dt1");
    let rice = h.product("RICE-5", 1200);
    h.invoice(warehouse, "INV-001", vec![stock_in(rice, 10, 100)]);

    let input = |qty| TransferInput {
        transfer_id: TransferId::new(AggregateId::new()),
        from: warehouse,
        to: shop,
        lines: vec![TransferLine { product_id: rice, quantity: qty }],
        note: Some("weekly restock".into()),
        occurred_at: at(3),
    };

    let first = input(4);
    h.sync(dispatch_transfer(&h.dispatcher, h.tenant, &first)).unwrap();
    assert_eq!(h.on_hand(warehouse, rice), 6);
    assert_eq!(h.on_hand(shop, rice), 0);
    h.sync(receive_transfer(&h.dispatcher, h.tenant, first.transfer_id, at(4))).unwrap();
    assert_eq!(h.on_hand(shop, rice), 4);

    let second = input(5);
    h.sync(dispatch_transfer(&h.dispatcher, h.tenant, &second)).unwrap();
    assert_eq!(h.on_hand(warehouse, rice), 1);
    h.sync(cancel_transfer(&h.dispatcher, h.tenant, second.transfer_id, None, at(4))).unwrap();
    assert_eq!(h.on_hand(warehouse, rice), 6);

    let err = receive_transfer(&h.dispatcher, h.tenant, second.transfer_id, at(5)).unwrap_err();
    assert!(matches!(err, DispatchError::Conflict(_) | DispatchError::InvariantViolation(_)));

    let in_transit = h.read_models.transfers.list(h.tenant, Some(shop), Some(TransferStatus::InTransit));
    assert!(in_transit.is_empty());
    assert_eq!(h.read_models.transfers.list(h.tenant, Some(warehouse), None).len(), 2);
}

#[test]
fn low_stock_follows_the_reorder_level() {
    let h = Harness::new();
    let shop = h.open(LocationKind::Shop, "dt1");
    let tea = h.product("TEA-1", 450);
    h.sync(adjust_stock(&h.dispatcher, h.tenant, shop, tea, 6, None, at(1))).unwrap();
    h.sync(set_reorder_level(&h.dispatcher, h.tenant, shop, tea, Some(5), at(1))).unwrap();
    assert!(h.read_models.inventory.low_stock(h.tenant, None).is_empty());

    let sale = h.sale_input(shop, vec![sell(tea, 2)], 2);
    h.sync(record_sale(&h.dispatcher, h.tenant, &sale)).unwrap();
    let low = h.read_models.inventory.low_stock(h.tenant, Some(shop));
    assert_eq!(low.len(), 1);
    assert_eq!(low[0].on_hand, 4);
}

#[test]
fn racing_commits_delivered_out_of_order_all_reach_the_read_models() {
    let h = Harness::new();
    let shop = h.open(LocationKind::Shop, "dt1");
    let tea = h.product("TEA-1", 450);
    h.sync(adjust_stock(&h.dispatcher, h.tenant, shop, tea, 10, None, at(1))).unwrap();

    let first = adjust_stock(&h.dispatcher, h.tenant, shop, tea, -3, None, at(2)).unwrap();
    let second = adjust_stock(&h.dispatcher, h.tenant, shop, tea, -2, None, at(2)).unwrap();

    // The second commit's synchronous apply and bus delivery both win the race.
    h.read_models.apply_stored(&second);
    h.read_models.apply_stored(&second);
    h.read_models.apply_stored(&first);
    h.read_models.apply_stored(&first);

    assert_eq!(h.on_hand(shop, tea), 5);
    let level = h.read_models.inventory.get(h.tenant, shop, tea).unwrap();
    assert_eq!(level.on_hand, 5);
}

#[test]
fn a_stream_seen_first_mid_history_is_not_skipped_from_the_start() {
    let h = Harness::new();
    let shop = h.open(LocationKind::Shop, "dt1");
    let tea = h.product("TEA-1", 450);

    let opening = adjust_stock(&h.dispatcher, h.tenant, shop, tea, 4, None, at(1)).unwrap();
    let later = adjust_stock(&h.dispatcher, h.tenant, shop, tea, 3, None, at(2)).unwrap();

    h.read_models.apply_stored(&later);
    assert!(h.read_models.inventory.get(h.tenant, shop, tea).is_none());

    h.read_models.apply_stored(&opening);
    assert_eq!(h.read_models.inventory.get(h.tenant, shop, tea).unwrap().on_hand, 7);
}

#[test]
fn tenants_cannot_touch_each_others_documents() {
    let h = Harness::new();
    let shop = h.open(LocationKind::Shop, "dt1");
    let tea = h.product("TEA-1", 450);
    h.sync(adjust_stock(&h.dispatcher, h.tenant, shop, tea, 3, None, at(1))).unwrap();
    let sale = h.sale_input(shop, vec![sell(tea, 1)], 2);
    h.sync(record_sale(&h.dispatcher, h.tenant, &sale)).unwrap();

    let other = TenantId::new();
    assert!(matches!(
        void_sale(&h.dispatcher, other, sale.sale_id, None, at(3)).unwrap_err(),
        DispatchError::NotFound
    ));
    assert!(matches!(
        record_sale(&h.dispatcher, other, &h.sale_input(shop, vec![sell(tea, 1)], 3)).unwrap_err(),
        DispatchError::NotFound
    ));
    assert!(h.read_models.sales.list(other, None).is_empty());
    assert!(h.read_models.catalog.list(other).is_empty());
}

#[test]
fn read_models_rebuild_from_the_full_history() {
    let h = Harness::new();
    let warehouse = h.open(LocationKind::Warehouse, "wh1");
    let shop = h.open(LocationKind::Shop, "dt1");
    let rice = h.product("RICE-5", 1200);
    h.invoice(warehouse, "INV-001", vec![stock_in(rice, 10, 700)]);
    let transfer = TransferInput {
        transfer_id: TransferId::new(AggregateId::new()),
        from: warehouse,
        to: shop,
        lines: vec![TransferLine { product_id: rice, quantity: 6 }],
        note: None,
        occurred_at: at(3),
    };
    h.sync(dispatch_transfer(&h.dispatcher, h.tenant, &transfer)).unwrap();
    h.sync(receive_transfer(&h.dispatcher, h.tenant, transfer.transfer_id, at(3))).unwrap();
    for day in [4, 5] {
        let sale = h.sale_input(shop, vec![sell(rice, 2)], day);
        h.sync(record_sale(&h.dispatcher, h.tenant, &sale)).unwrap();
    }

    let query = DashboardQuery::new(NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(), NaiveDate::from_ymd_opt(2026, 5, 31).unwrap());
    let live = h.read_models.dashboard.overview(h.tenant, &query);
    assert_eq!(live.totals.revenue, 4800);
    assert_eq!(live.totals.cost, 2800);
    assert_eq!(live.totals.sales, 2);

    let rebuilt = RetailReadModels::new();
    let report = rebuilt.rebuild(&h.dispatcher.store().load_all().unwrap());
    assert_eq!(report.failed_projections, 0);
    assert_eq!(rebuilt.dashboard.overview(h.tenant, &query), live);
    assert_eq!(rebuilt.inventory.get(h.tenant, shop, rice).unwrap().on_hand, 2);
    assert_eq!(rebuilt.catalog.get(h.tenant, &rice).unwrap().unit_cost, 700);
}

#[test]
fn worker_applies_published_events() {
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let read_models = Arc::new(RetailReadModels::new());
    let worker = ReadModelWorker::spawn(&bus, read_models.clone()).unwrap();

    let h = Harness {
        tenant: TenantId::new(),
        dispatcher: CommandDispatcher::new(InMemoryEventStore::new(), bus),
        read_models: RetailReadModels::new(),
    };
    let shop = h.open(LocationKind::Shop, "dt1");

    let deadline = Instant::now() + Duration::from_secs(2);
    while read_models.locations.get(h.tenant, &shop).is_none() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(read_models.locations.get(h.tenant, &shop).unwrap().code, "DT1");

    // Already applied: a second delivery is a no-op.
    for event in h.dispatcher.store().load_all().unwrap() {
        read_models.apply(&event.to_envelope());
    }
    assert_eq!(read_models.locations.list(h.tenant, None).len(), 1);

    worker.shutdown();
}

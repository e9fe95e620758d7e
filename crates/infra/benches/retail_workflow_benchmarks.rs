use std::sync::Arc;

use chrono::Utc;
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use serde_json::Value as JsonValue;

use retailops_core::{AggregateId, TenantId};
use retailops_events::{EventEnvelope, InMemoryEventBus};
use retailops_infra::command_dispatcher::CommandDispatcher;
use retailops_infra::event_store::{EventStore, InMemoryEventStore};
use retailops_infra::projections::RetailReadModels;
use retailops_infra::workflows::{RecordSaleInput, SaleLineInput, adjust_stock, record_sale};
use retailops_locations::{Location, LocationCommand, LocationId, LocationKind, OpenLocation};
use retailops_products::{ActivateProduct, CreateProduct, Product, ProductCommand, ProductId};
use retailops_sales::{PaymentMethod, SaleId};

type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
type Dispatcher = CommandDispatcher<InMemoryEventStore, Bus>;

struct Shop {
    dispatcher: Dispatcher,
    tenant: TenantId,
    shop: LocationId,
    products: Vec<ProductId>,
}

fn stocked_shop(product_count: usize, units_each: i64) -> Shop {
    let dispatcher = CommandDispatcher::new(InMemoryEventStore::new(), Arc::new(InMemoryEventBus::new()));
    let tenant = TenantId::new();
    let shop = LocationId::new(AggregateId::new());
    dispatcher
        .dispatch::<Location>(
            tenant,
            shop.0,
            LocationCommand::OpenLocation(OpenLocation {
                tenant_id: tenant,
                location_id: shop,
                kind: LocationKind::Shop,
                code: "BENCH".to_string(),
                name: "Bench shop".to_string(),
                address: None,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

    let mut products = Vec::with_capacity(product_count);
    for i in 0..product_count {
        let id = ProductId::new(AggregateId::new());
        let create = ProductCommand::CreateProduct(CreateProduct {
            tenant_id: tenant,
            product_id: id,
            sku: format!("SKU-{i}"),
            name: format!("Product {i}"),
            category: None,
            barcode: None,
            price: 100 + i as u64,
            occurred_at: Utc::now(),
        });
        let activate = ProductCommand::ActivateProduct(ActivateProduct {
            tenant_id: tenant,
            product_id: id,
            occurred_at: Utc::now(),
        });
        dispatcher.dispatch::<Product>(tenant, id.0, create).unwrap();
        dispatcher.dispatch::<Product>(tenant, id.0, activate).unwrap();
        adjust_stock(&dispatcher, tenant, shop, id, units_each, None, Utc::now()).unwrap();
        products.push(id);
    }

    Shop { dispatcher, tenant, shop, products }
}

fn sale(shop: &Shop, lines: usize) -> RecordSaleInput {
    RecordSaleInput {
        sale_id: SaleId::new(AggregateId::new()),
        shop_id: shop.shop,
        cashier_id: None,
        payment: PaymentMethod::Cash,
        lines: shop
            .products
            .iter()
            .take(lines)
            .map(|p| SaleLineInput { product_id: *p, quantity: 1, unit_price: None })
            .collect(),
        discount: 0,
        occurred_at: Utc::now(),
    }
}

fn bench_record_sale(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_sale");

    for lines in [1usize, 5, 20] {
        group.throughput(Throughput::Elements(lines as u64));
        group.bench_with_input(BenchmarkId::from_parameter(lines), &lines, |b, &lines| {
            let shop = stocked_shop(lines, 1_000_000);
            b.iter(|| {
                let input = sale(&shop, lines);
                black_box(record_sale(&shop.dispatcher, shop.tenant, &input).unwrap());
            });
        });
    }

    group.finish();
}

fn bench_read_model_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_model_rebuild");
    group.sample_size(20);

    for sales in [100usize, 1_000] {
        let shop = stocked_shop(5, 1_000_000);
        for _ in 0..sales {
            record_sale(&shop.dispatcher, shop.tenant, &sale(&shop, 3)).unwrap();
        }
        let history = shop.dispatcher.store().load_all().unwrap();

        group.throughput(Throughput::Elements(history.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(sales), &history, |b, history| {
            b.iter(|| {
                let read_models = RetailReadModels::new();
                black_box(read_models.rebuild(history));
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_record_sale, bench_read_model_rebuild);
criterion_main!(benches);

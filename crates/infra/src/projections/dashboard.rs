//! Revenue aggregation for dashboards.
//!
//! Two rollups are kept per tenant: one row per (shop, day) and one row per
//! (shop, product, day). A voided sale is subtracted from the day it was sold
//! on, not the day it was voided.

use std::collections::{BTreeMap, HashMap};

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use retailops_core::TenantId;
use retailops_events::EventEnvelope;
use retailops_locations::LocationId;
use retailops_products::ProductId;
use retailops_sales::{SaleEvent, SaleLine};

use super::cursor::{ProjectionError, StreamCursors, decode, ensure_matches};
use super::Projection;
use crate::read_model::{InMemoryTenantStore, TenantStore};

pub type ShopDayKey = (LocationId, NaiveDate);
pub type ProductDayKey = (LocationId, ProductId, NaiveDate);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyShopSales {
    pub shop_id: LocationId,
    pub date: NaiveDate,
    pub revenue: u64,
    pub cost: u64,
    pub sales: u64,
    pub units: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyProductSales {
    pub shop_id: LocationId,
    pub product_id: ProductId,
    pub date: NaiveDate,
    pub units: i64,
    /// Line revenue before the sale-level discount.
    pub revenue: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DashboardQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
    /// `None` means every shop of the tenant.
    pub shops: Option<Vec<LocationId>>,
    pub top_products: usize,
}

impl DashboardQuery {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Self {
        Self { from, to, shops: None, top_products: 10 }
    }

    pub fn for_shops(mut self, shops: Vec<LocationId>) -> Self {
        self.shops = Some(shops);
        self
    }

    fn includes(&self, shop_id: LocationId, date: NaiveDate) -> bool {
        date >= self.from
            && date <= self.to
            && self.shops.as_ref().is_none_or(|shops| shops.contains(&shop_id))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardTotals {
    pub revenue: u64,
    pub cost: u64,
    pub gross_profit: i64,
    /// `gross_profit / revenue`, zero without revenue.
    pub margin: f64,
    pub sales: u64,
    pub units: i64,
    pub average_ticket: u64,
}

impl DashboardTotals {
    fn from_sums(revenue: u64, cost: u64, sales: u64, units: i64) -> Self {
        let gross_profit = revenue as i64 - cost as i64;
        let margin = if revenue == 0 { 0.0 } else { gross_profit as f64 / revenue as f64 };
        let average_ticket = if sales == 0 { 0 } else { revenue / sales };
        Self { revenue, cost, gross_profit, margin, sales, units, average_ticket }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyRevenue {
    pub date: NaiveDate,
    pub revenue: u64,
    pub cost: u64,
    pub sales: u64,
    pub units: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShopSummary {
    pub shop_id: LocationId,
    pub revenue: u64,
    pub cost: u64,
    pub gross_profit: i64,
    pub sales: u64,
    pub units: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductSummary {
    pub product_id: ProductId,
    pub units: i64,
    pub revenue: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardOverview {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub totals: DashboardTotals,
    /// One entry per day of the range, zero-filled.
    pub daily: Vec<DailyRevenue>,
    /// Highest revenue first.
    pub shops: Vec<ShopSummary>,
    pub top_products: Vec<ProductSummary>,
}

/// Units sold per day for one product at one shop, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductUnitsHistory {
    pub shop_id: LocationId,
    pub product_id: ProductId,
    pub daily_units: Vec<i64>,
}

#[derive(Debug)]
pub struct DashboardProjection<D, P>
where
    D: TenantStore<ShopDayKey, DailyShopSales>,
    P: TenantStore<ProductDayKey, DailyProductSales>,
{
    shop_days: D,
    product_days: P,
    cursors: StreamCursors,
}

impl
    DashboardProjection<
        InMemoryTenantStore<ShopDayKey, DailyShopSales>,
        InMemoryTenantStore<ProductDayKey, DailyProductSales>,
    >
{
    pub fn in_memory() -> Self {
        Self::new(InMemoryTenantStore::new(), InMemoryTenantStore::new())
    }
}

impl<D, P> DashboardProjection<D, P>
where
    D: TenantStore<ShopDayKey, DailyShopSales>,
    P: TenantStore<ProductDayKey, DailyProductSales>,
{
    pub fn new(shop_days: D, product_days: P) -> Self {
        Self {
            shop_days,
            product_days,
            cursors: StreamCursors::new(),
        }
    }

    pub fn shop_day(&self, tenant_id: TenantId, shop_id: LocationId, date: NaiveDate) -> Option<DailyShopSales> {
        self.shop_days.get(tenant_id, &(shop_id, date))
    }

    pub fn overview(&self, tenant_id: TenantId, query: &DashboardQuery) -> DashboardOverview {
        let rows: Vec<_> = self
            .shop_days
            .list(tenant_id)
            .into_iter()
            .filter(|r| query.includes(r.shop_id, r.date))
            .collect();

        let mut daily: BTreeMap<NaiveDate, DailyRevenue> = BTreeMap::new();
        let mut day = Some(query.from);
        while let Some(d) = day.filter(|d| *d <= query.to) {
            daily.insert(d, DailyRevenue { date: d, revenue: 0, cost: 0, sales: 0, units: 0 });
            day = d.succ_opt();
        }

        let mut shops: HashMap<LocationId, ShopSummary> = HashMap::new();
        for r in &rows {
            if let Some(d) = daily.get_mut(&r.date) {
                d.revenue += r.revenue;
                d.cost += r.cost;
                d.sales += r.sales;
                d.units += r.units;
            }
            let s = shops.entry(r.shop_id).or_insert(ShopSummary {
                shop_id: r.shop_id,
                revenue: 0,
                cost: 0,
                gross_profit: 0,
                sales: 0,
                units: 0,
            });
            s.revenue += r.revenue;
            s.cost += r.cost;
            s.sales += r.sales;
            s.units += r.units;
        }

        let mut shops: Vec<_> = shops
            .into_values()
            .map(|mut s| {
                s.gross_profit = s.revenue as i64 - s.cost as i64;
                s
            })
            .collect();
        shops.sort_by(|a, b| b.revenue.cmp(&a.revenue).then_with(|| a.shop_id.0.cmp(&b.shop_id.0)));

        let totals = DashboardTotals::from_sums(
            rows.iter().map(|r| r.revenue).sum(),
            rows.iter().map(|r| r.cost).sum(),
            rows.iter().map(|r| r.sales).sum(),
            rows.iter().map(|r| r.units).sum(),
        );

        DashboardOverview {
            from: query.from,
            to: query.to,
            totals,
            daily: daily.into_values().collect(),
            shops,
            top_products: self.top_products(tenant_id, query),
        }
    }

    fn top_products(&self, tenant_id: TenantId, query: &DashboardQuery) -> Vec<ProductSummary> {
        let mut by_product: HashMap<ProductId, ProductSummary> = HashMap::new();
        for r in self.product_days.list(tenant_id) {
            if !query.includes(r.shop_id, r.date) {
                continue;
            }
            let p = by_product.entry(r.product_id).or_insert(ProductSummary {
                product_id: r.product_id,
                units: 0,
                revenue: 0,
            });
            p.units += r.units;
            p.revenue += r.revenue;
        }

        let mut out: Vec<_> = by_product.into_values().filter(|p| p.units > 0).collect();
        out.sort_by(|a, b| {
            b.revenue
                .cmp(&a.revenue)
                .then_with(|| b.units.cmp(&a.units))
                .then_with(|| a.product_id.0.cmp(&b.product_id.0))
        });
        out.truncate(query.top_products);
        out
    }

    /// Daily units for the `window_days` days ending at `as_of` (inclusive),
    /// per shop and product that sold anything in that window.
    pub fn units_history(
        &self,
        tenant_id: TenantId,
        shop_id: Option<LocationId>,
        as_of: NaiveDate,
        window_days: u32,
    ) -> Vec<ProductUnitsHistory> {
        if window_days == 0 {
            return Vec::new();
        }
        // Windows reaching past the calendar start are cut at its first day.
        let start = as_of
            .checked_sub_days(Days::new(u64::from(window_days) - 1))
            .unwrap_or(NaiveDate::MIN);

        let mut series: HashMap<(LocationId, ProductId), Vec<i64>> = HashMap::new();
        for r in self.product_days.list(tenant_id) {
            if r.date < start || r.date > as_of || shop_id.is_some_and(|id| id != r.shop_id) {
                continue;
            }
            let idx = (r.date - start).num_days() as usize;
            let days = series
                .entry((r.shop_id, r.product_id))
                .or_insert_with(|| vec![0; window_days as usize]);
            days[idx] += r.units;
        }

        let mut out: Vec<_> = series
            .into_iter()
            .filter(|(_, days)| days.iter().any(|u| *u != 0))
            .map(|((shop_id, product_id), daily_units)| ProductUnitsHistory {
                shop_id,
                product_id,
                daily_units,
            })
            .collect();
        out.sort_by(|a, b| (a.shop_id.0, a.product_id.0).cmp(&(b.shop_id.0, b.product_id.0)));
        out
    }

    /// `sign` is +1 for a sale and -1 for its void.
    fn record(
        &self,
        tenant_id: TenantId,
        shop_id: LocationId,
        date: NaiveDate,
        lines: &[SaleLine],
        total: u64,
        total_cost: u64,
        sign: i64,
    ) {
        let units: i64 = lines.iter().map(|l| l.quantity).sum();
        let key = (shop_id, date);
        let mut day = self.shop_days.get(tenant_id, &key).unwrap_or(DailyShopSales {
            shop_id,
            date,
            revenue: 0,
            cost: 0,
            sales: 0,
            units: 0,
        });
        if sign > 0 {
            day.revenue = day.revenue.saturating_add(total);
            day.cost = day.cost.saturating_add(total_cost);
            day.sales += 1;
        } else {
            day.revenue = day.revenue.saturating_sub(total);
            day.cost = day.cost.saturating_sub(total_cost);
            day.sales = day.sales.saturating_sub(1);
        }
        day.units += sign * units;
        self.shop_days.upsert(tenant_id, key, day);

        for line in lines {
            let key = (shop_id, line.product_id, date);
            let revenue = (line.quantity.max(0) as u64).saturating_mul(line.unit_price);
            let mut row = self.product_days.get(tenant_id, &key).unwrap_or(DailyProductSales {
                shop_id,
                product_id: line.product_id,
                date,
                units: 0,
                revenue: 0,
            });
            row.units += sign * line.quantity;
            row.revenue = if sign > 0 {
                row.revenue.saturating_add(revenue)
            } else {
                row.revenue.saturating_sub(revenue)
            };
            self.product_days.upsert(tenant_id, key, row);
        }
    }
}

impl<D, P> Projection for DashboardProjection<D, P>
where
    D: TenantStore<ShopDayKey, DailyShopSales>,
    P: TenantStore<ProductDayKey, DailyProductSales>,
{
    fn name(&self) -> &'static str {
        "dashboard"
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
                    let date = e.occurred_at.date_naive();
                    self.record(tenant_id, e.shop_id, date, &e.lines, e.total, e.total_cost, 1);
                }
                SaleEvent::SaleVoided(e) => {
                    ensure_matches(envelope, e.tenant_id, e.sale_id.0)?;
                    let date = e.sold_at.date_naive();
                    self.record(tenant_id, e.shop_id, date, &e.lines, e.total, e.total_cost, -1);
                }
            }
            Ok(())
        })
    }

    fn reset(&self, tenants: &[TenantId]) {
        self.cursors.clear();
        for t in tenants {
            self.shop_days.clear_tenant(*t);
            self.product_days.clear_tenant(*t);
        }
    }
}

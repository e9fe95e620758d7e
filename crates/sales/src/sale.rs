use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use retailops_core::{Aggregate, AggregateId, AggregateRoot, DomainError, DomainResult, TenantId, UserId};
use retailops_core::{line_total, sum_amounts};
use retailops_events::Event;
use retailops_locations::LocationId;
use retailops_products::ProductId;

pub const AGGREGATE_TYPE: &str = "sales.sale";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SaleId(pub AggregateId);

impl SaleId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for SaleId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaleStatus {
    Completed,
    Voided,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Card,
    Mobile,
    Other,
}

/// A sold line. `unit_cost` is the product's average cost at sale time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleLine {
    pub line_no: u32,
    pub product_id: ProductId,
    pub quantity: i64,
    /// Price in smallest currency unit (e.g., cents).
    pub unit_price: u64,
    pub unit_cost: u64,
}

/// Line as entered at the till (numbered by the aggregate).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSaleLine {
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: u64,
    pub unit_cost: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SaleTotals {
    pub subtotal: u64,
    pub discount: u64,
    pub total: u64,
    pub total_cost: u64,
    pub units: i64,
}

/// `subtotal = Σ qty·price`, `total = subtotal − discount`, `total_cost = Σ qty·cost`.
pub fn sale_totals(lines: &[SaleLine], discount: u64) -> DomainResult<SaleTotals> {
    let subtotal = sum_amounts(
        lines
            .iter()
            .map(|l| line_total(l.quantity, l.unit_price))
            .collect::<DomainResult<Vec<_>>>()?,
    )?;
    let total_cost = sum_amounts(
        lines
            .iter()
            .map(|l| line_total(l.quantity, l.unit_cost))
            .collect::<DomainResult<Vec<_>>>()?,
    )?;
    let total = subtotal
        .checked_sub(discount)
        .ok_or_else(|| DomainError::validation("discount cannot exceed subtotal"))?;

    Ok(SaleTotals {
        subtotal,
        discount,
        total,
        total_cost,
        units: lines.iter().map(|l| l.quantity).sum(),
    })
}

/// Aggregate root: Sale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sale {
    id: SaleId,
    tenant_id: Option<TenantId>,
    shop_id: Option<LocationId>,
    cashier_id: Option<UserId>,
    payment: PaymentMethod,
    lines: Vec<SaleLine>,
    totals: SaleTotals,
    status: SaleStatus,
    sold_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Sale {
    pub fn empty(id: SaleId) -> Self {
        Self {
            id,
            tenant_id: None,
            shop_id: None,
            cashier_id: None,
            payment: PaymentMethod::Cash,
            lines: Vec::new(),
            totals: SaleTotals::default(),
            status: SaleStatus::Completed,
            sold_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> SaleId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn shop_id(&self) -> Option<LocationId> {
        self.shop_id
    }

    pub fn cashier_id(&self) -> Option<UserId> {
        self.cashier_id
    }

    pub fn payment(&self) -> PaymentMethod {
        self.payment
    }

    pub fn lines(&self) -> &[SaleLine] {
        &self.lines
    }

    pub fn totals(&self) -> SaleTotals {
        self.totals
    }

    pub fn status(&self) -> SaleStatus {
        self.status
    }

    pub fn sold_at(&self) -> Option<DateTime<Utc>> {
        self.sold_at
    }
}

impl AggregateRoot for Sale {
    type Id = SaleId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSale {
    pub tenant_id: TenantId,
    pub sale_id: SaleId,
    pub shop_id: LocationId,
    pub cashier_id: Option<UserId>,
    pub payment: PaymentMethod,
    pub lines: Vec<NewSaleLine>,
    pub discount: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoidSale {
    pub tenant_id: TenantId,
    pub sale_id: SaleId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaleCommand {
    RecordSale(RecordSale),
    VoidSale(VoidSale),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleRecorded {
    pub tenant_id: TenantId,
    pub sale_id: SaleId,
    pub shop_id: LocationId,
    pub cashier_id: Option<UserId>,
    pub payment: PaymentMethod,
    pub lines: Vec<SaleLine>,
    pub subtotal: u64,
    pub discount: u64,
    pub total: u64,
    pub total_cost: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Carries everything needed to reverse the sale in read models.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleVoided {
    pub tenant_id: TenantId,
    pub sale_id: SaleId,
    pub shop_id: LocationId,
    pub lines: Vec<SaleLine>,
    pub total: u64,
    pub total_cost: u64,
    pub sold_at: DateTime<Utc>,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaleEvent {
    SaleRecorded(SaleRecorded),
    SaleVoided(SaleVoided),
}

impl Event for SaleEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SaleEvent::SaleRecorded(_) => "sales.sale.recorded",
            SaleEvent::SaleVoided(_) => "sales.sale.voided",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SaleEvent::SaleRecorded(e) => e.occurred_at,
            SaleEvent::SaleVoided(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Sale {
    type Command = SaleCommand;
    type Event = SaleEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SaleEvent::SaleRecorded(e) => {
                self.id = e.sale_id;
                self.tenant_id = Some(e.tenant_id);
                self.shop_id = Some(e.shop_id);
                self.cashier_id = e.cashier_id;
                self.payment = e.payment;
                self.lines = e.lines.clone();
                self.totals = SaleTotals {
                    subtotal: e.subtotal,
                    discount: e.discount,
                    total: e.total,
                    total_cost: e.total_cost,
                    units: e.lines.iter().map(|l| l.quantity).sum(),
                };
                self.status = SaleStatus::Completed;
                self.sold_at = Some(e.occurred_at);
                self.created = true;
            }
            SaleEvent::SaleVoided(_) => self.status = SaleStatus::Voided,
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SaleCommand::RecordSale(cmd) => self.handle_record(cmd),
            SaleCommand::VoidSale(cmd) => self.handle_void(cmd),
        }
    }
}

impl Sale {
    fn ensure_existing(&self, tenant_id: TenantId, sale_id: SaleId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != sale_id {
            return Err(DomainError::invariant("sale_id mismatch"));
        }
        Ok(())
    }

    fn handle_record(&self, cmd: &RecordSale) -> Result<Vec<SaleEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("sale already recorded"));
        }
        if self.id != cmd.sale_id {
            return Err(DomainError::invariant("sale_id mismatch"));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("a sale needs at least one line"));
        }

        let mut lines = Vec::with_capacity(cmd.lines.len());
        for (idx, l) in cmd.lines.iter().enumerate() {
            if l.quantity <= 0 {
                return Err(DomainError::validation(format!("line {}: quantity must be positive", idx + 1)));
            }
            if l.unit_price == 0 {
                return Err(DomainError::validation(format!(
                    "line {}: unit price must be greater than zero",
                    idx + 1
                )));
            }
            lines.push(SaleLine {
                line_no: (idx + 1) as u32,
                product_id: l.product_id,
                quantity: l.quantity,
                unit_price: l.unit_price,
                unit_cost: l.unit_cost,
            });
        }

        let totals = sale_totals(&lines, cmd.discount)?;

        Ok(vec![SaleEvent::SaleRecorded(SaleRecorded {
            tenant_id: cmd.tenant_id,
            sale_id: cmd.sale_id,
            shop_id: cmd.shop_id,
            cashier_id: cmd.cashier_id,
            payment: cmd.payment,
            lines,
            subtotal: totals.subtotal,
            discount: totals.discount,
            total: totals.total,
            total_cost: totals.total_cost,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_void(&self, cmd: &VoidSale) -> Result<Vec<SaleEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.sale_id)?;
        if self.status == SaleStatus::Voided {
            return Err(DomainError::conflict("sale is already voided"));
        }
        let (Some(shop_id), Some(sold_at)) = (self.shop_id, self.sold_at) else {
            return Err(DomainError::invariant("recorded sale is missing shop or date"));
        };

        Ok(vec![SaleEvent::SaleVoided(SaleVoided {
            tenant_id: cmd.tenant_id,
            sale_id: cmd.sale_id,
            shop_id,
            lines: self.lines.clone(),
            total: self.totals.total,
            total_cost: self.totals.total_cost,
            sold_at,
            reason: cmd.reason.as_deref().map(str::trim).filter(|r| !r.is_empty()).map(str::to_string),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    fn test_sale_id() -> SaleId {
        SaleId::new(AggregateId::new())
    }

    fn line(quantity: i64, unit_price: u64, unit_cost: u64) -> NewSaleLine {
        NewSaleLine {
            product_id: ProductId::new(AggregateId::new()),
            quantity,
            unit_price,
            unit_cost,
        }
    }

    fn record_cmd(tenant_id: TenantId, sale_id: SaleId, lines: Vec<NewSaleLine>, discount: u64) -> RecordSale {
        RecordSale {
            tenant_id,
            sale_id,
            shop_id: LocationId::new(AggregateId::new()),
            cashier_id: Some(UserId::new()),
            payment: PaymentMethod::Card,
            lines,
            discount,
            occurred_at: Utc::now(),
        }
    }

    fn recorded(lines: Vec<NewSaleLine>, discount: u64) -> (Sale, TenantId) {
        let tenant_id = test_tenant_id();
        let sale_id = test_sale_id();
        let mut sale = Sale::empty(sale_id);
        let events = sale
            .handle(&SaleCommand::RecordSale(record_cmd(tenant_id, sale_id, lines, discount)))
            .unwrap();
        for e in &events {
            sale.apply(e);
        }
        (sale, tenant_id)
    }

    #[test]
    fn record_numbers_lines_and_totals() {
        let (sale, _) = recorded(vec![line(2, 450, 300), line(1, 1000, 700)], 100);
        assert_eq!(sale.lines()[1].line_no, 2);
        let t = sale.totals();
        assert_eq!(t.subtotal, 1900);
        assert_eq!(t.total, 1800);
        assert_eq!(t.total_cost, 1300);
        assert_eq!(t.units, 3);
        assert_eq!(sale.status(), SaleStatus::Completed);
        assert_eq!(sale.version(), 1);
    }

    #[test]
    fn record_validates_lines_and_discount() {
        let sale_id = test_sale_id();
        let sale = Sale::empty(sale_id);
        let tenant_id = test_tenant_id();

        for cmd in [
            record_cmd(tenant_id, sale_id, vec![], 0),
            record_cmd(tenant_id, sale_id, vec![line(0, 100, 0)], 0),
            record_cmd(tenant_id, sale_id, vec![line(1, 0, 0)], 0),
            record_cmd(tenant_id, sale_id, vec![line(1, 100, 0)], 101),
        ] {
            let err = sale.handle(&SaleCommand::RecordSale(cmd)).unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)), "got {err:?}");
        }
    }

    #[test]
    fn void_carries_lines_and_original_date() {
        let (mut sale, tenant_id) = recorded(vec![line(3, 200, 120)], 0);
        let events = sale
            .handle(&SaleCommand::VoidSale(VoidSale {
                tenant_id,
                sale_id: sale.id_typed(),
                reason: Some(" customer return ".to_string()),
                occurred_at: Utc::now(),
            }))
            .unwrap();
        match &events[0] {
            SaleEvent::SaleVoided(e) => {
                assert_eq!(e.lines.len(), 1);
                assert_eq!(e.total, 600);
                assert_eq!(e.total_cost, 360);
                assert_eq!(Some(e.sold_at), sale.sold_at());
                assert_eq!(e.reason.as_deref(), Some("customer return"));
            }
            other => panic!("unexpected {other:?}"),
        }
        sale.apply(&events[0]);
        assert_eq!(sale.status(), SaleStatus::Voided);
    }

    #[test]
    fn void_twice_conflicts() {
        let (mut sale, tenant_id) = recorded(vec![line(1, 200, 0)], 0);
        let void = SaleCommand::VoidSale(VoidSale {
            tenant_id,
            sale_id: sale.id_typed(),
            reason: None,
            occurred_at: Utc::now(),
        });
        let events = sale.handle(&void).unwrap();
        sale.apply(&events[0]);
        assert!(matches!(sale.handle(&void), Err(DomainError::Conflict(_))));
    }

    #[test]
    fn void_unknown_sale_is_not_found() {
        let sale_id = test_sale_id();
        let err = Sale::empty(sale_id)
            .handle(&SaleCommand::VoidSale(VoidSale {
                tenant_id: test_tenant_id(),
                sale_id,
                reason: None,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }

    #[test]
    fn recording_twice_conflicts() {
        let (sale, tenant_id) = recorded(vec![line(1, 200, 0)], 0);
        let err = sale
            .handle(&SaleCommand::RecordSale(record_cmd(tenant_id, sale.id_typed(), vec![line(1, 5, 0)], 0)))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: total + discount always equals the sum of line amounts.
            #[test]
            fn totals_add_up(
                raw in proptest::collection::vec((1i64..50, 1u64..10_000, 0u64..10_000), 1..20),
                discount_pct in 0u64..=100,
            ) {
                let lines: Vec<SaleLine> = raw
                    .iter()
                    .enumerate()
                    .map(|(i, (q, p, c))| SaleLine {
                        line_no: i as u32 + 1,
                        product_id: ProductId::new(AggregateId::new()),
                        quantity: *q,
                        unit_price: *p,
                        unit_cost: *c,
                    })
                    .collect();
                let gross: u64 = raw.iter().map(|(q, p, _)| *q as u64 * p).sum();
                let discount = gross * discount_pct / 100;

                let t = sale_totals(&lines, discount).unwrap();
                prop_assert_eq!(t.subtotal, gross);
                prop_assert_eq!(t.total + t.discount, t.subtotal);
                prop_assert_eq!(t.units, raw.iter().map(|(q, _, _)| *q).sum::<i64>());
            }
        }
    }
}

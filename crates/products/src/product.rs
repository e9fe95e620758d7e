use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use retailops_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use retailops_events::Event;

use crate::costing::{reverse_weighted_average_cost, weighted_average_cost};

pub const AGGREGATE_TYPE: &str = "products.product";

/// Product identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub AggregateId);

impl ProductId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Product status lifecycle. Only active products can be sold or received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Draft,
    Active,
    Archived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostChangeReason {
    Receipt,
    ReceiptReversed,
}

/// Aggregate root: Product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    id: ProductId,
    tenant_id: Option<TenantId>,
    sku: String,
    name: String,
    category: Option<String>,
    barcode: Option<String>,
    status: ProductStatus,
    price: u64,
    unit_cost: u64,
    version: u64,
    created: bool,
}

impl Product {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            tenant_id: None,
            sku: String::new(),
            name: String::new(),
            category: None,
            barcode: None,
            status: ProductStatus::Draft,
            price: 0,
            unit_cost: 0,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn barcode(&self) -> Option<&str> {
        self.barcode.as_deref()
    }

    pub fn status(&self) -> ProductStatus {
        self.status
    }

    /// Selling price in the smallest currency unit.
    pub fn price(&self) -> u64 {
        self.price
    }

    /// Weighted average cost in the smallest currency unit.
    pub fn unit_cost(&self) -> u64 {
        self.unit_cost
    }

    /// Require the product to exist and be active.
    pub fn ensure_sellable(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.status != ProductStatus::Active {
            return Err(DomainError::invariant(format!(
                "product {} is not active",
                self.sku
            )));
        }
        Ok(())
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProduct {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub category: Option<String>,
    pub barcode: Option<String>,
    pub price: u64,
    pub occurred_at: DateTime<Utc>,
}

/// `None` keeps a field; an empty string clears `category` / `barcode`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProduct {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub name: Option<String>,
    pub category: Option<String>,
    pub barcode: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangePrice {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub price: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivateProduct {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveProduct {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

/// Blend a supplier receipt into the weighted average cost.
///
/// `on_hand_before` is the receiving warehouse's stock before the receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyReceiptCost {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub on_hand_before: i64,
    pub quantity: i64,
    pub unit_cost: u64,
    pub reference: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

/// Take a voided receipt back out of the weighted average cost.
///
/// `on_hand_before` is the warehouse stock before the units are issued back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseReceiptCost {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub on_hand_before: i64,
    pub quantity: i64,
    pub unit_cost: u64,
    pub reference: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductCommand {
    CreateProduct(CreateProduct),
    UpdateProduct(UpdateProduct),
    ChangePrice(ChangePrice),
    ActivateProduct(ActivateProduct),
    ArchiveProduct(ArchiveProduct),
    ApplyReceiptCost(ApplyReceiptCost),
    ReverseReceiptCost(ReverseReceiptCost),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCreated {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub category: Option<String>,
    pub barcode: Option<String>,
    pub price: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Carries the resulting descriptive fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductUpdated {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub name: String,
    pub category: Option<String>,
    pub barcode: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceChanged {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub previous_price: u64,
    pub price: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductActivated {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductArchived {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostRecalculated {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub previous_cost: u64,
    pub new_cost: u64,
    pub quantity: i64,
    pub unit_cost: u64,
    pub reason: CostChangeReason,
    /// The supplier invoice that caused the change.
    pub reference: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductEvent {
    ProductCreated(ProductCreated),
    ProductUpdated(ProductUpdated),
    PriceChanged(PriceChanged),
    ProductActivated(ProductActivated),
    ProductArchived(ProductArchived),
    CostRecalculated(CostRecalculated),
}

impl Event for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::ProductCreated(_) => "products.product.created",
            ProductEvent::ProductUpdated(_) => "products.product.updated",
            ProductEvent::PriceChanged(_) => "products.product.price_changed",
            ProductEvent::ProductActivated(_) => "products.product.activated",
            ProductEvent::ProductArchived(_) => "products.product.archived",
            ProductEvent::CostRecalculated(_) => "products.product.cost_recalculated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductEvent::ProductCreated(e) => e.occurred_at,
            ProductEvent::ProductUpdated(e) => e.occurred_at,
            ProductEvent::PriceChanged(e) => e.occurred_at,
            ProductEvent::ProductActivated(e) => e.occurred_at,
            ProductEvent::ProductArchived(e) => e.occurred_at,
            ProductEvent::CostRecalculated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Product {
    type Command = ProductCommand;
    type Event = ProductEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductEvent::ProductCreated(e) => {
                self.id = e.product_id;
                self.tenant_id = Some(e.tenant_id);
                self.sku = e.sku.clone();
                self.name = e.name.clone();
                self.category = e.category.clone();
                self.barcode = e.barcode.clone();
                self.price = e.price;
                self.unit_cost = 0;
                self.status = ProductStatus::Draft;
                self.created = true;
            }
            ProductEvent::ProductUpdated(e) => {
                self.name = e.name.clone();
                self.category = e.category.clone();
                self.barcode = e.barcode.clone();
            }
            ProductEvent::PriceChanged(e) => self.price = e.price,
            ProductEvent::ProductActivated(_) => self.status = ProductStatus::Active,
            ProductEvent::ProductArchived(_) => self.status = ProductStatus::Archived,
            ProductEvent::CostRecalculated(e) => self.unit_cost = e.new_cost,
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductCommand::CreateProduct(cmd) => self.handle_create(cmd),
            ProductCommand::UpdateProduct(cmd) => self.handle_update(cmd),
            ProductCommand::ChangePrice(cmd) => self.handle_change_price(cmd),
            ProductCommand::ActivateProduct(cmd) => self.handle_activate(cmd),
            ProductCommand::ArchiveProduct(cmd) => self.handle_archive(cmd),
            ProductCommand::ApplyReceiptCost(cmd) => self.handle_receipt_cost(cmd),
            ProductCommand::ReverseReceiptCost(cmd) => self.handle_reverse_receipt_cost(cmd),
        }
    }
}

impl Product {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if self.created && self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_product_id(&self, product_id: ProductId) -> Result<(), DomainError> {
        if self.id != product_id {
            return Err(DomainError::invariant("product_id mismatch"));
        }
        Ok(())
    }

    fn ensure_existing(&self, tenant_id: TenantId, product_id: ProductId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(tenant_id)?;
        self.ensure_product_id(product_id)
    }

    fn handle_create(&self, cmd: &CreateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("product already exists"));
        }
        self.ensure_product_id(cmd.product_id)?;

        let name = cmd.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        let sku = cmd.sku.trim();
        if sku.is_empty() {
            return Err(DomainError::validation("SKU cannot be empty"));
        }
        if cmd.price == 0 {
            return Err(DomainError::validation("price must be greater than zero"));
        }

        Ok(vec![ProductEvent::ProductCreated(ProductCreated {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            sku: sku.to_string(),
            name: name.to_string(),
            category: normalize(cmd.category.as_deref()),
            barcode: normalize(cmd.barcode.as_deref()),
            price: cmd.price,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.product_id)?;
        if self.status == ProductStatus::Archived {
            return Err(DomainError::invariant("archived products cannot be modified"));
        }

        let name = match cmd.name.as_deref().map(str::trim) {
            Some("") => return Err(DomainError::validation("name cannot be empty")),
            Some(n) => n.to_string(),
            None => self.name.clone(),
        };
        let category = match cmd.category.as_deref() {
            Some(c) => normalize(Some(c)),
            None => self.category.clone(),
        };
        let barcode = match cmd.barcode.as_deref() {
            Some(b) => normalize(Some(b)),
            None => self.barcode.clone(),
        };

        if name == self.name && category == self.category && barcode == self.barcode {
            return Err(DomainError::validation("update changes nothing"));
        }

        Ok(vec![ProductEvent::ProductUpdated(ProductUpdated {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            name,
            category,
            barcode,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_price(&self, cmd: &ChangePrice) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.product_id)?;
        if self.status == ProductStatus::Archived {
            return Err(DomainError::invariant("archived products cannot be modified"));
        }
        if cmd.price == 0 {
            return Err(DomainError::validation("price must be greater than zero"));
        }
        if cmd.price == self.price {
            return Err(DomainError::validation("price is unchanged"));
        }

        Ok(vec![ProductEvent::PriceChanged(PriceChanged {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            previous_price: self.price,
            price: cmd.price,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_activate(&self, cmd: &ActivateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.product_id)?;
        match self.status {
            ProductStatus::Active => Err(DomainError::conflict("product is already active")),
            ProductStatus::Archived => Err(DomainError::invariant("archived products cannot be activated")),
            ProductStatus::Draft => Ok(vec![ProductEvent::ProductActivated(ProductActivated {
                tenant_id: cmd.tenant_id,
                product_id: cmd.product_id,
                occurred_at: cmd.occurred_at,
            })]),
        }
    }

    fn handle_archive(&self, cmd: &ArchiveProduct) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.product_id)?;
        if self.status == ProductStatus::Archived {
            return Err(DomainError::conflict("product is already archived"));
        }
        Ok(vec![ProductEvent::ProductArchived(ProductArchived {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_receipt_cost(&self, cmd: &ApplyReceiptCost) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.product_id)?;
        validate_receipt(cmd.quantity, cmd.unit_cost)?;

        let new_cost = weighted_average_cost(cmd.on_hand_before, self.unit_cost, cmd.quantity, cmd.unit_cost);
        Ok(vec![ProductEvent::CostRecalculated(CostRecalculated {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            previous_cost: self.unit_cost,
            new_cost,
            quantity: cmd.quantity,
            unit_cost: cmd.unit_cost,
            reason: CostChangeReason::Receipt,
            reference: cmd.reference,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reverse_receipt_cost(&self, cmd: &ReverseReceiptCost) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.product_id)?;
        validate_receipt(cmd.quantity, cmd.unit_cost)?;

        let new_cost =
            reverse_weighted_average_cost(cmd.on_hand_before, self.unit_cost, cmd.quantity, cmd.unit_cost);
        Ok(vec![ProductEvent::CostRecalculated(CostRecalculated {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            previous_cost: self.unit_cost,
            new_cost,
            quantity: cmd.quantity,
            unit_cost: cmd.unit_cost,
            reason: CostChangeReason::ReceiptReversed,
            reference: cmd.reference,
            occurred_at: cmd.occurred_at,
        })])
    }
}

fn validate_receipt(quantity: i64, unit_cost: u64) -> Result<(), DomainError> {
    if quantity <= 0 {
        return Err(DomainError::validation("receipt quantity must be positive"));
    }
    if unit_cost == 0 {
        return Err(DomainError::validation("receipt unit cost must be greater than zero"));
    }
    Ok(())
}

fn normalize(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

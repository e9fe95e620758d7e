use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use retailops_core::{Aggregate, AggregateId, AggregateRoot, DomainError, DomainResult, TenantId};
use retailops_core::{line_total, sum_amounts};
use retailops_events::Event;
use retailops_locations::LocationId;
use retailops_products::ProductId;

pub const AGGREGATE_TYPE: &str = "invoicing.invoice";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SupplierInvoiceId(pub AggregateId);

impl SupplierInvoiceId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for SupplierInvoiceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Posted,
    Voided,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub line_no: u32,
    pub product_id: ProductId,
    pub quantity: i64,
    /// Purchase cost per unit, smallest currency unit.
    pub unit_cost: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInvoiceLine {
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_cost: u64,
}

/// Aggregate root: SupplierInvoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupplierInvoice {
    id: SupplierInvoiceId,
    tenant_id: Option<TenantId>,
    warehouse_id: Option<LocationId>,
    supplier: String,
    reference: String,
    invoice_date: Option<NaiveDate>,
    lines: Vec<InvoiceLine>,
    total: u64,
    status: InvoiceStatus,
    version: u64,
    created: bool,
}

impl SupplierInvoice {
    pub fn empty(id: SupplierInvoiceId) -> Self {
        Self {
            id,
            tenant_id: None,
            warehouse_id: None,
            supplier: String::new(),
            reference: String::new(),
            invoice_date: None,
            lines: Vec::new(),
            total: 0,
            status: InvoiceStatus::Posted,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> SupplierInvoiceId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn warehouse_id(&self) -> Option<LocationId> {
        self.warehouse_id
    }

    pub fn supplier(&self) -> &str {
        &self.supplier
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn invoice_date(&self) -> Option<NaiveDate> {
        self.invoice_date
    }

    pub fn lines(&self) -> &[InvoiceLine] {
        &self.lines
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn status(&self) -> InvoiceStatus {
        self.status
    }
}

impl AggregateRoot for SupplierInvoice {
    type Id = SupplierInvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostInvoice {
    pub tenant_id: TenantId,
    pub invoice_id: SupplierInvoiceId,
    pub warehouse_id: LocationId,
    pub supplier: String,
    pub reference: String,
    /// Date printed on the supplier's invoice; defaults to the posting date.
    pub invoice_date: Option<NaiveDate>,
    pub lines: Vec<NewInvoiceLine>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoidInvoice {
    pub tenant_id: TenantId,
    pub invoice_id: SupplierInvoiceId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceCommand {
    PostInvoice(PostInvoice),
    VoidInvoice(VoidInvoice),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoicePosted {
    pub tenant_id: TenantId,
    pub invoice_id: SupplierInvoiceId,
    pub warehouse_id: LocationId,
    pub supplier: String,
    pub reference: String,
    pub invoice_date: NaiveDate,
    pub lines: Vec<InvoiceLine>,
    pub total: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceVoided {
    pub tenant_id: TenantId,
    pub invoice_id: SupplierInvoiceId,
    pub warehouse_id: LocationId,
    pub lines: Vec<InvoiceLine>,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceEvent {
    InvoicePosted(InvoicePosted),
    InvoiceVoided(InvoiceVoided),
}

impl Event for InvoiceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InvoiceEvent::InvoicePosted(_) => "invoicing.invoice.posted",
            InvoiceEvent::InvoiceVoided(_) => "invoicing.invoice.voided",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InvoiceEvent::InvoicePosted(e) => e.occurred_at,
            InvoiceEvent::InvoiceVoided(e) => e.occurred_at,
        }
    }
}

impl Aggregate for SupplierInvoice {
    type Command = InvoiceCommand;
    type Event = InvoiceEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InvoiceEvent::InvoicePosted(e) => {
                self.id = e.invoice_id;
                self.tenant_id = Some(e.tenant_id);
                self.warehouse_id = Some(e.warehouse_id);
                self.supplier = e.supplier.clone();
                self.reference = e.reference.clone();
                self.invoice_date = Some(e.invoice_date);
                self.lines = e.lines.clone();
                self.total = e.total;
                self.status = InvoiceStatus::Posted;
                self.created = true;
            }
            InvoiceEvent::InvoiceVoided(_) => self.status = InvoiceStatus::Voided,
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InvoiceCommand::PostInvoice(cmd) => self.handle_post(cmd),
            InvoiceCommand::VoidInvoice(cmd) => self.handle_void(cmd),
        }
    }
}

impl SupplierInvoice {
    fn handle_post(&self, cmd: &PostInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("invoice already posted"));
        }
        if self.id != cmd.invoice_id {
            return Err(DomainError::invariant("invoice_id mismatch"));
        }
        let supplier = cmd.supplier.trim();
        if supplier.is_empty() {
            return Err(DomainError::validation("supplier cannot be empty"));
        }
        let reference = cmd.reference.trim();
        if reference.is_empty() {
            return Err(DomainError::validation("supplier reference cannot be empty"));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("an invoice needs at least one line"));
        }

        let mut lines = Vec::with_capacity(cmd.lines.len());
        for (idx, l) in cmd.lines.iter().enumerate() {
            if l.quantity <= 0 {
                return Err(DomainError::validation(format!("line {}: quantity must be positive", idx + 1)));
            }
            if l.unit_cost == 0 {
                return Err(DomainError::validation(format!(
                    "line {}: unit cost must be greater than zero",
                    idx + 1
                )));
            }
            lines.push(InvoiceLine {
                line_no: (idx + 1) as u32,
                product_id: l.product_id,
                quantity: l.quantity,
                unit_cost: l.unit_cost,
            });
        }
        let total = invoice_total(&lines)?;

        Ok(vec![InvoiceEvent::InvoicePosted(InvoicePosted {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            warehouse_id: cmd.warehouse_id,
            supplier: supplier.to_string(),
            reference: reference.to_string(),
            invoice_date: cmd.invoice_date.unwrap_or_else(|| cmd.occurred_at.date_naive()),
            lines,
            total,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_void(&self, cmd: &VoidInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(cmd.tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != cmd.invoice_id {
            return Err(DomainError::invariant("invoice_id mismatch"));
        }
        if self.status == InvoiceStatus::Voided {
            return Err(DomainError::conflict("invoice is already voided"));
        }
        let Some(warehouse_id) = self.warehouse_id else {
            return Err(DomainError::invariant("posted invoice has no warehouse"));
        };

        Ok(vec![InvoiceEvent::InvoiceVoided(InvoiceVoided {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            warehouse_id,
            lines: self.lines.clone(),
            reason: cmd.reason.as_deref().map(str::trim).filter(|r| !r.is_empty()).map(str::to_string),
            occurred_at: cmd.occurred_at,
        })])
    }
}

fn invoice_total(lines: &[InvoiceLine]) -> DomainResult<u64> {
    sum_amounts(
        lines
            .iter()
            .map(|l| line_total(l.quantity, l.unit_cost))
            .collect::<DomainResult<Vec<_>>>()?,
    )
}

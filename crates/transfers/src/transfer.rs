use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use retailops_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use retailops_events::Event;
use retailops_locations::LocationId;
use retailops_products::ProductId;

pub const AGGREGATE_TYPE: &str = "transfers.transfer";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferId(pub AggregateId);

impl TransferId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for TransferId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    InTransit,
    Received,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferLine {
    pub product_id: ProductId,
    pub quantity: i64,
}

/// Aggregate root: Transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    id: TransferId,
    tenant_id: Option<TenantId>,
    from: Option<LocationId>,
    to: Option<LocationId>,
    lines: Vec<TransferLine>,
    note: Option<String>,
    status: TransferStatus,
    version: u64,
    created: bool,
}

impl Transfer {
    pub fn empty(id: TransferId) -> Self {
        Self {
            id,
            tenant_id: None,
            from: None,
            to: None,
            lines: Vec::new(),
            note: None,
            status: TransferStatus::InTransit,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> TransferId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn from(&self) -> Option<LocationId> {
        self.from
    }

    pub fn to(&self) -> Option<LocationId> {
        self.to
    }

    pub fn lines(&self) -> &[TransferLine] {
        &self.lines
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    pub fn status(&self) -> TransferStatus {
        self.status
    }
}

impl AggregateRoot for Transfer {
    type Id = TransferId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchTransfer {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub from: LocationId,
    pub to: LocationId,
    pub lines: Vec<TransferLine>,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveTransfer {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelTransfer {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferCommand {
    DispatchTransfer(DispatchTransfer),
    ReceiveTransfer(ReceiveTransfer),
    CancelTransfer(CancelTransfer),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferDispatched {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub from: LocationId,
    pub to: LocationId,
    pub lines: Vec<TransferLine>,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceived {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub to: LocationId,
    pub lines: Vec<TransferLine>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferCancelled {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub from: LocationId,
    pub lines: Vec<TransferLine>,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferEvent {
    TransferDispatched(TransferDispatched),
    TransferReceived(TransferReceived),
    TransferCancelled(TransferCancelled),
}

impl Event for TransferEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TransferEvent::TransferDispatched(_) => "transfers.transfer.dispatched",
            TransferEvent::TransferReceived(_) => "transfers.transfer.received",
            TransferEvent::TransferCancelled(_) => "transfers.transfer.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            TransferEvent::TransferDispatched(e) => e.occurred_at,
            TransferEvent::TransferReceived(e) => e.occurred_at,
            TransferEvent::TransferCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Transfer {
    type Command = TransferCommand;
    type Event = TransferEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            TransferEvent::TransferDispatched(e) => {
                self.id = e.transfer_id;
                self.tenant_id = Some(e.tenant_id);
                self.from = Some(e.from);
                self.to = Some(e.to);
                self.lines = e.lines.clone();
                self.note = e.note.clone();
                self.status = TransferStatus::InTransit;
                self.created = true;
            }
            TransferEvent::TransferReceived(_) => self.status = TransferStatus::Received,
            TransferEvent::TransferCancelled(_) => self.status = TransferStatus::Cancelled,
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            TransferCommand::DispatchTransfer(cmd) => self.handle_dispatch(cmd),
            TransferCommand::ReceiveTransfer(cmd) => self.handle_receive(cmd),
            TransferCommand::CancelTransfer(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl Transfer {
    fn ensure_in_transit(&self, tenant_id: TenantId, transfer_id: TransferId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != transfer_id {
            return Err(DomainError::invariant("transfer_id mismatch"));
        }
        match self.status {
            TransferStatus::InTransit => Ok(()),
            TransferStatus::Received => Err(DomainError::conflict("transfer was already received")),
            TransferStatus::Cancelled => Err(DomainError::conflict("transfer was cancelled")),
        }
    }

    fn handle_dispatch(&self, cmd: &DispatchTransfer) -> Result<Vec<TransferEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("transfer already dispatched"));
        }
        if self.id != cmd.transfer_id {
            return Err(DomainError::invariant("transfer_id mismatch"));
        }
        if cmd.from == cmd.to {
            return Err(DomainError::validation("source and destination must differ"));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("a transfer needs at least one line"));
        }
        let mut seen = HashSet::new();
        for l in &cmd.lines {
            if l.quantity <= 0 {
                return Err(DomainError::validation("transfer quantity must be positive"));
            }
            if !seen.insert(l.product_id) {
                return Err(DomainError::validation(format!(
                    "product {} appears more than once",
                    l.product_id
                )));
            }
        }

        Ok(vec![TransferEvent::TransferDispatched(TransferDispatched {
            tenant_id: cmd.tenant_id,
            transfer_id: cmd.transfer_id,
            from: cmd.from,
            to: cmd.to,
            lines: cmd.lines.clone(),
            note: cmd.note.as_deref().map(str::trim).filter(|n| !n.is_empty()).map(str::to_string),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_receive(&self, cmd: &ReceiveTransfer) -> Result<Vec<TransferEvent>, DomainError> {
        self.ensure_in_transit(cmd.tenant_id, cmd.transfer_id)?;
        let to = self.to.ok_or_else(|| DomainError::invariant("transfer has no destination"))?;
        Ok(vec![TransferEvent::TransferReceived(TransferReceived {
            tenant_id: cmd.tenant_id,
            transfer_id: cmd.transfer_id,
            to,
            lines: self.lines.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelTransfer) -> Result<Vec<TransferEvent>, DomainError> {
        self.ensure_in_transit(cmd.tenant_id, cmd.transfer_id)?;
        let from = self.from.ok_or_else(|| DomainError::invariant("transfer has no source"))?;
        Ok(vec![TransferEvent::TransferCancelled(TransferCancelled {
            tenant_id: cmd.tenant_id,
            transfer_id: cmd.transfer_id,
            from,
            lines: self.lines.clone(),
            reason: cmd.reason.as_deref().map(str::trim).filter(|r| !r.is_empty()).map(str::to_string),
            occurred_at: cmd.occurred_at,
        })])
    }
}

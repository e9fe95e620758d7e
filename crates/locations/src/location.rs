use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use retailops_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use retailops_events::Event;

pub const AGGREGATE_TYPE: &str = "locations.location";

const MAX_CODE_LEN: usize = 16;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocationId(pub AggregateId);

impl LocationId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for LocationId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationKind {
    Shop,
    Warehouse,
}

impl core::fmt::Display for LocationKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            LocationKind::Shop => "shop",
            LocationKind::Warehouse => "warehouse",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationStatus {
    Active,
    Closed,
}

/// Aggregate root: Location (a shop or a warehouse).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    id: LocationId,
    tenant_id: Option<TenantId>,
    kind: LocationKind,
    code: String,
    name: String,
    address: Option<String>,
    status: LocationStatus,
    version: u64,
    created: bool,
}

impl Location {
    pub fn empty(id: LocationId) -> Self {
        Self {
            id,
            tenant_id: None,
            kind: LocationKind::Shop,
            code: String::new(),
            name: String::new(),
            address: None,
            status: LocationStatus::Active,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> LocationId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn kind(&self) -> LocationKind {
        self.kind
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn status(&self) -> LocationStatus {
        self.status
    }

    /// Open and of the given kind.
    pub fn is_active(&self, kind: LocationKind) -> bool {
        self.created && self.status == LocationStatus::Active && self.kind == kind
    }

    /// Require this location to be an open `kind`; used by cross-aggregate workflows.
    pub fn ensure_active(&self, kind: LocationKind) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.kind != kind {
            return Err(DomainError::validation(format!(
                "location {} is a {}, expected a {}",
                self.code, self.kind, kind
            )));
        }
        if self.status != LocationStatus::Active {
            return Err(DomainError::invariant(format!("{} {} is closed", self.kind, self.code)));
        }
        Ok(())
    }

    /// Require this location to be open, whatever its kind.
    pub fn ensure_open(&self) -> Result<(), DomainError> {
        self.ensure_active(self.kind)
    }
}

impl AggregateRoot for Location {
    type Id = LocationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenLocation {
    pub tenant_id: TenantId,
    pub location_id: LocationId,
    pub kind: LocationKind,
    pub code: String,
    pub name: String,
    pub address: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Fields left as `None` keep their current value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateLocation {
    pub tenant_id: TenantId,
    pub location_id: LocationId,
    pub name: Option<String>,
    pub address: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseLocation {
    pub tenant_id: TenantId,
    pub location_id: LocationId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReopenLocation {
    pub tenant_id: TenantId,
    pub location_id: LocationId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocationCommand {
    OpenLocation(OpenLocation),
    UpdateLocation(UpdateLocation),
    CloseLocation(CloseLocation),
    ReopenLocation(ReopenLocation),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationOpened {
    pub tenant_id: TenantId,
    pub location_id: LocationId,
    pub kind: LocationKind,
    pub code: String,
    pub name: String,
    pub address: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Carries the resulting name and address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationUpdated {
    pub tenant_id: TenantId,
    pub location_id: LocationId,
    pub name: String,
    pub address: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationClosed {
    pub tenant_id: TenantId,
    pub location_id: LocationId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationReopened {
    pub tenant_id: TenantId,
    pub location_id: LocationId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocationEvent {
    LocationOpened(LocationOpened),
    LocationUpdated(LocationUpdated),
    LocationClosed(LocationClosed),
    LocationReopened(LocationReopened),
}

impl Event for LocationEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LocationEvent::LocationOpened(_) => "locations.location.opened",
            LocationEvent::LocationUpdated(_) => "locations.location.updated",
            LocationEvent::LocationClosed(_) => "locations.location.closed",
            LocationEvent::LocationReopened(_) => "locations.location.reopened",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LocationEvent::LocationOpened(e) => e.occurred_at,
            LocationEvent::LocationUpdated(e) => e.occurred_at,
            LocationEvent::LocationClosed(e) => e.occurred_at,
            LocationEvent::LocationReopened(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Location {
    type Command = LocationCommand;
    type Event = LocationEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            LocationEvent::LocationOpened(e) => {
                self.id = e.location_id;
                self.tenant_id = Some(e.tenant_id);
                self.kind = e.kind;
                self.code = e.code.clone();
                self.name = e.name.clone();
                self.address = e.address.clone();
                self.status = LocationStatus::Active;
                self.created = true;
            }
            LocationEvent::LocationUpdated(e) => {
                self.name = e.name.clone();
                self.address = e.address.clone();
            }
            LocationEvent::LocationClosed(_) => self.status = LocationStatus::Closed,
            LocationEvent::LocationReopened(_) => self.status = LocationStatus::Active,
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            LocationCommand::OpenLocation(cmd) => self.handle_open(cmd),
            LocationCommand::UpdateLocation(cmd) => self.handle_update(cmd),
            LocationCommand::CloseLocation(cmd) => self.handle_close(cmd),
            LocationCommand::ReopenLocation(cmd) => self.handle_reopen(cmd),
        }
    }
}

impl Location {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if self.created && self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_location_id(&self, location_id: LocationId) -> Result<(), DomainError> {
        if self.id != location_id {
            return Err(DomainError::invariant("location_id mismatch"));
        }
        Ok(())
    }

    fn ensure_existing(&self, tenant_id: TenantId, location_id: LocationId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(tenant_id)?;
        self.ensure_location_id(location_id)
    }

    fn handle_open(&self, cmd: &OpenLocation) -> Result<Vec<LocationEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("location already exists"));
        }
        self.ensure_location_id(cmd.location_id)?;

        let code = cmd.code.trim().to_uppercase();
        if code.is_empty() {
            return Err(DomainError::validation("code cannot be empty"));
        }
        if code.chars().count() > MAX_CODE_LEN {
            return Err(DomainError::validation(format!(
                "code cannot be longer than {MAX_CODE_LEN} characters"
            )));
        }
        let name = cmd.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }

        Ok(vec![LocationEvent::LocationOpened(LocationOpened {
            tenant_id: cmd.tenant_id,
            location_id: cmd.location_id,
            kind: cmd.kind,
            code,
            name: name.to_string(),
            address: normalize(cmd.address.as_deref()),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateLocation) -> Result<Vec<LocationEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.location_id)?;

        let name = match cmd.name.as_deref().map(str::trim) {
            Some("") => return Err(DomainError::validation("name cannot be empty")),
            Some(n) => n.to_string(),
            None => self.name.clone(),
        };
        let address = match cmd.address.as_deref() {
            Some(a) => normalize(Some(a)),
            None => self.address.clone(),
        };

        if name == self.name && address == self.address {
            return Err(DomainError::validation("update changes nothing"));
        }

        Ok(vec![LocationEvent::LocationUpdated(LocationUpdated {
            tenant_id: cmd.tenant_id,
            location_id: cmd.location_id,
            name,
            address,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_close(&self, cmd: &CloseLocation) -> Result<Vec<LocationEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.location_id)?;
        if self.status == LocationStatus::Closed {
            return Err(DomainError::conflict("location is already closed"));
        }
        Ok(vec![LocationEvent::LocationClosed(LocationClosed {
            tenant_id: cmd.tenant_id,
            location_id: cmd.location_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reopen(&self, cmd: &ReopenLocation) -> Result<Vec<LocationEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.location_id)?;
        if self.status == LocationStatus::Active {
            return Err(DomainError::conflict("location is already open"));
        }
        Ok(vec![LocationEvent::LocationReopened(LocationReopened {
            tenant_id: cmd.tenant_id,
            location_id: cmd.location_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

/// Blank strings clear the field.
fn normalize(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

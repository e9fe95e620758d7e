use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use retailops_core::TenantId;
use retailops_events::EventEnvelope;
use retailops_locations::{LocationEvent, LocationId, LocationKind, LocationStatus};

use super::cursor::{ProjectionError, StreamCursors, decode, ensure_matches};
use super::Projection;
use crate::read_model::{InMemoryTenantStore, TenantStore};

/// A shop or warehouse as listed in the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocationView {
    pub location_id: LocationId,
    pub kind: LocationKind,
    pub code: String,
    pub name: String,
    pub address: Option<String>,
    pub status: LocationStatus,
    pub opened_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct LocationDirectoryProjection<S>
where
    S: TenantStore<LocationId, LocationView>,
{
    store: S,
    cursors: StreamCursors,
}

impl LocationDirectoryProjection<InMemoryTenantStore<LocationId, LocationView>> {
    pub fn in_memory() -> Self {
        Self::new(InMemoryTenantStore::new())
    }
}

impl<S> LocationDirectoryProjection<S>
where
    S: TenantStore<LocationId, LocationView>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, tenant_id: TenantId, location_id: &LocationId) -> Option<LocationView> {
        self.store.get(tenant_id, location_id)
    }

    /// Locations ordered by code, optionally only one kind.
    pub fn list(&self, tenant_id: TenantId, kind: Option<LocationKind>) -> Vec<LocationView> {
        let mut out: Vec<_> = self
            .store
            .list(tenant_id)
            .into_iter()
            .filter(|l| kind.is_none_or(|k| l.kind == k))
            .collect();
        out.sort_by(|a, b| a.code.cmp(&b.code));
        out
    }

    pub fn find_by_code(&self, tenant_id: TenantId, code: &str) -> Option<LocationView> {
        let code = code.trim();
        self.store
            .list(tenant_id)
            .into_iter()
            .find(|l| l.code.eq_ignore_ascii_case(code))
    }

    fn update(&self, tenant_id: TenantId, id: LocationId, at: DateTime<Utc>, f: impl FnOnce(&mut LocationView)) {
        if let Some(mut view) = self.store.get(tenant_id, &id) {
            f(&mut view);
            view.updated_at = at;
            self.store.upsert(tenant_id, id, view);
        }
    }
}

impl<S> Projection for LocationDirectoryProjection<S>
where
    S: TenantStore<LocationId, LocationView>,
{
    fn name(&self) -> &'static str {
        "locations"
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != retailops_locations::AGGREGATE_TYPE {
            return Ok(());
        }
        let tenant_id = envelope.tenant_id();

        self.cursors.apply_in_order(envelope, |envelope| {
            match decode::<LocationEvent>(envelope)? {
                LocationEvent::LocationOpened(e) => {
                    ensure_matches(envelope, e.tenant_id, e.location_id.0)?;
                    self.store.upsert(
                        tenant_id,
                        e.location_id,
                        LocationView {
                            location_id: e.location_id,
                            kind: e.kind,
                            code: e.code,
                            name: e.name,
                            address: e.address,
                            status: LocationStatus::Active,
                            opened_at: e.occurred_at,
                            updated_at: e.occurred_at,
                        },
                    );
                }
                LocationEvent::LocationUpdated(e) => {
                    ensure_matches(envelope, e.tenant_id, e.location_id.0)?;
                    self.update(tenant_id, e.location_id, e.occurred_at, |v| {
                        v.name = e.name;
                        v.address = e.address;
                    });
                }
                LocationEvent::LocationClosed(e) => {
                    ensure_matches(envelope, e.tenant_id, e.location_id.0)?;
                    self.update(tenant_id, e.location_id, e.occurred_at, |v| v.status = LocationStatus::Closed);
                }
                LocationEvent::LocationReopened(e) => {
                    ensure_matches(envelope, e.tenant_id, e.location_id.0)?;
                    self.update(tenant_id, e.location_id, e.occurred_at, |v| v.status = LocationStatus::Active);
                }
            }
            Ok(())
        })
    }

    fn reset(&self, tenants: &[TenantId]) {
        self.cursors.clear();
        for t in tenants {
            self.store.clear_tenant(*t);
        }
    }
}

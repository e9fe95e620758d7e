use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use retailops_core::TenantId;
use retailops_events::EventEnvelope;
use retailops_locations::LocationId;
use retailops_transfers::{TransferEvent, TransferId, TransferLine, TransferStatus};

use super::cursor::{ProjectionError, StreamCursors, decode, ensure_matches};
use super::Projection;
use crate::read_model::{InMemoryTenantStore, TenantStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferView {
    pub transfer_id: TransferId,
    pub from: LocationId,
    pub to: LocationId,
    pub lines: Vec<TransferLine>,
    pub note: Option<String>,
    pub status: TransferStatus,
    pub dispatched_at: DateTime<Utc>,
    /// Receipt or cancellation time.
    pub closed_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
}

impl TransferView {
    pub fn units(&self) -> i64 {
        self.lines.iter().map(|l| l.quantity).sum()
    }
}

#[derive(Debug)]
pub struct TransferRegisterProjection<S>
where
    S: TenantStore<TransferId, TransferView>,
{
    store: S,
    cursors: StreamCursors,
}

impl TransferRegisterProjection<InMemoryTenantStore<TransferId, TransferView>> {
    pub fn in_memory() -> Self {
        Self::new(InMemoryTenantStore::new())
    }
}

impl<S> TransferRegisterProjection<S>
where
    S: TenantStore<TransferId, TransferView>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, tenant_id: TenantId, transfer_id: &TransferId) -> Option<TransferView> {
        self.store.get(tenant_id, transfer_id)
    }

    /// `location_id` matches either end of the transfer. Newest first.
    pub fn list(
        &self,
        tenant_id: TenantId,
        location_id: Option<LocationId>,
        status: Option<TransferStatus>,
    ) -> Vec<TransferView> {
        let mut out: Vec<_> = self
            .store
            .list(tenant_id)
            .into_iter()
            .filter(|t| location_id.is_none_or(|id| t.from == id || t.to == id))
            .filter(|t| status.is_none_or(|s| t.status == s))
            .collect();
        out.sort_by(|a, b| b.dispatched_at.cmp(&a.dispatched_at));
        out
    }

    fn close(
        &self,
        tenant_id: TenantId,
        transfer_id: TransferId,
        status: TransferStatus,
        at: DateTime<Utc>,
        reason: Option<String>,
    ) {
        if let Some(mut view) = self.store.get(tenant_id, &transfer_id) {
            view.status = status;
            view.closed_at = Some(at);
            view.cancel_reason = reason;
            self.store.upsert(tenant_id, transfer_id, view);
        }
    }
}

impl<S> Projection for TransferRegisterProjection<S>
where
    S: TenantStore<TransferId, TransferView>,
{
    fn name(&self) -> &'static str {
        "transfer_register"
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != retailops_transfers::AGGREGATE_TYPE {
            return Ok(());
        }
        let tenant_id = envelope.tenant_id();

        self.cursors.apply_in_order(envelope, |envelope| {
            match decode::<TransferEvent>(envelope)? {
                TransferEvent::TransferDispatched(e) => {
                    ensure_matches(envelope, e.tenant_id, e.transfer_id.0)?;
                    self.store.upsert(
                        tenant_id,
                        e.transfer_id,
                        TransferView {
                            transfer_id: e.transfer_id,
                            from: e.from,
                            to: e.to,
                            lines: e.lines,
                            note: e.note,
                            status: TransferStatus::InTransit,
                            dispatched_at: e.occurred_at,
                            closed_at: None,
                            cancel_reason: None,
                        },
                    );
                }
                TransferEvent::TransferReceived(e) => {
                    ensure_matches(envelope, e.tenant_id, e.transfer_id.0)?;
                    self.close(tenant_id, e.transfer_id, TransferStatus::Received, e.occurred_at, None);
                }
                TransferEvent::TransferCancelled(e) => {
                    ensure_matches(envelope, e.tenant_id, e.transfer_id.0)?;
                    self.close(tenant_id, e.transfer_id, TransferStatus::Cancelled, e.occurred_at, e.reason);
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

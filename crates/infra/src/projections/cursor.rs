use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;

use retailops_core::{AggregateId, TenantId};
use retailops_events::EventEnvelope;

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to deserialize event: {0}")]
    Deserialize(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },

    #[error("projection state lock poisoned")]
    Poisoned,
}

impl ProjectionError {
    /// A gap: the envelope arrived before its predecessor.
    pub fn is_out_of_order(&self) -> bool {
        matches!(self, ProjectionError::NonMonotonicSequence { last, found } if found > last)
    }
}

/// Tenant+aggregate cursor for at-least-once delivery.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

/// Envelopes held back per stream while waiting for a predecessor.
const MAX_PARKED_PER_STREAM: usize = 1024;

#[derive(Debug, Default)]
struct StreamPosition {
    last: u64,
    parked: BTreeMap<u64, EventEnvelope<JsonValue>>,
}

/// Per-stream positions of a projection.
///
/// Every stream starts at sequence 1. Duplicates (`seq <= last`) are skipped.
/// An envelope that arrives ahead of its predecessor is parked and applied as
/// soon as the gap closes, so concurrent commits delivered out of order still
/// end up applied in stream order.
#[derive(Debug, Default)]
pub struct StreamCursors {
    inner: RwLock<HashMap<CursorKey, StreamPosition>>,
}

impl StreamCursors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `apply` for `envelope` if it is the next one of its stream, then for
    /// every parked successor it unblocks.
    ///
    /// The cursor lock is held while applying so that two deliveries of the
    /// same envelope cannot both pass the check.
    pub fn apply_in_order<F>(&self, envelope: &EventEnvelope<JsonValue>, mut apply: F) -> Result<(), ProjectionError>
    where
        F: FnMut(&EventEnvelope<JsonValue>) -> Result<(), ProjectionError>,
    {
        let key = CursorKey {
            tenant_id: envelope.tenant_id(),
            aggregate_id: envelope.aggregate_id(),
        };
        let seq = envelope.sequence_number();

        let mut cursors = self.inner.write().map_err(|_| ProjectionError::Poisoned)?;
        let position = cursors.entry(key).or_default();

        if seq == 0 {
            return Err(ProjectionError::NonMonotonicSequence {
                last: position.last,
                found: seq,
            });
        }
        if seq <= position.last {
            // Duplicate or replay.
            return Ok(());
        }
        if seq != position.last + 1 {
            if position.parked.contains_key(&seq) {
                return Ok(());
            }
            if position.parked.len() >= MAX_PARKED_PER_STREAM {
                return Err(ProjectionError::NonMonotonicSequence {
                    last: position.last,
                    found: seq,
                });
            }
            tracing::debug!(
                aggregate_id = %key.aggregate_id,
                last = position.last,
                sequence_number = seq,
                "parking envelope until its predecessor arrives"
            );
            position.parked.insert(seq, envelope.clone());
            return Ok(());
        }

        apply(envelope)?;
        position.last = seq;

        while let Some(next) = position.parked.remove(&(position.last + 1)) {
            apply(&next)?;
            position.last = next.sequence_number();
        }
        Ok(())
    }

    pub fn position(&self, tenant_id: TenantId, aggregate_id: AggregateId) -> u64 {
        self.inner
            .read()
            .ok()
            .and_then(|c| c.get(&CursorKey { tenant_id, aggregate_id }).map(|p| p.last))
            .unwrap_or(0)
    }

    /// Number of envelopes waiting for a predecessor on one stream.
    pub fn parked(&self, tenant_id: TenantId, aggregate_id: AggregateId) -> usize {
        self.inner
            .read()
            .ok()
            .and_then(|c| c.get(&CursorKey { tenant_id, aggregate_id }).map(|p| p.parked.len()))
            .unwrap_or(0)
    }

    pub fn clear(&self) {
        if let Ok(mut cursors) = self.inner.write() {
            cursors.clear();
        }
    }
}

pub(crate) fn decode<E: DeserializeOwned>(envelope: &EventEnvelope<JsonValue>) -> Result<E, ProjectionError> {
    serde_json::from_value(envelope.payload().clone()).map_err(|e| ProjectionError::Deserialize(e.to_string()))
}

/// The event must belong to the envelope's tenant and stream.
pub(crate) fn ensure_matches(
    envelope: &EventEnvelope<JsonValue>,
    event_tenant: TenantId,
    event_aggregate: AggregateId,
) -> Result<(), ProjectionError> {
    if event_tenant != envelope.tenant_id() {
        return Err(ProjectionError::TenantIsolation(
            "event tenant_id does not match envelope tenant_id".to_string(),
        ));
    }
    if event_aggregate != envelope.aggregate_id() {
        return Err(ProjectionError::TenantIsolation(
            "event aggregate id does not match envelope aggregate_id".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn env(tenant_id: TenantId, aggregate_id: AggregateId, seq: u64) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(Uuid::now_v7(), tenant_id, aggregate_id, "test", seq, "test.e", Utc::now(), json!({}))
    }

    #[test]
    fn duplicates_are_skipped() {
        let cursors = StreamCursors::new();
        let (t, a) = (TenantId::new(), AggregateId::new());
        let mut applied = 0;

        cursors.apply_in_order(&env(t, a, 1), |_| { applied += 1; Ok(()) }).unwrap();
        cursors.apply_in_order(&env(t, a, 1), |_| { applied += 1; Ok(()) }).unwrap();
        assert_eq!(applied, 1);
        assert_eq!(cursors.position(t, a), 1);
    }

    #[test]
    fn envelopes_ahead_of_the_cursor_wait_for_the_gap_to_close() {
        let cursors = StreamCursors::new();
        let (t, a) = (TenantId::new(), AggregateId::new());
        let mut seen = Vec::new();

        // Two commits racing: 3 and 4 show up (twice) before 2.
        for seq in [1, 3, 4, 3, 4] {
            cursors.apply_in_order(&env(t, a, seq), |e| { seen.push(e.sequence_number()); Ok(()) }).unwrap();
        }
        assert_eq!(seen, vec![1]);
        assert_eq!(cursors.position(t, a), 1);
        assert_eq!(cursors.parked(t, a), 2);

        for seq in [2, 2] {
            cursors.apply_in_order(&env(t, a, seq), |e| { seen.push(e.sequence_number()); Ok(()) }).unwrap();
        }
        assert_eq!(seen, vec![1, 2, 3, 4]);
        assert_eq!(cursors.position(t, a), 4);
        assert_eq!(cursors.parked(t, a), 0);
    }

    #[test]
    fn a_new_stream_starts_at_one() {
        let cursors = StreamCursors::new();
        let (t, a) = (TenantId::new(), AggregateId::new());
        let mut seen = Vec::new();

        cursors.apply_in_order(&env(t, a, 2), |e| { seen.push(e.sequence_number()); Ok(()) }).unwrap();
        assert!(seen.is_empty());
        assert_eq!(cursors.position(t, a), 0);

        cursors.apply_in_order(&env(t, a, 1), |e| { seen.push(e.sequence_number()); Ok(()) }).unwrap();
        assert_eq!(seen, vec![1, 2]);
    }

    #[test]
    fn failed_apply_does_not_advance() {
        let cursors = StreamCursors::new();
        let (t, a) = (TenantId::new(), AggregateId::new());
        let _ = cursors.apply_in_order(&env(t, a, 1), |_| Err(ProjectionError::Deserialize("bad".into())));
        assert_eq!(cursors.position(t, a), 0);
    }

    #[test]
    fn sequence_zero_is_rejected() {
        let cursors = StreamCursors::new();
        let err = cursors.apply_in_order(&env(TenantId::new(), AggregateId::new(), 0), |_| Ok(())).unwrap_err();
        assert!(matches!(err, ProjectionError::NonMonotonicSequence { found: 0, .. }));
        assert!(!err.is_out_of_order());
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use retailops_core::{AggregateId, ExpectedVersion, TenantId};
use std::sync::Arc;

/// An event ready to be appended to a stream (no sequence number yet).
///
/// Lifecycle: domain event (`handle()`) → `UncommittedEvent` → `StoredEvent`
/// (sequence assigned by the store) → `EventEnvelope` (published).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncommittedEvent {
    pub event_id: Uuid,
    pub tenant_id: TenantId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

/// A persisted event.
///
/// Sequence numbers are stream-scoped (tenant + aggregate), start at 1 and
/// never skip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: Uuid,
    pub tenant_id: TenantId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    /// Position in the aggregate stream.
    pub sequence_number: u64,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

impl StoredEvent {
    pub fn stream_version(&self) -> u64 {
        self.sequence_number
    }

    /// Convert into a tenant-scoped envelope for publication.
    pub fn to_envelope(&self) -> retailops_events::EventEnvelope<JsonValue> {
        retailops_events::EventEnvelope::new(
            self.event_id,
            self.tenant_id,
            self.aggregate_id,
            self.aggregate_type.clone(),
            self.sequence_number,
            self.event_type.clone(),
            self.occurred_at,
            self.payload.clone(),
        )
    }

    pub(crate) fn from_uncommitted(event: UncommittedEvent, sequence_number: u64) -> Self {
        Self {
            event_id: event.event_id,
            tenant_id: event.tenant_id,
            aggregate_id: event.aggregate_id,
            aggregate_type: event.aggregate_type,
            sequence_number,
            event_type: event.event_type,
            event_version: event.event_version,
            occurred_at: event.occurred_at,
            payload: event.payload,
        }
    }
}

/// Event store operation error (storage, concurrency, isolation).
#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("aggregate type mismatch: {0}")]
    AggregateTypeMismatch(String),

    #[error("invalid append: {0}")]
    InvalidAppend(String),

    #[error("event publication failed: {0}")]
    Publish(String),

    /// The backing storage failed (connection, query, row decoding).
    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Events for one stream within a multi-stream append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamAppend {
    pub tenant_id: TenantId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,
    pub expected_version: ExpectedVersion,
    pub events: Vec<UncommittedEvent>,
}

impl StreamAppend {
    /// Group a single-stream batch. `None` for an empty batch.
    pub fn from_events(
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Option<Self>, EventStoreError> {
        let Some(first) = events.first() else {
            return Ok(None);
        };
        let batch = Self {
            tenant_id: first.tenant_id,
            aggregate_id: first.aggregate_id,
            aggregate_type: first.aggregate_type.clone(),
            expected_version,
            events,
        };
        batch.validate()?;
        Ok(Some(batch))
    }

    /// Every event must target this batch's tenant, aggregate and type.
    pub fn validate(&self) -> Result<(), EventStoreError> {
        for (idx, e) in self.events.iter().enumerate() {
            if e.tenant_id != self.tenant_id {
                return Err(EventStoreError::TenantIsolation(format!(
                    "batch contains multiple tenant_ids (index {idx})"
                )));
            }
            if e.aggregate_id != self.aggregate_id {
                return Err(EventStoreError::InvalidAppend(format!(
                    "batch contains multiple aggregate_ids (index {idx})"
                )));
            }
            if e.aggregate_type != self.aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "batch contains multiple aggregate_types (index {idx})"
                )));
            }
        }
        Ok(())
    }
}

/// Checks shared by every backend before a multi-stream append: each batch
/// is internally consistent, all batches belong to one tenant and no stream
/// appears twice.
pub(crate) fn validate_batches(batches: &[StreamAppend]) -> Result<(), EventStoreError> {
    let Some(first) = batches.first() else {
        return Ok(());
    };
    let mut seen = std::collections::HashSet::new();
    for (idx, b) in batches.iter().enumerate() {
        b.validate()?;
        if b.tenant_id != first.tenant_id {
            return Err(EventStoreError::TenantIsolation(format!(
                "multi-stream append spans tenants (batch {idx})"
            )));
        }
        if !seen.insert(b.aggregate_id) {
            return Err(EventStoreError::InvalidAppend(format!(
                "stream {} appears twice in one append",
                b.aggregate_id
            )));
        }
    }
    Ok(())
}

/// Append-only, tenant-scoped event store.
///
/// One stream per aggregate instance, keyed by `(tenant_id, aggregate_id)`.
/// Implementations must enforce tenant isolation, optimistic concurrency and
/// gap-free sequence numbers, and persist each call all-or-nothing.
pub trait EventStore: Send + Sync {
    /// Append to several streams atomically. Either every batch is persisted
    /// (each checked against its own `expected_version`) or none is.
    fn append_streams(&self, batches: Vec<StreamAppend>) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Load the full stream for a tenant + aggregate, ordered by sequence.
    /// Empty when the stream does not exist.
    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Every stored event, ordered by tenant, stream, then sequence.
    /// Used to rebuild read models.
    fn load_all(&self) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Append to a single aggregate stream.
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        match StreamAppend::from_events(events, expected_version)? {
            Some(batch) => self.append_streams(vec![batch]),
            None => Ok(vec![]),
        }
    }
}

impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    fn append_streams(&self, batches: Vec<StreamAppend>) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).append_streams(batches)
    }

    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load_stream(tenant_id, aggregate_id)
    }

    fn load_all(&self) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load_all()
    }

    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).append(events, expected_version)
    }
}

impl UncommittedEvent {
    /// Wrap a typed domain event, capturing the metadata needed to
    /// deserialize it later.
    pub fn from_typed<E>(
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        event_id: Uuid,
        event: &E,
    ) -> Result<Self, EventStoreError>
    where
        E: retailops_events::Event + Serialize,
    {
        let payload = serde_json::to_value(event)
            .map_err(|e| EventStoreError::InvalidAppend(format!("payload serialization failed: {e}")))?;

        Ok(Self {
            event_id,
            tenant_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            event_type: event.event_type().to_string(),
            event_version: event.version(),
            occurred_at: event.occurred_at(),
            payload,
        })
    }
}

//! Command execution pipeline.
//!
//! ```text
//! Command
//!   ↓  1. load stream (tenant-scoped) and validate it
//!   ↓  2. rehydrate the aggregate
//!   ↓  3. handle (pure decision, produces events)
//!   ↓  4. append with ExpectedVersion::Exact(version)
//!   ↓  5. publish committed envelopes
//! ```
//!
//! Single-stream commands go through [`CommandDispatcher::dispatch`].
//! Operations that touch several streams (a sale and the shop's inventory
//! records) open a [`UnitOfWork`] with [`CommandDispatcher::begin`].

use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

use retailops_core::{AggregateId, DomainError, ExpectedVersion, TenantId};
use retailops_events::{EventBus, EventEnvelope};

use crate::aggregates::StreamAggregate;
use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
use crate::unit_of_work::UnitOfWork;

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Stale stream version; the operation can be retried.
    #[error("concurrency conflict: {0}")]
    Concurrency(String),

    /// Business-level conflict (already exists, already voided, ...).
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("not found")]
    NotFound,

    /// Historical payload does not deserialize into the aggregate's events.
    #[error("failed to deserialize event history: {0}")]
    Deserialize(String),

    #[error(transparent)]
    Store(EventStoreError),

    /// Publication failed after a successful append (events are persisted).
    #[error("event publication failed: {0}")]
    Publish(String),
}

impl DispatchError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, DispatchError::Concurrency(_))
    }
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            EventStoreError::TenantIsolation(msg) => DispatchError::TenantIsolation(msg),
            EventStoreError::Publish(msg) => DispatchError::Publish(msg),
            other => DispatchError::Store(other),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => DispatchError::Validation(msg),
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::Conflict(msg) => DispatchError::Conflict(msg),
            DomainError::Unauthorized => DispatchError::Unauthorized,
            DomainError::NotFound => DispatchError::NotFound,
            DomainError::InvalidId(msg) => DispatchError::Validation(msg),
        }
    }
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// Events are persisted before they are published; if publication fails the
/// caller receives `DispatchError::Publish` and the events stay committed
/// (at-least-once delivery).
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Run one command against one aggregate stream.
    #[instrument(
        skip(self, command),
        fields(tenant_id = %tenant_id, aggregate_id = %aggregate_id, aggregate_type = A::AGGREGATE_TYPE),
        err
    )]
    pub fn dispatch<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        command: A::Command,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: StreamAggregate,
    {
        let history = self.store.load_stream(tenant_id, aggregate_id)?;
        validate_loaded_stream(tenant_id, aggregate_id, &history)?;
        ensure_stream_type::<A>(aggregate_id, history.first().map(|e| e.aggregate_type.as_str()))?;
        let expected = ExpectedVersion::Exact(stream_version(&history));

        let mut aggregate = A::empty_for(aggregate_id);
        apply_history(&mut aggregate, history.iter().map(|e| &e.payload))?;

        let decided = aggregate.handle(&command)?;
        if decided.is_empty() {
            return Ok(vec![]);
        }

        let uncommitted = decided
            .iter()
            .map(|ev| UncommittedEvent::from_typed(tenant_id, aggregate_id, A::AGGREGATE_TYPE, Uuid::now_v7(), ev))
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, expected)?;
        self.publish(&committed)?;
        Ok(committed)
    }

    /// Rehydrate an aggregate without running a command.
    pub fn load<A>(&self, tenant_id: TenantId, aggregate_id: AggregateId) -> Result<A, DispatchError>
    where
        A: StreamAggregate,
    {
        let history = self.store.load_stream(tenant_id, aggregate_id)?;
        validate_loaded_stream(tenant_id, aggregate_id, &history)?;
        ensure_stream_type::<A>(aggregate_id, history.first().map(|e| e.aggregate_type.as_str()))?;
        let mut aggregate = A::empty_for(aggregate_id);
        apply_history(&mut aggregate, history.iter().map(|e| &e.payload))?;
        Ok(aggregate)
    }

    /// Start a multi-stream unit of work for one tenant.
    pub fn begin(&self, tenant_id: TenantId) -> UnitOfWork<'_, S, B> {
        UnitOfWork::new(self, tenant_id)
    }

    pub(crate) fn publish(&self, committed: &[StoredEvent]) -> Result<(), DispatchError> {
        for stored in committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }
        Ok(())
    }
}

pub(crate) fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

/// Reject foreign-tenant rows and out-of-order sequences even if the
/// backend returned them.
pub(crate) fn validate_loaded_stream(
    tenant_id: TenantId,
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.tenant_id != tenant_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong tenant_id at index {idx}"
            )));
        }
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.sequence_number != last + 1 {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-contiguous sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

/// A stream that belongs to another aggregate type does not exist as `A`.
pub(crate) fn ensure_stream_type<A: StreamAggregate>(
    aggregate_id: AggregateId,
    existing: Option<&str>,
) -> Result<(), DispatchError> {
    match existing {
        Some(existing) if existing != A::AGGREGATE_TYPE => {
            tracing::debug!(
                aggregate_id = %aggregate_id,
                stream_type = existing,
                requested_type = A::AGGREGATE_TYPE,
                "stream belongs to another aggregate type"
            );
            Err(DispatchError::NotFound)
        }
        _ => Ok(()),
    }
}

pub(crate) fn apply_history<'p, A>(
    aggregate: &mut A,
    payloads: impl IntoIterator<Item = &'p JsonValue>,
) -> Result<(), DispatchError>
where
    A: StreamAggregate,
{
    for payload in payloads {
        let ev: A::Event =
            serde_json::from_value(payload.clone()).map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }
    Ok(())
}

use std::collections::HashMap;
use std::sync::RwLock;

use retailops_core::{AggregateId, TenantId};

use super::r#trait::{EventStore, EventStoreError, StoredEvent, StreamAppend, validate_batches};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct StreamKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

/// In-memory append-only event store.
///
/// Intended for tests/dev. A multi-stream append happens under one write
/// lock: every batch is checked before any event is stored.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    streams: RwLock<HashMap<StreamKey, Vec<StoredEvent>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_version(stream: &[StoredEvent]) -> u64 {
        stream.last().map(|e| e.sequence_number).unwrap_or(0)
    }
}

impl EventStore for InMemoryEventStore {
    fn append_streams(&self, batches: Vec<StreamAppend>) -> Result<Vec<StoredEvent>, EventStoreError> {
        let batches: Vec<_> = batches.into_iter().filter(|b| !b.events.is_empty()).collect();
        if batches.is_empty() {
            return Ok(vec![]);
        }
        validate_batches(&batches)?;

        let mut streams = self
            .streams
            .write()
            .map_err(|_| EventStoreError::Backend("lock poisoned".to_string()))?;

        // Phase 1: check every stream before touching any.
        for b in &batches {
            let key = StreamKey {
                tenant_id: b.tenant_id,
                aggregate_id: b.aggregate_id,
            };
            let stream = streams.get(&key).map(Vec::as_slice).unwrap_or(&[]);
            let current = Self::current_version(stream);

            if !b.expected_version.matches(current) {
                return Err(EventStoreError::Concurrency(format!(
                    "stream {}: expected {:?}, found {current}",
                    b.aggregate_id, b.expected_version
                )));
            }
            if let Some(existing) = stream.first() {
                if existing.aggregate_type != b.aggregate_type {
                    return Err(EventStoreError::AggregateTypeMismatch(format!(
                        "stream aggregate_type is '{}', attempted append with '{}'",
                        existing.aggregate_type, b.aggregate_type
                    )));
                }
            }
        }

        // Phase 2: assign sequence numbers and append.
        let mut committed = Vec::new();
        for b in batches {
            let key = StreamKey {
                tenant_id: b.tenant_id,
                aggregate_id: b.aggregate_id,
            };
            let stream = streams.entry(key).or_default();
            let mut next = Self::current_version(stream) + 1;
            for e in b.events {
                let stored = StoredEvent::from_uncommitted(e, next);
                next += 1;
                stream.push(stored.clone());
                committed.push(stored);
            }
        }

        Ok(committed)
    }

    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let key = StreamKey {
            tenant_id,
            aggregate_id,
        };

        let streams = self
            .streams
            .read()
            .map_err(|_| EventStoreError::Backend("lock poisoned".to_string()))?;

        Ok(streams.get(&key).cloned().unwrap_or_default())
    }

    fn load_all(&self) -> Result<Vec<StoredEvent>, EventStoreError> {
        let streams = self
            .streams
            .read()
            .map_err(|_| EventStoreError::Backend("lock poisoned".to_string()))?;

        let mut all: Vec<StoredEvent> = streams.values().flatten().cloned().collect();
        all.sort_by_key(|e| (e.tenant_id, e.aggregate_id, e.sequence_number));
        Ok(all)
    }
}

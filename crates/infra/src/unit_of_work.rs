//! Multi-stream unit of work.
//!
//! A unit loads aggregates, stages the events their commands decide and
//! commits every touched stream in one atomic `append_streams`. Later steps
//! see the events staged by earlier ones (two sale lines for the same
//! product issue stock from the same rehydrated record). Nothing is visible
//! in the store until `commit()`; dropping the unit discards it.

use serde_json::Value as JsonValue;
use uuid::Uuid;

use retailops_core::{AggregateId, ExpectedVersion, TenantId};
use retailops_events::{EventBus, EventEnvelope};

use crate::aggregates::StreamAggregate;
use crate::command_dispatcher::{
    CommandDispatcher, DispatchError, apply_history, ensure_stream_type, stream_version, validate_loaded_stream,
};
use crate::event_store::{EventStore, StoredEvent, StreamAppend, UncommittedEvent};

#[derive(Debug)]
struct StagedStream {
    aggregate_id: AggregateId,
    aggregate_type: &'static str,
    loaded_version: u64,
    history: Vec<JsonValue>,
    pending: Vec<UncommittedEvent>,
}

pub struct UnitOfWork<'d, S, B> {
    dispatcher: &'d CommandDispatcher<S, B>,
    tenant_id: TenantId,
    streams: Vec<StagedStream>,
}

impl<'d, S, B> UnitOfWork<'d, S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub(crate) fn new(dispatcher: &'d CommandDispatcher<S, B>, tenant_id: TenantId) -> Self {
        Self {
            dispatcher,
            tenant_id,
            streams: Vec::new(),
        }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Number of events staged so far.
    pub fn pending_len(&self) -> usize {
        self.streams.iter().map(|s| s.pending.len()).sum()
    }

    /// Rehydrate an aggregate, including events already staged in this unit.
    pub fn load<A>(&mut self, aggregate_id: AggregateId) -> Result<A, DispatchError>
    where
        A: StreamAggregate,
    {
        let idx = self.stream_index::<A>(aggregate_id)?;
        let stream = &self.streams[idx];

        let mut aggregate = A::empty_for(aggregate_id);
        apply_history(
            &mut aggregate,
            stream.history.iter().chain(stream.pending.iter().map(|e| &e.payload)),
        )?;
        Ok(aggregate)
    }

    /// Decide a command against the current (staged) state and stage its events.
    pub fn execute<A>(&mut self, aggregate_id: AggregateId, command: A::Command) -> Result<Vec<A::Event>, DispatchError>
    where
        A: StreamAggregate,
    {
        let aggregate = self.load::<A>(aggregate_id)?;
        let decided = aggregate.handle(&command)?;

        let tenant_id = self.tenant_id;
        let staged = decided
            .iter()
            .map(|ev| UncommittedEvent::from_typed(tenant_id, aggregate_id, A::AGGREGATE_TYPE, Uuid::now_v7(), ev))
            .collect::<Result<Vec<_>, _>>()?;

        let idx = self.stream_index::<A>(aggregate_id)?;
        self.streams[idx].pending.extend(staged);
        Ok(decided)
    }

    /// Append every touched stream atomically, then publish.
    pub fn commit(self) -> Result<Vec<StoredEvent>, DispatchError> {
        let tenant_id = self.tenant_id;
        let batches: Vec<StreamAppend> = self
            .streams
            .into_iter()
            .filter(|s| !s.pending.is_empty())
            .map(|s| StreamAppend {
                tenant_id,
                aggregate_id: s.aggregate_id,
                aggregate_type: s.aggregate_type.to_string(),
                expected_version: ExpectedVersion::Exact(s.loaded_version),
                events: s.pending,
            })
            .collect();

        if batches.is_empty() {
            return Ok(vec![]);
        }

        let committed = self.dispatcher.store().append_streams(batches)?;
        self.dispatcher.publish(&committed)?;
        Ok(committed)
    }

    fn stream_index<A>(&mut self, aggregate_id: AggregateId) -> Result<usize, DispatchError>
    where
        A: StreamAggregate,
    {
        if let Some(idx) = self.streams.iter().position(|s| s.aggregate_id == aggregate_id) {
            ensure_stream_type::<A>(aggregate_id, Some(self.streams[idx].aggregate_type))?;
            return Ok(idx);
        }

        let history = self.dispatcher.store().load_stream(self.tenant_id, aggregate_id)?;
        validate_loaded_stream(self.tenant_id, aggregate_id, &history)?;
        ensure_stream_type::<A>(aggregate_id, history.first().map(|e| e.aggregate_type.as_str()))?;

        self.streams.push(StagedStream {
            aggregate_id,
            aggregate_type: A::AGGREGATE_TYPE,
            loaded_version: stream_version(&history),
            history: history.into_iter().map(|e| e.payload).collect(),
            pending: Vec::new(),
        });
        Ok(self.streams.len() - 1)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use proptest::prelude::*;

    use retailops_events::InMemoryEventBus;
    use retailops_inventory::{InventoryCommand, InventoryRecord, InventoryRecordId, IssueStock, ReceiveStock, StockMovement};
    use retailops_locations::{Location, LocationId};
    use retailops_products::ProductId;

    use super::*;
    use crate::event_store::InMemoryEventStore;

    type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

    fn dispatcher() -> CommandDispatcher<InMemoryEventStore, Bus> {
        CommandDispatcher::new(InMemoryEventStore::new(), Arc::new(InMemoryEventBus::new()))
    }

    fn pair() -> (LocationId, ProductId, AggregateId) {
        let location = LocationId::new(AggregateId::new());
        let product = ProductId::new(AggregateId::new());
        (location, product, InventoryRecordId::for_pair(location, product).0)
    }

    fn receive(tenant_id: TenantId, location_id: LocationId, product_id: ProductId, quantity: i64) -> InventoryCommand {
        InventoryCommand::ReceiveStock(ReceiveStock {
            tenant_id,
            location_id,
            product_id,
            quantity,
            movement: StockMovement::Correction { note: None },
            occurred_at: Utc::now(),
        })
    }

    fn issue(tenant_id: TenantId, location_id: LocationId, product_id: ProductId, quantity: i64) -> InventoryCommand {
        InventoryCommand::IssueStock(IssueStock {
            tenant_id,
            location_id,
            product_id,
            quantity,
            movement: StockMovement::Correction { note: None },
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn later_steps_see_staged_events() {
        let d = dispatcher();
        let tenant_id = TenantId::new();
        let (location, product, record) = pair();

        let mut uow = d.begin(tenant_id);
        uow.execute::<InventoryRecord>(record, receive(tenant_id, location, product, 5)).unwrap();
        uow.execute::<InventoryRecord>(record, issue(tenant_id, location, product, 3)).unwrap();
        assert_eq!(uow.load::<InventoryRecord>(record).unwrap().on_hand(), 2);

        // The second issue would overdraw the staged balance.
        let err = uow.execute::<InventoryRecord>(record, issue(tenant_id, location, product, 3)).unwrap_err();
        assert!(matches!(err, DispatchError::InvariantViolation(_)));

        let committed = uow.commit().unwrap();
        let seqs: Vec<u64> = committed.iter().map(|e| e.sequence_number).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[test]
    fn nothing_is_stored_before_commit() {
        let d = dispatcher();
        let tenant_id = TenantId::new();
        let (location, product, record) = pair();

        {
            let mut uow = d.begin(tenant_id);
            uow.execute::<InventoryRecord>(record, receive(tenant_id, location, product, 1)).unwrap();
            assert!(uow.pending_len() > 0);
            assert!(d.store().load_stream(tenant_id, record).unwrap().is_empty());
        }
        assert!(d.store().load_stream(tenant_id, record).unwrap().is_empty());
    }

    #[test]
    fn stale_stream_fails_the_whole_commit() {
        let d = dispatcher();
        let tenant_id = TenantId::new();
        let (location, product, record) = pair();
        let (other_location, other_product, other_record) = pair();

        let mut uow = d.begin(tenant_id);
        uow.execute::<InventoryRecord>(record, receive(tenant_id, location, product, 1)).unwrap();
        uow.execute::<InventoryRecord>(other_record, receive(tenant_id, other_location, other_product, 1))
            .unwrap();

        // Someone else writes to `record` after the unit loaded it.
        d.dispatch::<InventoryRecord>(tenant_id, record, receive(tenant_id, location, product, 7))
            .unwrap();

        let err = uow.commit().unwrap_err();
        assert!(err.is_retryable());
        assert!(d.store().load_stream(tenant_id, other_record).unwrap().is_empty());
        assert_eq!(d.load::<InventoryRecord>(tenant_id, record).unwrap().on_hand(), 7);
    }

    #[test]
    fn one_stream_cannot_be_two_aggregate_types() {
        let d = dispatcher();
        let tenant_id = TenantId::new();
        let (location, product, record) = pair();

        let mut uow = d.begin(tenant_id);
        uow.execute::<InventoryRecord>(record, receive(tenant_id, location, product, 1)).unwrap();
        let err = uow.load::<Location>(record).unwrap_err();
        assert!(matches!(err, DispatchError::NotFound));

        uow.commit().unwrap();
        let mut fresh = d.begin(tenant_id);
        assert!(matches!(fresh.load::<Location>(record).unwrap_err(), DispatchError::NotFound));
        assert!(matches!(d.load::<Location>(tenant_id, record).unwrap_err(), DispatchError::NotFound));
    }

    proptest! {
        #[test]
        fn staged_stock_never_goes_negative(moves in prop::collection::vec(-20i64..20, 1..40)) {
            let d = dispatcher();
            let tenant_id = TenantId::new();
            let (location, product, record) = pair();
            let mut uow = d.begin(tenant_id);
            let mut expected = 0i64;

            for m in moves.into_iter().filter(|m| *m != 0) {
                let cmd = if m > 0 {
                    receive(tenant_id, location, product, m)
                } else {
                    issue(tenant_id, location, product, -m)
                };
                match uow.execute::<InventoryRecord>(record, cmd) {
                    Ok(_) => expected += m,
                    Err(_) => prop_assert!(expected + m < 0),
                }
                let on_hand = uow.load::<InventoryRecord>(record).unwrap().on_hand();
                prop_assert!(on_hand >= 0);
                prop_assert_eq!(on_hand, expected);
            }

            uow.commit().unwrap();
            prop_assert_eq!(d.load::<InventoryRecord>(tenant_id, record).unwrap().on_hand(), expected);
        }
    }
}

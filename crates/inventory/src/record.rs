use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use retailops_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use retailops_events::Event;
use retailops_locations::LocationId;
use retailops_products::ProductId;

pub const AGGREGATE_TYPE: &str = "inventory.record";

const RECORD_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a8e_4b7d_5c39_9e0a_31d8_f2b4_7a65);

/// Inventory record identifier, derived from the (location, product) pair.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InventoryRecordId(pub AggregateId);

impl InventoryRecordId {
    pub fn for_pair(location_id: LocationId, product_id: ProductId) -> Self {
        Self(AggregateId::derived(&RECORD_NAMESPACE, &[&location_id.0, &product_id.0]))
    }
}

impl core::fmt::Display for InventoryRecordId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Why stock moved. Each variant references the document that moved it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StockMovement {
    Sale { sale_id: AggregateId },
    SaleVoided { sale_id: AggregateId },
    InvoiceReceipt { invoice_id: AggregateId },
    InvoiceVoided { invoice_id: AggregateId },
    TransferOut { transfer_id: AggregateId },
    TransferIn { transfer_id: AggregateId },
    TransferCancelled { transfer_id: AggregateId },
    Correction { note: Option<String> },
}

impl StockMovement {
    pub fn reference(&self) -> Option<AggregateId> {
        match self {
            StockMovement::Sale { sale_id } | StockMovement::SaleVoided { sale_id } => Some(*sale_id),
            StockMovement::InvoiceReceipt { invoice_id } | StockMovement::InvoiceVoided { invoice_id } => {
                Some(*invoice_id)
            }
            StockMovement::TransferOut { transfer_id }
            | StockMovement::TransferIn { transfer_id }
            | StockMovement::TransferCancelled { transfer_id } => Some(*transfer_id),
            StockMovement::Correction { .. } => None,
        }
    }
}

/// Aggregate root: stock of one product at one location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryRecord {
    id: InventoryRecordId,
    tenant_id: Option<TenantId>,
    location_id: Option<LocationId>,
    product_id: Option<ProductId>,
    on_hand: i64,
    reorder_level: Option<i64>,
    version: u64,
    created: bool,
}

impl InventoryRecord {
    pub fn empty(id: InventoryRecordId) -> Self {
        Self {
            id,
            tenant_id: None,
            location_id: None,
            product_id: None,
            on_hand: 0,
            reorder_level: None,
            version: 0,
            created: false,
        }
    }

    pub fn for_pair(location_id: LocationId, product_id: ProductId) -> Self {
        Self::empty(InventoryRecordId::for_pair(location_id, product_id))
    }

    pub fn id_typed(&self) -> InventoryRecordId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn on_hand(&self) -> i64 {
        self.on_hand
    }

    pub fn reorder_level(&self) -> Option<i64> {
        self.reorder_level
    }
}

impl AggregateRoot for InventoryRecord {
    type Id = InventoryRecordId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: add stock (`quantity > 0`). Opens the record on first receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveStock {
    pub tenant_id: TenantId,
    pub location_id: LocationId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub movement: StockMovement,
    pub occurred_at: DateTime<Utc>,
}

/// Command: take stock out (`quantity > 0`); never below zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueStock {
    pub tenant_id: TenantId,
    pub location_id: LocationId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub movement: StockMovement,
    pub occurred_at: DateTime<Utc>,
}

/// Command: manual correction (stock count, breakage, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustStock {
    pub tenant_id: TenantId,
    pub location_id: LocationId,
    pub product_id: ProductId,
    pub delta: i64,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetReorderLevel {
    pub tenant_id: TenantId,
    pub location_id: LocationId,
    pub product_id: ProductId,
    pub level: Option<i64>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryCommand {
    ReceiveStock(ReceiveStock),
    IssueStock(IssueStock),
    AdjustStock(AdjustStock),
    SetReorderLevel(SetReorderLevel),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordOpened {
    pub tenant_id: TenantId,
    pub record_id: InventoryRecordId,
    pub location_id: LocationId,
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjusted {
    pub tenant_id: TenantId,
    pub record_id: InventoryRecordId,
    pub location_id: LocationId,
    pub product_id: ProductId,
    pub delta: i64,
    pub on_hand_after: i64,
    pub movement: StockMovement,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderLevelSet {
    pub tenant_id: TenantId,
    pub record_id: InventoryRecordId,
    pub location_id: LocationId,
    pub product_id: ProductId,
    pub level: Option<i64>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryEvent {
    RecordOpened(RecordOpened),
    StockAdjusted(StockAdjusted),
    ReorderLevelSet(ReorderLevelSet),
}

impl InventoryEvent {
    pub fn location_id(&self) -> LocationId {
        match self {
            InventoryEvent::RecordOpened(e) => e.location_id,
            InventoryEvent::StockAdjusted(e) => e.location_id,
            InventoryEvent::ReorderLevelSet(e) => e.location_id,
        }
    }

    pub fn product_id(&self) -> ProductId {
        match self {
            InventoryEvent::RecordOpened(e) => e.product_id,
            InventoryEvent::StockAdjusted(e) => e.product_id,
            InventoryEvent::ReorderLevelSet(e) => e.product_id,
        }
    }
}

impl Event for InventoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InventoryEvent::RecordOpened(_) => "inventory.record.opened",
            InventoryEvent::StockAdjusted(_) => "inventory.record.stock_adjusted",
            InventoryEvent::ReorderLevelSet(_) => "inventory.record.reorder_level_set",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InventoryEvent::RecordOpened(e) => e.occurred_at,
            InventoryEvent::StockAdjusted(e) => e.occurred_at,
            InventoryEvent::ReorderLevelSet(e) => e.occurred_at,
        }
    }
}

impl Aggregate for InventoryRecord {
    type Command = InventoryCommand;
    type Event = InventoryEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InventoryEvent::RecordOpened(e) => {
                self.id = e.record_id;
                self.tenant_id = Some(e.tenant_id);
                self.location_id = Some(e.location_id);
                self.product_id = Some(e.product_id);
                self.on_hand = 0;
                self.created = true;
            }
            InventoryEvent::StockAdjusted(e) => self.on_hand += e.delta,
            InventoryEvent::ReorderLevelSet(e) => self.reorder_level = e.level,
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InventoryCommand::ReceiveStock(cmd) => self.handle_receive(cmd),
            InventoryCommand::IssueStock(cmd) => self.handle_issue(cmd),
            InventoryCommand::AdjustStock(cmd) => self.handle_adjust(cmd),
            InventoryCommand::SetReorderLevel(cmd) => self.handle_reorder_level(cmd),
        }
    }
}

impl InventoryRecord {
    fn ensure_target(
        &self,
        tenant_id: TenantId,
        location_id: LocationId,
        product_id: ProductId,
    ) -> Result<(), DomainError> {
        if self.id != InventoryRecordId::for_pair(location_id, product_id) {
            return Err(DomainError::invariant("record_id does not match location/product"));
        }
        if self.created && self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn open_if_needed(
        &self,
        tenant_id: TenantId,
        location_id: LocationId,
        product_id: ProductId,
        occurred_at: DateTime<Utc>,
    ) -> Vec<InventoryEvent> {
        if self.created {
            return vec![];
        }
        vec![InventoryEvent::RecordOpened(RecordOpened {
            tenant_id,
            record_id: self.id,
            location_id,
            product_id,
            occurred_at,
        })]
    }

    fn moved(
        &self,
        tenant_id: TenantId,
        location_id: LocationId,
        product_id: ProductId,
        delta: i64,
        movement: StockMovement,
        occurred_at: DateTime<Utc>,
    ) -> Result<InventoryEvent, DomainError> {
        let on_hand_after = self.on_hand.checked_add(delta).ok_or_else(|| {
            DomainError::validation("stock quantity overflows")
        })?;
        if on_hand_after < 0 {
            return Err(DomainError::invariant(format!(
                "insufficient stock for product {product_id} at location {location_id} (on hand {}, requested {})",
                self.on_hand,
                -delta
            )));
        }
        Ok(InventoryEvent::StockAdjusted(StockAdjusted {
            tenant_id,
            record_id: self.id,
            location_id,
            product_id,
            delta,
            on_hand_after,
            movement,
            occurred_at,
        }))
    }

    fn handle_receive(&self, cmd: &ReceiveStock) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_target(cmd.tenant_id, cmd.location_id, cmd.product_id)?;
        if cmd.quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }

        let mut events = self.open_if_needed(cmd.tenant_id, cmd.location_id, cmd.product_id, cmd.occurred_at);
        events.push(self.moved(
            cmd.tenant_id,
            cmd.location_id,
            cmd.product_id,
            cmd.quantity,
            cmd.movement.clone(),
            cmd.occurred_at,
        )?);
        Ok(events)
    }

    fn handle_issue(&self, cmd: &IssueStock) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_target(cmd.tenant_id, cmd.location_id, cmd.product_id)?;
        if cmd.quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }

        Ok(vec![self.moved(
            cmd.tenant_id,
            cmd.location_id,
            cmd.product_id,
            -cmd.quantity,
            cmd.movement.clone(),
            cmd.occurred_at,
        )?])
    }

    fn handle_adjust(&self, cmd: &AdjustStock) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_target(cmd.tenant_id, cmd.location_id, cmd.product_id)?;
        if cmd.delta == 0 {
            return Err(DomainError::validation("delta cannot be zero"));
        }

        let movement = StockMovement::Correction {
            note: cmd.note.as_deref().map(str::trim).filter(|n| !n.is_empty()).map(str::to_string),
        };
        let adjusted = self.moved(
            cmd.tenant_id,
            cmd.location_id,
            cmd.product_id,
            cmd.delta,
            movement,
            cmd.occurred_at,
        )?;

        let mut events = self.open_if_needed(cmd.tenant_id, cmd.location_id, cmd.product_id, cmd.occurred_at);
        events.push(adjusted);
        Ok(events)
    }

    fn handle_reorder_level(&self, cmd: &SetReorderLevel) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_target(cmd.tenant_id, cmd.location_id, cmd.product_id)?;
        if matches!(cmd.level, Some(l) if l < 0) {
            return Err(DomainError::validation("reorder level cannot be negative"));
        }
        if self.created && self.reorder_level == cmd.level {
            return Err(DomainError::validation("reorder level is unchanged"));
        }

        let mut events = self.open_if_needed(cmd.tenant_id, cmd.location_id, cmd.product_id, cmd.occurred_at);
        events.push(InventoryEvent::ReorderLevelSet(ReorderLevelSet {
            tenant_id: cmd.tenant_id,
            record_id: self.id,
            location_id: cmd.location_id,
            product_id: cmd.product_id,
            level: cmd.level,
            occurred_at: cmd.occurred_at,
        }));
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        tenant_id: TenantId,
        location_id: LocationId,
        product_id: ProductId,
        record: InventoryRecord,
    }

    impl Fixture {
        fn new() -> Self {
            let location_id = LocationId::new(AggregateId::new());
            let product_id = ProductId::new(AggregateId::new());
            Self {
                tenant_id: TenantId::new(),
                location_id,
                product_id,
                record: InventoryRecord::for_pair(location_id, product_id),
            }
        }

        fn exec(&mut self, cmd: InventoryCommand) -> Result<Vec<InventoryEvent>, DomainError> {
            let events = self.record.handle(&cmd)?;
            for e in &events {
                self.record.apply(e);
            }
            Ok(events)
        }

        fn receive(&mut self, quantity: i64) -> Result<Vec<InventoryEvent>, DomainError> {
            self.exec(InventoryCommand::ReceiveStock(ReceiveStock {
                tenant_id: self.tenant_id,
                location_id: self.location_id,
                product_id: self.product_id,
                quantity,
                movement: StockMovement::InvoiceReceipt { invoice_id: AggregateId::new() },
                occurred_at: Utc::now(),
            }))
        }

        fn issue(&mut self, quantity: i64) -> Result<Vec<InventoryEvent>, DomainError> {
            self.exec(InventoryCommand::IssueStock(IssueStock {
                tenant_id: self.tenant_id,
                location_id: self.location_id,
                product_id: self.product_id,
                quantity,
                movement: StockMovement::Sale { sale_id: AggregateId::new() },
                occurred_at: Utc::now(),
            }))
        }

        fn adjust(&mut self, delta: i64) -> Result<Vec<InventoryEvent>, DomainError> {
            self.exec(InventoryCommand::AdjustStock(AdjustStock {
                tenant_id: self.tenant_id,
                location_id: self.location_id,
                product_id: self.product_id,
                delta,
                note: Some("count".to_string()),
                occurred_at: Utc::now(),
            }))
        }
    }

    #[test]
    fn record_id_is_deterministic_per_pair() {
        let l = LocationId::new(AggregateId::new());
        let p = ProductId::new(AggregateId::new());
        assert_eq!(InventoryRecordId::for_pair(l, p), InventoryRecordId::for_pair(l, p));
        let other = LocationId::new(AggregateId::new());
        assert_ne!(InventoryRecordId::for_pair(l, p), InventoryRecordId::for_pair(other, p));
    }

    #[test]
    fn first_receipt_opens_the_record() {
        let mut f = Fixture::new();
        let events = f.receive(5).unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], InventoryEvent::RecordOpened(_)));
        assert_eq!(f.record.on_hand(), 5);

        let events = f.receive(3).unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            InventoryEvent::StockAdjusted(e) => assert_eq!(e.on_hand_after, 8),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(f.record.version(), 3);
    }

    #[test]
    fn issue_cannot_go_negative() {
        let mut f = Fixture::new();
        f.receive(2).unwrap();
        let err = f.issue(3).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(msg) if msg.contains("insufficient stock")));
        assert_eq!(f.record.on_hand(), 2);
        f.issue(2).unwrap();
        assert_eq!(f.record.on_hand(), 0);
    }

    #[test]
    fn issue_from_unopened_record_is_insufficient() {
        let mut f = Fixture::new();
        let err = f.issue(1).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn non_positive_quantities_are_rejected() {
        let mut f = Fixture::new();
        assert!(matches!(f.receive(0), Err(DomainError::Validation(_))));
        assert!(matches!(f.issue(-1), Err(DomainError::Validation(_))));
        assert!(matches!(f.adjust(0), Err(DomainError::Validation(_))));
    }

    #[test]
    fn adjustment_opens_record_and_tags_correction() {
        let mut f = Fixture::new();
        let events = f.adjust(4).unwrap();
        assert!(matches!(events[0], InventoryEvent::RecordOpened(_)));
        match &events[1] {
            InventoryEvent::StockAdjusted(e) => {
                assert_eq!(e.movement, StockMovement::Correction { note: Some("count".to_string()) });
                assert_eq!(e.movement.reference(), None);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(f.adjust(-5).is_err());
    }

    #[test]
    fn reorder_level_validation() {
        let mut f = Fixture::new();
        let set = |level| {
            InventoryCommand::SetReorderLevel(SetReorderLevel {
                tenant_id: f.tenant_id,
                location_id: f.location_id,
                product_id: f.product_id,
                level,
                occurred_at: Utc::now(),
            })
        };
        let negative = set(Some(-1));
        let ten = set(Some(10));
        assert!(matches!(f.exec(negative), Err(DomainError::Validation(_))));
        f.exec(ten.clone()).unwrap();
        assert_eq!(f.record.reorder_level(), Some(10));
        assert!(matches!(f.exec(ten), Err(DomainError::Validation(_))));
    }

    #[test]
    fn wrong_pair_is_rejected() {
        let mut f = Fixture::new();
        f.product_id = ProductId::new(AggregateId::new());
        assert!(matches!(f.receive(1), Err(DomainError::InvariantViolation(_))));
    }

    #[test]
    fn movement_serializes_with_kind_tag() {
        let id = AggregateId::new();
        let json = serde_json::to_value(StockMovement::TransferIn { transfer_id: id }).unwrap();
        assert_eq!(json["kind"], "transfer_in");
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 500,
                ..ProptestConfig::default()
            })]

            /// Property: no accepted sequence of movements drives stock below zero,
            /// and the record always equals the sum of accepted deltas.
            #[test]
            fn stock_never_negative(deltas in proptest::collection::vec(-50i64..50, 1..60)) {
                let mut f = Fixture::new();
                let mut expected = 0i64;
                for delta in deltas {
                    let result = match delta {
                        0 => continue,
                        d if d > 0 => f.receive(d),
                        d => f.issue(-d),
                    };
                    match result {
                        Ok(_) => expected += delta,
                        Err(e) => prop_assert!(matches!(e, DomainError::InvariantViolation(_))),
                    }
                    prop_assert!(f.record.on_hand() >= 0);
                    prop_assert_eq!(f.record.on_hand(), expected);
                }
            }
        }
    }
}

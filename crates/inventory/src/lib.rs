//! Inventory domain module (event-sourced).
//!
//! One [`InventoryRecord`] per (location, product) pair holds the on-hand
//! quantity. Sales, supplier invoices and transfers move stock through it;
//! every movement names its cause.

pub mod record;

pub use record::{
    AGGREGATE_TYPE, AdjustStock, InventoryCommand, InventoryEvent, InventoryRecord, InventoryRecordId,
    IssueStock, ReceiveStock, RecordOpened, ReorderLevelSet, SetReorderLevel, StockAdjusted, StockMovement,
};

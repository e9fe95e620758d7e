//! Stock transfers between locations (event-sourced).
//!
//! Two-step: dispatch takes stock out of the source, receipt puts it into the
//! destination. A transfer still in transit can be cancelled.

pub mod transfer;

pub use transfer::{
    AGGREGATE_TYPE, CancelTransfer, DispatchTransfer, ReceiveTransfer, Transfer, TransferCancelled,
    TransferCommand, TransferDispatched, TransferEvent, TransferId, TransferLine, TransferReceived,
    TransferStatus,
};

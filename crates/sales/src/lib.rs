//! Point-of-sale transactions (event-sourced).
//!
//! A sale is recorded complete in one step at a shop. Voiding it is the only
//! way to take it back; stock reversal is the workflow layer's job.

pub mod sale;

pub use sale::{
    AGGREGATE_TYPE, NewSaleLine, PaymentMethod, RecordSale, Sale, SaleCommand, SaleEvent, SaleId, SaleLine,
    SaleRecorded, SaleStatus, SaleTotals, SaleVoided, VoidSale, sale_totals,
};

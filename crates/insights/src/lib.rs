//! `retailops-insights`
//!
//! Read-only analytics over sales history. Jobs consume snapshots built from
//! read models and return insights; they never emit domain events or touch
//! aggregates.

pub mod job;
pub mod result;
pub mod stock_velocity;

pub use job::InsightJob;
pub use result::{InsightError, InsightResult};
pub use stock_velocity::{
    ItemSalesHistory, ItemVelocity, SalesHistorySnapshot, StockVelocityJob, DEFAULT_LEAD_TIME_DAYS,
    DEFAULT_TARGET_COVER_DAYS,
};

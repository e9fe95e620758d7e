//! Product catalog (event-sourced).
//!
//! A product carries its selling price and its weighted average unit cost.
//! The cost moves only through supplier-invoice receipts (see [`costing`]).

pub mod costing;
pub mod product;

pub use costing::{reverse_weighted_average_cost, weighted_average_cost};
pub use product::{
    AGGREGATE_TYPE, ActivateProduct, ApplyReceiptCost, ArchiveProduct, ChangePrice,
    CostChangeReason, CostRecalculated, CreateProduct, PriceChanged, Product, ProductActivated,
    ProductArchived, ProductCommand, ProductCreated, ProductEvent, ProductId, ProductStatus,
    ProductUpdated, ReverseReceiptCost, UpdateProduct,
};

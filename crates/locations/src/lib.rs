//! Shops and warehouses (event-sourced).
//!
//! A location is where stock lives. Shops sell; warehouses receive supplier
//! invoices; transfers move stock between any two active locations.

pub mod location;

pub use location::{
    AGGREGATE_TYPE, CloseLocation, Location, LocationClosed, LocationCommand, LocationEvent,
    LocationId, LocationKind, LocationOpened, LocationReopened, LocationStatus, LocationUpdated,
    OpenLocation, ReopenLocation, UpdateLocation,
};

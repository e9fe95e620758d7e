//! Infrastructure for the retail service: event storage, command dispatch,
//! cross-aggregate workflows and the read models built from committed events.

pub mod aggregates;
pub mod command_dispatcher;
pub mod event_store;
pub mod projections;
pub mod read_model;
pub mod unit_of_work;
pub mod workers;
pub mod workflows;

#[cfg(test)]
mod integration_tests;

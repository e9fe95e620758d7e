//! Event primitives shared by the retail domain crates and infrastructure.
//!
//! - [`Event`]: metadata every domain event exposes
//! - [`EventEnvelope`]: tenant + stream metadata around a payload
//! - [`EventBus`]: publish/subscribe mechanics (no storage)

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};

//! Background threads fed by the event bus.

pub mod read_model_worker;

pub use read_model_worker::{ReadModelWorker, WorkerHandle};

//! Process-wide logging setup shared by the retail binaries.

pub mod tracing;

pub use tracing::{LogFormat, ParseLogFormatError};

/// Install the global subscriber. Later calls are no-ops.
pub fn init(format: LogFormat) {
    tracing::init(format);
}

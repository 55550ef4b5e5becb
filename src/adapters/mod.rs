//! Consumers of the reading stream
//!
//! Adapters are registered per sensor and called in registration order from
//! that sensor's scheduling thread. A failing adapter is logged by the manager
//! and never affects the others.

pub mod logging;
pub mod queue;
pub mod json_lines;

pub use logging::LoggingAdapter;
pub use queue::QueueAdapter;
pub use json_lines::JsonLinesAdapter;

use crate::core::Reading;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),

    /// The consuming side of a channel has gone away
    #[error("consumer disconnected")]
    Disconnected,

    #[error("{0}")]
    Other(String),
}

pub trait Adapter: Send + Sync {
    fn process_reading(&self, reading: &Reading) -> Result<(), AdapterError>;
}

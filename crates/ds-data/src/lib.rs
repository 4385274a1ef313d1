//! Data acquisition and querying for the telemetry feed platform
//!
//! Builds on the core model: the buffered table writer, the adaptive
//! nearest-timestamp index, historical fetch normalization, and the
//! recorded/live feed implementations with their session assembly.

pub mod config;
pub mod history;
pub mod index;
pub mod session;
pub mod sources;
pub mod writer;

use ds_core::LifecycleError;
use ds_stream::StreamError;
use thiserror::Error;

// Re-exports
pub use config::SessionConfig;
pub use history::{HistoricalDataApi, HistoricalRow, HistoricalValue};
pub use index::TimestampIndex;
pub use session::FeedSession;
pub use sources::{EmptyFeed, LiveFeed, RecordedFeed};
pub use writer::BufferedTableWriter;

/// Errors that can occur in data operations
#[derive(Error, Debug)]
pub enum DataError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("feed lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("recorded mode requires a historical data api")]
    MissingHistoricalApi,
}

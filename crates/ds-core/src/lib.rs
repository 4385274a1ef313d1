//! Core model and abstractions for the telemetry feed platform
//!
//! This crate provides the shared data model (timestamped samples and the
//! columnar table), the observable value primitive every component publishes
//! through, and the feed contract consumers program against.

pub mod feed;
pub mod observable;
pub mod table;

// Re-export commonly used types
pub use feed::{DataFeed, FeedLifecycle, FeedMode, LifecycleError};
pub use observable::{Observable, Subscription, TimeSignal};
pub use table::{
    ColumnDefinition, ColumnKind, SampleValue, TimeseriesPoint, TimeseriesTable, VectorColumn,
};

//! The mode-uniform data feed contract
//!
//! Consumers (visualizations, plugins) program against [`DataFeed`] without
//! knowing whether rows come from a one-shot historical fetch or a live
//! stream. Each consumer gets its own feed instance; feeds sharing a session
//! share the current-time signal and the underlying connections.

use async_trait::async_trait;
use thiserror::Error;

use crate::observable::{Observable, TimeSignal};
use crate::table::{ColumnDefinition, TimeseriesPoint, TimeseriesTable};

/// Where a feed's rows come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedMode {
    /// Full historical table fetched once, queried by an external clock.
    Recorded,
    /// Rows arrive continuously from a stream; the clock is self-driven.
    Live,
}

/// Feed lifecycle states with checked transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedLifecycle {
    Created,
    Initialized,
    Closed,
}

#[derive(Debug, Error)]
#[error("invalid feed lifecycle transition: {from:?} -> {to:?}")]
pub struct LifecycleError {
    pub from: FeedLifecycle,
    pub to: FeedLifecycle,
}

impl FeedLifecycle {
    /// Validate and perform a transition.
    pub fn advance(self, to: FeedLifecycle) -> Result<FeedLifecycle, LifecycleError> {
        use FeedLifecycle::*;
        match (self, to) {
            (Created, Initialized) | (Created, Closed) | (Initialized, Closed) => Ok(to),
            (from, to) => Err(LifecycleError { from, to }),
        }
    }
}

/// Uniform "value near time T" contract over recorded and live data.
#[async_trait]
pub trait DataFeed: Send + Sync {
    /// Declare the measurement keys this consumer cares about and acquire
    /// the backing data (historical fetch or stream subscription).
    async fn initialize(&self, measurement_keys: &[String]) -> anyhow::Result<()>;

    /// Attach the externally driven current-time signal. Recorded feeds look
    /// up and republish the nearest row per tick; live feeds ignore ticks
    /// because rows already arrive "at now".
    fn subscribe_to_current_time(&self, time: &TimeSignal);

    /// Rows this feed republishes to its consumer.
    fn measurements(&self) -> Observable<TimeseriesPoint>;

    /// Snapshot of everything gathered so far.
    fn all_measurements(&self) -> TimeseriesTable;

    /// Columns currently present in the feed's table.
    fn column_catalog(&self) -> Vec<ColumnDefinition>;

    /// Columns the backing source could provide.
    async fn available_columns(&self) -> anyhow::Result<Vec<ColumnDefinition>>;

    /// Tear down subscriptions; the feed is inert afterwards.
    fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_accepts_forward_transitions() {
        let state = FeedLifecycle::Created;
        let state = state.advance(FeedLifecycle::Initialized).unwrap();
        let state = state.advance(FeedLifecycle::Closed).unwrap();
        assert_eq!(state, FeedLifecycle::Closed);

        // Skipping initialization straight to closed is allowed.
        assert!(FeedLifecycle::Created.advance(FeedLifecycle::Closed).is_ok());
    }

    #[test]
    fn lifecycle_rejects_reinitialization_and_reopen() {
        assert!(FeedLifecycle::Initialized
            .advance(FeedLifecycle::Initialized)
            .is_err());
        assert!(FeedLifecycle::Closed
            .advance(FeedLifecycle::Initialized)
            .is_err());
        assert!(FeedLifecycle::Closed.advance(FeedLifecycle::Created).is_err());
    }
}

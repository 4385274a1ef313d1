//! Recorded-mode feed: one-shot historical snapshot, queried by an
//! externally driven clock

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use ds_core::{
    ColumnDefinition, DataFeed, FeedLifecycle, Observable, Subscription, TimeSignal,
    TimeseriesPoint, TimeseriesTable,
};
use ds_stream::ClockSyncConnection;

use crate::history::{build_table, HistoricalDataApi};
use crate::index::TimestampIndex;
use crate::DataError;

/// Feed over a historical snapshot fetched once at initialization.
///
/// Each tick of the attached time signal runs a nearest-timestamp lookup and
/// republishes the found row; the externally-chosen time is also forwarded
/// over the clock-sync channel so remote consumers stay aligned.
pub struct RecordedFeed {
    api: Arc<dyn HistoricalDataApi>,
    clock_sync: Option<Arc<ClockSyncConnection>>,
    table: Arc<RwLock<TimeseriesTable>>,
    index: Arc<RwLock<Option<TimestampIndex>>>,
    measurements: Observable<TimeseriesPoint>,
    time_subscription: Mutex<Option<Subscription>>,
    lifecycle: Mutex<FeedLifecycle>,
}

impl RecordedFeed {
    pub fn new(
        api: Arc<dyn HistoricalDataApi>,
        clock_sync: Option<Arc<ClockSyncConnection>>,
    ) -> Self {
        Self {
            api,
            clock_sync,
            table: Arc::new(RwLock::new(TimeseriesTable::new())),
            index: Arc::new(RwLock::new(None)),
            measurements: Observable::new(),
            time_subscription: Mutex::new(None),
            lifecycle: Mutex::new(FeedLifecycle::Created),
        }
    }

    fn advance_lifecycle(&self, to: FeedLifecycle) -> Result<(), DataError> {
        let mut lifecycle = self.lifecycle.lock();
        *lifecycle = lifecycle.advance(to)?;
        Ok(())
    }
}

#[async_trait]
impl DataFeed for RecordedFeed {
    async fn initialize(&self, measurement_keys: &[String]) -> anyhow::Result<()> {
        self.advance_lifecycle(FeedLifecycle::Initialized)?;

        let rows = self.api.fetch_rows(measurement_keys).await?;
        let table = build_table(&rows, measurement_keys);
        info!(
            rows = table.row_count(),
            columns = measurement_keys.len(),
            "historical snapshot loaded"
        );

        *self.table.write() = table;
        *self.index.write() = Some(TimestampIndex::new(Arc::clone(&self.table)));
        Ok(())
    }

    fn subscribe_to_current_time(&self, time: &TimeSignal) {
        let index = Arc::clone(&self.index);
        let measurements = self.measurements.clone();
        let clock_sync = self.clock_sync.clone();

        let subscription = time.subscribe(move |timestamp: &f64| {
            if let Some(sync) = clock_sync.as_deref() {
                sync.send_current_timestamp(*timestamp);
            }

            let found = {
                let mut guard = index.write();
                let Some(index) = guard.as_mut() else {
                    warn!("time tick before initialization, ignoring");
                    return;
                };
                index.lookup(*timestamp)
            };
            if let Some(point) = found {
                measurements.publish(point);
            }
        });

        *self.time_subscription.lock() = Some(subscription);
    }

    fn measurements(&self) -> Observable<TimeseriesPoint> {
        self.measurements.clone()
    }

    fn all_measurements(&self) -> TimeseriesTable {
        self.table.read().clone()
    }

    fn column_catalog(&self) -> Vec<ColumnDefinition> {
        self.table.read().column_catalog()
    }

    async fn available_columns(&self) -> anyhow::Result<Vec<ColumnDefinition>> {
        self.api.available_columns().await
    }

    fn close(&self) {
        if self.advance_lifecycle(FeedLifecycle::Closed).is_err() {
            return;
        }
        self.time_subscription.lock().take();
    }
}

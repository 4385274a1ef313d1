//! Live-mode feed: rows arrive continuously from the stream and the clock
//! follows them

use std::sync::Arc;

use ahash::AHashMap;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use ds_core::{
    ColumnDefinition, DataFeed, FeedLifecycle, Observable, Subscription, TimeSignal,
    TimeseriesPoint, TimeseriesTable,
};

use crate::config::WriterSettings;
use crate::writer::{BufferedTableWriter, FlushTicker};
use crate::DataError;

/// Feed over the live stream.
///
/// Inbound rows are filtered down to the consumer's keys of interest, queued
/// into the buffered writer for later historical queries, and republished
/// immediately — no index lookup, live rows already arrive "at now". The
/// shared time signal is driven by each arriving row's timestamp.
pub struct LiveFeed {
    events: Observable<TimeseriesPoint>,
    time: TimeSignal,
    table: Arc<RwLock<TimeseriesTable>>,
    writer: Arc<BufferedTableWriter>,
    ticker: Mutex<Option<FlushTicker>>,
    measurements: Observable<TimeseriesPoint>,
    stream_subscription: Mutex<Option<Subscription>>,
    lifecycle: Mutex<FeedLifecycle>,
}

impl LiveFeed {
    /// `events` is the stream connection's decoded-point observable; `time`
    /// is the session-shared clock this feed drives. Must be called from a
    /// tokio runtime, the writer's flush ticker is spawned here.
    pub fn new(
        events: Observable<TimeseriesPoint>,
        time: TimeSignal,
        settings: &WriterSettings,
    ) -> Self {
        let table = Arc::new(RwLock::new(TimeseriesTable::new()));
        let writer = Arc::new(BufferedTableWriter::new(Arc::clone(&table), settings));
        let ticker = writer.spawn_ticker(settings.tick_interval());

        Self {
            events,
            time,
            table,
            writer,
            ticker: Mutex::new(Some(ticker)),
            measurements: Observable::new(),
            stream_subscription: Mutex::new(None),
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
impl DataFeed for LiveFeed {
    async fn initialize(&self, measurement_keys: &[String]) -> anyhow::Result<()> {
        self.advance_lifecycle(FeedLifecycle::Initialized)?;

        let keys = measurement_keys.to_vec();
        let writer = Arc::clone(&self.writer);
        let measurements = self.measurements.clone();
        let time = self.time.clone();

        let subscription = self.events.subscribe(move |point: &TimeseriesPoint| {
            let mut values = AHashMap::new();
            for key in &keys {
                if let Some(value) = point.values.get(key) {
                    values.insert(key.clone(), value.clone());
                }
            }
            let filtered = TimeseriesPoint {
                timestamp: point.timestamp,
                values,
            };

            writer.add(filtered.clone());
            measurements.publish(filtered);
            // Self-clocking: arrival drives the shared time signal.
            time.publish(point.timestamp);
        });

        *self.stream_subscription.lock() = Some(subscription);
        Ok(())
    }

    /// Live rows arrive already "at now"; ticks need no lookup.
    fn subscribe_to_current_time(&self, _time: &TimeSignal) {}

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
        // No side catalog in live mode; what has been observed is available.
        Ok(self.column_catalog())
    }

    fn close(&self) {
        if self.advance_lifecycle(FeedLifecycle::Closed).is_err() {
            return;
        }
        self.stream_subscription.lock().take();
        self.ticker.lock().take();
        self.writer.flush();
    }
}

//! Buffered append path into the columnar table
//!
//! Decouples high-frequency point arrival from the cost of extending
//! columnar storage: points queue in memory and are committed in batches,
//! either when the queue reaches the flush count or when the flush interval
//! has elapsed. Both conditions are checked opportunistically on every `add`
//! and by a periodic ticker task.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::debug;

use ds_core::{TimeseriesPoint, TimeseriesTable};

use crate::config::WriterSettings;

/// Batches incoming points and periodically extends the table's columns.
///
/// The writer mutates the table in place and notifies nobody: an index built
/// over the table stays a snapshot of the rows it measured (see
/// [`crate::TimestampIndex`]).
pub struct BufferedTableWriter {
    table: Arc<RwLock<TimeseriesTable>>,
    pending: Mutex<Vec<TimeseriesPoint>>,
    last_flush: Mutex<Instant>,
    flush_count: usize,
    flush_interval: Duration,
}

impl BufferedTableWriter {
    pub fn new(table: Arc<RwLock<TimeseriesTable>>, settings: &WriterSettings) -> Self {
        Self {
            table,
            pending: Mutex::new(Vec::new()),
            last_flush: Mutex::new(Instant::now()),
            flush_count: settings.flush_count,
            flush_interval: settings.flush_interval(),
        }
    }

    /// Queue one point and flush opportunistically.
    pub fn add(&self, point: TimeseriesPoint) {
        self.pending.lock().push(point);
        self.flush_if_needed();
    }

    /// Flush when either threshold is reached.
    pub fn flush_if_needed(&self) {
        let count_reached = self.pending.lock().len() >= self.flush_count;
        let interval_elapsed = self.last_flush.lock().elapsed() >= self.flush_interval;
        if count_reached || interval_elapsed {
            self.flush();
        }
    }

    /// Commit every pending point into the table. No-op on an empty queue.
    ///
    /// Unseen keys grow zero-backfilled columns first; then every column is
    /// extended by exactly the pending count. Frequent small flushes approach
    /// O(1) amortized per point, infrequent ones pay reallocation spikes.
    pub fn flush(&self) {
        let points = {
            let mut pending = self.pending.lock();
            if pending.is_empty() {
                return;
            }
            std::mem::take(&mut *pending)
        };

        {
            let mut table = self.table.write();
            table.extend(&points);
            debug!(
                appended = points.len(),
                total_rows = table.row_count(),
                "flushed pending points"
            );
        }

        *self.last_flush.lock() = Instant::now();
    }

    /// Number of queued, not yet committed points.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Spawn the periodic flush check. The ticker stops when the returned
    /// guard is dropped or when the writer itself is gone.
    pub fn spawn_ticker(self: &Arc<Self>, tick_interval: Duration) -> FlushTicker {
        let writer = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = interval(tick_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(writer) = writer.upgrade() else { break };
                writer.flush_if_needed();
            }
        });
        FlushTicker { handle }
    }
}

/// Guard for the periodic flush task; aborts the task on drop.
pub struct FlushTicker {
    handle: JoinHandle<()>,
}

impl FlushTicker {
    pub fn stop(self) {
        // Drop runs the abort.
    }
}

impl Drop for FlushTicker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ds_core::SampleValue;

    fn writer_with(settings: WriterSettings) -> (Arc<RwLock<TimeseriesTable>>, BufferedTableWriter) {
        let table = Arc::new(RwLock::new(TimeseriesTable::new()));
        let writer = BufferedTableWriter::new(table.clone(), &settings);
        (table, writer)
    }

    fn point(timestamp: f64) -> TimeseriesPoint {
        TimeseriesPoint::new(timestamp).with_value("speed", SampleValue::Scalar(timestamp * 2.0))
    }

    #[tokio::test]
    async fn buffers_until_count_threshold() {
        let settings = WriterSettings {
            flush_count: 3,
            ..WriterSettings::default()
        };
        let (table, writer) = writer_with(settings);

        writer.add(point(1.0));
        writer.add(point(2.0));
        assert_eq!(table.read().row_count(), 0);
        assert_eq!(writer.pending_len(), 2);

        writer.add(point(3.0));
        assert_eq!(table.read().row_count(), 3);
        assert_eq!(writer.pending_len(), 0);
        assert!(table.read().columns_consistent());
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_flushes_after_the_interval() {
        let settings = WriterSettings {
            flush_count: 100,
            flush_interval_ms: 10_000,
            tick_interval_ms: 1000,
        };
        let (table, writer) = writer_with(settings.clone());
        let writer = Arc::new(writer);
        let _ticker = writer.spawn_ticker(settings.tick_interval());

        writer.add(point(1.0));
        assert_eq!(table.read().row_count(), 0);

        // Well past the flush interval; the ticker must have committed.
        tokio::time::sleep(Duration::from_secs(12)).await;
        assert_eq!(table.read().row_count(), 1);
    }

    #[tokio::test]
    async fn flush_on_empty_queue_is_a_no_op() {
        let (table, writer) = writer_with(WriterSettings::default());
        writer.flush();
        assert_eq!(table.read().row_count(), 0);
    }

    #[tokio::test]
    async fn flush_keeps_every_column_parallel() {
        let settings = WriterSettings {
            flush_count: 100,
            ..WriterSettings::default()
        };
        let (table, writer) = writer_with(settings);

        writer.add(point(1.0));
        let with_vector = TimeseriesPoint::new(2.0)
            .with_value("speed", SampleValue::Scalar(4.0))
            .with_value("gps", SampleValue::Vector(vec![48.1, 11.5]));
        writer.add(with_vector);
        writer.flush();

        let table = table.read();
        assert_eq!(table.row_count(), 2);
        assert!(table.columns_consistent());
        // The late vector column is zero-backfilled for the first row.
        assert_eq!(table.vector_column("gps").unwrap().row(0), Some(&[0.0, 0.0][..]));
    }

    #[tokio::test]
    async fn dropping_the_ticker_guard_stops_the_task() {
        let (_, writer) = writer_with(WriterSettings::default());
        let writer = Arc::new(writer);
        let ticker = writer.spawn_ticker(Duration::from_millis(10));
        ticker.stop();
        // Nothing to assert beyond not hanging; the abort is immediate.
    }
}

//! Inert placeholder feed

use async_trait::async_trait;

use ds_core::{
    ColumnDefinition, DataFeed, Observable, TimeSignal, TimeseriesPoint, TimeseriesTable,
};

/// Feed with no backing data; used while no project is loaded.
#[derive(Default)]
pub struct EmptyFeed {
    measurements: Observable<TimeseriesPoint>,
}

impl EmptyFeed {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DataFeed for EmptyFeed {
    async fn initialize(&self, _measurement_keys: &[String]) -> anyhow::Result<()> {
        Ok(())
    }

    fn subscribe_to_current_time(&self, _time: &TimeSignal) {}

    fn measurements(&self) -> Observable<TimeseriesPoint> {
        self.measurements.clone()
    }

    fn all_measurements(&self) -> TimeseriesTable {
        TimeseriesTable::new()
    }

    fn column_catalog(&self) -> Vec<ColumnDefinition> {
        Vec::new()
    }

    async fn available_columns(&self) -> anyhow::Result<Vec<ColumnDefinition>> {
        Ok(Vec::new())
    }

    fn close(&self) {}
}

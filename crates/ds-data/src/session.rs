//! Session assembly: explicit context object owning the shared clock and the
//! live connections
//!
//! One session corresponds to one loaded project. Switching projects or
//! modes means shutting the session down and building a fresh one; there is
//! no cross-mode state migration and no process-wide singletons.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use ds_core::{DataFeed, FeedMode, TimeSignal};
use ds_stream::{ClockSyncConnection, PointStreamConnection};

use crate::config::SessionConfig;
use crate::history::HistoricalDataApi;
use crate::sources::{LiveFeed, RecordedFeed};
use crate::DataError;

/// Owns the shared time signal and the stream connections; builds one feed
/// per consumer.
pub struct FeedSession {
    config: SessionConfig,
    time: TimeSignal,
    data_stream: Mutex<Option<Arc<PointStreamConnection>>>,
    clock_sync: Mutex<Option<Arc<ClockSyncConnection>>>,
}

impl FeedSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            time: TimeSignal::new(),
            data_stream: Mutex::new(None),
            clock_sync: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The session-wide current-time signal. Recorded feeds are driven by
    /// it, live feeds drive it.
    pub fn time(&self) -> TimeSignal {
        self.time.clone()
    }

    /// Build one feed for one consumer. Recorded mode needs the historical
    /// collaborator; live mode shares the session's stream connection. Must
    /// be called from a tokio runtime.
    pub fn create_feed(
        &self,
        mode: FeedMode,
        api: Option<Arc<dyn HistoricalDataApi>>,
    ) -> Result<Arc<dyn DataFeed>, DataError> {
        match mode {
            FeedMode::Recorded => {
                let api = api.ok_or(DataError::MissingHistoricalApi)?;
                let clock_sync = self.clock_sync_connection()?;
                Ok(Arc::new(RecordedFeed::new(api, Some(clock_sync))))
            }
            FeedMode::Live => {
                let stream = self.data_stream_connection()?;
                Ok(Arc::new(LiveFeed::new(
                    stream.events(),
                    self.time.clone(),
                    &self.config.writer,
                )))
            }
        }
    }

    fn data_stream_connection(&self) -> Result<Arc<PointStreamConnection>, DataError> {
        let mut slot = self.data_stream.lock();
        if let Some(connection) = slot.as_ref() {
            return Ok(Arc::clone(connection));
        }
        let connection = Arc::new(PointStreamConnection::open(
            &self.config.stream.data_url,
            self.config.stream.reconnect_interval(),
        )?);
        *slot = Some(Arc::clone(&connection));
        Ok(connection)
    }

    fn clock_sync_connection(&self) -> Result<Arc<ClockSyncConnection>, DataError> {
        let mut slot = self.clock_sync.lock();
        if let Some(connection) = slot.as_ref() {
            return Ok(Arc::clone(connection));
        }
        let connection = Arc::new(ClockSyncConnection::open(
            &self.config.stream.clock_sync_url,
            self.config.stream.reconnect_interval(),
        )?);
        *slot = Some(Arc::clone(&connection));
        Ok(connection)
    }

    /// Tear the session down on project switch: closes every connection.
    /// Feeds built from this session must be closed by their owners.
    pub async fn shutdown(&self) {
        let data_stream = self.data_stream.lock().take();
        if let Some(connection) = data_stream {
            connection.close().await;
        }
        let clock_sync = self.clock_sync.lock().take();
        if let Some(connection) = clock_sync {
            connection.close().await;
        }
        info!("feed session shut down");
    }
}

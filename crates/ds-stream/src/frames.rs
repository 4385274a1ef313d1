//! Wire frames and protocol specializations
//!
//! Inbound frames are either the literal heartbeat text (handled by the
//! connection itself) or JSON objects decoded here into typed events. The
//! decoding is strict: a frame with a missing timestamp or a non-numeric
//! value is rejected whole, before anything reaches domain logic.

use std::time::Duration;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use ds_core::{Observable, SampleValue, TimeseriesPoint};

use crate::connection::{FrameHandler, StreamConnection};
use crate::StreamError;

/// Data frame: `{"timestamp": <number>, "<key>": <number|[number,...]>, ...}`.
/// Every non-timestamp field becomes one value of the produced point.
#[derive(Debug, Deserialize)]
struct PointFrame {
    timestamp: f64,
    #[serde(flatten)]
    values: AHashMap<String, WireValue>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireValue {
    Scalar(f64),
    Vector(Vec<f64>),
}

impl From<WireValue> for SampleValue {
    fn from(value: WireValue) -> Self {
        match value {
            WireValue::Scalar(scalar) => SampleValue::Scalar(scalar),
            WireValue::Vector(components) => SampleValue::Vector(components),
        }
    }
}

/// Decoder for the live telemetry stream.
pub struct PointFrameDecoder;

impl FrameHandler for PointFrameDecoder {
    type Event = TimeseriesPoint;

    fn decode(&self, raw: &str) -> Result<TimeseriesPoint, StreamError> {
        let frame: PointFrame = serde_json::from_str(raw)?;
        Ok(TimeseriesPoint {
            timestamp: frame.timestamp,
            values: frame
                .values
                .into_iter()
                .map(|(key, value)| (key, value.into()))
                .collect(),
        })
    }
}

/// Clock-sync frame, both directions: `{"timestamp": <number>}`.
#[derive(Debug, Serialize, Deserialize)]
struct ClockFrame {
    timestamp: f64,
}

/// Decoder for the simulation-time channel.
pub struct ClockFrameDecoder;

impl FrameHandler for ClockFrameDecoder {
    type Event = f64;

    fn decode(&self, raw: &str) -> Result<f64, StreamError> {
        let frame: ClockFrame = serde_json::from_str(raw)?;
        Ok(frame.timestamp)
    }
}

/// Live telemetry connection delivering [`TimeseriesPoint`]s.
pub type PointStreamConnection = StreamConnection<PointFrameDecoder>;

impl PointStreamConnection {
    pub fn open(url: &str, reconnect_interval: Duration) -> Result<Self, StreamError> {
        Self::connect(url, PointFrameDecoder, reconnect_interval)
    }
}

/// Duplex clock channel: publishes the remote simulation time and accepts
/// the locally scrubbed time to keep the remote clock informed.
pub struct ClockSyncConnection {
    inner: StreamConnection<ClockFrameDecoder>,
}

impl ClockSyncConnection {
    pub fn open(url: &str, reconnect_interval: Duration) -> Result<Self, StreamError> {
        Ok(Self {
            inner: StreamConnection::connect(url, ClockFrameDecoder, reconnect_interval)?,
        })
    }

    /// Remote timestamps observed on the channel.
    pub fn timestamps(&self) -> Observable<f64> {
        self.inner.events()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    /// Tell the remote clock where local playback currently is. Dropped with
    /// a log line when the socket is down.
    pub fn send_current_timestamp(&self, timestamp: f64) -> bool {
        match serde_json::to_string(&ClockFrame { timestamp }) {
            Ok(payload) => self.inner.send_text(payload),
            Err(_) => false,
        }
    }

    pub async fn close(&self) {
        self.inner.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;
    use tokio::time::timeout;
    use tokio_tungstenite::accept_async;
    use tokio_tungstenite::tungstenite::Message;

    const TEST_TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn decodes_scalar_and_vector_fields() {
        let point = PointFrameDecoder
            .decode(r#"{"timestamp": 1000.0, "speed": 87.5, "gps": [48.1, 11.5]}"#)
            .expect("valid frame");

        assert_eq!(point.timestamp, 1000.0);
        assert_eq!(point.values.get("speed"), Some(&SampleValue::Scalar(87.5)));
        assert_eq!(
            point.values.get("gps"),
            Some(&SampleValue::Vector(vec![48.1, 11.5]))
        );
    }

    #[test]
    fn rejects_malformed_frames_whole() {
        assert!(PointFrameDecoder.decode("not json").is_err());
        // Missing timestamp.
        assert!(PointFrameDecoder.decode(r#"{"speed": 1.0}"#).is_err());
        // Non-numeric value poisons the frame.
        assert!(PointFrameDecoder
            .decode(r#"{"timestamp": 1.0, "speed": "fast"}"#)
            .is_err());
    }

    #[test]
    fn decodes_clock_frames() {
        assert_eq!(
            ClockFrameDecoder.decode(r#"{"timestamp": 42.5}"#).expect("valid"),
            42.5
        );
        assert!(ClockFrameDecoder.decode(r#"{}"#).is_err());
    }

    #[tokio::test]
    async fn publishes_points_and_survives_bad_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let url = format!("ws://{}", listener.local_addr().expect("local addr"));

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut ws = accept_async(stream).await.expect("handshake");
            ws.send(Message::Text(r#"{"timestamp": 1.0, "speed": 10.0}"#.into()))
                .await
                .expect("first point");
            ws.send(Message::Text("garbage".into())).await.expect("bad frame");
            ws.send(Message::Text(r#"{"timestamp": 2.0, "speed": 20.0}"#.into()))
                .await
                .expect("second point");
            // Hold the socket open until the client is done.
            let _ = ws.next().await;
        });

        let connection =
            PointStreamConnection::open(&url, Duration::from_millis(100)).expect("connect");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = connection.events().subscribe(move |point: &TimeseriesPoint| {
            let _ = tx.send(point.clone());
        });

        let first = timeout(TEST_TIMEOUT, rx.recv()).await.expect("first").expect("open");
        let second = timeout(TEST_TIMEOUT, rx.recv()).await.expect("second").expect("open");
        assert_eq!(first.timestamp, 1.0);
        assert_eq!(second.timestamp, 2.0);
        assert_eq!(second.values.get("speed"), Some(&SampleValue::Scalar(20.0)));

        connection.close().await;
        let _ = timeout(TEST_TIMEOUT, server).await;
    }

    #[tokio::test]
    async fn forwards_scrubbed_time_to_remote_clock() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let url = format!("ws://{}", listener.local_addr().expect("local addr"));

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut ws = accept_async(stream).await.expect("handshake");
            while let Some(msg) = ws.next().await {
                if let Ok(Message::Text(text)) = msg {
                    return text;
                }
            }
            panic!("no clock-sync frame received");
        });

        let connection =
            ClockSyncConnection::open(&url, Duration::from_millis(100)).expect("connect");
        timeout(TEST_TIMEOUT, async {
            while !connection.is_connected() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("connected in time");

        assert!(connection.send_current_timestamp(1234.5));

        let raw = timeout(TEST_TIMEOUT, server).await.expect("frame in time").expect("server");
        assert_eq!(raw, r#"{"timestamp":1234.5}"#);
        connection.close().await;
    }
}

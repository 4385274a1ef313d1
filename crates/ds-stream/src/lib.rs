//! Resilient duplex stream channel for live telemetry
//!
//! One logical connection over an unreliable websocket transport: a
//! supervised I/O task keeps the socket alive (fixed-interval reconnect,
//! forever), answers the server's text heartbeat, decodes domain frames at
//! the boundary, and carries outbound clock-sync messages.

pub mod connection;
pub mod frames;

use thiserror::Error;

pub use connection::{FrameHandler, StreamConnection};
pub use frames::{ClockSyncConnection, PointStreamConnection};

/// Errors surfaced by the stream layer.
///
/// Parse failures are logged and dropped per frame; transport failures are
/// the reconnect supervisor's business. Neither tears down the connection
/// from the caller's point of view.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("invalid stream url: {0}")]
    Url(#[from] url::ParseError),

    #[error("malformed frame: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),
}

//! Supervised websocket connection

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{error, info, warn};
use url::Url;

use ds_core::Observable;

use crate::StreamError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Decodes one raw text frame into a typed domain event.
///
/// Parse errors drop the frame; they never affect the transport.
pub trait FrameHandler: Send + Sync + 'static {
    type Event: Clone + Send + Sync + 'static;

    fn decode(&self, raw: &str) -> Result<Self::Event, StreamError>;
}

/// One logical live connection over an unreliable transport.
///
/// Construction spawns an I/O task that opens the socket and keeps it open:
/// whenever the socket is down, a new connect attempt is issued every
/// `reconnect_interval`, indefinitely, until [`close`](Self::close) stops the
/// supervision. Inbound text `"ping"` is answered with `"pong"` before any
/// frame decoding. Decoded events fan out on an [`Observable`] that any
/// number of subscribers may observe.
pub struct StreamConnection<H: FrameHandler> {
    url: Url,
    events: Observable<H::Event>,
    outbound: mpsc::UnboundedSender<Message>,
    connected: Arc<AtomicBool>,
    shutdown: watch::Sender<bool>,
    io_task: Mutex<Option<JoinHandle<()>>>,
}

impl<H: FrameHandler> StreamConnection<H> {
    /// Open the connection and start supervision.
    pub fn connect(
        url: &str,
        handler: H,
        reconnect_interval: Duration,
    ) -> Result<Self, StreamError> {
        let url = Url::parse(url)?;
        let events = Observable::new();
        let connected = Arc::new(AtomicBool::new(false));
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let io_task = tokio::spawn(io_loop(
            url.clone(),
            handler,
            events.clone(),
            outbound_rx,
            shutdown_rx,
            connected.clone(),
            reconnect_interval,
        ));

        Ok(Self {
            url,
            events,
            outbound: outbound_tx,
            connected,
            shutdown: shutdown_tx,
            io_task: Mutex::new(Some(io_task)),
        })
    }

    /// Observable the decoded domain events are published on.
    pub fn events(&self) -> Observable<H::Event> {
        self.events.clone()
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Whether the socket is currently open.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Queue a text frame for the peer. Returns false, after logging, when
    /// the socket is down; the frame is dropped, not retried.
    pub fn send_text(&self, payload: String) -> bool {
        if !self.is_connected() {
            warn!(url = %self.url, "socket is not open, dropping outbound frame");
            return false;
        }
        self.outbound.send(Message::Text(payload)).is_ok()
    }

    /// Stop supervision and close the socket; the connection is inert
    /// afterwards and never reconnects.
    pub async fn close(&self) {
        let _ = self.shutdown.send(true);
        let task = self.io_task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
        info!(url = %self.url, "stream connection closed");
    }
}

impl<H: FrameHandler> Drop for StreamConnection<H> {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.io_task.lock().take() {
            task.abort();
        }
    }
}

/// Why a connected session ended.
enum SessionEnd {
    Shutdown,
    Disconnected,
}

/// I/O task: reconnect supervision around one connected session at a time.
async fn io_loop<H: FrameHandler>(
    url: Url,
    handler: H,
    events: Observable<H::Event>,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    mut shutdown: watch::Receiver<bool>,
    connected: Arc<AtomicBool>,
    reconnect_interval: Duration,
) {
    let mut first_attempt = true;

    loop {
        if *shutdown.borrow() {
            break;
        }

        // First attempt is immediate, every later one waits out the fixed
        // interval. No backoff, no giving up.
        if !first_attempt {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = sleep(reconnect_interval) => {}
            }
        }
        first_attempt = false;

        let attempt = tokio::select! {
            _ = shutdown.changed() => break,
            result = connect_async(url.as_str()) => result,
        };
        let ws = match attempt {
            Ok((ws, _)) => ws,
            Err(err) => {
                error!(url = %url, error = %err, "stream connect failed, will retry");
                continue;
            }
        };

        info!(url = %url, "stream connected");
        connected.store(true, Ordering::Relaxed);
        let end = run_session(ws, &handler, &events, &mut outbound, &mut shutdown, &url).await;
        connected.store(false, Ordering::Relaxed);

        match end {
            SessionEnd::Shutdown => break,
            SessionEnd::Disconnected => {
                warn!(url = %url, "stream disconnected, supervisor will reconnect");
            }
        }
    }

    connected.store(false, Ordering::Relaxed);
}

/// Drive one connected socket until shutdown or transport failure.
async fn run_session<H: FrameHandler>(
    ws: WsStream,
    handler: &H,
    events: &Observable<H::Event>,
    outbound: &mut mpsc::UnboundedReceiver<Message>,
    shutdown: &mut watch::Receiver<bool>,
    url: &Url,
) -> SessionEnd {
    let (mut sink, mut source): (WsSink, WsSource) = ws.split();

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                let _ = sink.close().await;
                return SessionEnd::Shutdown;
            }
            frame = source.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    // Heartbeat is answered before any frame decoding.
                    if text == "ping" {
                        if let Err(err) = sink.send(Message::Text("pong".to_owned())).await {
                            error!(url = %url, error = %err, "heartbeat reply failed");
                            return SessionEnd::Disconnected;
                        }
                    } else {
                        match handler.decode(&text) {
                            Ok(event) => events.publish(event),
                            Err(err) => {
                                warn!(url = %url, error = %err, "dropping malformed frame");
                            }
                        }
                    }
                }
                Some(Ok(Message::Ping(payload))) => {
                    let _ = sink.send(Message::Pong(payload)).await;
                }
                Some(Ok(Message::Close(_))) | None => {
                    warn!(url = %url, "stream closed by peer");
                    return SessionEnd::Disconnected;
                }
                Some(Err(err)) => {
                    error!(url = %url, error = %err, "stream transport error");
                    return SessionEnd::Disconnected;
                }
                Some(Ok(_)) => {}
            },
            msg = outbound.recv() => match msg {
                Some(msg) => {
                    if let Err(err) = sink.send(msg).await {
                        error!(url = %url, error = %err, "outbound send failed");
                        return SessionEnd::Disconnected;
                    }
                }
                // Sender gone means the connection handle was dropped.
                None => return SessionEnd::Shutdown,
            }
        }
    }
}

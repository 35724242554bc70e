//! Realtime transcription WebSocket client.
//!
//! # Key Features
//!
//! - Single bidirectional WebSocket per session: binary audio frames out,
//!   JSON text frames in
//! - Bounded channels decouple callers from socket IO
//! - Keepalive heartbeat while connected, inactivity watchdog on reads
//! - Sends outside the `Connected` state are silent no-ops, so callers
//!   never have to order their shutdown against in-flight audio
//!
//! ```text
//! send_audio/send_control --> channels --> event loop --> WebSocket
//!                                              |
//! on_event handler <-- classification <--------+
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use http::Request;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout};
use tokio_tungstenite::tungstenite::handshake::client::generate_key;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::connect_async;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use super::config::StreamConfig;
use super::messages::{classify, is_finalize_ack, ControlMessage, InboundMessage};
use super::{ConnectionState, SessionError, SessionEvent, SessionEventHandler};

// ============================================================================
// Constants
// ============================================================================

/// Ceiling on one connection attempt, handshake included.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Receive inactivity watchdog. The service sends metadata and results
/// continuously while audio flows, so a silent wire this long means the
/// connection is gone.
const WS_MESSAGE_TIMEOUT: Duration = Duration::from_secs(60);

/// Heartbeat period while connected.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(5);

/// Grace period for the event loop to flush `CloseStream` and exit.
const LOOP_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Buffered audio frames between callers and the socket writer.
const AUDIO_CHANNEL_CAPACITY: usize = 32;

/// Buffered control frames between callers and the socket writer.
const CONTROL_CHANNEL_CAPACITY: usize = 8;

// ============================================================================
// Stream session
// ============================================================================

/// A single realtime transcription connection.
///
/// The session owns the socket through a spawned event loop; callers hold
/// the session behind an `Arc` and drive it from any task. All observable
/// activity flows through the event handler given at construction.
pub struct StreamSession {
    config: StreamConfig,
    on_event: SessionEventHandler,
    state: Arc<RwLock<ConnectionState>>,
    connected: Arc<AtomicBool>,
    audio_tx: Mutex<Option<mpsc::Sender<Bytes>>>,
    control_tx: Mutex<Option<mpsc::Sender<String>>>,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

impl StreamSession {
    /// Create a session. No network activity until [`connect`](Self::connect).
    pub fn new(config: StreamConfig, on_event: SessionEventHandler) -> Self {
        Self {
            config,
            on_event,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            connected: Arc::new(AtomicBool::new(false)),
            audio_tx: Mutex::new(None),
            control_tx: Mutex::new(None),
            shutdown_tx: Mutex::new(None),
            loop_handle: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Open the WebSocket and start streaming.
    ///
    /// On success the session is `Connected` and a connected event has been
    /// emitted. On failure an error event is emitted, the state returns to
    /// `Disconnected`, and the error is also returned to the caller.
    pub async fn connect(&self) -> Result<(), SessionError> {
        if self.config.api_key.trim().is_empty() {
            let error = SessionError::MissingApiKey;
            error!("refusing to connect: {}", error);
            self.emit(SessionEvent::Error(error.to_string())).await;
            return Err(error);
        }
        {
            let mut state = self.state.write();
            if *state != ConnectionState::Disconnected {
                warn!("connect() called while {}", *state);
                return Err(SessionError::AlreadyActive);
            }
            *state = ConnectionState::Connecting;
        }

        let ws_url = self.config.build_websocket_url();
        debug!("connecting to {}", ws_url);

        let request = match self.build_request(&ws_url) {
            Ok(request) => request,
            Err(error) => return Err(self.fail_connect(error).await),
        };

        let ws_stream = match timeout(CONNECT_TIMEOUT, connect_async(request)).await {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(error)) => {
                let error = SessionError::ConnectionFailed(error.to_string());
                return Err(self.fail_connect(error).await);
            }
            Err(_) => {
                let error = SessionError::ConnectTimeout(CONNECT_TIMEOUT.as_secs());
                return Err(self.fail_connect(error).await);
            }
        };

        info!("transcription WebSocket connected");
        let (mut ws_sink, mut ws_reader) = ws_stream.split();

        let (audio_tx, mut audio_rx) = mpsc::channel::<Bytes>(AUDIO_CHANNEL_CAPACITY);
        let (control_tx, mut control_rx) = mpsc::channel::<String>(CONTROL_CHANNEL_CAPACITY);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        *self.audio_tx.lock() = Some(audio_tx);
        *self.control_tx.lock() = Some(control_tx);
        *self.shutdown_tx.lock() = Some(shutdown_tx);

        self.connected.store(true, Ordering::Release);
        *self.state.write() = ConnectionState::Connected;

        let state = Arc::clone(&self.state);
        let connected = Arc::clone(&self.connected);
        let on_event = Arc::clone(&self.on_event);

        // Emit before the loop starts reading so the connected event always
        // precedes the first service message.
        self.emit(SessionEvent::Connected).await;

        let handle = tokio::spawn(async move {
            let mut keepalive = interval(KEEPALIVE_INTERVAL);
            // The first tick completes immediately; skip it so heartbeats
            // start one full period after connect.
            keepalive.tick().await;

            loop {
                tokio::select! {
                    Some(audio) = audio_rx.recv() => {
                        let len = audio.len();
                        if let Err(error) = ws_sink.send(Message::Binary(audio)).await {
                            error!("failed to send audio: {}", error);
                            connected.store(false, Ordering::Release);
                            *state.write() = ConnectionState::Disconnected;
                            on_event(SessionEvent::Error(format!("failed to send audio: {error}"))).await;
                            break;
                        }
                        trace!("sent {} byte audio frame", len);
                    }
                    Some(control) = control_rx.recv() => {
                        debug!("sending control message: {}", control);
                        if let Err(error) = ws_sink.send(Message::Text(control.into())).await {
                            warn!("failed to send control message: {}", error);
                        }
                    }
                    _ = keepalive.tick() => {
                        trace!("sending keepalive");
                        if let Err(error) = ws_sink
                            .send(Message::Text(ControlMessage::KeepAlive.to_json().into()))
                            .await
                        {
                            warn!("failed to send keepalive: {}", error);
                        }
                    }
                    message = timeout(WS_MESSAGE_TIMEOUT, ws_reader.next()) => {
                        match message {
                            Ok(Some(Ok(message))) => {
                                if !Self::handle_server_message(message, &on_event).await {
                                    connected.store(false, Ordering::Release);
                                    *state.write() = ConnectionState::Disconnected;
                                    on_event(SessionEvent::Disconnected).await;
                                    break;
                                }
                            }
                            Ok(Some(Err(error))) => {
                                error!("websocket receive error: {}", error);
                                connected.store(false, Ordering::Release);
                                *state.write() = ConnectionState::Disconnected;
                                on_event(SessionEvent::Error(format!("connection lost: {error}"))).await;
                                break;
                            }
                            Ok(None) => {
                                info!("service stream ended");
                                connected.store(false, Ordering::Release);
                                *state.write() = ConnectionState::Disconnected;
                                on_event(SessionEvent::Disconnected).await;
                                break;
                            }
                            Err(_) => {
                                warn!(
                                    "no websocket activity for {}s, dropping connection",
                                    WS_MESSAGE_TIMEOUT.as_secs()
                                );
                                connected.store(false, Ordering::Release);
                                *state.write() = ConnectionState::Disconnected;
                                on_event(SessionEvent::Error(format!(
                                    "no activity for {} seconds",
                                    WS_MESSAGE_TIMEOUT.as_secs()
                                ))).await;
                                break;
                            }
                        }
                    }
                    _ = &mut shutdown_rx => {
                        debug!("session shutdown requested");
                        let goodbye = ControlMessage::CloseStream.to_json();
                        if let Err(error) = ws_sink.send(Message::Text(goodbye.into())).await {
                            debug!("could not send CloseStream: {}", error);
                        }
                        let _ = ws_sink.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
            debug!("session event loop ended");
        });
        *self.loop_handle.lock() = Some(handle);

        Ok(())
    }

    /// Queue one frame of service-format audio.
    ///
    /// Outside the `Connected` state the frame is dropped and logged; the
    /// call never fails. Empty frames are ignored.
    pub async fn send_audio(&self, data: Bytes) {
        if data.is_empty() {
            trace!("ignoring empty audio frame");
            return;
        }
        if !self.connected.load(Ordering::Acquire) {
            trace!("dropping {} audio bytes: session not connected", data.len());
            return;
        }
        let sender = self.audio_tx.lock().clone();
        if let Some(sender) = sender {
            if sender.send(data).await.is_err() {
                debug!("audio channel closed while sending");
            }
        }
    }

    /// Queue a control message. A no-op unless connected.
    pub async fn send_control(&self, message: ControlMessage) {
        if !self.connected.load(Ordering::Acquire) {
            debug!(
                "ignoring {} control message: session not connected",
                message.kind()
            );
            return;
        }
        let sender = self.control_tx.lock().clone();
        if let Some(sender) = sender {
            if sender.send(message.to_json()).await.is_err() {
                debug!("control channel closed while sending");
            }
        }
    }

    /// Shut the session down.
    ///
    /// Safe from any state, including before the first connect. Announces
    /// `CloseStream` to the service on a best-effort basis, stops the event
    /// loop, and always finishes in `Disconnected` with a disconnected event
    /// emitted to the handler.
    pub async fn close(&self) {
        {
            let mut state = self.state.write();
            debug!("closing session (was {})", *state);
            *state = ConnectionState::Closing;
        }
        self.connected.store(false, Ordering::Release);
        *self.audio_tx.lock() = None;
        *self.control_tx.lock() = None;

        if let Some(shutdown) = self.shutdown_tx.lock().take() {
            let _ = shutdown.send(());
        }
        let handle = self.loop_handle.lock().take();
        if let Some(handle) = handle {
            if timeout(LOOP_SHUTDOWN_TIMEOUT, handle).await.is_err() {
                warn!(
                    "session event loop did not exit within {}s",
                    LOOP_SHUTDOWN_TIMEOUT.as_secs()
                );
            }
        }

        *self.state.write() = ConnectionState::Disconnected;
        self.emit(SessionEvent::Disconnected).await;
        info!("transcription session closed");
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn emit(&self, event: SessionEvent) {
        (self.on_event)(event).await;
    }

    /// Record a failed connection attempt and hand the error back.
    async fn fail_connect(&self, error: SessionError) -> SessionError {
        error!("connection attempt failed: {}", error);
        *self.state.write() = ConnectionState::Disconnected;
        self.emit(SessionEvent::Error(error.to_string())).await;
        error
    }

    /// Build the upgrade request with authorization attached.
    fn build_request(&self, ws_url: &str) -> Result<Request<()>, SessionError> {
        let url = Url::parse(ws_url)
            .map_err(|e| SessionError::ConnectionFailed(format!("invalid endpoint URL: {e}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| {
                SessionError::ConnectionFailed("endpoint URL has no host".to_string())
            })?;
        let host = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        Request::builder()
            .method("GET")
            .uri(ws_url)
            .header("Host", host)
            .header("Upgrade", "websocket")
            .header("Connection", "Upgrade")
            .header("Sec-WebSocket-Key", generate_key())
            .header("Sec-WebSocket-Version", "13")
            .header("Authorization", format!("Token {}", self.config.api_key))
            .body(())
            .map_err(|e| SessionError::ConnectionFailed(format!("failed to build request: {e}")))
    }

    /// Process one frame from the service.
    ///
    /// Returns `false` when the connection should be treated as closed.
    async fn handle_server_message(message: Message, on_event: &SessionEventHandler) -> bool {
        match message {
            Message::Text(text) => {
                trace!("service message: {}", text);
                match classify(&text) {
                    InboundMessage::Metadata(value) => {
                        on_event(SessionEvent::Metadata(value)).await;
                    }
                    InboundMessage::Results(value) => {
                        if is_finalize_ack(&value) {
                            on_event(SessionEvent::Finalized(value)).await;
                        } else {
                            on_event(SessionEvent::Results(value)).await;
                        }
                    }
                }
                true
            }
            Message::Binary(data) => {
                debug!("ignoring unexpected {} byte binary frame", data.len());
                true
            }
            Message::Close(frame) => {
                info!("service closed the connection: {:?}", frame);
                false
            }
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => true,
        }
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown_tx.lock().take() {
            let _ = shutdown.send(());
        }
    }
}

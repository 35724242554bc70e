#![allow(dead_code)]

//! In-process WebSocket stand-in for the transcription service.
//!
//! Speaks just enough of the streaming protocol to exercise the client:
//! a metadata greeting on connect, one results payload per audio frame,
//! finalize acknowledgements, and a server-side close on `CloseStream`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

/// Counters shared between the mock and the test body.
#[derive(Debug, Default)]
pub struct MockStats {
    pub connections: AtomicU64,
    pub binary_frames: AtomicU64,
    pub audio_bytes: AtomicU64,
    pub keepalives: AtomicU64,
    pub finalizes: AtomicU64,
    pub close_streams: AtomicU64,
}

impl MockStats {
    pub fn connections(&self) -> u64 {
        self.connections.load(Ordering::Relaxed)
    }

    pub fn binary_frames(&self) -> u64 {
        self.binary_frames.load(Ordering::Relaxed)
    }

    pub fn audio_bytes(&self) -> u64 {
        self.audio_bytes.load(Ordering::Relaxed)
    }

    pub fn keepalives(&self) -> u64 {
        self.keepalives.load(Ordering::Relaxed)
    }

    pub fn finalizes(&self) -> u64 {
        self.finalizes.load(Ordering::Relaxed)
    }

    pub fn close_streams(&self) -> u64 {
        self.close_streams.load(Ordering::Relaxed)
    }
}

pub struct MockService {
    port: u16,
    pub stats: Arc<MockStats>,
    accept_task: JoinHandle<()>,
}

impl MockService {
    /// Bind an OS-assigned port and start accepting sessions.
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock listener");
        let port = listener.local_addr().expect("mock local addr").port();
        let stats = Arc::new(MockStats::default());

        let accept_stats = stats.clone();
        let accept_task = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let session_stats = accept_stats.clone();
                tokio::spawn(async move {
                    let _ = serve_session(stream, session_stats).await;
                });
            }
        });

        Self {
            port,
            stats,
            accept_task,
        }
    }

    /// Base URL for `StreamConfig::with_base_url`.
    pub fn base_url(&self) -> String {
        format!("ws://127.0.0.1:{}", self.port)
    }
}

impl Drop for MockService {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn serve_session(
    stream: TcpStream,
    stats: Arc<MockStats>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let ws = accept_async(stream).await?;
    let connection = stats.connections.fetch_add(1, Ordering::Relaxed) + 1;
    let (mut sink, mut reader) = ws.split();

    let metadata = json!({
        "type": "Metadata",
        "request_id": format!("mock-request-{connection}"),
        "created": "2024-01-01T00:00:00.000Z",
    });
    sink.send(Message::Text(metadata.to_string().into())).await?;

    let mut results_sent = 0u64;
    while let Some(message) = reader.next().await {
        match message? {
            Message::Binary(payload) => {
                stats.binary_frames.fetch_add(1, Ordering::Relaxed);
                stats
                    .audio_bytes
                    .fetch_add(payload.len() as u64, Ordering::Relaxed);
                results_sent += 1;
                let results = json!({
                    "type": "Results",
                    "channel": {
                        "alternatives": [{
                            "transcript": format!("mock transcript {results_sent}"),
                            "confidence": 0.98,
                            "words": [],
                        }],
                    },
                    "is_final": true,
                    "speech_final": true,
                    "start": 0.0,
                    "duration": 0.1,
                });
                sink.send(Message::Text(results.to_string().into())).await?;
            }
            Message::Text(text) => {
                let Ok(control) = serde_json::from_str::<serde_json::Value>(&text) else {
                    continue;
                };
                match control.get("type").and_then(|kind| kind.as_str()) {
                    Some("KeepAlive") => {
                        stats.keepalives.fetch_add(1, Ordering::Relaxed);
                    }
                    Some("Finalize") => {
                        stats.finalizes.fetch_add(1, Ordering::Relaxed);
                        let ack = json!({
                            "type": "Results",
                            "from_finalize": true,
                            "is_final": true,
                            "speech_final": true,
                            "channel": {
                                "alternatives": [{
                                    "transcript": "",
                                    "confidence": 0.0,
                                    "words": [],
                                }],
                            },
                        });
                        sink.send(Message::Text(ack.to_string().into())).await?;
                    }
                    Some("CloseStream") => {
                        stats.close_streams.fetch_add(1, Ordering::Relaxed);
                        sink.send(Message::Close(None)).await?;
                        break;
                    }
                    _ => {}
                }
            }
            Message::Ping(payload) => sink.send(Message::Pong(payload)).await?,
            Message::Close(_) => break,
            _ => {}
        }
    }

    Ok(())
}

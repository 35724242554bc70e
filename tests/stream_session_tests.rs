//! End-to-end session tests against the in-process mock service.

mod fixtures;
mod mock_service;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio_test::assert_ok;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

use tapscribe::stt::{
    ControlMessage, RecognitionResults, SessionEvent, SessionEventHandler, StreamConfig,
    StreamSession,
};

use mock_service::MockService;

fn collecting_handler() -> (SessionEventHandler, mpsc::UnboundedReceiver<SessionEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler: SessionEventHandler = Arc::new(move |event| {
        let tx = tx.clone();
        Box::pin(async move {
            let _ = tx.send(event);
        }) as Pin<Box<dyn Future<Output = ()> + Send>>
    });
    (handler, rx)
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> SessionEvent {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for session event")
        .expect("event channel closed")
}

/// Drain events until one matches, failing the test after five seconds.
async fn wait_for(
    rx: &mut mpsc::UnboundedReceiver<SessionEvent>,
    matches: impl Fn(&SessionEvent) -> bool,
) -> SessionEvent {
    loop {
        let event = next_event(rx).await;
        if matches(&event) {
            return event;
        }
    }
}

fn config_for(mock: &MockService) -> StreamConfig {
    StreamConfig::new("test-key")
        .with_sample_rate(16000)
        .with_base_url(mock.base_url())
}

#[tokio::test]
async fn test_connect_emits_connected_then_metadata() {
    let mock = MockService::spawn().await;
    let (handler, mut events) = collecting_handler();
    let session = StreamSession::new(config_for(&mock), handler);

    tokio_test::assert_ok!(session.connect().await);
    assert!(session.is_connected());

    assert!(matches!(next_event(&mut events).await, SessionEvent::Connected));
    match next_event(&mut events).await {
        SessionEvent::Metadata(data) => {
            let request_id = data.get("request_id").and_then(|id| id.as_str());
            assert_eq!(request_id, Some("mock-request-1"));
        }
        other => panic!("expected metadata, got {other:?}"),
    }

    session.close().await;
}

#[tokio::test]
async fn test_audio_round_trip_produces_results() {
    let mock = MockService::spawn().await;
    let (handler, mut events) = collecting_handler();
    let session = StreamSession::new(config_for(&mock), handler);

    session.connect().await.expect("connect");
    let frame = fixtures::samples_to_bytes(&fixtures::sine_i16(1600, 16000, 440.0, 0.4));
    session.send_audio(Bytes::from(frame)).await;

    let event = wait_for(&mut events, |event| matches!(event, SessionEvent::Results(_))).await;
    let SessionEvent::Results(data) = event else {
        unreachable!();
    };
    let results = RecognitionResults::from_value(&data).expect("typed results");
    assert_eq!(results.transcript(), Some("mock transcript 1"));
    assert!(results.is_final);

    assert_eq!(mock.stats.binary_frames(), 1);
    assert_eq!(mock.stats.audio_bytes(), 3200);

    session.close().await;
}

#[tokio::test]
async fn test_finalize_round_trip() {
    let mock = MockService::spawn().await;
    let (handler, mut events) = collecting_handler();
    let session = StreamSession::new(config_for(&mock), handler);

    session.connect().await.expect("connect");
    session.send_control(ControlMessage::Finalize).await;

    let event = wait_for(&mut events, |event| {
        matches!(event, SessionEvent::Finalized(_))
    })
    .await;
    let SessionEvent::Finalized(data) = event else {
        unreachable!();
    };
    assert_eq!(data.get("from_finalize"), Some(&serde_json::json!(true)));
    assert_eq!(mock.stats.finalizes(), 1);

    session.close().await;
}

#[tokio::test]
async fn test_close_sends_closestream_and_emits_one_disconnected() {
    let mock = MockService::spawn().await;
    let (handler, mut events) = collecting_handler();
    let session = StreamSession::new(config_for(&mock), handler);

    session.connect().await.expect("connect");
    wait_for(&mut events, |event| matches!(event, SessionEvent::Metadata(_))).await;

    session.close().await;
    assert!(!session.is_connected());

    assert!(matches!(
        next_event(&mut events).await,
        SessionEvent::Disconnected
    ));

    // The goodbye reaches the server even though the session is already torn
    // down locally.
    timeout(Duration::from_secs(5), async {
        while mock.stats.close_streams() == 0 {
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("mock never saw CloseStream");

    sleep(Duration::from_millis(100)).await;
    assert!(
        events.try_recv().is_err(),
        "close must emit exactly one disconnected event"
    );
}

#[tokio::test]
async fn test_server_initiated_close_emits_disconnected() {
    let mock = MockService::spawn().await;
    let (handler, mut events) = collecting_handler();
    let session = StreamSession::new(config_for(&mock), handler);

    session.connect().await.expect("connect");
    wait_for(&mut events, |event| matches!(event, SessionEvent::Metadata(_))).await;

    // CloseStream through the control channel makes the mock close the
    // socket from its side while our session keeps reading.
    session.send_control(ControlMessage::CloseStream).await;

    assert!(matches!(
        next_event(&mut events).await,
        SessionEvent::Disconnected
    ));
    timeout(Duration::from_secs(5), async {
        while session.is_connected() {
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("session never observed the server close");
}

#[tokio::test]
async fn test_keepalive_flows_while_idle() {
    let mock = MockService::spawn().await;
    let (handler, _events) = collecting_handler();
    let session = StreamSession::new(config_for(&mock), handler);

    session.connect().await.expect("connect");

    // Heartbeats start one full period after connect.
    timeout(Duration::from_secs(8), async {
        while mock.stats.keepalives() == 0 {
            sleep(Duration::from_millis(200)).await;
        }
    })
    .await
    .expect("mock never saw a keepalive");

    session.close().await;
}

#[tokio::test]
async fn test_session_reconnects_after_clean_close() {
    let mock = MockService::spawn().await;

    let (handler, mut events) = collecting_handler();
    let session = StreamSession::new(config_for(&mock), handler);
    session.connect().await.expect("first connect");
    wait_for(&mut events, |event| matches!(event, SessionEvent::Metadata(_))).await;
    session.close().await;
    wait_for(&mut events, |event| {
        matches!(event, SessionEvent::Disconnected)
    })
    .await;

    // The same session object reconnects after a clean close.
    session.connect().await.expect("second connect");
    let event = wait_for(&mut events, |event| {
        matches!(event, SessionEvent::Metadata(_))
    })
    .await;
    let SessionEvent::Metadata(data) = event else {
        unreachable!();
    };
    assert_eq!(
        data.get("request_id").and_then(|id| id.as_str()),
        Some("mock-request-2")
    );
    assert_eq!(mock.stats.connections(), 2);

    session.close().await;
}

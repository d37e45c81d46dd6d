// WebSocket transport against a local tokio-tungstenite server

use anyhow::Result;
use exhibit_voice::audio::{CaptureConfig, ChannelCapture, MemorySink, PlaybackSink};
use exhibit_voice::credentials::StaticCredentialProvider;
use exhibit_voice::error::TransportError;
use exhibit_voice::session::{SessionConfig, VoiceSession};
use exhibit_voice::transport::{Connector, OutboundMessage, TransportEvent, WsConnector};
use exhibit_voice::WireStyle;
use futures::{SinkExt, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

const WAIT: Duration = Duration::from_secs(5);

/// Accept one WebSocket client and hand it to `handler`; returns the URL.
async fn serve_once<F, Fut>(handler: F) -> Result<String>
where
    F: FnOnce(WebSocketStream<TcpStream>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        if let Ok((stream, _)) = listener.accept().await {
            if let Ok(ws) = tokio_tungstenite::accept_async(stream).await {
                handler(ws).await;
            }
        }
    });

    Ok(format!("ws://{}/v1/convai/conversation", addr))
}

async fn next_closed(events: &mut mpsc::Receiver<TransportEvent>) -> exhibit_voice::CloseInfo {
    loop {
        match timeout(WAIT, events.recv()).await.unwrap() {
            Some(TransportEvent::Closed(info)) => return info,
            Some(_) => continue,
            None => panic!("event stream ended without a close"),
        }
    }
}

#[tokio::test]
async fn test_round_trip_and_policy_close() -> Result<()> {
    let url = serve_once(|mut ws| async move {
        for _ in 0..2 {
            match ws.next().await {
                Some(Ok(msg)) => {
                    let _ = ws.send(msg).await;
                }
                _ => return,
            }
        }
        let frame = CloseFrame { code: CloseCode::Policy, reason: "agent disabled".into() };
        let _ = ws.send(Message::Close(Some(frame))).await;
        while let Some(Ok(_)) = ws.next().await {}
    })
    .await?;

    let connection = WsConnector::new().connect(&url).await?;
    let transport = connection.transport;
    let mut events = connection.events;
    assert!(transport.is_open());

    transport.send(OutboundMessage::Text(r#"{"type":"pong","event_id":1}"#.to_string()))?;
    assert_eq!(
        timeout(WAIT, events.recv()).await?,
        Some(TransportEvent::Text(r#"{"type":"pong","event_id":1}"#.to_string()))
    );

    transport.send(OutboundMessage::Binary(vec![1, 2, 3, 4]))?;
    assert_eq!(timeout(WAIT, events.recv()).await?, Some(TransportEvent::Binary(vec![1, 2, 3, 4])));

    let close = next_closed(&mut events).await;
    assert_eq!(close.code, 1008);
    assert_eq!(close.reason, "agent disabled");
    assert!(close.clean);
    assert!(!transport.is_open());
    assert_eq!(transport.buffered_amount(), 0);

    // Closing after the remote closed is a no-op
    transport.close(1000, "Session ended")?;
    assert!(matches!(
        transport.send(OutboundMessage::Text("late".to_string())),
        Err(TransportError::Closed)
    ));
    Ok(())
}

#[tokio::test]
async fn test_dropped_connection_is_abnormal() -> Result<()> {
    let url = serve_once(|ws| async move {
        drop(ws);
    })
    .await?;

    let mut connection = WsConnector::new().connect(&url).await?;
    let close = next_closed(&mut connection.events).await;
    assert_eq!(close.code, 1006);
    assert!(!close.clean);
    Ok(())
}

#[tokio::test]
async fn test_connect_refused() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);

    let result = WsConnector::new().connect(&format!("ws://{}/", addr)).await;
    assert!(matches!(result, Err(TransportError::Connect(_))));
    Ok(())
}

#[tokio::test]
async fn test_local_close_sends_close_frame() -> Result<()> {
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    let url = serve_once(move |mut ws| async move {
        while let Some(Ok(msg)) = ws.next().await {
            let _ = seen_tx.send(msg);
        }
    })
    .await?;

    let connection = WsConnector::new().connect(&url).await?;
    connection.transport.close(1000, "Session ended")?;
    // Second close does nothing
    connection.transport.close(1000, "Session ended")?;
    assert!(!connection.transport.is_open());

    match timeout(WAIT, seen_rx.recv()).await? {
        Some(Message::Close(Some(frame))) => {
            assert_eq!(u16::from(frame.code), 1000);
            assert_eq!(frame.reason.to_string(), "Session ended");
        }
        other => panic!("expected a close frame, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_session_over_websocket() -> Result<()> {
    let seen: Arc<Mutex<Vec<Message>>> = Arc::new(Mutex::new(Vec::new()));
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<()>();
    let server_seen = Arc::clone(&seen);

    let url = serve_once(move |mut ws| async move {
        let ready = r#"{"type":"conversation_initiation_metadata","conversation_initiation_metadata_event":{"conversation_id":"conv_ws","agent_output_audio_format":"pcm_16000"}}"#;
        let _ = ws.send(Message::Text(ready.into())).await;
        let _ = ws
            .send(Message::Text(r#"{"type":"ping","ping_event":{"event_id":5,"ping_ms":20}}"#.into()))
            .await;

        while let Some(Ok(msg)) = ws.next().await {
            let is_close = msg.is_close();
            server_seen.lock().await.push(msg);
            if is_close {
                break;
            }
        }
        let _ = done_tx.send(());
    })
    .await?;

    let (capture, feed) = ChannelCapture::new(CaptureConfig::default());
    let sink = MemorySink::new();
    let sink_handle = sink.clone();
    let mut session = VoiceSession::new(
        SessionConfig { level_interval: Duration::ZERO, ..SessionConfig::for_agent("agent_ws") },
        Arc::new(StaticCredentialProvider::new(url, WireStyle::Json)),
        Arc::new(WsConnector::new()),
        Box::new(capture),
        Box::new(move || -> anyhow::Result<Box<dyn PlaybackSink>> {
            Ok(Box::new(sink_handle.clone()))
        }),
    );

    session.start().await?;
    let mut watch = session.watch();
    timeout(WAIT, watch.wait_for(|s| s.ready)).await??;
    assert_eq!(session.conversation_id().await.as_deref(), Some("conv_ws"));

    feed.push(vec![0.5; 2048]);
    let deadline = tokio::time::Instant::now() + WAIT;
    while session.stats().await.frames_sent == 0 {
        assert!(tokio::time::Instant::now() < deadline, "audio block never sent");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let report = session.end().await?;
    assert!(report.transport_closed);
    assert!(report.errors.is_empty());
    assert!(sink.is_released());

    timeout(WAIT, done_rx.recv()).await?;
    let seen = seen.lock().await;
    let texts: Vec<String> = seen
        .iter()
        .filter_map(|m| match m {
            Message::Text(t) => Some(t.to_string()),
            _ => None,
        })
        .collect();
    assert!(texts.contains(&r#"{"type":"pong","event_id":5}"#.to_string()));
    assert!(texts.iter().any(|t| t.starts_with(r#"{"user_audio_chunk":""#)));

    match seen.last() {
        Some(Message::Close(Some(frame))) => assert_eq!(u16::from(frame.code), 1000),
        other => panic!("expected a close frame last, got {:?}", other),
    }
    Ok(())
}

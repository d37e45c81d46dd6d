use futures::{Sink, SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::{Connection, Connector, OutboundMessage, Transport, TransportEvent};
use crate::error::TransportError;
use crate::protocol::CloseInfo;

/// Events buffered between the socket reader and the session
const EVENT_QUEUE_DEPTH: usize = 256;

enum Outgoing {
    Data(OutboundMessage),
    Close(u16, String),
}

#[derive(Debug)]
struct WsShared {
    buffered: AtomicUsize,
    open: AtomicBool,
    close_requested: AtomicBool,
}

/// Writer task: sends the outgoing queue in order until a close or a
/// failed write, then discards whatever is still queued.
async fn write_queue<S>(
    mut sink: S,
    mut out_rx: mpsc::UnboundedReceiver<Outgoing>,
    shared: Arc<WsShared>,
) where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    while let Some(outgoing) = out_rx.recv().await {
        match outgoing {
            Outgoing::Data(message) => {
                let len = message.len();
                let frame = match message {
                    OutboundMessage::Text(text) => Message::Text(text.into()),
                    OutboundMessage::Binary(bytes) => Message::Binary(bytes.into()),
                };
                let result = sink.send(frame).await;
                shared.buffered.fetch_sub(len, Ordering::SeqCst);
                if let Err(e) = result {
                    warn!("WebSocket write failed: {}", e);
                    break;
                }
            }
            Outgoing::Close(code, reason) => {
                let frame = CloseFrame { code: CloseCode::from(code), reason: reason.into() };
                if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                    debug!("Close frame not delivered: {}", e);
                }
                break;
            }
        }
    }

    // Later sends fail fast; queued bytes no longer count as buffered
    out_rx.close();
    let mut discarded = 0;
    while let Ok(outgoing) = out_rx.try_recv() {
        if let Outgoing::Data(message) = outgoing {
            shared.buffered.fetch_sub(message.len(), Ordering::SeqCst);
            discarded += 1;
        }
    }
    debug!(discarded, "WebSocket writer stopped");
}

/// WebSocket connector (`ws://` and `wss://`)
#[derive(Debug, Default, Clone)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Connection, TransportError> {
        let (stream, _response) = connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        info!("WebSocket connected");

        let (sink, mut source) = stream.split();
        let shared = Arc::new(WsShared {
            buffered: AtomicUsize::new(0),
            open: AtomicBool::new(true),
            close_requested: AtomicBool::new(false),
        });
        let (out_tx, out_rx) = mpsc::unbounded_channel::<Outgoing>();
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);

        tokio::spawn(write_queue(sink, out_rx, Arc::clone(&shared)));

        // Reader: forwards messages until the socket ends
        let reader_shared = Arc::clone(&shared);
        let reader = tokio::spawn(async move {
            let close = loop {
                match source.next().await {
                    Some(Ok(Message::Text(text))) => {
                        if event_tx.send(TransportEvent::Text(text.to_string())).await.is_err() {
                            return;
                        }
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        if event_tx.send(TransportEvent::Binary(bytes.to_vec())).await.is_err() {
                            return;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break match frame {
                            Some(frame) => {
                                CloseInfo::new(u16::from(frame.code), frame.reason.to_string(), true)
                            }
                            None => CloseInfo::new(1005, "", true),
                        };
                    }
                    // Ping/pong frames are answered by tungstenite
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        let _ = event_tx.send(TransportEvent::Error(e.to_string())).await;
                        break CloseInfo::abnormal();
                    }
                    None => break CloseInfo::abnormal(),
                }
            };

            reader_shared.open.store(false, Ordering::SeqCst);
            info!(code = close.code, clean = close.clean, "WebSocket closed");
            let _ = event_tx.send(TransportEvent::Closed(close)).await;
        });

        let transport = WsTransport { out_tx, shared, reader };

        Ok(Connection { transport: Arc::new(transport), events: event_rx })
    }

    fn name(&self) -> &str {
        "websocket"
    }
}

/// Sending half of a WebSocket connection
pub struct WsTransport {
    out_tx: mpsc::UnboundedSender<Outgoing>,
    shared: Arc<WsShared>,
    reader: JoinHandle<()>,
}

impl Transport for WsTransport {
    fn send(&self, message: OutboundMessage) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }

        let len = message.len();
        self.shared.buffered.fetch_add(len, Ordering::SeqCst);
        self.out_tx.send(Outgoing::Data(message)).map_err(|_| {
            self.shared.buffered.fetch_sub(len, Ordering::SeqCst);
            TransportError::Send("writer stopped".to_string())
        })
    }

    fn buffered_amount(&self) -> usize {
        self.shared.buffered.load(Ordering::SeqCst)
    }

    fn close(&self, code: u16, reason: &str) -> Result<(), TransportError> {
        if self.shared.close_requested.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let was_open = self.shared.open.swap(false, Ordering::SeqCst);
        if !was_open {
            return Ok(());
        }

        self.out_tx
            .send(Outgoing::Close(code, reason.to_string()))
            .map_err(|_| TransportError::Close("writer stopped".to_string()))
    }

    fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::SeqCst)
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_tungstenite::tungstenite;

    fn shared() -> Arc<WsShared> {
        Arc::new(WsShared {
            buffered: AtomicUsize::new(0),
            open: AtomicBool::new(true),
            close_requested: AtomicBool::new(false),
        })
    }

    fn queue(shared: &WsShared, tx: &mpsc::UnboundedSender<Outgoing>, message: OutboundMessage) {
        shared.buffered.fetch_add(message.len(), Ordering::SeqCst);
        assert!(tx.send(Outgoing::Data(message)).is_ok());
    }

    #[tokio::test]
    async fn test_failed_write_releases_backlog() {
        let shared = shared();
        let (tx, rx) = mpsc::unbounded_channel();
        for _ in 0..3 {
            queue(&shared, &tx, OutboundMessage::Binary(vec![0; 4096]));
        }
        queue(&shared, &tx, OutboundMessage::Text("{}".to_string()));
        assert_eq!(shared.buffered.load(Ordering::SeqCst), 3 * 4096 + 2);

        let broken = Box::pin(futures::sink::unfold((), |(), _frame: Message| async {
            Err::<(), _>(tungstenite::Error::ConnectionClosed)
        }));
        write_queue(broken, rx, Arc::clone(&shared)).await;

        assert_eq!(shared.buffered.load(Ordering::SeqCst), 0);
        // The queue is closed, so a late send is refused
        assert!(tx.send(Outgoing::Data(OutboundMessage::Text("late".to_string()))).is_err());
    }

    #[tokio::test]
    async fn test_close_discards_queued_data() {
        let shared = shared();
        let (tx, rx) = mpsc::unbounded_channel();
        queue(&shared, &tx, OutboundMessage::Binary(vec![1; 10]));
        assert!(tx.send(Outgoing::Close(1000, "Session ended".to_string())).is_ok());
        queue(&shared, &tx, OutboundMessage::Binary(vec![2; 20]));

        write_queue(futures::sink::drain(), rx, Arc::clone(&shared)).await;
        assert_eq!(shared.buffered.load(Ordering::SeqCst), 0);
    }
}

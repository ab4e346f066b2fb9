//! WebSocket transport adapter
//!
//! Owns the socket: dials the feed, forwards inbound text frames and
//! connection transitions to the engine's event channel, drains the
//! outbound frame queue onto the wire, and answers protocol pings. On any
//! loss it reports a disconnect and redials after a fixed delay, forever,
//! until cancelled. Outbound frames queued while the link is down are
//! dropped, not replayed; the engine rebuilds its subscriptions on every
//! connect.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::transport::{DisconnectReason, TransportEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Handle to the background connection task
pub struct WsClient {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl WsClient {
    pub fn spawn(
        url: String,
        reconnect_delay: Duration,
        events: mpsc::UnboundedSender<TransportEvent>,
        outbound: mpsc::UnboundedReceiver<String>,
    ) -> Self {
        let token = CancellationToken::new();
        let task_token = token.clone();
        let handle = tokio::spawn(async move {
            run(url, reconnect_delay, events, outbound, task_token).await;
        });
        Self { token, handle }
    }

    pub async fn shutdown(self) {
        self.token.cancel();
        let _ = self.handle.await;
    }
}

async fn run(
    url: String,
    reconnect_delay: Duration,
    events: mpsc::UnboundedSender<TransportEvent>,
    mut outbound: mpsc::UnboundedReceiver<String>,
    token: CancellationToken,
) {
    loop {
        if token.is_cancelled() {
            break;
        }
        info!(url = %url, "connecting to feed");
        match connect_async(url.as_str()).await {
            Ok((stream, _)) => {
                info!("feed connection established");
                if events.send(TransportEvent::Connected).is_err() {
                    break;
                }
                let reason = drive(stream, &events, &mut outbound, &token).await;
                let local_shutdown = matches!(reason, DisconnectReason::Shutdown);
                let _ = events.send(TransportEvent::Disconnected { reason });
                if local_shutdown {
                    break;
                }
            }
            Err(err) => warn!("feed connection failed: {}", err),
        }

        // frames queued while down are stale, drop them
        while outbound.try_recv().is_ok() {}

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(reconnect_delay) => {}
        }
    }
    debug!("ws client stopped");
}

/// Pump one established connection until it drops or we are cancelled
async fn drive(
    stream: WsStream,
    events: &mpsc::UnboundedSender<TransportEvent>,
    outbound: &mut mpsc::UnboundedReceiver<String>,
    token: &CancellationToken,
) -> DisconnectReason {
    let (mut sink, mut source) = stream.split();
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                return DisconnectReason::Shutdown;
            }
            frame = outbound.recv() => {
                match frame {
                    Some(text) => {
                        if let Err(err) = sink.send(Message::Text(text)).await {
                            return DisconnectReason::Error(err.to_string());
                        }
                    }
                    // the engine side is gone, nothing left to do
                    None => {
                        let _ = sink.send(Message::Close(None)).await;
                        return DisconnectReason::Shutdown;
                    }
                }
            }
            message = source.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        let _ = events.send(TransportEvent::Frame(text));
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        if sink.send(Message::Pong(payload)).await.is_err() {
                            return DisconnectReason::Error("pong send failed".to_string());
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return DisconnectReason::Closed,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => return DisconnectReason::Error(err.to_string()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connect_send_receive_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let message = ws.next().await.unwrap().unwrap();
            assert!(message.is_text());
            ws.send(Message::Text(r#"{"type":"pong"}"#.to_string()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        });

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let client = WsClient::spawn(
            format!("ws://{}", addr),
            Duration::from_millis(100),
            events_tx,
            outbound_rx,
        );

        assert!(matches!(
            events_rx.recv().await,
            Some(TransportEvent::Connected)
        ));

        outbound_tx.send(r#"{"action":"ping"}"#.to_string()).unwrap();
        match events_rx.recv().await {
            Some(TransportEvent::Frame(text)) => assert!(text.contains("pong")),
            other => panic!("expected frame, got {:?}", other),
        }

        match events_rx.recv().await {
            Some(TransportEvent::Disconnected {
                reason: DisconnectReason::Closed,
            }) => {}
            other => panic!("expected clean disconnect, got {:?}", other),
        }

        client.shutdown().await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_reconnects_after_connection_drop() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            // first connection dies right after the handshake
            let (stream, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            drop(ws);

            // second connection stays up
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let _ = ws.next().await;
        });

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let (_outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let client = WsClient::spawn(
            format!("ws://{}", addr),
            Duration::from_millis(50),
            events_tx,
            outbound_rx,
        );

        assert!(matches!(
            events_rx.recv().await,
            Some(TransportEvent::Connected)
        ));
        assert!(matches!(
            events_rx.recv().await,
            Some(TransportEvent::Disconnected { .. })
        ));
        assert!(matches!(
            events_rx.recv().await,
            Some(TransportEvent::Connected)
        ));

        client.shutdown().await;
        server.abort();
    }
}

//! Client side of the signaling relay: sends the local offer and waits for the
//! model's answer on a WebSocket.

use crate::protocol::SignalMessage;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message as WsMessage,
};
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum SignalingError {
    #[error("failed to connect to signaling relay: {0}")]
    Connect(#[source] tokio_tungstenite::tungstenite::Error),
    #[error("signaling transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("failed to encode signaling message: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("signaling connection closed before an answer arrived")]
    Closed,
}

/// Opens signaling connections.
#[async_trait]
pub trait SignalingConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn SignalingChannel>, SignalingError>;
}

/// One open signaling connection.
#[async_trait]
pub trait SignalingChannel: Send {
    /// Sends the offer and waits for the matching answer.
    async fn exchange(&mut self, offer_sdp: &str) -> Result<String, SignalingError>;
    async fn close(&mut self) -> Result<(), SignalingError>;
}

pub struct WsSignalingConnector {
    url: String,
}

impl WsSignalingConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl SignalingConnector for WsSignalingConnector {
    async fn connect(&self) -> Result<Box<dyn SignalingChannel>, SignalingError> {
        let (stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(SignalingError::Connect)?;
        info!(url = %self.url, "Connected to signaling relay.");
        Ok(Box::new(WsSignalingChannel { stream }))
    }
}

struct WsSignalingChannel {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl SignalingChannel for WsSignalingChannel {
    async fn exchange(&mut self, offer_sdp: &str) -> Result<String, SignalingError> {
        let offer = serde_json::to_string(&SignalMessage::Offer {
            sdp: offer_sdp.to_string(),
        })?;
        self.stream.send(WsMessage::Text(offer.into())).await?;

        while let Some(frame) = self.stream.next().await {
            match frame? {
                WsMessage::Text(text) => {
                    match serde_json::from_str::<SignalMessage>(text.as_str()) {
                        Ok(SignalMessage::Answer { sdp }) => return Ok(sdp),
                        _ => debug!(frame = %text.as_str(), "Ignoring non-answer signaling frame"),
                    }
                }
                WsMessage::Close(_) => break,
                _ => {}
            }
        }
        Err(SignalingError::Closed)
    }

    async fn close(&mut self) -> Result<(), SignalingError> {
        self.stream.close(None).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Router,
        extract::ws::{Message, WebSocket, WebSocketUpgrade},
        response::Response,
        routing::get,
    };

    async fn relay_stub(ws: WebSocketUpgrade) -> Response {
        ws.on_upgrade(|mut socket: WebSocket| async move {
            while let Some(Ok(Message::Text(text))) = socket.recv().await {
                // An unrelated frame first, then the answer.
                let _ = socket
                    .send(Message::Text(format!("echo: {}", text.as_str()).into()))
                    .await;
                let _ = socket
                    .send(Message::Text(
                        r#"{"type":"answer","sdp":"remote-sdp"}"#.to_string().into(),
                    ))
                    .await;
            }
        })
    }

    async fn spawn_stub() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = Router::new().route("/ws", get(relay_stub));
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("ws://{addr}/ws")
    }

    #[tokio::test]
    async fn test_exchange_skips_non_answer_frames() {
        let url = spawn_stub().await;
        let connector = WsSignalingConnector::new(url);

        let mut channel = connector.connect().await.unwrap();
        let answer = channel.exchange("local-sdp").await.unwrap();

        assert_eq!(answer, "remote-sdp");
        channel.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_failure_is_reported() {
        let connector = WsSignalingConnector::new("ws://127.0.0.1:1/ws");
        assert!(matches!(
            connector.connect().await,
            Err(SignalingError::Connect(_))
        ));
    }
}

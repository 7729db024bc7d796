use std::future::Future;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tracing::{debug, warn};

use society_types::events::{ChannelCommand, ChannelEvent};

use crate::error::ChatError;

/// An open realtime connection, seen as a pair of channels.
///
/// The connection is over once `inbound` yields `None`. Dropping `outbound`
/// closes it from our side.
pub struct Connection {
    pub outbound: mpsc::UnboundedSender<ChannelCommand>,
    pub inbound: mpsc::UnboundedReceiver<ChannelEvent>,
}

/// Opens realtime connections for a session.
pub trait Connector: Send + Sync + 'static {
    fn connect(
        &self,
        token: Option<String>,
    ) -> impl Future<Output = Result<Connection, ChatError>> + Send;
}

/// Supplies the caller's current bearer token at connect time.
pub trait TokenProvider: Send + Sync + 'static {
    fn current_token(&self) -> Option<String>;
}

impl TokenProvider for Option<String> {
    fn current_token(&self) -> Option<String> {
        self.clone()
    }
}

impl TokenProvider for String {
    fn current_token(&self) -> Option<String> {
        Some(self.clone())
    }
}

impl<T: TokenProvider> TokenProvider for std::sync::Arc<T> {
    fn current_token(&self) -> Option<String> {
        (**self).current_token()
    }
}

/// WebSocket connector for the gateway. The token travels in the
/// `Authorization` header of the upgrade request.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Connector for WsConnector {
    async fn connect(&self, token: Option<String>) -> Result<Connection, ChatError> {
        let mut request = self.url.as_str().into_client_request()?;
        if let Some(token) = token {
            // An unencodable token is sent without auth; the server rejects it
            match HeaderValue::from_str(&format!("Bearer {}", token)) {
                Ok(value) => {
                    request.headers_mut().insert("Authorization", value);
                }
                Err(e) => warn!("Bearer token is not a valid header value: {}", e),
            }
        }

        let (socket, _response) = tokio_tungstenite::connect_async(request).await?;
        debug!("Connected to gateway at {}", self.url);

        let (mut sink, mut stream) = socket.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ChannelCommand>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<ChannelEvent>();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    cmd = outbound_rx.recv() => {
                        let Some(cmd) = cmd else {
                            let _ = sink.send(Message::Close(None)).await;
                            break;
                        };
                        let text = match serde_json::to_string(&cmd) {
                            Ok(text) => text,
                            Err(e) => {
                                warn!("Failed to encode command: {}", e);
                                continue;
                            }
                        };
                        if sink.send(Message::text(text)).await.is_err() {
                            break;
                        }
                    }
                    frame = stream.next() => {
                        match frame {
                            Some(Ok(Message::Text(text))) => {
                                match serde_json::from_str::<ChannelEvent>(&text) {
                                    Ok(event) => {
                                        if inbound_tx.send(event).is_err() {
                                            break;
                                        }
                                    }
                                    Err(e) => {
                                        warn!(
                                            "Dropping malformed event: {} -- raw: {}",
                                            e,
                                            text.chars().take(200).collect::<String>()
                                        );
                                    }
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => break,
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                debug!("Gateway stream error: {}", e);
                                break;
                            }
                        }
                    }
                }
            }
            debug!("Gateway connection pump finished");
        });

        Ok(Connection {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

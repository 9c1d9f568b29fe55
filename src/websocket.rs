//! graphql-transport-ws client used to consume remote subscriptions.
//!
//! One websocket connection carries exactly one subscription. Server events are
//! pushed into a [`SubscriptionSink`]; disposing the paired stream sends
//! `complete` to the remote service and closes the socket.

use crate::error::{Error, GraphQLError, Result};
use crate::subscription::SubscriptionSink;
use crate::types::{GraphQLRequest, GraphQLResponse};
use futures::{future, Sink, SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

/// Subprotocol name of the graphql-ws protocol
pub const GRAPHQL_TRANSPORT_WS: &str = "graphql-transport-ws";

const SUBSCRIPTION_ID: &str = "1";

/// Messages sent to the remote service
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    ConnectionInit {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<serde_json::Value>,
    },
    Subscribe {
        id: String,
        payload: GraphQLRequest,
    },
    Complete {
        id: String,
    },
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<serde_json::Value>,
    },
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<serde_json::Value>,
    },
    /// Not part of the protocol; closes the socket with a normal close frame
    #[serde(skip)]
    CloseWebsocket,
}

/// Messages received from the remote service
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    ConnectionAck,
    Next {
        id: String,
        payload: GraphQLResponse,
    },
    Error {
        #[serde(default)]
        id: Option<String>,
        payload: ServerError,
    },
    Complete {
        id: String,
    },
    Ping {
        #[serde(default)]
        payload: Option<serde_json::Value>,
    },
    Pong {
        #[serde(default)]
        payload: Option<serde_json::Value>,
    },
}

/// Error payload; servers send either one error or a list
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerError {
    Errors(Vec<GraphQLError>),
    Error(GraphQLError),
}

impl ServerError {
    fn into_error(self) -> Error {
        let errors = match self {
            ServerError::Errors(errors) => errors,
            ServerError::Error(error) => vec![error],
        };
        let summary = errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        Error::Remote(summary)
    }
}

/// Derive the websocket address of an http(s) endpoint
pub fn ws_url(http_url: &str) -> Result<String> {
    if let Some(rest) = http_url.strip_prefix("https://") {
        Ok(format!("wss://{rest}"))
    } else if let Some(rest) = http_url.strip_prefix("http://") {
        Ok(format!("ws://{rest}"))
    } else {
        Err(Error::InvalidRequest(format!(
            "cannot derive a websocket url from {http_url}"
        )))
    }
}

/// Typed view over a raw websocket: a sink of [`ClientMessage`] and a stream
/// of [`ServerMessage`].
fn convert_websocket_stream<S>(
    socket: S,
) -> impl Stream<Item = Result<ServerMessage>> + Sink<ClientMessage, Error = Error> + Unpin
where
    S: Stream<Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>
        + Sink<Message, Error = tokio_tungstenite::tungstenite::Error>
        + Unpin,
{
    socket
        .sink_map_err(Error::from)
        .with(|message: ClientMessage| {
            future::ready(match message {
                ClientMessage::CloseWebsocket => Ok(Message::Close(Some(CloseFrame {
                    code: CloseCode::Normal,
                    reason: Default::default(),
                }))),
                message => serde_json::to_string(&message)
                    .map(Message::Text)
                    .map_err(Error::from),
            })
        })
        .filter_map(|message| {
            future::ready(match message {
                Ok(Message::Text(text)) => Some(serde_json::from_str(&text).map_err(Error::from)),
                Ok(Message::Binary(bytes)) => {
                    Some(serde_json::from_slice(&bytes).map_err(Error::from))
                }
                Ok(Message::Close(None)) => Some(Ok(ServerMessage::Complete {
                    id: SUBSCRIPTION_ID.to_string(),
                })),
                Ok(Message::Close(Some(CloseFrame { code, reason }))) => {
                    if code == CloseCode::Normal {
                        Some(Ok(ServerMessage::Complete {
                            id: SUBSCRIPTION_ID.to_string(),
                        }))
                    } else {
                        Some(Err(Error::WebSocket(format!(
                            "connection closed with code '{code}' and reason '{reason}'"
                        ))))
                    }
                }
                // Transport-level pings are answered by tungstenite itself
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => None,
                Err(err) => Some(Err(Error::from(err))),
            })
        })
}

/// Open a connection, run the `connection_init` handshake and start one
/// subscription whose events are pushed into `sink`.
///
/// Returns once the remote service acknowledged the connection and the
/// `subscribe` message was sent. Both the WebSocket upgrade and the
/// `connection_ack` must arrive within `ack_timeout`. A background task then relays events until
/// the remote completes, errors, or the consumer disposes.
pub async fn subscribe(
    url: &str,
    request: GraphQLRequest,
    init_payload: Option<serde_json::Value>,
    ack_timeout: Duration,
    sink: SubscriptionSink<GraphQLResponse>,
) -> Result<()> {
    let address = ws_url(url)?;
    let mut ws_request = address.as_str().into_client_request()?;
    ws_request.headers_mut().insert(
        header::SEC_WEBSOCKET_PROTOCOL,
        HeaderValue::from_static(GRAPHQL_TRANSPORT_WS),
    );

    // The opening handshake shares the ack deadline
    let (socket, _) = tokio::time::timeout(ack_timeout, tokio_tungstenite::connect_async(ws_request))
        .await
        .map_err(|_| Error::Timeout(format!("websocket connect to {address}")))?
        .map_err(|e| Error::Connection(format!("{address}: {e}")))?;
    let mut socket = convert_websocket_stream(socket);

    socket
        .send(ClientMessage::ConnectionInit {
            payload: init_payload,
        })
        .await?;

    let first_non_ping = async {
        loop {
            match socket.next().await {
                Some(Ok(ServerMessage::Ping { .. })) => {
                    if let Err(e) = socket.send(ClientMessage::Pong { payload: None }).await {
                        return Some(Err(e));
                    }
                }
                other => return other,
            }
        }
    };
    let ack = tokio::time::timeout(ack_timeout, first_non_ping)
        .await
        .map_err(|_| Error::Timeout(format!("connection ack from {address}")))?;
    match ack {
        Some(Ok(ServerMessage::ConnectionAck)) => {}
        Some(Err(e)) => return Err(e),
        other => {
            return Err(Error::WebSocket(format!(
                "expected connection_ack from {address}, got {other:?}"
            )))
        }
    }

    socket
        .send(ClientMessage::Subscribe {
            id: SUBSCRIPTION_ID.to_string(),
            payload: request,
        })
        .await?;

    let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
    sink.activate(move || {
        let _ = cancel_tx.send(());
    });

    tracing::debug!(url = %address, "remote subscription started");
    tokio::spawn(relay(socket, sink, cancel_rx));
    Ok(())
}

async fn relay<S>(
    mut socket: S,
    sink: SubscriptionSink<GraphQLResponse>,
    mut cancel: oneshot::Receiver<()>,
) where
    S: Stream<Item = Result<ServerMessage>> + Sink<ClientMessage, Error = Error> + Unpin,
{
    let mut stop_remote = false;

    loop {
        tokio::select! {
            _ = &mut cancel => {
                stop_remote = true;
                break;
            }
            message = socket.next() => match message {
                Some(Ok(ServerMessage::Next { payload, .. })) => {
                    if !sink.next(payload) {
                        stop_remote = true;
                        break;
                    }
                }
                Some(Ok(ServerMessage::Error { payload, .. })) => {
                    sink.error(payload.into_error());
                    break;
                }
                Some(Ok(ServerMessage::Complete { .. })) | None => {
                    sink.complete();
                    break;
                }
                Some(Ok(ServerMessage::Ping { .. })) => {
                    if let Err(e) = socket.send(ClientMessage::Pong { payload: None }).await {
                        sink.error(e);
                        break;
                    }
                }
                Some(Ok(ServerMessage::Pong { .. } | ServerMessage::ConnectionAck)) => {}
                Some(Err(e)) => {
                    sink.error(e);
                    break;
                }
            }
        }
    }

    if stop_remote {
        tracing::trace!("disposing remote subscription");
        let _ = socket
            .send(ClientMessage::Complete {
                id: SUBSCRIPTION_ID.to_string(),
            })
            .await;
    }
    let _ = socket.send(ClientMessage::CloseWebsocket).await;
}

//! WebSocket endpoint agents connect to.

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, Stream, StreamExt, future};
use log::{debug, info};
use std::sync::Arc;

use crate::hub::AgentConnection;

use super::state::AppState;

/// WebSocket upgrade handler.
///
/// GET {base}/rw/ws/agent
pub async fn agent_ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let peer = format!("conn-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]);
    info!("Agent WebSocket upgrade request ({})", peer);
    ws.on_upgrade(move |socket| handle_agent_connection(socket, state, peer))
}

/// Run the message router for one agent socket until it closes.
async fn handle_agent_connection(socket: WebSocket, state: AppState, peer: String) {
    let (sender, receiver) = socket.split();

    let sink = sender.with(|text: String| {
        future::ready(Ok::<_, axum::Error>(Message::Text(text.into())))
    });
    let conn = Arc::new(AgentConnection::from_sink(peer.clone(), sink));

    state.router.run(conn, text_frames(receiver)).await;
    info!("Agent connection {} closed", peer);
}

/// Text payloads of a socket's messages. Binary frames are decoded as UTF-8,
/// control frames are skipped and a close frame ends the stream.
fn text_frames<S>(messages: S) -> impl Stream<Item = Result<String, axum::Error>>
where
    S: Stream<Item = Result<Message, axum::Error>>,
{
    messages
        .take_while(|msg| future::ready(!matches!(msg, Ok(Message::Close(_)))))
        .filter_map(|msg| {
            future::ready(match msg {
                Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                Ok(Message::Binary(bytes)) => {
                    Some(Ok(String::from_utf8_lossy(&bytes).into_owned()))
                }
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Close(_)) => {
                    debug!("Skipping control frame");
                    None
                }
                Err(e) => Some(Err(e)),
            })
        })
}

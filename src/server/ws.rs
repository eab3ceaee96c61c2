//! WebSocket transport for streaming sessions

use crate::error::ConnectionClosed;
use crate::events::ServerFrame;
use crate::session::Transport;
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};

pub struct WsTransport {
    socket: WebSocket,
}

impl WsTransport {
    pub fn new(socket: WebSocket) -> Self {
        Self { socket }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn recv(&mut self) -> Option<String> {
        loop {
            match self.socket.recv().await? {
                Ok(Message::Text(text)) => return Some(text),
                Ok(Message::Close(_)) => return None,
                // binary, ping and pong carry no requests
                Ok(_) => continue,
                Err(e) => {
                    tracing::debug!(error = %e, "WebSocket receive failed");
                    return None;
                }
            }
        }
    }

    async fn send(&mut self, frame: &ServerFrame) -> Result<(), ConnectionClosed> {
        self.socket
            .send(Message::Text(frame.to_json()))
            .await
            .map_err(|_| ConnectionClosed)
    }
}

//! Connection session manager
//!
//! Drives one persistent connection through
//! `Accepted -> Ready -> (Dispatching -> Ready)* -> Closed`.
//! Requests on a connection are handled strictly one at a time: the next
//! message is only read after the previous request's terminal frame is out.

use crate::error::{ConnectionClosed, RelayError};
use crate::events::{RequestEnvelope, ServerFrame};
use crate::relay::{CompletionRelay, CompletionRequest};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// A bidirectional, message-oriented connection
#[async_trait]
pub trait Transport: Send {
    /// Next text message from the peer; `None` once the peer has gone away
    async fn recv(&mut self) -> Option<String>;

    /// Write one frame. Fails only when the peer has gone away.
    async fn send(&mut self, frame: &ServerFrame) -> Result<(), ConnectionClosed>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Accepted,
    Ready,
    Dispatching,
    Closed,
}

/// Counters reported when a session ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    /// Messages received
    pub requests: u64,
    /// Requests that ended with `done`
    pub completed: u64,
    /// Requests that ended with `error`
    pub failed: u64,
}

pub struct Session<T> {
    id: Uuid,
    relay: Arc<CompletionRelay>,
    transport: T,
    state: SessionState,
    summary: SessionSummary,
}

impl<T: Transport> Session<T> {
    pub fn new(relay: Arc<CompletionRelay>, transport: T) -> Self {
        Self {
            id: Uuid::new_v4(),
            relay,
            transport,
            state: SessionState::Accepted,
            summary: SessionSummary::default(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Serve the connection until the peer disconnects
    pub async fn run(mut self) -> SessionSummary {
        self.transition(SessionState::Ready);
        info!(session_id = %self.id, "Session ready");

        while let Some(text) = self.transport.recv().await {
            self.summary.requests += 1;
            if self.handle(&text).await.is_err() {
                info!(session_id = %self.id, "Peer disconnected mid-request");
                break;
            }
        }

        self.transition(SessionState::Closed);
        info!(
            session_id = %self.id,
            requests = self.summary.requests,
            completed = self.summary.completed,
            failed = self.summary.failed,
            "Session closed"
        );
        self.summary
    }

    fn transition(&mut self, next: SessionState) {
        debug!(session_id = %self.id, from = ?self.state, to = ?next, "Session state change");
        self.state = next;
    }

    async fn handle(&mut self, text: &str) -> Result<(), ConnectionClosed> {
        let request = match RequestEnvelope::parse(text).and_then(RequestEnvelope::into_request) {
            Ok(request) => request,
            Err(e) => {
                warn!(session_id = %self.id, error = %e, "Rejected request");
                return self.fail(&e).await;
            }
        };

        if let Err(e) = self.relay.resolve(&request) {
            warn!(session_id = %self.id, error = %e, kind = e.kind(), "No provider for request");
            return self.fail(&e).await;
        }

        self.transition(SessionState::Dispatching);
        self.dispatch(&request).await?;
        self.transition(SessionState::Ready);
        Ok(())
    }

    async fn dispatch(&mut self, request: &CompletionRequest) -> Result<(), ConnectionClosed> {
        let start = Instant::now();
        let model = self.relay.resolve_model(request).to_string();
        info!(session_id = %self.id, model = %model, "Dispatching streaming request");

        let mut stream = match self.relay.stream(request).await {
            Ok(stream) => stream,
            Err(e) => return self.fail(&e).await,
        };

        let mut chunks = 0u64;
        while let Some(item) = stream.next().await {
            match item {
                Ok(fragment) => {
                    self.transport.send(&ServerFrame::chunk(fragment)).await?;
                    chunks += 1;
                }
                Err(e) => {
                    error!(session_id = %self.id, model = %model, chunks, error = %e, "Stream failed");
                    return self.fail(&e).await;
                }
            }
        }

        self.summary.completed += 1;
        info!(
            session_id = %self.id,
            model = %model,
            chunks,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Stream completed"
        );
        self.transport.send(&ServerFrame::done()).await
    }

    async fn fail(&mut self, error: &RelayError) -> Result<(), ConnectionClosed> {
        self.summary.failed += 1;
        self.transport.send(&ServerFrame::error(error.to_string())).await
    }
}

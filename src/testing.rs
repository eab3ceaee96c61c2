//! Scripted collaborators shared by unit tests

use crate::config::Settings;
use crate::events::ServerFrame;
use crate::error::ConnectionClosed;
use crate::message::ChatMessage;
use crate::provider::{Backend, FragmentStream, ProviderAdapter, ProviderError, SamplingParams};
use crate::session::Transport;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

pub(crate) fn openai_settings() -> Arc<Settings> {
    let mut settings = Settings::default();
    settings.llm.openai_api_key = Some("sk-test".to_string());
    settings.database_url = "sqlite::memory:".to_string();
    Arc::new(settings)
}

pub(crate) fn unconfigured_settings() -> Arc<Settings> {
    let mut settings = Settings::default();
    settings.database_url = "sqlite::memory:".to_string();
    Arc::new(settings)
}

/// One scripted streaming step
#[derive(Debug, Clone, Copy)]
pub(crate) enum Step {
    Chunk(&'static str),
    Fail(&'static str),
}

/// Adapter that replays a script and records what it was asked
#[derive(Default)]
pub(crate) struct StubAdapter {
    reply: Option<String>,
    complete_error: Option<&'static str>,
    open_error: Option<&'static str>,
    steps: Vec<Step>,
    scripts: Vec<Vec<Step>>,
    calls: AtomicUsize,
    last_backend: Mutex<Option<Backend>>,
    last_messages: Mutex<Vec<ChatMessage>>,
    last_params: Mutex<Option<SamplingParams>>,
}

impl StubAdapter {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Some(text.to_string()),
            ..Self::default()
        }
    }

    pub fn streaming(steps: Vec<Step>) -> Self {
        Self {
            steps,
            ..Self::default()
        }
    }

    /// One script per `stream` call, in order; calls past the end reuse the last
    pub fn scripted(scripts: Vec<Vec<Step>>) -> Self {
        Self {
            scripts,
            ..Self::default()
        }
    }

    pub fn failing_complete(mut self, message: &'static str) -> Self {
        self.complete_error = Some(message);
        self
    }

    pub fn failing_open(mut self, message: &'static str) -> Self {
        self.open_error = Some(message);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_backend(&self) -> Option<Backend> {
        self.last_backend.lock().clone()
    }

    pub fn last_messages(&self) -> Vec<ChatMessage> {
        self.last_messages.lock().clone()
    }

    pub fn last_params(&self) -> Option<SamplingParams> {
        *self.last_params.lock()
    }

    fn record(&self, backend: &Backend, messages: &[ChatMessage], params: SamplingParams) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_backend.lock() = Some(backend.clone());
        *self.last_messages.lock() = messages.to_vec();
        *self.last_params.lock() = Some(params);
    }
}

fn failure(message: &str) -> ProviderError {
    ProviderError::Stream(message.to_string())
}

#[async_trait]
impl ProviderAdapter for StubAdapter {
    async fn complete(
        &self,
        backend: &Backend,
        messages: &[ChatMessage],
        params: SamplingParams,
    ) -> Result<String, ProviderError> {
        self.record(backend, messages, params);
        if let Some(message) = self.complete_error {
            return Err(failure(message));
        }
        self.reply
            .clone()
            .ok_or_else(|| ProviderError::MalformedResponse("no reply scripted".to_string()))
    }

    async fn stream(
        &self,
        backend: &Backend,
        messages: &[ChatMessage],
        params: SamplingParams,
    ) -> Result<FragmentStream, ProviderError> {
        let call = self.calls();
        self.record(backend, messages, params);
        if let Some(message) = self.open_error {
            return Err(failure(message));
        }
        let steps = match self.scripts.last() {
            Some(last) => self.scripts.get(call).unwrap_or(last),
            None => &self.steps,
        };
        let items: Vec<Result<String, ProviderError>> = steps
            .iter()
            .map(|step| match step {
                Step::Chunk(text) => Ok(text.to_string()),
                Step::Fail(message) => Err(failure(message)),
            })
            .collect();
        Ok(Box::pin(futures::stream::iter(items)))
    }
}

/// In-memory connection: inbound messages are queued up front, outbound
/// frames are published on a channel. `close_after` simulates the peer
/// vanishing after that many frames were written.
pub(crate) struct ScriptedTransport {
    inbound: VecDeque<String>,
    outbound: mpsc::UnboundedSender<ServerFrame>,
    close_after: Option<usize>,
    sent: usize,
}

impl ScriptedTransport {
    pub fn new(inbound: &[&str]) -> (Self, mpsc::UnboundedReceiver<ServerFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Self {
            inbound: inbound.iter().map(|s| s.to_string()).collect(),
            outbound: tx,
            close_after: None,
            sent: 0,
        };
        (transport, rx)
    }

    pub fn close_after(mut self, frames: usize) -> Self {
        self.close_after = Some(frames);
        self
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn recv(&mut self) -> Option<String> {
        if self.close_after.is_some_and(|limit| self.sent >= limit) {
            return None;
        }
        self.inbound.pop_front()
    }

    async fn send(&mut self, frame: &ServerFrame) -> Result<(), ConnectionClosed> {
        if self.close_after.is_some_and(|limit| self.sent >= limit) {
            return Err(ConnectionClosed);
        }
        self.sent += 1;
        self.outbound.send(frame.clone()).map_err(|_| ConnectionClosed)
    }
}

/// Drain everything a finished session wrote
pub(crate) fn drain(rx: &mut mpsc::UnboundedReceiver<ServerFrame>) -> Vec<ServerFrame> {
    let mut frames = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        frames.push(frame);
    }
    frames
}

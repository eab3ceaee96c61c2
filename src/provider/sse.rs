//! Incremental Server-Sent Events decoding for streaming chat completions

use super::ProviderError;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use std::collections::VecDeque;
use std::pin::Pin;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SseEvent {
    Data(String),
    Done,
    /// A line that is not valid UTF-8
    Invalid(String),
}

/// Splits a byte stream into SSE `data:` events.
///
/// Bytes are buffered until a full line is available so multi-byte
/// characters split across network reads decode correctly.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = match String::from_utf8(raw) {
                Ok(line) => line,
                Err(e) => {
                    events.push(SseEvent::Invalid(e.to_string()));
                    continue;
                }
            };
            let line = line.trim();

            if line.is_empty() || line.starts_with(':') {
                continue;
            }

            if let Some(data) = line.strip_prefix("data:") {
                let data = data.trim_start();
                if data == "[DONE]" {
                    events.push(SseEvent::Done);
                } else {
                    events.push(SseEvent::Data(data.to_string()));
                }
            }
        }
        events
    }

    /// Flush a final line that arrived without a trailing newline
    pub fn finish(&mut self) -> Vec<SseEvent> {
        if self.buffer.is_empty() {
            return Vec::new();
        }
        self.push(b"\n")
    }
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamChunkDelta {
    content: Option<String>,
}

/// Text content carried by one `data:` payload
fn parse_content(data: &str) -> Result<Vec<String>, ProviderError> {
    let chunk: StreamChunk = serde_json::from_str(data)
        .map_err(|e| ProviderError::MalformedResponse(format!("{e} (raw: {data})")))?;

    if let Some(error) = chunk.error {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .map(String::from)
            .unwrap_or_else(|| error.to_string());
        return Err(ProviderError::Stream(message));
    }

    Ok(chunk
        .choices
        .into_iter()
        .filter_map(|choice| choice.delta.content)
        .collect())
}

struct FragmentState<S> {
    body: Pin<Box<S>>,
    decoder: SseDecoder,
    pending: VecDeque<Result<String, ProviderError>>,
    finished: bool,
}

impl<S> FragmentState<S> {
    fn absorb(&mut self, events: Vec<SseEvent>) {
        for event in events {
            if self.finished {
                break;
            }
            match event {
                SseEvent::Done => self.finished = true,
                SseEvent::Invalid(reason) => {
                    self.pending.push_back(Err(ProviderError::MalformedResponse(format!(
                        "invalid UTF-8 in event stream: {reason}"
                    ))));
                    self.finished = true;
                }
                SseEvent::Data(data) => match parse_content(&data) {
                    Ok(fragments) => self.pending.extend(fragments.into_iter().map(Ok)),
                    Err(e) => {
                        self.pending.push_back(Err(e));
                        self.finished = true;
                    }
                },
            }
        }
    }
}

/// Turn a raw SSE response body into content fragments.
///
/// Fragments come out in arrival order. The sequence ends at `[DONE]` or
/// right after the first error item. A body that ends without `[DONE]` was
/// cut short and yields a final error.
pub(crate) fn content_fragments<S, B, E>(
    body: S,
) -> impl Stream<Item = Result<String, ProviderError>> + Send + 'static
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<ProviderError> + Send + 'static,
{
    let state = FragmentState {
        body: Box::pin(body),
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        finished: false,
    };

    futures::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                return Some((item, st));
            }
            if st.finished {
                return None;
            }
            match st.body.next().await {
                Some(Ok(bytes)) => {
                    let events = st.decoder.push(bytes.as_ref());
                    st.absorb(events);
                }
                Some(Err(e)) => {
                    st.pending.push_back(Err(e.into()));
                    st.finished = true;
                }
                None => {
                    let events = st.decoder.finish();
                    st.absorb(events);
                    if !st.finished {
                        st.pending.push_back(Err(ProviderError::MalformedResponse(
                            "stream ended before [DONE]".to_string(),
                        )));
                    }
                    st.finished = true;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(text: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"delta": {"content": text}}]})
        )
    }

    #[test]
    fn test_decoder_handles_split_lines() {
        let mut decoder = SseDecoder::default();

        assert!(decoder.push(b"data: {\"a\"").is_empty());
        assert_eq!(
            decoder.push(b":1}\n\n: keep-alive\ndata: [DONE]\n"),
            vec![SseEvent::Data("{\"a\":1}".to_string()), SseEvent::Done]
        );
    }

    #[test]
    fn test_decoder_keeps_multibyte_characters() {
        let line = "data: héllo\n".as_bytes();
        let split = line.iter().position(|b| *b == 0xC3).unwrap() + 1;

        let mut decoder = SseDecoder::default();
        assert!(decoder.push(&line[..split]).is_empty());
        assert_eq!(
            decoder.push(&line[split..]),
            vec![SseEvent::Data("héllo".to_string())]
        );
    }

    #[test]
    fn test_decoder_finish_flushes_last_line() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: [DONE]").is_empty());
        assert_eq!(decoder.finish(), vec![SseEvent::Done]);
        assert!(decoder.finish().is_empty());
    }

    #[tokio::test]
    async fn test_fragments_in_order_until_done() {
        let body = format!("{}{}data: [DONE]\n\n{}", delta("Hel"), delta("lo"), delta("late"));
        let chunks: Vec<Result<Vec<u8>, ProviderError>> = body
            .as_bytes()
            .chunks(7)
            .map(|c| Ok(c.to_vec()))
            .collect();

        let fragments: Vec<_> = content_fragments(futures::stream::iter(chunks))
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();

        assert_eq!(fragments, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn test_upstream_error_ends_stream() {
        let body = format!(
            "{}data: {{\"error\": {{\"message\": \"rate limited\"}}}}\n\n{}",
            delta("1"),
            delta("2")
        );
        let chunks = vec![Ok::<_, ProviderError>(body.into_bytes())];

        let items: Vec<_> = content_fragments(futures::stream::iter(chunks)).collect().await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "1");
        assert!(matches!(&items[1], Err(ProviderError::Stream(m)) if m == "rate limited"));
    }

    #[tokio::test]
    async fn test_transport_error_ends_stream() {
        let chunks = vec![
            Ok(delta("a").into_bytes()),
            Err(ProviderError::Stream("connection reset".to_string())),
            Ok(delta("b").into_bytes()),
        ];

        let items: Vec<_> = content_fragments(futures::stream::iter(chunks)).collect().await;

        assert_eq!(items.len(), 2);
        assert!(items[1].is_err());
    }

    #[tokio::test]
    async fn test_body_ending_without_done_is_an_error() {
        let chunks = vec![Ok::<_, ProviderError>(delta("Hel").into_bytes())];

        let items: Vec<_> = content_fragments(futures::stream::iter(chunks)).collect().await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "Hel");
        assert!(
            matches!(&items[1], Err(ProviderError::MalformedResponse(m)) if m.contains("[DONE]"))
        );
    }

    #[tokio::test]
    async fn test_done_without_trailing_newline_ends_cleanly() {
        let body = format!("{}data: [DONE]", delta("ok"));
        let chunks = vec![Ok::<_, ProviderError>(body.into_bytes())];

        let items: Vec<_> = content_fragments(futures::stream::iter(chunks)).collect().await;

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap(), "ok");
    }

    #[test]
    fn test_decoder_flags_invalid_utf8() {
        let mut decoder = SseDecoder::default();
        let events = decoder.push(b"data: \xFF\xFE\n");

        assert!(matches!(&events[..], [SseEvent::Invalid(_)]));
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_malformed() {
        let mut body = delta("a").into_bytes();
        body.extend_from_slice(b"data: \xC3\x28\n\n");
        body.extend_from_slice(delta("b").as_bytes());
        let chunks = vec![Ok::<_, ProviderError>(body)];

        let items: Vec<_> = content_fragments(futures::stream::iter(chunks)).collect().await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "a");
        assert!(
            matches!(&items[1], Err(ProviderError::MalformedResponse(m)) if m.contains("UTF-8"))
        );
    }

    #[tokio::test]
    async fn test_garbage_payload_is_malformed() {
        let chunks = vec![Ok::<_, ProviderError>(b"data: not json\n\n".to_vec())];

        let items: Vec<_> = content_fragments(futures::stream::iter(chunks)).collect().await;

        assert!(matches!(&items[..], [Err(ProviderError::MalformedResponse(_))]));
    }
}

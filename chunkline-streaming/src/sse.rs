//! Server-Sent Events decoding.
//!
//! Backends usually deliver fragments as an SSE stream where each event's
//! `data` is one JSON-encoded fragment and a literal `[DONE]` marks the end.
//! [`SseParser`] splits raw bytes into [`SseEvent`]s; [`FragmentSseStream`]
//! turns a byte stream into a fragment stream ready for the processor.

use crate::error::{StreamError, StreamResult};
use bytes::Bytes;
use chunkline_core::Fragment;
use futures::Stream;
use pin_project_lite::pin_project;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::{trace, warn};

const MAX_BUFFER_SIZE: usize = 10 * 1024 * 1024;

/// A parsed SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event type (if specified).
    pub event: Option<String>,
    /// Event data, multi-line data joined with `\n`.
    pub data: String,
    /// Event ID (if specified).
    pub id: Option<String>,
    /// Retry timeout in milliseconds (if specified).
    pub retry: Option<u64>,
}

impl SseEvent {
    /// Create an event with just data.
    pub fn data(data: impl Into<String>) -> Self {
        Self {
            event: None,
            data: data.into(),
            id: None,
            retry: None,
        }
    }

    /// Set the event type.
    #[must_use]
    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    /// Check if this is the end-of-stream marker.
    pub fn is_done(&self) -> bool {
        self.data.trim() == "[DONE]"
    }

    /// Decode the data as a fragment.
    pub fn to_fragment(&self) -> StreamResult<Fragment> {
        Ok(Fragment::from_json(&self.data)?)
    }
}

/// Incremental SSE parser.
///
/// Bytes may be split anywhere, including inside a UTF-8 sequence.
#[derive(Debug, Default)]
pub struct SseParser {
    pending: Vec<u8>,
    buffer: String,
    last_event_id: Option<String>,
}

impl SseParser {
    /// Create a new parser.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes, returning the events they complete.
    pub fn feed(&mut self, bytes: &[u8]) -> StreamResult<Vec<SseEvent>> {
        self.pending.extend_from_slice(bytes);

        let valid = match std::str::from_utf8(&self.pending) {
            Ok(s) => s.len(),
            // An incomplete trailing sequence stays pending until more bytes arrive.
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(e) => {
                self.pending.clear();
                return Err(StreamError::ParseSse(format!("invalid UTF-8: {}", e)));
            }
        };
        let rest = self.pending.split_off(valid);
        let chunk = std::mem::replace(&mut self.pending, rest);
        self.feed_str(&String::from_utf8_lossy(&chunk))
    }

    /// Feed text, returning the events it completes.
    pub fn feed_str(&mut self, s: &str) -> StreamResult<Vec<SseEvent>> {
        self.buffer.push_str(s);
        if self.buffer.len() > MAX_BUFFER_SIZE {
            self.buffer.clear();
            return Err(StreamError::BufferOverflow);
        }

        let mut events = Vec::new();
        while let Some((pos, delimiter_len)) = self.find_event_boundary() {
            let block: String = self.buffer.drain(..pos + delimiter_len).collect();
            if let Some(event) = self.parse_event(&block[..pos]) {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// Flush an unterminated trailing event at end of input.
    pub fn finish(&mut self) -> Option<SseEvent> {
        let block = std::mem::take(&mut self.buffer);
        self.pending.clear();
        if block.trim().is_empty() {
            return None;
        }
        self.parse_event(block.trim_end_matches(['\n', '\r']))
    }

    /// Id of the most recent event that carried one.
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    fn find_event_boundary(&self) -> Option<(usize, usize)> {
        let newline = self.buffer.find("\n\n").map(|pos| (pos, 2));
        let carriage = self.buffer.find("\r\n\r\n").map(|pos| (pos, 4));

        match (newline, carriage) {
            (Some(nl), Some(cr)) => Some(if cr.0 < nl.0 { cr } else { nl }),
            (nl, cr) => nl.or(cr),
        }
    }

    fn parse_event(&mut self, block: &str) -> Option<SseEvent> {
        let mut event = None;
        let mut data_lines: Vec<&str> = Vec::new();
        let mut id = None;
        let mut retry = None;

        for line in block.lines() {
            if line.is_empty() || line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            match field {
                "event" => event = Some(value.to_string()),
                "data" => data_lines.push(value),
                "id" => id = Some(value.to_string()),
                "retry" => retry = value.trim().parse().ok(),
                other => trace!(field = %other, "Ignoring unknown SSE field"),
            }
        }

        if let Some(id) = &id {
            self.last_event_id = Some(id.clone());
        }
        if data_lines.is_empty() {
            return None;
        }

        Some(SseEvent {
            event,
            data: data_lines.join("\n"),
            id,
            retry,
        })
    }
}

pin_project! {
    /// Fragment stream decoded from an SSE byte stream.
    ///
    /// Ends at the `[DONE]` marker or when the byte stream ends.
    pub struct FragmentSseStream<S> {
        #[pin]
        inner: S,
        parser: SseParser,
        ready: VecDeque<StreamResult<Fragment>>,
        skip_malformed: bool,
        finished: bool,
    }
}

impl<S> FragmentSseStream<S>
where
    S: Stream<Item = Result<Bytes, std::io::Error>>,
{
    /// Create a new fragment stream from a byte stream.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            parser: SseParser::new(),
            ready: VecDeque::new(),
            skip_malformed: false,
            finished: false,
        }
    }

    /// Log and skip events whose data is not a valid fragment instead of
    /// yielding a decode error.
    #[must_use]
    pub fn skip_malformed(mut self, skip: bool) -> Self {
        self.skip_malformed = skip;
        self
    }
}

fn enqueue(
    ready: &mut VecDeque<StreamResult<Fragment>>,
    finished: &mut bool,
    skip_malformed: bool,
    events: impl IntoIterator<Item = SseEvent>,
) {
    for event in events {
        if *finished {
            return;
        }
        if event.is_done() {
            *finished = true;
            return;
        }
        match event.to_fragment() {
            Ok(fragment) => ready.push_back(Ok(fragment)),
            Err(error) if skip_malformed && error.is_recoverable() => {
                warn!(error = %error, "Skipping malformed SSE fragment");
            }
            Err(error) => ready.push_back(Err(error)),
        }
    }
}

impl<S> Stream for FragmentSseStream<S>
where
    S: Stream<Item = Result<Bytes, std::io::Error>>,
{
    type Item = StreamResult<Fragment>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if let Some(item) = this.ready.pop_front() {
                return Poll::Ready(Some(item));
            }
            if *this.finished {
                return Poll::Ready(None);
            }

            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => match this.parser.feed(&bytes) {
                    Ok(events) => {
                        enqueue(this.ready, this.finished, *this.skip_malformed, events)
                    }
                    Err(error) => return Poll::Ready(Some(Err(error))),
                },
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Some(Err(StreamError::Io(e)))),
                Poll::Ready(None) => {
                    let tail = this.parser.finish();
                    enqueue(this.ready, this.finished, *this.skip_malformed, tail);
                    *this.finished = true;
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

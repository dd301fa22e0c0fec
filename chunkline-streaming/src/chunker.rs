//! Line-aware batching of text and reasoning deltas.
//!
//! Backends emit many tiny deltas. [`Chunker`] coalesces them into fewer,
//! larger ones while keeping the emitted text identical: for any block id,
//! the concatenation of emitted deltas equals the concatenation of received
//! deltas. Text and reasoning are buffered separately, each buffer keyed by
//! the block id of the deltas it holds and carrying at most one flush
//! deadline.
//!
//! [`ChunkedStream`] wraps a fragment stream with a [`Chunker`] and drives
//! its deadlines with a tokio timer.

use crate::config::{ChunkingMode, StreamConfig};
use crate::error::StreamResult;
use chunkline_core::Fragment;
use futures::Stream;
use pin_project_lite::pin_project;
use serde_json::Value;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{Instant, Sleep};
use tracing::{debug, trace};

/// Which delta buffer a fragment belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    /// `text-delta` fragments.
    Text,
    /// `reasoning-delta` fragments.
    Reasoning,
}

/// Buffered deltas for one lane.
#[derive(Debug)]
pub struct DeltaBuffer {
    lane: Lane,
    id: Option<String>,
    content: String,
    provider_metadata: Option<Value>,
    deadline: Option<Instant>,
    /// Arrival order of the first delta currently buffered.
    opened_at: u64,
}

impl DeltaBuffer {
    fn new(lane: Lane) -> Self {
        Self {
            lane,
            id: None,
            content: String::new(),
            provider_metadata: None,
            deadline: None,
            opened_at: 0,
        }
    }

    /// Lane of this buffer.
    pub fn lane(&self) -> Lane {
        self.lane
    }

    /// Block id of the buffered content.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Buffered, not yet emitted text.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Check if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Pending flush deadline, if a timer is armed.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Check if a flush timer is armed.
    pub fn has_pending_timer(&self) -> bool {
        self.deadline.is_some()
    }

    /// Arm the flush timer unless one is already pending.
    ///
    /// Returns `false` and leaves the existing deadline untouched when a
    /// timer is already armed.
    pub fn arm_timer(&mut self, now: Instant, interval: Duration) -> bool {
        if self.deadline.is_some() {
            return false;
        }
        self.deadline = Some(now + interval);
        true
    }

    fn cancel_timer(&mut self) {
        self.deadline = None;
    }

    fn append(&mut self, id: String, text: &str, metadata: Option<Value>, seq: u64) {
        if self.content.is_empty() {
            self.opened_at = seq;
        }
        self.id = Some(id);
        self.content.push_str(text);
        if metadata.is_some() {
            self.provider_metadata = metadata;
        }
    }

    /// Emit everything, ignoring line boundaries.
    fn take_all(&mut self) -> Option<Fragment> {
        self.cancel_timer();
        if self.content.is_empty() {
            return None;
        }
        let text = std::mem::take(&mut self.content);
        Some(self.to_fragment(text))
    }

    /// Emit what the chunking mode allows and keep the rest.
    fn take_ready(&mut self, mode: ChunkingMode) -> Option<Fragment> {
        match mode {
            ChunkingMode::None => self.take_all(),
            ChunkingMode::Line => {
                let cut = self.content.rfind('\n')? + 1;
                let rest = self.content.split_off(cut);
                let text = std::mem::replace(&mut self.content, rest);
                Some(self.to_fragment(text))
            }
        }
    }

    fn to_fragment(&mut self, text: String) -> Fragment {
        let id = self.id.clone().unwrap_or_default();
        match self.lane {
            Lane::Text => Fragment::TextDelta { id, text },
            Lane::Reasoning => Fragment::ReasoningDelta {
                id,
                text,
                provider_metadata: self.provider_metadata.take(),
            },
        }
    }
}

/// Batches text and reasoning deltas for one stream.
///
/// Every call returns the fragments that are ready to go downstream, in the
/// order they must be delivered.
#[derive(Debug)]
pub struct Chunker {
    mode: ChunkingMode,
    interval: Duration,
    redaction_sentinels: Vec<String>,
    text: DeltaBuffer,
    reasoning: DeltaBuffer,
    seq: u64,
}

impl Chunker {
    /// Create a chunker from the stream configuration.
    pub fn new(config: &StreamConfig) -> Self {
        Self {
            mode: config.chunking_mode,
            interval: config.flush_interval(),
            redaction_sentinels: config.redaction_sentinels.clone(),
            text: DeltaBuffer::new(Lane::Text),
            reasoning: DeltaBuffer::new(Lane::Reasoning),
            seq: 0,
        }
    }

    /// The text buffer.
    pub fn text_buffer(&self) -> &DeltaBuffer {
        &self.text
    }

    /// The reasoning buffer.
    pub fn reasoning_buffer(&self) -> &DeltaBuffer {
        &self.reasoning
    }

    /// Check if both buffers are empty.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.reasoning.is_empty()
    }

    /// Earliest pending flush deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.text.deadline, self.reasoning.deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Accept one upstream fragment.
    pub fn push(&mut self, fragment: Fragment, now: Instant) -> Vec<Fragment> {
        self.seq += 1;
        match fragment {
            Fragment::TextDelta { id, text } => self.push_delta(Lane::Text, id, &text, None, now),
            Fragment::ReasoningDelta {
                id,
                text,
                provider_metadata,
            } => {
                if self.redaction_sentinels.iter().any(|s| *s == text) {
                    trace!(id = %id, "Dropping redacted reasoning delta");
                    return Vec::new();
                }
                self.push_delta(Lane::Reasoning, id, &text, provider_metadata, now)
            }
            other => {
                let mut ready = self.flush_all();
                ready.push(other);
                ready
            }
        }
    }

    fn push_delta(
        &mut self,
        lane: Lane,
        id: String,
        text: &str,
        metadata: Option<Value>,
        now: Instant,
    ) -> Vec<Fragment> {
        let mut ready = Vec::new();
        let (buffer, other) = match lane {
            Lane::Text => (&mut self.text, &mut self.reasoning),
            Lane::Reasoning => (&mut self.reasoning, &mut self.text),
        };

        // Reasoning goes out ahead of the answer that follows it. In line
        // mode a partial answer line stays buffered while reasoning arrives.
        match (lane, self.mode) {
            (Lane::Reasoning, ChunkingMode::Line) => {}
            _ => ready.extend(other.take_all()),
        }

        if !buffer.is_empty() && buffer.id.as_deref() != Some(id.as_str()) {
            debug!(
                lane = ?lane,
                previous = ?buffer.id,
                next = %id,
                "Block id changed, flushing buffer"
            );
            ready.extend(buffer.take_all());
        }

        buffer.append(id, text, metadata, self.seq);

        if self.interval.is_zero() {
            ready.extend(buffer.take_all());
            return ready;
        }

        if self.mode == ChunkingMode::Line {
            ready.extend(buffer.take_ready(ChunkingMode::Line));
        }
        if buffer.is_empty() {
            buffer.cancel_timer();
        } else {
            buffer.arm_timer(now, self.interval);
        }

        ready
    }

    /// Flush every buffer whose deadline has passed.
    ///
    /// Buffers that still hold content afterwards are rescheduled.
    pub fn flush_expired(&mut self, now: Instant) -> Vec<Fragment> {
        let (mode, interval) = (self.mode, self.interval);
        let mut ready = Vec::new();
        for buffer in self.ordered_buffers() {
            match buffer.deadline {
                Some(deadline) if deadline <= now => {}
                _ => continue,
            }
            buffer.cancel_timer();
            if let Some(fragment) = buffer.take_ready(mode) {
                trace!(lane = ?buffer.lane, "Timer flush");
                ready.push(fragment);
            }
            if !buffer.is_empty() {
                buffer.arm_timer(now, interval);
            }
        }
        ready
    }

    /// Flush both buffers completely, ignoring line boundaries.
    pub fn flush_all(&mut self) -> Vec<Fragment> {
        let ready: Vec<Fragment> = self
            .ordered_buffers()
            .into_iter()
            .filter_map(DeltaBuffer::take_all)
            .collect();
        if !ready.is_empty() {
            debug!(count = ready.len(), "Force-flushed delta buffers");
        }
        ready
    }

    /// Both buffers, the one holding the older content first.
    fn ordered_buffers(&mut self) -> [&mut DeltaBuffer; 2] {
        if !self.reasoning.is_empty()
            && (self.text.is_empty() || self.reasoning.opened_at < self.text.opened_at)
        {
            [&mut self.reasoning, &mut self.text]
        } else {
            [&mut self.text, &mut self.reasoning]
        }
    }
}

pin_project! {
    /// Fragment stream with text and reasoning deltas batched.
    ///
    /// Non-delta fragments, upstream errors and the end of the upstream
    /// stream all force both buffers out first, so text always precedes the
    /// fragment that logically follows it.
    pub struct ChunkedStream<S> {
        #[pin]
        inner: S,
        chunker: Chunker,
        ready: VecDeque<StreamResult<Fragment>>,
        sleep: Option<Pin<Box<Sleep>>>,
        finished: bool,
    }
}

impl<S> ChunkedStream<S>
where
    S: Stream<Item = StreamResult<Fragment>>,
{
    /// Create a new chunked stream.
    pub fn new(inner: S, config: &StreamConfig) -> Self {
        Self {
            inner,
            chunker: Chunker::new(config),
            ready: VecDeque::new(),
            sleep: None,
            finished: false,
        }
    }

    /// Get the underlying chunker.
    pub fn chunker(&self) -> &Chunker {
        &self.chunker
    }

    /// Force out everything still queued or buffered, e.g. when abandoning
    /// the stream. Queued upstream errors are returned in their position.
    pub fn flush_pending(self: Pin<&mut Self>) -> Vec<StreamResult<Fragment>> {
        let this = self.project();
        let mut flushed: Vec<StreamResult<Fragment>> = this.ready.drain(..).collect();
        flushed.extend(this.chunker.flush_all().into_iter().map(Ok));
        flushed
    }
}

impl<S> Stream for ChunkedStream<S>
where
    S: Stream<Item = StreamResult<Fragment>>,
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
                Poll::Ready(Some(Ok(fragment))) => {
                    let out = this.chunker.push(fragment, Instant::now());
                    this.ready.extend(out.into_iter().map(Ok));
                }
                Poll::Ready(Some(Err(error))) => {
                    this.ready
                        .extend(this.chunker.flush_all().into_iter().map(Ok));
                    this.ready.push_back(Err(error));
                }
                Poll::Ready(None) => {
                    *this.finished = true;
                    this.ready
                        .extend(this.chunker.flush_all().into_iter().map(Ok));
                }
                Poll::Pending => {
                    let Some(deadline) = this.chunker.next_deadline() else {
                        return Poll::Pending;
                    };

                    let sleep = this
                        .sleep
                        .get_or_insert_with(|| Box::pin(tokio::time::sleep_until(deadline)));
                    if sleep.deadline() != deadline {
                        sleep.as_mut().reset(deadline);
                    }

                    match sleep.as_mut().poll(cx) {
                        Poll::Ready(()) => {
                            let out = this.chunker.flush_expired(Instant::now());
                            this.ready.extend(out.into_iter().map(Ok));
                        }
                        Poll::Pending => return Poll::Pending,
                    }
                }
            }
        }
    }
}

/// Extension trait for batching fragment streams.
pub trait ChunkStreamExt: Stream<Item = StreamResult<Fragment>> {
    /// Batch text and reasoning deltas according to `config`.
    fn chunked(self, config: &StreamConfig) -> ChunkedStream<Self>
    where
        Self: Sized,
    {
        ChunkedStream::new(self, config)
    }
}

impl<S: Stream<Item = StreamResult<Fragment>>> ChunkStreamExt for S {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StreamError;
    use futures::{stream, StreamExt};
    use pretty_assertions::assert_eq;

    fn line_config(ms: u64) -> StreamConfig {
        StreamConfig::default()
            .flush_interval_ms(ms)
            .chunking_mode(ChunkingMode::Line)
    }

    fn none_config(ms: u64) -> StreamConfig {
        StreamConfig::default()
            .flush_interval_ms(ms)
            .chunking_mode(ChunkingMode::None)
    }

    fn texts(fragments: &[Fragment]) -> Vec<&str> {
        fragments.iter().filter_map(Fragment::delta_text).collect()
    }

    #[test]
    fn test_line_mode_flushes_through_last_newline() {
        let mut chunker = Chunker::new(&line_config(500));
        let now = Instant::now();

        assert!(chunker.push(Fragment::text_delta("t", "Hel"), now).is_empty());
        assert!(chunker.text_buffer().has_pending_timer());

        let out = chunker.push(Fragment::text_delta("t", "lo\nwor"), now);
        assert_eq!(texts(&out), vec!["Hello\n"]);
        assert_eq!(chunker.text_buffer().content(), "wor");
    }

    #[test]
    fn test_line_mode_keeps_multiple_lines_together() {
        let mut chunker = Chunker::new(&line_config(500));
        let out = chunker.push(Fragment::text_delta("t", "a\nb\nc"), Instant::now());
        assert_eq!(texts(&out), vec!["a\nb\n"]);
        assert_eq!(chunker.text_buffer().content(), "c");
    }

    #[test]
    fn test_none_mode_waits_for_timer() {
        let mut chunker = Chunker::new(&none_config(100));
        let start = Instant::now();

        assert!(chunker.push(Fragment::text_delta("t", "a\n"), start).is_empty());
        assert!(chunker.push(Fragment::text_delta("t", "b"), start).is_empty());
        assert_eq!(chunker.next_deadline(), Some(start + Duration::from_millis(100)));

        assert!(chunker.flush_expired(start + Duration::from_millis(50)).is_empty());

        let out = chunker.flush_expired(start + Duration::from_millis(100));
        assert_eq!(texts(&out), vec!["a\nb"]);
        assert!(chunker.is_empty());
        assert_eq!(chunker.next_deadline(), None);
    }

    #[test]
    fn test_none_mode_batches_consecutive_deltas() {
        let mut chunker = Chunker::new(&none_config(500));
        let now = Instant::now();

        assert!(chunker.push(Fragment::text_delta("t", "a"), now).is_empty());
        assert!(chunker.push(Fragment::text_delta("t", "b"), now).is_empty());
        assert_eq!(chunker.text_buffer().content(), "ab");
        assert!(chunker.text_buffer().has_pending_timer());

        let out = chunker.flush_expired(now + Duration::from_millis(500));
        assert_eq!(out, vec![Fragment::text_delta("t", "ab")]);
    }

    #[test]
    fn test_line_mode_reasoning_keeps_partial_answer_line() {
        let mut chunker = Chunker::new(&line_config(500));
        let now = Instant::now();

        assert!(chunker.push(Fragment::text_delta("t", "ab"), now).is_empty());
        assert!(chunker.push(Fragment::reasoning_delta("r", "x"), now).is_empty());
        assert_eq!(chunker.text_buffer().content(), "ab");

        let out = chunker.push(Fragment::text_delta("t", "c\n"), now);
        assert_eq!(
            out,
            vec![
                Fragment::reasoning_delta("r", "x"),
                Fragment::text_delta("t", "abc\n"),
            ]
        );
        assert!(chunker.is_empty());
        assert_eq!(chunker.next_deadline(), None);
    }

    #[test]
    fn test_line_mode_timer_reschedules_partial_line() {
        let mut chunker = Chunker::new(&line_config(100));
        let start = Instant::now();
        chunker.push(Fragment::text_delta("t", "partial"), start);

        let fire = start + Duration::from_millis(100);
        assert!(chunker.flush_expired(fire).is_empty());
        assert_eq!(chunker.text_buffer().content(), "partial");
        assert_eq!(
            chunker.next_deadline(),
            Some(fire + Duration::from_millis(100))
        );
    }

    #[test]
    fn test_single_pending_timer_per_buffer() {
        let mut chunker = Chunker::new(&none_config(100));
        let start = Instant::now();
        chunker.push(Fragment::text_delta("t", "a"), start);
        chunker.push(
            Fragment::text_delta("t", "b"),
            start + Duration::from_millis(60),
        );
        assert_eq!(chunker.next_deadline(), Some(start + Duration::from_millis(100)));

        let mut buffer = DeltaBuffer::new(Lane::Text);
        assert!(buffer.arm_timer(start, Duration::from_millis(10)));
        assert!(!buffer.arm_timer(start, Duration::from_millis(99)));
        assert_eq!(buffer.deadline(), Some(start + Duration::from_millis(10)));
    }

    #[test]
    fn test_id_change_forces_full_flush() {
        let mut chunker = Chunker::new(&line_config(500));
        let now = Instant::now();
        chunker.push(Fragment::text_delta("a", "first turn"), now);

        let out = chunker.push(Fragment::text_delta("b", "second"), now);
        assert_eq!(
            out,
            vec![Fragment::text_delta("a", "first turn")]
        );
        assert_eq!(chunker.text_buffer().id(), Some("b"));
        assert_eq!(chunker.text_buffer().content(), "second");
    }

    #[test]
    fn test_non_delta_flushes_before_forwarding() {
        let mut chunker = Chunker::new(&line_config(500));
        let now = Instant::now();
        chunker.push(Fragment::reasoning_delta("r", "think"), now);
        chunker.push(Fragment::text_delta("t", "answer"), now);

        let call = Fragment::tool_call("c1", "search", serde_json::json!({}));
        let out = chunker.push(call.clone(), now);
        assert_eq!(
            out,
            vec![
                Fragment::text_delta("t", "answer"),
                call,
            ]
        );
        assert!(chunker.is_empty());
        assert_eq!(chunker.next_deadline(), None);
    }

    #[test]
    fn test_lane_switch_preserves_order() {
        let mut chunker = Chunker::new(&line_config(500));
        let now = Instant::now();
        chunker.push(Fragment::reasoning_delta("r", "think"), now);
        let out = chunker.push(Fragment::text_delta("t", "answer"), now);
        assert_eq!(out, vec![Fragment::reasoning_delta("r", "think")]);
    }

    #[test]
    fn test_flush_all_orders_by_arrival() {
        let mut chunker = Chunker::new(&line_config(500));
        let now = Instant::now();
        chunker.text.append("t".into(), "late", None, 5);
        chunker.reasoning.append("r".into(), "early", None, 2);
        chunker.text.arm_timer(now, Duration::from_millis(1));

        let out = chunker.flush_all();
        assert_eq!(texts(&out), vec!["early", "late"]);
        assert_eq!(chunker.next_deadline(), None);
    }

    #[test]
    fn test_redaction_sentinel_never_touches_buffer() {
        let mut chunker = Chunker::new(&none_config(100));
        let out = chunker.push(Fragment::reasoning_delta("r", "[REDACTED]"), Instant::now());
        assert!(out.is_empty());
        assert!(chunker.reasoning_buffer().is_empty());
        assert!(chunker.reasoning_buffer().id().is_none());
        assert!(!chunker.reasoning_buffer().has_pending_timer());
    }

    #[test]
    fn test_zero_interval_passes_through() {
        let mut chunker = Chunker::new(&line_config(0));
        let out = chunker.push(Fragment::text_delta("t", "no newline"), Instant::now());
        assert_eq!(texts(&out), vec!["no newline"]);
        assert_eq!(chunker.next_deadline(), None);
    }

    #[test]
    fn test_reasoning_metadata_survives_batching() {
        let mut chunker = Chunker::new(&none_config(100));
        let now = Instant::now();
        chunker.push(Fragment::reasoning_delta("r", "a"), now);
        chunker.push(
            Fragment::ReasoningDelta {
                id: "r".into(),
                text: "b".into(),
                provider_metadata: Some(serde_json::json!({"sig": "x"})),
            },
            now,
        );
        let out = chunker.flush_all();
        assert_eq!(
            out,
            vec![Fragment::ReasoningDelta {
                id: "r".into(),
                text: "ab".into(),
                provider_metadata: Some(serde_json::json!({"sig": "x"})),
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_chunked_stream_concatenation() {
        let deltas = ["Hel", "lo", "\nwor", "ld", "!\n", "tail"];
        for config in [line_config(500), none_config(500), line_config(0), none_config(0)] {
            let source = stream::iter(
                deltas
                    .iter()
                    .map(|d| Ok(Fragment::text_delta("t", *d)))
                    .collect::<Vec<_>>(),
            );
            let out: Vec<Fragment> = source
                .chunked(&config)
                .map(|r| r.unwrap())
                .collect()
                .await;
            let joined: String = texts(&out).concat();
            assert_eq!(joined, "Hello\nworld!\ntail", "config {:?}", config);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_chunked_stream_line_property() {
        let deltas = ["a", "b\nc", "d", "e\n", "f\ng", "h"];
        let source = stream::iter(
            deltas
                .iter()
                .map(|d| Ok(Fragment::text_delta("t", *d)))
                .collect::<Vec<_>>(),
        );
        let out: Vec<Fragment> = source
            .chunked(&line_config(500))
            .map(|r| r.unwrap())
            .collect()
            .await;
        let emitted = texts(&out);
        assert_eq!(emitted, vec!["ab\n", "cde\n", "f\n", "gh"]);
        for delta in &emitted[..emitted.len() - 1] {
            assert!(delta.ends_with('\n'));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_chunked_stream_timer_flush() {
        let (tx, rx) = futures::channel::mpsc::unbounded::<StreamResult<Fragment>>();
        let mut chunked = Box::pin(rx.chunked(&none_config(200)));

        tx.unbounded_send(Ok(Fragment::text_delta("t", "slow"))).unwrap();

        let started = Instant::now();
        let first = chunked.next().await.unwrap().unwrap();
        assert_eq!(first, Fragment::text_delta("t", "slow"));
        assert!(started.elapsed() >= Duration::from_millis(200));

        drop(tx);
        assert!(chunked.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_chunked_stream_id_change_before_timer() {
        let (tx, rx) = futures::channel::mpsc::unbounded::<StreamResult<Fragment>>();
        let mut chunked = Box::pin(rx.chunked(&none_config(1_000)));

        tx.unbounded_send(Ok(Fragment::text_delta("a", "turn one")))
            .unwrap();
        tx.unbounded_send(Ok(Fragment::text_delta("b", "turn two")))
            .unwrap();

        let first = chunked.next().await.unwrap().unwrap();
        assert_eq!(first, Fragment::text_delta("a", "turn one"));
        assert_eq!(chunked.chunker().text_buffer().content(), "turn two");

        drop(tx);
        let second = chunked.next().await.unwrap().unwrap();
        assert_eq!(second, Fragment::text_delta("b", "turn two"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_chunked_stream_flushes_before_error() {
        let source = stream::iter(vec![
            Ok(Fragment::text_delta("t", "partial")),
            Err(StreamError::source("connection reset")),
        ]);
        let out: Vec<StreamResult<Fragment>> =
            source.chunked(&line_config(500)).collect().await;

        assert_eq!(out.len(), 2);
        assert_eq!(
            out[0].as_ref().unwrap(),
            &Fragment::text_delta("t", "partial")
        );
        assert!(matches!(out[1], Err(StreamError::Source(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_chunked_stream_flush_pending() {
        let (tx, rx) = futures::channel::mpsc::unbounded::<StreamResult<Fragment>>();
        let mut chunked = Box::pin(rx.chunked(&none_config(1_000)));
        tx.unbounded_send(Ok(Fragment::text_delta("t", "abandoned")))
            .unwrap();

        let poll = futures::poll!(chunked.next());
        assert!(poll.is_pending());

        let flushed = chunked.as_mut().flush_pending();
        assert_eq!(flushed.len(), 1);
        assert_eq!(
            flushed[0].as_ref().unwrap(),
            &Fragment::text_delta("t", "abandoned")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_pending_keeps_queued_errors() {
        let source = stream::iter(vec![
            Ok(Fragment::text_delta("t", "partial")),
            Err(StreamError::source("connection reset")),
        ]);
        let mut chunked = Box::pin(source.chunked(&line_config(500)));

        let first = chunked.next().await.unwrap().unwrap();
        assert_eq!(first, Fragment::text_delta("t", "partial"));

        let flushed = chunked.as_mut().flush_pending();
        assert_eq!(flushed.len(), 1);
        assert!(matches!(flushed[0], Err(StreamError::Source(_))));
    }
}

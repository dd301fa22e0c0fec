//! The stream loop.
//!
//! [`StreamProcessor`] consumes a fragment source, batches deltas, classifies
//! fragments, assembles the completion and publishes everything to an
//! [`EventSink`]. Each call to [`StreamProcessor::run`] owns a fresh
//! [`StreamState`] and [`Chunker`]; nothing is shared between streams.
//!
//! ```text
//! source ──► raw-fragment
//!    │
//!    ▼
//! Chunker ──► finish? ──yes──► CompletionAssembler ──► complete
//!                │
//!                no
//!                ▼
//!          ChunkClassifier ──► content / reasoning / kind-changed / tool-* / ...
//! ```

use crate::chunker::Chunker;
use crate::classifier::{ChunkClassifier, StreamState};
use crate::completion::{CompletionAssembler, CompletionSummary};
use crate::config::StreamConfig;
use crate::error::StreamResult;
use crate::events::StreamEvent;
use crate::sink::EventSink;
use crate::tool_correlator::ContextProbe;
use chunkline_core::Fragment;
use futures::{Stream, StreamExt};
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// How a stream run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamOutcome {
    /// The source ended after a finish marker.
    Completed(Box<CompletionSummary>),
    /// The source ended without a finish marker.
    Ended,
    /// The run was cancelled; no completion was assembled.
    Cancelled,
}

impl StreamOutcome {
    /// Get the summary if the stream completed.
    pub fn summary(&self) -> Option<&CompletionSummary> {
        match self {
            Self::Completed(summary) => Some(&**summary),
            _ => None,
        }
    }

    /// Check if the run was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Drives fragment streams through the pipeline.
#[derive(Debug, Clone)]
pub struct StreamProcessor {
    config: StreamConfig,
    classifier: ChunkClassifier,
    assembler: CompletionAssembler,
}

impl Default for StreamProcessor {
    fn default() -> Self {
        Self::new(StreamConfig::default())
    }
}

/// Mutable state of one run.
struct Run<'a, K: ?Sized> {
    processor: &'a StreamProcessor,
    sink: &'a mut K,
    state: StreamState,
    chunker: Chunker,
    summary: Option<CompletionSummary>,
}

impl<K: EventSink + ?Sized> Run<'_, K> {
    async fn emit(&mut self, events: Vec<StreamEvent>) -> StreamResult<()> {
        for event in events {
            self.sink.publish(event).await?;
        }
        Ok(())
    }

    /// Route chunker output: finish to the assembler, the rest to the
    /// classifier.
    async fn dispatch(&mut self, fragments: Vec<Fragment>) -> StreamResult<()> {
        for fragment in fragments {
            match fragment {
                Fragment::Finish(finish) => {
                    let summary = self.processor.assembler.assemble(&mut self.state, finish);
                    info!(
                        finish_reason = %summary.finish_reason,
                        total_tokens = summary.usage.total_tokens,
                        "Stream finished"
                    );
                    self.summary = Some(summary.clone());
                    self.sink.publish(StreamEvent::Complete(summary)).await?;
                }
                other => {
                    let events = self.processor.classifier.classify(&mut self.state, other);
                    self.emit(events).await?;
                }
            }
        }
        Ok(())
    }

    fn outcome(self) -> StreamOutcome {
        match self.summary {
            Some(summary) => StreamOutcome::Completed(Box::new(summary)),
            None => StreamOutcome::Ended,
        }
    }
}

impl StreamProcessor {
    /// Create a processor.
    #[must_use]
    pub fn new(config: StreamConfig) -> Self {
        Self {
            classifier: ChunkClassifier::new(&config),
            assembler: CompletionAssembler::new(&config),
            config,
        }
    }

    /// Attach a context probe used to annotate tool calls.
    #[must_use]
    pub fn with_context_probe(mut self, probe: Arc<dyn ContextProbe>) -> Self {
        self.classifier = self.classifier.with_context_probe(probe);
        self
    }

    /// Get the configuration.
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Consume `source` and publish its events to `sink`.
    ///
    /// Buffered deltas are always flushed before this returns, whether the
    /// source ended, failed or the run was cancelled. A source error is
    /// returned after the flush; errors from the sink abort the run.
    pub async fn run<S, K>(
        &self,
        source: S,
        sink: &mut K,
        cancel: CancellationToken,
    ) -> StreamResult<StreamOutcome>
    where
        S: Stream<Item = StreamResult<Fragment>>,
        K: EventSink + ?Sized,
    {
        let stream_id = Uuid::new_v4();
        let span = info_span!("chunk_stream", stream_id = %stream_id);
        self.drive(source, sink, cancel).instrument(span).await
    }

    async fn drive<S, K>(
        &self,
        source: S,
        sink: &mut K,
        cancel: CancellationToken,
    ) -> StreamResult<StreamOutcome>
    where
        S: Stream<Item = StreamResult<Fragment>>,
        K: EventSink + ?Sized,
    {
        futures::pin_mut!(source);
        let mut run = Run {
            processor: self,
            sink,
            state: StreamState::new(),
            chunker: Chunker::new(&self.config),
            summary: None,
        };

        debug!(
            flush_interval_ms = self.config.flush_interval_ms,
            chunking_mode = %self.config.chunking_mode,
            "Stream started"
        );

        loop {
            let deadline = run.chunker.next_deadline();

            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    let pending = run.chunker.flush_all();
                    info!(flushed = pending.len(), "Stream cancelled");
                    run.dispatch(pending).await?;
                    return Ok(StreamOutcome::Cancelled);
                }

                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    let ready = run.chunker.flush_expired(Instant::now());
                    run.dispatch(ready).await?;
                }

                next = source.next() => match next {
                    Some(Ok(fragment)) => {
                        if self.config.emit_raw_fragments {
                            run.sink
                                .publish(StreamEvent::RawFragment { fragment: fragment.clone() })
                                .await?;
                        }
                        let ready = run.chunker.push(fragment, Instant::now());
                        run.dispatch(ready).await?;
                    }
                    Some(Err(error)) => {
                        warn!(error = %error, "Fragment source failed");
                        let pending = run.chunker.flush_all();
                        run.dispatch(pending).await?;
                        return Err(error);
                    }
                    None => {
                        let pending = run.chunker.flush_all();
                        run.dispatch(pending).await?;
                        if run.summary.is_none() {
                            warn!("Source ended without a finish marker");
                        }
                        return Ok(run.outcome());
                    }
                },
            }
        }
    }

    /// Run to completion, collecting every event in memory.
    pub async fn collect<S>(&self, source: S) -> StreamResult<(Vec<StreamEvent>, StreamOutcome)>
    where
        S: Stream<Item = StreamResult<Fragment>>,
    {
        let mut events = Vec::new();
        let outcome = self
            .run(source, &mut events, CancellationToken::new())
            .await?;
        Ok((events, outcome))
    }
}

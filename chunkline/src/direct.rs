//! Direct processing functions.
//!
//! Thin wrappers around [`StreamProcessor`] for the common cases: collect
//! everything in memory, decode an SSE body, or run a stream in the
//! background and fan its events out over an [`EventBus`].
//!
//! # Examples
//!
//! ## Background processing with subscribers
//!
//! ```rust,ignore
//! use chunkline::direct::spawn_processor;
//! use chunkline::prelude::*;
//!
//! let bus = EventBus::new();
//! let mut content = bus.subscribe(EventChannel::Content, 64);
//! let handle = spawn_processor(source, StreamConfig::from_env()?, bus, CancellationToken::new());
//!
//! while let Some(event) = content.recv().await {
//!     print!("{}", event);
//! }
//! let outcome = handle.await??;
//! ```

use bytes::Bytes;
use chunkline_core::Fragment;
use chunkline_streaming::{
    EventBus, EventSink, FragmentSseStream, StreamConfig, StreamEvent, StreamOutcome,
    StreamProcessor, StreamResult,
};
use futures::Stream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Run `source` to the end and return every event with the outcome.
pub async fn collect_events<S>(
    source: S,
    config: StreamConfig,
) -> StreamResult<(Vec<StreamEvent>, StreamOutcome)>
where
    S: Stream<Item = StreamResult<Fragment>>,
{
    StreamProcessor::new(config).collect(source).await
}

/// Decode an SSE body into fragments and publish their events to `sink`.
///
/// Events whose data is not a valid fragment are logged and skipped.
pub async fn process_sse<B, K>(
    body: B,
    sink: &mut K,
    config: StreamConfig,
    cancel: CancellationToken,
) -> StreamResult<StreamOutcome>
where
    B: Stream<Item = Result<Bytes, std::io::Error>>,
    K: EventSink + ?Sized,
{
    let fragments = FragmentSseStream::new(body).skip_malformed(true);
    StreamProcessor::new(config)
        .run(fragments, sink, cancel)
        .await
}

/// Spawn a task that runs `source` and publishes to `bus`.
///
/// Subscribe to the bus before calling this, or early events are missed.
pub fn spawn_processor<S>(
    source: S,
    config: StreamConfig,
    bus: EventBus,
    cancel: CancellationToken,
) -> JoinHandle<StreamResult<StreamOutcome>>
where
    S: Stream<Item = StreamResult<Fragment>> + Send + 'static,
{
    debug!(subscribers = bus.subscriber_count(), "Spawning stream processor");
    tokio::spawn(async move {
        let mut bus = bus;
        StreamProcessor::new(config)
            .run(source, &mut bus, cancel)
            .await
    })
}

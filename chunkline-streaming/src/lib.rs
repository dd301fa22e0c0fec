//! # chunkline-streaming
//!
//! Chunking, classification and completion assembly for generative text
//! streams.
//!
//! A generation backend streams [`Fragment`](chunkline_core::Fragment)s.
//! This crate batches their text, classifies them into semantic events,
//! correlates tool calls with results and assembles a completion summary
//! when the finish marker arrives.
//!
//! ## Core Concepts
//!
//! - **[`Chunker`] / [`ChunkedStream`]**: line-aware batching of text and
//!   reasoning deltas with a bounded flush latency
//! - **[`ChunkClassifier`]**: fragment to [`StreamEvent`] translation with
//!   kind transition tracking
//! - **[`ToolCorrelator`]**: tool call, result and error lifecycle events
//! - **[`CompletionAssembler`]**: the final [`CompletionSummary`]
//! - **[`StreamProcessor`]**: the loop tying them together and publishing to
//!   an [`EventSink`]
//! - **[`FragmentSseStream`]**: fragments decoded from an SSE byte stream
//!
//! ## Example
//!
//! ```rust
//! use chunkline_core::{FinishFragment, Fragment};
//! use chunkline_streaming::{StreamConfig, StreamProcessor};
//! use futures::stream;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), chunkline_streaming::StreamError> {
//! let processor = StreamProcessor::new(StreamConfig::default());
//! let source = stream::iter(vec![
//!     Ok(Fragment::text_delta("t1", "Hello")),
//!     Ok(Fragment::text_delta("t1", " world")),
//!     Ok(Fragment::Finish(FinishFragment::new("stop"))),
//! ]);
//!
//! let (_events, outcome) = processor.collect(source).await?;
//! assert_eq!(outcome.summary().map(|s| s.message.as_str()), Some("Hello world"));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod chunker;
pub mod classifier;
pub mod completion;
pub mod config;
pub mod error;
pub mod event_stream;
pub mod events;
pub mod processor;
pub mod sink;
pub mod sse;
pub mod tool_correlator;

// Re-exports
pub use chunker::{ChunkStreamExt, ChunkedStream, Chunker, DeltaBuffer, Lane};
pub use classifier::{ChunkClassifier, StreamState};
pub use completion::{
    invalid_tool_calls, CompletionAssembler, CompletionSummary, MessageSource,
    CAPTURE_FAILURE_MESSAGE,
};
pub use config::{ChunkingMode, StreamConfig};
pub use error::{StreamError, StreamResult};
pub use event_stream::{ChannelStream, CompletionStream, ContentStream, EventStreamExt};
pub use events::{EventChannel, StreamEvent};
pub use processor::{StreamOutcome, StreamProcessor};
pub use sink::{receiver_stream, EventBus, EventSink};
pub use sse::{FragmentSseStream, SseEvent, SseParser};
pub use tool_correlator::{
    detect_tool_error, ContextProbe, ContextSnapshot, ToolCorrelator, ToolErrorInfo,
};

/// Prelude for common imports.
pub mod prelude {
    pub use crate::{
        ChunkStreamExt, ChunkingMode, CompletionSummary, ContextProbe, ContextSnapshot,
        EventBus, EventChannel, EventSink, EventStreamExt, StreamConfig, StreamError,
        StreamEvent, StreamOutcome, StreamProcessor, StreamResult,
    };
}

/// Shared helpers for unit tests.
#[cfg(test)]
pub(crate) mod test_util {
    /// Install a test-writer subscriber filtered by `RUST_LOG`.
    pub(crate) fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prelude_imports() {
        use crate::prelude::*;

        let config = StreamConfig::default();
        assert_eq!(config.chunking_mode, ChunkingMode::Line);
        assert_eq!(EventChannel::Complete.as_str(), "complete");
        let _ = StreamProcessor::new(config);
    }
}

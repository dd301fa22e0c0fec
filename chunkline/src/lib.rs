//! # chunkline
//!
//! Streaming chunk classification, buffering and correlation for generative
//! text backends.
//!
//! A backend streams a sequence of heterogeneous fragments: answer text,
//! reasoning text, tool calls and results, errors, lifecycle markers and a
//! terminal finish marker. chunkline turns that raw sequence into a clean,
//! ordered stream of semantic events on named channels, and produces a final
//! completion summary.
//!
//! ## Quick Start
//!
//! ```rust
//! use chunkline::prelude::*;
//! use futures::stream;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), StreamError> {
//! let source = stream::iter(vec![
//!     Ok(Fragment::text_delta("t1", "Hello")),
//!     Ok(Fragment::text_delta("t1", " world")),
//!     Ok(Fragment::finish("stop")),
//! ]);
//!
//! let (events, outcome) = chunkline::direct::collect_events(source, StreamConfig::default()).await?;
//! let text: String = events.iter().filter_map(StreamEvent::as_content).collect();
//! assert_eq!(text, "Hello world");
//! assert_eq!(outcome.summary().map(|s| s.message.as_str()), Some("Hello world"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Channels
//!
//! | Channel | Payload |
//! |---------|---------|
//! | `content` | answer text delta |
//! | `reasoning` | reasoning text delta |
//! | `kind-changed` | previous and new fragment kind |
//! | `tool-will-execute` | tool call id, name, arguments, usage snapshot |
//! | `tool-did-execute` | tool call id, name, result, error flag |
//! | `stream-error` | backend error payload |
//! | `complete` | completion summary |
//! | `raw-fragment` | unmodified input fragment |
//! | `trace` | lifecycle and unrecognised fragments |
//!
//! ## Architecture
//!
//! - [`chunkline_core`] - Fragment, usage and error types
//! - [`chunkline_streaming`] - Chunker, classifier, tool correlator,
//!   completion assembler, sinks and the stream processor
//!
//! ## Configuration
//!
//! [`StreamConfig::from_env`] reads `CHUNKLINE_FLUSH_INTERVAL_MS` and
//! `CHUNKLINE_CHUNKING_MODE` on top of the defaults (500 ms, `line`).

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

/// One-call helpers for driving a fragment source.
pub mod direct;

/// Fragment, usage and error types.
pub use chunkline_core as core;

/// Chunking, classification and completion assembly.
pub use chunkline_streaming as streaming;

// Fragments
pub use chunkline_core::{
    CompletionUsage, CoreError, FinishFragment, Fragment, FragmentKind, StepResult, TokenUsage,
    ToolCall, ToolError, ToolResult,
};

// Pipeline
pub use chunkline_streaming::{
    ChunkClassifier, ChunkedStream, Chunker, ChunkingMode, CompletionAssembler,
    CompletionSummary, ContextProbe, ContextSnapshot, EventBus, EventChannel, EventSink,
    FragmentSseStream, MessageSource, StreamConfig, StreamError, StreamEvent, StreamOutcome,
    StreamProcessor, StreamResult, StreamState, ToolCorrelator, CAPTURE_FAILURE_MESSAGE,
};

/// Convenient prelude for common imports.
///
/// ```rust
/// use chunkline::prelude::*;
///
/// let config = StreamConfig::default().chunking_mode(ChunkingMode::None);
/// let processor = StreamProcessor::new(config);
/// # let _ = processor;
/// ```
pub mod prelude {
    pub use chunkline_core::{
        CompletionUsage, FinishFragment, Fragment, FragmentKind, TokenUsage, ToolCall,
    };
    pub use chunkline_streaming::prelude::*;
}

/// Returns the current version of chunkline.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(version(), "0.1.0");
    }

    #[test]
    fn test_prelude_imports() {
        use crate::prelude::*;

        let fragment = Fragment::text_delta("t", "x");
        assert_eq!(fragment.kind(), FragmentKind::TextDelta);
        assert_eq!(StreamConfig::default().flush_interval_ms, 500);
    }
}

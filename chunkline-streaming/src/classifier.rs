//! Fragment classification.
//!
//! [`ChunkClassifier`] turns each fragment into zero or more
//! [`StreamEvent`]s and tracks kind transitions in a per-stream
//! [`StreamState`]. A `kind-changed` event is always produced before any
//! other event of the new kind, and every transition clears the cached
//! completion text so the text handed to the completion assembler is the
//! final contiguous run of text deltas.
//!
//! Lifecycle fragments (`text-start`, `finish-step`, ...) and unrecognised
//! kinds are diagnostic only: they never take part in transition tracking.
//! The finish marker never comes through here; see
//! [`CompletionAssembler`](crate::completion::CompletionAssembler).

use crate::config::StreamConfig;
use crate::events::StreamEvent;
use crate::tool_correlator::{ContextProbe, ToolCorrelator};
use chunkline_core::{Fragment, FragmentKind};
use std::sync::Arc;
use tracing::{trace, warn};

/// Per-stream classification state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamState {
    previous_kind: Option<FragmentKind>,
    cached_completion_text: String,
}

impl StreamState {
    /// Fresh state for a new stream.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Kind of the last classified (non-diagnostic) fragment.
    pub fn previous_kind(&self) -> Option<FragmentKind> {
        self.previous_kind
    }

    /// Text accumulated since the last kind transition.
    pub fn cached_completion_text(&self) -> &str {
        &self.cached_completion_text
    }

    /// Take the cached text, leaving the cache empty.
    pub fn take_cached_completion_text(&mut self) -> String {
        std::mem::take(&mut self.cached_completion_text)
    }
}

/// Whether a kind is surfaced only as a diagnostic.
fn is_diagnostic(kind: FragmentKind) -> bool {
    matches!(
        kind,
        FragmentKind::ToolInputStart
            | FragmentKind::ToolInputDelta
            | FragmentKind::ToolInputEnd
            | FragmentKind::ReasoningStart
            | FragmentKind::ReasoningEnd
            | FragmentKind::TextStart
            | FragmentKind::TextEnd
            | FragmentKind::StartStep
            | FragmentKind::FinishStep
            | FragmentKind::Unknown
    )
}

/// Classifies fragments into stream events.
#[derive(Debug, Clone)]
pub struct ChunkClassifier {
    config: StreamConfig,
    tools: ToolCorrelator,
}

impl ChunkClassifier {
    /// Create a classifier for the given configuration.
    #[must_use]
    pub fn new(config: &StreamConfig) -> Self {
        Self {
            config: config.clone(),
            tools: ToolCorrelator::new(),
        }
    }

    /// Attach a context probe used to annotate tool calls.
    #[must_use]
    pub fn with_context_probe(mut self, probe: Arc<dyn ContextProbe>) -> Self {
        self.tools = self.tools.with_context_probe(probe);
        self
    }

    /// Classify one fragment.
    ///
    /// Returns the events to publish, in order.
    pub fn classify(&self, state: &mut StreamState, fragment: Fragment) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        let kind = fragment.kind();

        if let Fragment::ReasoningDelta { text, .. } = &fragment {
            if self.config.is_redaction_sentinel(text) {
                trace!("Dropping redacted reasoning delta");
                return events;
            }
        }

        if kind == FragmentKind::Finish {
            warn!("Finish marker reached the classifier; it belongs to the completion assembler");
            if self.config.emit_trace_events {
                events.push(StreamEvent::Trace {
                    kind: kind.as_str().to_string(),
                    fragment,
                });
            }
            return events;
        }

        if is_diagnostic(kind) {
            self.diagnostic(&mut events, fragment);
            return events;
        }

        if state.previous_kind != Some(kind) {
            events.push(StreamEvent::kind_changed(state.previous_kind, kind));
            state.cached_completion_text.clear();
            state.previous_kind = Some(kind);
        }

        match fragment {
            Fragment::TextDelta { text, .. } => {
                state.cached_completion_text.push_str(&text);
                events.push(StreamEvent::Content { delta: text });
            }
            Fragment::ReasoningDelta { text, .. } => {
                events.push(StreamEvent::Reasoning { delta: text });
            }
            Fragment::ToolCall(call) => events.push(self.tools.handle_tool_call(call)),
            Fragment::ToolResult(result) => events.push(self.tools.handle_tool_result(result)),
            Fragment::ToolError(failure) => events.push(self.tools.handle_tool_error(failure)),
            Fragment::Error { error } => {
                warn!(error = %error, "Backend reported an error");
                events.push(StreamEvent::StreamError { error });
            }
            other => self.diagnostic(&mut events, other),
        }

        events
    }

    fn diagnostic(&self, events: &mut Vec<StreamEvent>, fragment: Fragment) {
        match &fragment {
            Fragment::Unknown { kind, .. } => {
                warn!(kind = %kind, "Unrecognised fragment kind");
                events.push(StreamEvent::Trace {
                    kind: kind.clone(),
                    fragment,
                });
            }
            _ => {
                let kind = fragment.kind();
                trace!(kind = %kind, "Lifecycle fragment");
                if self.config.emit_trace_events {
                    events.push(StreamEvent::Trace {
                        kind: kind.as_str().to_string(),
                        fragment,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn classify_all(fragments: Vec<Fragment>) -> (Vec<StreamEvent>, StreamState) {
        let classifier = ChunkClassifier::new(&StreamConfig::default());
        let mut state = StreamState::new();
        let events = fragments
            .into_iter()
            .flat_map(|f| classifier.classify(&mut state, f))
            .collect();
        (events, state)
    }

    #[test]
    fn test_first_fragment_announces_kind() {
        let (events, state) = classify_all(vec![Fragment::text_delta("t", "Hi")]);
        assert_eq!(
            events,
            vec![
                StreamEvent::kind_changed(None, FragmentKind::TextDelta),
                StreamEvent::content("Hi"),
            ]
        );
        assert_eq!(state.previous_kind(), Some(FragmentKind::TextDelta));
        assert_eq!(state.cached_completion_text(), "Hi");
    }

    #[test]
    fn test_same_kind_does_not_repeat_transition() {
        let (events, state) = classify_all(vec![
            Fragment::text_delta("t", "Hello"),
            Fragment::text_delta("t", " world"),
        ]);
        let transitions = events
            .iter()
            .filter(|e| matches!(e, StreamEvent::KindChanged { .. }))
            .count();
        assert_eq!(transitions, 1);
        assert_eq!(state.cached_completion_text(), "Hello world");
    }

    #[test]
    fn test_tool_call_between_text_runs() {
        let (events, state) = classify_all(vec![
            Fragment::text_delta("t", "A"),
            Fragment::tool_call("c1", "search", json!({})),
            Fragment::text_delta("t", "B"),
        ]);

        let text_to_tool = events
            .iter()
            .filter(|e| {
                **e == StreamEvent::kind_changed(
                    Some(FragmentKind::TextDelta),
                    FragmentKind::ToolCall,
                )
            })
            .count();
        assert_eq!(text_to_tool, 1);

        let position = |needle: &StreamEvent| events.iter().position(|e| e == needle).unwrap();
        let change = position(&StreamEvent::kind_changed(
            Some(FragmentKind::TextDelta),
            FragmentKind::ToolCall,
        ));
        let will_execute = events
            .iter()
            .position(|e| matches!(e, StreamEvent::ToolWillExecute { .. }))
            .unwrap();
        assert!(change < will_execute);

        assert_eq!(state.cached_completion_text(), "B");
    }

    #[test]
    fn test_reasoning_is_not_cached() {
        let (events, state) = classify_all(vec![
            Fragment::text_delta("t", "draft"),
            Fragment::reasoning_delta("r", "thinking"),
        ]);
        assert!(events.contains(&StreamEvent::reasoning("thinking")));
        assert_eq!(state.cached_completion_text(), "");
        assert_eq!(state.previous_kind(), Some(FragmentKind::ReasoningDelta));
    }

    #[test]
    fn test_redacted_reasoning_is_dropped() {
        let (events, state) = classify_all(vec![Fragment::reasoning_delta("r", "[REDACTED]")]);
        assert!(events.is_empty());
        assert_eq!(state, StreamState::new());
    }

    #[test]
    fn test_backend_error_becomes_event() {
        let (events, _) = classify_all(vec![Fragment::error(json!({"message": "overloaded"}))]);
        assert_eq!(
            events,
            vec![
                StreamEvent::kind_changed(None, FragmentKind::Error),
                StreamEvent::StreamError {
                    error: json!({"message": "overloaded"})
                },
            ]
        );
    }

    #[test]
    fn test_tool_error_goes_through_transition() {
        let (events, _) = classify_all(vec![
            Fragment::tool_call("c1", "write", json!({})),
            Fragment::tool_error("c1", "write", json!("denied")),
        ]);
        assert!(events.contains(&StreamEvent::kind_changed(
            Some(FragmentKind::ToolCall),
            FragmentKind::ToolError
        )));
        assert!(matches!(
            events.last(),
            Some(StreamEvent::ToolDidExecute { error: true, .. })
        ));
    }

    #[test]
    fn test_lifecycle_fragments_keep_cached_text() {
        let (events, state) = classify_all(vec![
            Fragment::TextStart { id: "t".into() },
            Fragment::text_delta("t", "kept"),
            Fragment::TextEnd { id: "t".into() },
            Fragment::FinishStep,
        ]);
        assert_eq!(state.cached_completion_text(), "kept");
        assert_eq!(state.previous_kind(), Some(FragmentKind::TextDelta));

        let traces: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Trace { kind, .. } => Some(kind.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(traces, vec!["text-start", "text-end", "finish-step"]);
    }

    #[test]
    fn test_unknown_kind_always_surfaces() {
        let classifier =
            ChunkClassifier::new(&StreamConfig::default().emit_trace_events(false));
        let mut state = StreamState::new();

        let lifecycle = classifier.classify(&mut state, Fragment::StartStep);
        assert!(lifecycle.is_empty());

        let unknown = Fragment::Unknown {
            kind: "source".into(),
            raw: json!({"type": "source"}),
        };
        let events = classifier.classify(&mut state, unknown.clone());
        assert_eq!(
            events,
            vec![StreamEvent::Trace {
                kind: "source".into(),
                fragment: unknown,
            }]
        );
        assert_eq!(state.previous_kind(), None);
    }

    #[test]
    fn test_finish_never_transitions() {
        let (events, state) = classify_all(vec![
            Fragment::text_delta("t", "answer"),
            Fragment::finish("stop"),
        ]);
        assert!(!events.iter().any(|e| matches!(
            e,
            StreamEvent::KindChanged {
                to: FragmentKind::Finish,
                ..
            }
        )));
        assert_eq!(state.cached_completion_text(), "answer");
    }
}

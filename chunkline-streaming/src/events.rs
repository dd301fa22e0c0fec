//! Classified stream events.
//!
//! This module defines the events published to the event sink and the named
//! channels they travel on. Channel names are part of the public contract.

use crate::completion::CompletionSummary;
use crate::tool_correlator::ContextSnapshot;
use chunkline_core::{Fragment, FragmentKind};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// Named channel an event is published on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventChannel {
    /// Answer text deltas.
    Content,
    /// Reasoning text deltas.
    Reasoning,
    /// Fragment kind transitions.
    KindChanged,
    /// Tool about to run.
    ToolWillExecute,
    /// Tool finished (successfully or not).
    ToolDidExecute,
    /// Backend-reported error.
    StreamError,
    /// Final completion summary.
    Complete,
    /// Unmodified input fragments.
    RawFragment,
    /// Low-priority diagnostics.
    Trace,
}

impl EventChannel {
    /// Every channel, in declaration order.
    pub const ALL: [EventChannel; 9] = [
        Self::Content,
        Self::Reasoning,
        Self::KindChanged,
        Self::ToolWillExecute,
        Self::ToolDidExecute,
        Self::StreamError,
        Self::Complete,
        Self::RawFragment,
        Self::Trace,
    ];

    /// Public name of the channel.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::Reasoning => "reasoning",
            Self::KindChanged => "kind-changed",
            Self::ToolWillExecute => "tool-will-execute",
            Self::ToolDidExecute => "tool-did-execute",
            Self::StreamError => "stream-error",
            Self::Complete => "complete",
            Self::RawFragment => "raw-fragment",
            Self::Trace => "trace",
        }
    }
}

impl fmt::Display for EventChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events emitted while classifying a fragment stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StreamEvent {
    /// Answer text delta.
    Content {
        /// The text content.
        delta: String,
    },

    /// Reasoning text delta.
    Reasoning {
        /// The reasoning content.
        delta: String,
    },

    /// The fragment kind differs from the previous fragment's.
    KindChanged {
        /// Previous kind, `None` for the first fragment of a stream.
        from: Option<FragmentKind>,
        /// New kind.
        to: FragmentKind,
    },

    /// A tool is about to run.
    #[serde(rename_all = "camelCase")]
    ToolWillExecute {
        /// Call id used to correlate the result.
        tool_call_id: String,
        /// Tool name.
        tool_name: String,
        /// Tool arguments.
        args: JsonValue,
        /// Host usage snapshot taken when the call was translated.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<ContextSnapshot>,
    },

    /// A tool finished.
    #[serde(rename_all = "camelCase")]
    ToolDidExecute {
        /// Call id of the originating call.
        tool_call_id: String,
        /// Tool name.
        tool_name: String,
        /// Tool output, or a synthesized error payload.
        result: JsonValue,
        /// Whether the result is error-shaped.
        error: bool,
    },

    /// The backend reported an error.
    StreamError {
        /// Error payload as sent by the backend.
        error: JsonValue,
    },

    /// The stream completed.
    Complete(CompletionSummary),

    /// Unmodified input fragment.
    RawFragment {
        /// The fragment.
        fragment: Fragment,
    },

    /// Diagnostic-only event for lifecycle and unrecognised fragments.
    Trace {
        /// Wire name of the fragment kind.
        kind: String,
        /// The fragment.
        fragment: Fragment,
    },
}

impl StreamEvent {
    /// Create a content event.
    pub fn content(delta: impl Into<String>) -> Self {
        Self::Content {
            delta: delta.into(),
        }
    }

    /// Create a reasoning event.
    pub fn reasoning(delta: impl Into<String>) -> Self {
        Self::Reasoning {
            delta: delta.into(),
        }
    }

    /// Create a kind change event.
    pub fn kind_changed(from: Option<FragmentKind>, to: FragmentKind) -> Self {
        Self::KindChanged { from, to }
    }

    /// Channel this event is published on.
    #[must_use]
    pub fn channel(&self) -> EventChannel {
        match self {
            Self::Content { .. } => EventChannel::Content,
            Self::Reasoning { .. } => EventChannel::Reasoning,
            Self::KindChanged { .. } => EventChannel::KindChanged,
            Self::ToolWillExecute { .. } => EventChannel::ToolWillExecute,
            Self::ToolDidExecute { .. } => EventChannel::ToolDidExecute,
            Self::StreamError { .. } => EventChannel::StreamError,
            Self::Complete(_) => EventChannel::Complete,
            Self::RawFragment { .. } => EventChannel::RawFragment,
            Self::Trace { .. } => EventChannel::Trace,
        }
    }

    /// Check if this is the completion event.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete(_))
    }

    /// Get the text if this is a content event.
    pub fn as_content(&self) -> Option<&str> {
        match self {
            Self::Content { delta } => Some(delta),
            _ => None,
        }
    }

    /// Get the summary if this is the completion event.
    pub fn as_completion(&self) -> Option<&CompletionSummary> {
        match self {
            Self::Complete(summary) => Some(summary),
            _ => None,
        }
    }
}

impl fmt::Display for StreamEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Content { delta } => write!(f, "{}", delta),
            Self::Reasoning { delta } => write!(f, "[reasoning] {}", delta),
            Self::KindChanged { from, to } => match from {
                Some(from) => write!(f, "[kind_changed] {} -> {}", from, to),
                None => write!(f, "[kind_changed] -> {}", to),
            },
            Self::ToolWillExecute { tool_name, .. } => write!(f, "[tool_start] {}", tool_name),
            Self::ToolDidExecute {
                tool_name, error, ..
            } => write!(
                f,
                "[tool_result] {} ({})",
                tool_name,
                if *error { "error" } else { "ok" }
            ),
            Self::StreamError { error } => write!(f, "[error] {}", error),
            Self::Complete(summary) => write!(f, "[complete] {}", summary.finish_reason),
            Self::RawFragment { fragment } => write!(f, "[raw] {}", fragment.kind()),
            Self::Trace { kind, .. } => write!(f, "[trace] {}", kind),
        }
    }
}

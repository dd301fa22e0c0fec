//! Translation of tool fragments into lifecycle events.
//!
//! A `tool-call` becomes `tool-will-execute`; a `tool-result` or `tool-error`
//! becomes `tool-did-execute`. Results are inspected for error shapes so a
//! tool that "succeeded" by returning an error payload is still flagged.

use crate::events::StreamEvent;
use chunkline_core::{ToolCall, ToolError, ToolResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// Prefix of the synthesized message for failed tool executions.
pub const TOOL_FAILURE_PREFIX: &str = "Tool execution failed: ";

/// Host token usage at the moment a tool call was observed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSnapshot {
    /// Prompt tokens consumed so far.
    pub input_tokens: u64,
    /// Completion tokens consumed so far.
    pub output_tokens: u64,
    /// Total tokens consumed so far.
    pub total_tokens: u64,
    /// Size of the model's context window, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u64>,
}

impl ContextSnapshot {
    /// Fraction of the context window in use, if the window is known.
    #[must_use]
    pub fn utilization(&self) -> Option<f64> {
        match self.context_window {
            Some(window) if window > 0 => Some(self.total_tokens as f64 / window as f64),
            _ => None,
        }
    }
}

/// Source of context usage snapshots.
///
/// Implemented by the host; the correlator calls it synchronously for each
/// tool call.
pub trait ContextProbe: Send + Sync {
    /// Current usage, or `None` if nothing is known yet.
    fn snapshot(&self) -> Option<ContextSnapshot>;
}

impl<F> ContextProbe for F
where
    F: Fn() -> Option<ContextSnapshot> + Send + Sync,
{
    fn snapshot(&self) -> Option<ContextSnapshot> {
        self()
    }
}

/// Type and message extracted from an error-shaped tool output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolErrorInfo {
    /// The `type` discriminant (`error-text`, `error-json` or `error`).
    pub kind: String,
    /// Human readable message.
    pub message: String,
}

/// Inspect a tool output for a known error shape.
///
/// Recognised shapes are objects whose `type` is `error-text` (message in
/// `text` or `value`), `error-json` (payload in `json` or `value`) or
/// `error` (message in `message`, `error`, `text` or `value`).
#[must_use]
pub fn detect_tool_error(output: &Value) -> Option<ToolErrorInfo> {
    let kind = output.get("type")?.as_str()?;
    let fields: &[&str] = match kind {
        "error-text" => &["text", "value"],
        "error-json" => &["json", "value"],
        "error" => &["message", "error", "text", "value"],
        _ => return None,
    };

    let message = fields
        .iter()
        .find_map(|field| output.get(*field))
        .map(message_of)
        .unwrap_or_else(|| output.to_string());

    Some(ToolErrorInfo {
        kind: kind.to_string(),
        message,
    })
}

/// Message text of an error value: the string itself, its `message` field,
/// or its JSON encoding.
fn message_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(map) => match map.get("message") {
            Some(Value::String(s)) => s.clone(),
            _ => value.to_string(),
        },
        other => other.to_string(),
    }
}

/// Translates tool fragments into tool lifecycle events.
#[derive(Clone, Default)]
pub struct ToolCorrelator {
    probe: Option<Arc<dyn ContextProbe>>,
}

impl std::fmt::Debug for ToolCorrelator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolCorrelator")
            .field("has_probe", &self.probe.is_some())
            .finish()
    }
}

impl ToolCorrelator {
    /// Create a correlator without a context probe.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a context probe.
    #[must_use]
    pub fn with_context_probe(mut self, probe: Arc<dyn ContextProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Translate a tool call.
    pub fn handle_tool_call(&self, call: ToolCall) -> StreamEvent {
        let usage = self.probe.as_ref().and_then(|probe| probe.snapshot());
        debug!(
            tool_call_id = %call.tool_call_id,
            tool_name = %call.tool_name,
            total_tokens = usage.map(|u| u.total_tokens),
            "Tool will execute"
        );

        StreamEvent::ToolWillExecute {
            tool_call_id: call.tool_call_id,
            tool_name: call.tool_name,
            args: call.input,
            usage,
        }
    }

    /// Translate a tool result, flagging error-shaped outputs.
    pub fn handle_tool_result(&self, result: ToolResult) -> StreamEvent {
        let error = match detect_tool_error(&result.output) {
            Some(info) => {
                warn!(
                    tool_call_id = %result.tool_call_id,
                    tool_name = %result.tool_name,
                    error_type = %info.kind,
                    message = %info.message,
                    "Tool returned an error result"
                );
                true
            }
            None => false,
        };

        StreamEvent::ToolDidExecute {
            tool_call_id: result.tool_call_id,
            tool_name: result.tool_name,
            result: result.output,
            error,
        }
    }

    /// Translate a tool failure into an error-flagged result.
    pub fn handle_tool_error(&self, failure: ToolError) -> StreamEvent {
        let message = message_of(&failure.error);
        warn!(
            tool_call_id = %failure.tool_call_id,
            tool_name = %failure.tool_name,
            message = %message,
            "Tool execution failed"
        );

        StreamEvent::ToolDidExecute {
            tool_call_id: failure.tool_call_id,
            tool_name: failure.tool_name,
            result: json!({
                "type": "error-text",
                "text": format!("{}{}", TOOL_FAILURE_PREFIX, message),
            }),
            error: true,
        }
    }
}

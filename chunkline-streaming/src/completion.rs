//! Completion assembly.
//!
//! When the finish marker arrives, [`CompletionAssembler`] builds the
//! [`CompletionSummary`] published on the `complete` channel.

use crate::classifier::StreamState;
use crate::config::StreamConfig;
use chrono::{DateTime, Utc};
use chunkline_core::{CompletionUsage, FinishFragment, StepResult, ToolCall};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Message used when no text could be captured from the stream or the
/// finish marker.
pub const CAPTURE_FAILURE_MESSAGE: &str =
    "There was an error capturing the work done, please review the conversation for the results";

/// Where the completion message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageSource {
    /// Text deltas cached since the last kind transition.
    Streamed,
    /// Text carried on the finish marker.
    Terminal,
    /// Neither was available; the message is [`CAPTURE_FAILURE_MESSAGE`].
    CaptureFailure,
}

/// Summary of a finished stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionSummary {
    /// Final answer text.
    pub message: String,
    /// Where [`message`](Self::message) came from.
    pub message_source: MessageSource,
    /// Per-step results reported by the backend.
    pub steps: Vec<StepResult>,
    /// Token usage.
    pub usage: CompletionUsage,
    /// Why generation stopped.
    pub finish_reason: String,
    /// When the summary was assembled.
    pub completed_at: DateTime<Utc>,
}

impl CompletionSummary {
    /// Check if the message is the capture-failure fallback.
    #[must_use]
    pub fn is_capture_failure(&self) -> bool {
        self.message_source == MessageSource::CaptureFailure
    }
}

/// Tool calls in `steps` that the backend rejected as dynamic and invalid.
pub fn invalid_tool_calls(steps: &[StepResult]) -> impl Iterator<Item = &ToolCall> {
    steps
        .iter()
        .flat_map(|step| step.tool_calls.iter())
        .filter(|call| call.dynamic && call.invalid && call.error.is_some())
}

/// Builds the completion summary from the finish marker.
#[derive(Debug, Clone)]
pub struct CompletionAssembler {
    usage_metadata_provider: String,
}

impl CompletionAssembler {
    /// Create an assembler for the given configuration.
    #[must_use]
    pub fn new(config: &StreamConfig) -> Self {
        Self {
            usage_metadata_provider: config.usage_metadata_provider.clone(),
        }
    }

    /// Assemble the summary and clear the cached completion text.
    pub fn assemble(&self, state: &mut StreamState, finish: FinishFragment) -> CompletionSummary {
        let cached = state.take_cached_completion_text();

        let (message, message_source) = if !cached.is_empty() {
            (cached, MessageSource::Streamed)
        } else {
            match finish.text {
                Some(text) if !text.is_empty() => (text, MessageSource::Terminal),
                _ => {
                    warn!(
                        finish_reason = %finish.finish_reason,
                        "No completion text captured"
                    );
                    (
                        CAPTURE_FAILURE_MESSAGE.to_string(),
                        MessageSource::CaptureFailure,
                    )
                }
            }
        };

        let invalid: Vec<&str> = invalid_tool_calls(&finish.steps)
            .map(|call| call.tool_name.as_str())
            .collect();
        if !invalid.is_empty() {
            warn!(tools = ?invalid, "Completion contains invalid dynamic tool calls");
        }

        let usage = finish
            .provider_metadata
            .as_ref()
            .and_then(|meta| {
                CompletionUsage::from_provider_metadata(meta, &self.usage_metadata_provider)
            })
            .unwrap_or_else(|| CompletionUsage::from(&finish.usage));

        debug!(
            finish_reason = %finish.finish_reason,
            source = ?message_source,
            steps = finish.steps.len(),
            total_tokens = usage.total_tokens,
            "Completion assembled"
        );

        CompletionSummary {
            message,
            message_source,
            steps: finish.steps,
            usage,
            finish_reason: finish.finish_reason,
            completed_at: Utc::now(),
        }
    }
}

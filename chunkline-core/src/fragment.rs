//! Raw stream fragments.
//!
//! A [`Fragment`] is one unit of the incremental stream a generation backend
//! produces. The wire form is a JSON object tagged by `type`; several field
//! names have historical aliases (`text`/`delta`, `input`/`args`,
//! `output`/`result`, `totalUsage`/`usage`) and all of them are accepted.
//! Tags this crate does not know are kept as [`Fragment::Unknown`] rather
//! than rejected, so consumers can surface them.

use crate::errors::{CoreError, Result};
use crate::usage::TokenUsage;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// Discriminant of a [`Fragment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FragmentKind {
    /// Incremental answer text.
    TextDelta,
    /// Incremental reasoning text.
    ReasoningDelta,
    /// Tool invocation request.
    ToolCall,
    /// Tool result.
    ToolResult,
    /// Tool execution failure.
    ToolError,
    /// Start of streamed tool input.
    ToolInputStart,
    /// Streamed tool input delta.
    ToolInputDelta,
    /// End of streamed tool input.
    ToolInputEnd,
    /// Start of a reasoning block.
    ReasoningStart,
    /// End of a reasoning block.
    ReasoningEnd,
    /// Start of a text block.
    TextStart,
    /// End of a text block.
    TextEnd,
    /// Start of a generation step.
    StartStep,
    /// End of a generation step.
    FinishStep,
    /// Backend-reported error.
    Error,
    /// Terminal marker.
    Finish,
    /// A tag this crate does not recognise.
    Unknown,
}

impl FragmentKind {
    /// Wire name of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TextDelta => "text-delta",
            Self::ReasoningDelta => "reasoning-delta",
            Self::ToolCall => "tool-call",
            Self::ToolResult => "tool-result",
            Self::ToolError => "tool-error",
            Self::ToolInputStart => "tool-input-start",
            Self::ToolInputDelta => "tool-input-delta",
            Self::ToolInputEnd => "tool-input-end",
            Self::ReasoningStart => "reasoning-start",
            Self::ReasoningEnd => "reasoning-end",
            Self::TextStart => "text-start",
            Self::TextEnd => "text-end",
            Self::StartStep => "start-step",
            Self::FinishStep => "finish-step",
            Self::Error => "error",
            Self::Finish => "finish",
            Self::Unknown => "unknown",
        }
    }

    /// Look up a known kind by wire name. Never returns [`FragmentKind::Unknown`].
    #[must_use]
    pub fn from_wire(tag: &str) -> Option<Self> {
        let kind = match tag {
            "text-delta" => Self::TextDelta,
            "reasoning-delta" => Self::ReasoningDelta,
            "tool-call" => Self::ToolCall,
            "tool-result" => Self::ToolResult,
            "tool-error" => Self::ToolError,
            "tool-input-start" => Self::ToolInputStart,
            "tool-input-delta" => Self::ToolInputDelta,
            "tool-input-end" => Self::ToolInputEnd,
            "reasoning-start" => Self::ReasoningStart,
            "reasoning-end" => Self::ReasoningEnd,
            "text-start" => Self::TextStart,
            "text-end" => Self::TextEnd,
            "start-step" => Self::StartStep,
            "finish-step" => Self::FinishStep,
            "error" => Self::Error,
            "finish" => Self::Finish,
            _ => return None,
        };
        Some(kind)
    }

    /// Whether fragments of this kind carry bufferable delta text.
    #[must_use]
    pub fn is_delta(self) -> bool {
        matches!(self, Self::TextDelta | Self::ReasoningDelta)
    }
}

impl fmt::Display for FragmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// A tool invocation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    /// Call id, unique within a stream.
    pub tool_call_id: String,
    /// Name of the tool.
    pub tool_name: String,
    /// Tool arguments.
    #[serde(alias = "args")]
    pub input: Value,
    /// Tool was resolved dynamically rather than from the static tool set.
    #[serde(default, skip_serializing_if = "is_false")]
    pub dynamic: bool,
    /// The backend could not parse or match this call.
    #[serde(default, skip_serializing_if = "is_false")]
    pub invalid: bool,
    /// Error attached to an invalid call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl ToolCall {
    /// Create a new tool call.
    pub fn new(tool_call_id: impl Into<String>, tool_name: impl Into<String>, input: Value) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            input,
            dynamic: false,
            invalid: false,
            error: None,
        }
    }

    /// Mark the call as dynamic and invalid with the given error.
    #[must_use]
    pub fn with_invalid_error(mut self, error: Value) -> Self {
        self.dynamic = true;
        self.invalid = true;
        self.error = Some(error);
        self
    }
}

/// A tool result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    /// Call id this result answers.
    pub tool_call_id: String,
    /// Name of the tool.
    pub tool_name: String,
    /// Tool output.
    #[serde(alias = "result")]
    pub output: Value,
    /// Arguments the tool was called with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
}

/// A tool execution failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolError {
    /// Call id this error answers.
    pub tool_call_id: String,
    /// Name of the tool.
    pub tool_name: String,
    /// The thrown error. Usually a string, sometimes an object with `message`.
    pub error: Value,
    /// Arguments the tool was called with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
}

/// Result of one generation step, as reported on the finish marker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    /// Text produced during the step.
    #[serde(default)]
    pub text: String,
    /// Why the step ended.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    /// Step usage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    /// Tool calls made during the step.
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    /// Tool results produced during the step.
    #[serde(default)]
    pub tool_results: Vec<Value>,
}

/// The terminal marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishFragment {
    /// Why generation stopped.
    pub finish_reason: String,
    /// Aggregate usage across all steps.
    #[serde(rename = "totalUsage", alias = "usage", default)]
    pub usage: TokenUsage,
    /// Backend-specific metadata side channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_metadata: Option<Value>,
    /// Full response text, for backends that only deliver it here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Per-step results.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepResult>,
}

impl FinishFragment {
    /// Create a finish marker with the given reason and no usage.
    pub fn new(finish_reason: impl Into<String>) -> Self {
        Self {
            finish_reason: finish_reason.into(),
            usage: TokenUsage::default(),
            provider_metadata: None,
            text: None,
            steps: Vec::new(),
        }
    }

    /// Set the aggregate usage.
    #[must_use]
    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = usage;
        self
    }

    /// Set the final text.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Set the provider metadata.
    #[must_use]
    pub fn with_provider_metadata(mut self, metadata: Value) -> Self {
        self.provider_metadata = Some(metadata);
        self
    }

    /// Append a step result.
    #[must_use]
    pub fn with_step(mut self, step: StepResult) -> Self {
        self.steps.push(step);
        self
    }
}

/// One unit of the raw incremental stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    /// Incremental answer text.
    TextDelta {
        /// Opaque id of the text block.
        id: String,
        /// Delta text.
        text: String,
    },
    /// Incremental reasoning text.
    ReasoningDelta {
        /// Opaque id of the reasoning block.
        id: String,
        /// Delta text.
        text: String,
        /// Backend-specific metadata (signatures, encrypted content).
        provider_metadata: Option<Value>,
    },
    /// Tool invocation request.
    ToolCall(ToolCall),
    /// Tool result.
    ToolResult(ToolResult),
    /// Tool execution failure.
    ToolError(ToolError),
    /// Start of streamed tool input.
    ToolInputStart {
        /// Call id the input belongs to.
        id: String,
        /// Name of the tool.
        tool_name: String,
    },
    /// Streamed tool input delta.
    ToolInputDelta {
        /// Call id the input belongs to.
        id: String,
        /// Raw argument text.
        text: String,
    },
    /// End of streamed tool input.
    ToolInputEnd {
        /// Call id the input belongs to.
        id: String,
    },
    /// Start of a reasoning block.
    ReasoningStart {
        /// Block id.
        id: String,
    },
    /// End of a reasoning block.
    ReasoningEnd {
        /// Block id.
        id: String,
    },
    /// Start of a text block.
    TextStart {
        /// Block id.
        id: String,
    },
    /// End of a text block.
    TextEnd {
        /// Block id.
        id: String,
    },
    /// Start of a generation step.
    StartStep,
    /// End of a generation step.
    FinishStep,
    /// Backend-reported error.
    Error {
        /// Error payload as sent by the backend.
        error: Value,
    },
    /// Terminal marker.
    Finish(FinishFragment),
    /// Fragment with a tag this crate does not recognise.
    Unknown {
        /// The unrecognised `type` tag.
        kind: String,
        /// The payload, untouched.
        raw: Value,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeltaPayload {
    #[serde(default)]
    id: String,
    #[serde(alias = "delta")]
    text: String,
    #[serde(default)]
    provider_metadata: Option<Value>,
}

#[derive(Deserialize)]
struct IdPayload {
    #[serde(default)]
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolInputStartPayload {
    #[serde(alias = "toolCallId")]
    id: String,
    tool_name: String,
}

#[derive(Deserialize)]
struct ErrorPayload {
    error: Value,
}

fn decode<T: DeserializeOwned>(kind: FragmentKind, value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| CoreError::invalid(kind.as_str(), e))
}

impl Fragment {
    /// Create a text delta.
    pub fn text_delta(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::TextDelta {
            id: id.into(),
            text: text.into(),
        }
    }

    /// Create a reasoning delta.
    pub fn reasoning_delta(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::ReasoningDelta {
            id: id.into(),
            text: text.into(),
            provider_metadata: None,
        }
    }

    /// Create a tool call.
    pub fn tool_call(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        Self::ToolCall(ToolCall::new(id, name, input))
    }

    /// Create a tool result.
    pub fn tool_result(id: impl Into<String>, name: impl Into<String>, output: Value) -> Self {
        Self::ToolResult(ToolResult {
            tool_call_id: id.into(),
            tool_name: name.into(),
            output,
            input: None,
        })
    }

    /// Create a tool error.
    pub fn tool_error(id: impl Into<String>, name: impl Into<String>, error: Value) -> Self {
        Self::ToolError(ToolError {
            tool_call_id: id.into(),
            tool_name: name.into(),
            error,
            input: None,
        })
    }

    /// Create a backend error.
    pub fn error(error: impl Into<Value>) -> Self {
        Self::Error {
            error: error.into(),
        }
    }

    /// Create a bare finish marker.
    pub fn finish(finish_reason: impl Into<String>) -> Self {
        Self::Finish(FinishFragment::new(finish_reason))
    }

    /// Get the kind of this fragment.
    #[must_use]
    pub fn kind(&self) -> FragmentKind {
        match self {
            Self::TextDelta { .. } => FragmentKind::TextDelta,
            Self::ReasoningDelta { .. } => FragmentKind::ReasoningDelta,
            Self::ToolCall(_) => FragmentKind::ToolCall,
            Self::ToolResult(_) => FragmentKind::ToolResult,
            Self::ToolError(_) => FragmentKind::ToolError,
            Self::ToolInputStart { .. } => FragmentKind::ToolInputStart,
            Self::ToolInputDelta { .. } => FragmentKind::ToolInputDelta,
            Self::ToolInputEnd { .. } => FragmentKind::ToolInputEnd,
            Self::ReasoningStart { .. } => FragmentKind::ReasoningStart,
            Self::ReasoningEnd { .. } => FragmentKind::ReasoningEnd,
            Self::TextStart { .. } => FragmentKind::TextStart,
            Self::TextEnd { .. } => FragmentKind::TextEnd,
            Self::StartStep => FragmentKind::StartStep,
            Self::FinishStep => FragmentKind::FinishStep,
            Self::Error { .. } => FragmentKind::Error,
            Self::Finish(_) => FragmentKind::Finish,
            Self::Unknown { .. } => FragmentKind::Unknown,
        }
    }

    /// Check if this is the terminal marker.
    #[must_use]
    pub fn is_finish(&self) -> bool {
        matches!(self, Self::Finish(_))
    }

    /// Get the delta text if this is a text or reasoning delta.
    pub fn delta_text(&self) -> Option<&str> {
        match self {
            Self::TextDelta { text, .. } | Self::ReasoningDelta { text, .. } => Some(text),
            _ => None,
        }
    }

    /// Parse a fragment from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Decode a fragment from a JSON value.
    pub fn from_value(value: Value) -> Result<Self> {
        let tag = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(CoreError::MissingType)?
            .to_string();
        let kind = FragmentKind::from_wire(&tag).unwrap_or(FragmentKind::Unknown);

        let fragment = match kind {
            FragmentKind::TextDelta => {
                let p: DeltaPayload = decode(kind, value)?;
                Self::TextDelta {
                    id: p.id,
                    text: p.text,
                }
            }
            FragmentKind::ReasoningDelta => {
                let p: DeltaPayload = decode(kind, value)?;
                Self::ReasoningDelta {
                    id: p.id,
                    text: p.text,
                    provider_metadata: p.provider_metadata,
                }
            }
            FragmentKind::ToolCall => Self::ToolCall(decode(kind, value)?),
            FragmentKind::ToolResult => Self::ToolResult(decode(kind, value)?),
            FragmentKind::ToolError => Self::ToolError(decode(kind, value)?),
            FragmentKind::ToolInputStart => {
                let p: ToolInputStartPayload = decode(kind, value)?;
                Self::ToolInputStart {
                    id: p.id,
                    tool_name: p.tool_name,
                }
            }
            FragmentKind::ToolInputDelta => {
                let p: DeltaPayload = decode(kind, value)?;
                Self::ToolInputDelta {
                    id: p.id,
                    text: p.text,
                }
            }
            FragmentKind::ToolInputEnd => Self::ToolInputEnd {
                id: decode::<IdPayload>(kind, value)?.id,
            },
            FragmentKind::ReasoningStart => Self::ReasoningStart {
                id: decode::<IdPayload>(kind, value)?.id,
            },
            FragmentKind::ReasoningEnd => Self::ReasoningEnd {
                id: decode::<IdPayload>(kind, value)?.id,
            },
            FragmentKind::TextStart => Self::TextStart {
                id: decode::<IdPayload>(kind, value)?.id,
            },
            FragmentKind::TextEnd => Self::TextEnd {
                id: decode::<IdPayload>(kind, value)?.id,
            },
            FragmentKind::StartStep => Self::StartStep,
            FragmentKind::FinishStep => Self::FinishStep,
            FragmentKind::Error => Self::Error {
                error: decode::<ErrorPayload>(kind, value)?.error,
            },
            FragmentKind::Finish => Self::Finish(decode(kind, value)?),
            FragmentKind::Unknown => Self::Unknown {
                kind: tag,
                raw: value,
            },
        };

        Ok(fragment)
    }

    /// Encode this fragment in its canonical wire form.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut object = Map::new();
        let mut put = |key: &str, value: Value| {
            object.insert(key.to_string(), value);
        };

        match self {
            Self::TextDelta { id, text } | Self::ToolInputDelta { id, text } => {
                put("id", Value::from(id.as_str()));
                put("text", Value::from(text.as_str()));
            }
            Self::ReasoningDelta {
                id,
                text,
                provider_metadata,
            } => {
                put("id", Value::from(id.as_str()));
                put("text", Value::from(text.as_str()));
                if let Some(metadata) = provider_metadata {
                    put("providerMetadata", metadata.clone());
                }
            }
            Self::ToolCall(call) => return tagged(self.kind(), call),
            Self::ToolResult(result) => return tagged(self.kind(), result),
            Self::ToolError(error) => return tagged(self.kind(), error),
            Self::Finish(finish) => return tagged(self.kind(), finish),
            Self::ToolInputStart { id, tool_name } => {
                put("id", Value::from(id.as_str()));
                put("toolName", Value::from(tool_name.as_str()));
            }
            Self::ToolInputEnd { id }
            | Self::ReasoningStart { id }
            | Self::ReasoningEnd { id }
            | Self::TextStart { id }
            | Self::TextEnd { id } => put("id", Value::from(id.as_str())),
            Self::StartStep | Self::FinishStep => {}
            Self::Error { error } => put("error", error.clone()),
            Self::Unknown { raw, .. } => return raw.clone(),
        }

        object.insert("type".to_string(), Value::from(self.kind().as_str()));
        Value::Object(object)
    }
}

fn tagged<T: Serialize>(kind: FragmentKind, payload: &T) -> Value {
    let mut value = serde_json::to_value(payload).unwrap_or_default();
    if let Value::Object(ref mut object) = value {
        object.insert("type".to_string(), Value::from(kind.as_str()));
    }
    value
}

impl Serialize for Fragment {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Fragment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(serde::de::Error::custom)
    }
}

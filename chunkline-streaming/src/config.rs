//! Stream configuration.

use crate::error::{StreamError, StreamResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Environment variable overriding [`StreamConfig::flush_interval_ms`].
pub const ENV_FLUSH_INTERVAL_MS: &str = "CHUNKLINE_FLUSH_INTERVAL_MS";
/// Environment variable overriding [`StreamConfig::chunking_mode`].
pub const ENV_CHUNKING_MODE: &str = "CHUNKLINE_CHUNKING_MODE";

/// Placeholder some backends send in place of private reasoning content.
pub const DEFAULT_REDACTION_SENTINEL: &str = "[REDACTED]";

/// How buffered deltas are cut when flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkingMode {
    /// Emit up to and including the last newline, keep the remainder.
    #[default]
    Line,
    /// Emit the whole buffer.
    None,
}

impl ChunkingMode {
    /// Config name of this mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Line => "line",
            Self::None => "none",
        }
    }
}

impl fmt::Display for ChunkingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkingMode {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "line" => Ok(Self::Line),
            "none" => Ok(Self::None),
            other => Err(StreamError::Config(format!(
                "unknown chunking mode `{}` (expected `line` or `none`)",
                other
            ))),
        }
    }
}

/// Configuration for one fragment stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamConfig {
    /// Longest time a delta may sit in a buffer before being flushed (ms).
    /// Zero flushes every delta as soon as it arrives.
    pub flush_interval_ms: u64,
    /// How flushes cut the buffer.
    pub chunking_mode: ChunkingMode,
    /// Reasoning deltas exactly equal to one of these are dropped.
    pub redaction_sentinels: Vec<String>,
    /// Key under `providerMetadata` whose `usage` block takes precedence
    /// over the aggregate usage on the finish marker.
    pub usage_metadata_provider: String,
    /// Whether to publish every input fragment on the `raw-fragment` channel.
    pub emit_raw_fragments: bool,
    /// Whether to publish diagnostic `trace` events for lifecycle fragments.
    pub emit_trace_events: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: 500,
            chunking_mode: ChunkingMode::Line,
            redaction_sentinels: vec![DEFAULT_REDACTION_SENTINEL.to_string()],
            usage_metadata_provider: "openrouter".to_string(),
            emit_raw_fragments: true,
            emit_trace_events: true,
        }
    }
}

impl StreamConfig {
    /// Create the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overlaid with `CHUNKLINE_FLUSH_INTERVAL_MS` and
    /// `CHUNKLINE_CHUNKING_MODE` when set.
    pub fn from_env() -> StreamResult<Self> {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var(ENV_FLUSH_INTERVAL_MS) {
            config.flush_interval_ms = raw.trim().parse().map_err(|e| {
                StreamError::Config(format!("{}=`{}`: {}", ENV_FLUSH_INTERVAL_MS, raw, e))
            })?;
        }
        if let Ok(raw) = std::env::var(ENV_CHUNKING_MODE) {
            config.chunking_mode = raw.parse()?;
        }

        Ok(config)
    }

    /// Set the flush interval in milliseconds.
    #[must_use]
    pub fn flush_interval_ms(mut self, ms: u64) -> Self {
        self.flush_interval_ms = ms;
        self
    }

    /// Set the chunking mode.
    #[must_use]
    pub fn chunking_mode(mut self, mode: ChunkingMode) -> Self {
        self.chunking_mode = mode;
        self
    }

    /// Add a redaction sentinel.
    #[must_use]
    pub fn redaction_sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.redaction_sentinels.push(sentinel.into());
        self
    }

    /// Set the provider whose metadata carries usage.
    #[must_use]
    pub fn usage_metadata_provider(mut self, provider: impl Into<String>) -> Self {
        self.usage_metadata_provider = provider.into();
        self
    }

    /// Enable or disable the `raw-fragment` channel.
    #[must_use]
    pub fn emit_raw_fragments(mut self, emit: bool) -> Self {
        self.emit_raw_fragments = emit;
        self
    }

    /// Enable or disable diagnostic `trace` events.
    #[must_use]
    pub fn emit_trace_events(mut self, emit: bool) -> Self {
        self.emit_trace_events = emit;
        self
    }

    /// The flush interval as a [`Duration`].
    #[must_use]
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Check whether `text` is a known redaction placeholder.
    #[must_use]
    pub fn is_redaction_sentinel(&self, text: &str) -> bool {
        self.redaction_sentinels.iter().any(|s| s == text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_stream_config_default() {
        let config = StreamConfig::default();
        assert_eq!(config.flush_interval_ms, 500);
        assert_eq!(config.chunking_mode, ChunkingMode::Line);
        assert!(config.is_redaction_sentinel("[REDACTED]"));
        assert!(config.emit_raw_fragments);
        assert_eq!(config.flush_interval(), Duration::from_millis(500));
    }

    #[test]
    fn test_deserialize_partial() {
        let config: StreamConfig =
            serde_json::from_str(r#"{"flushIntervalMs": 0, "chunkingMode": "none"}"#).unwrap();
        assert_eq!(config.flush_interval_ms, 0);
        assert_eq!(config.chunking_mode, ChunkingMode::None);
        assert_eq!(config.usage_metadata_provider, "openrouter");
    }

    #[rstest]
    #[case("line", ChunkingMode::Line)]
    #[case("none", ChunkingMode::None)]
    #[case(" LINE ", ChunkingMode::Line)]
    fn test_chunking_mode_from_str(#[case] raw: &str, #[case] expected: ChunkingMode) {
        assert_eq!(raw.parse::<ChunkingMode>().unwrap(), expected);
    }

    #[test]
    fn test_chunking_mode_rejects_unknown() {
        let err = "word".parse::<ChunkingMode>().unwrap_err();
        assert!(matches!(err, StreamError::Config(_)));
    }

    #[test]
    fn test_sentinel_is_exact_match() {
        let config = StreamConfig::default().redaction_sentinel("<redacted/>");
        assert!(config.is_redaction_sentinel("<redacted/>"));
        assert!(!config.is_redaction_sentinel("[REDACTED] but more"));
        assert!(!config.is_redaction_sentinel("[redacted]"));
    }

    #[test]
    fn test_from_env() {
        std::env::set_var(ENV_FLUSH_INTERVAL_MS, "40");
        std::env::set_var(ENV_CHUNKING_MODE, "none");
        let config = StreamConfig::from_env().unwrap();
        assert_eq!(config.flush_interval_ms, 40);
        assert_eq!(config.chunking_mode, ChunkingMode::None);

        std::env::set_var(ENV_FLUSH_INTERVAL_MS, "soon");
        assert!(matches!(StreamConfig::from_env(), Err(StreamError::Config(_))));

        std::env::remove_var(ENV_FLUSH_INTERVAL_MS);
        std::env::remove_var(ENV_CHUNKING_MODE);
    }
}

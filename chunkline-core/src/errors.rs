//! Error types for fragment decoding.

use thiserror::Error;

/// Errors raised while turning wire payloads into typed fragments.
#[derive(Error, Debug)]
pub enum CoreError {
    /// The payload was not valid JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload has no string `type` discriminant.
    #[error("Fragment has no `type` field")]
    MissingType,

    /// A known fragment kind was missing a field or had one of the wrong shape.
    #[error("Invalid `{kind}` fragment: {message}")]
    InvalidFragment {
        /// Wire name of the fragment kind.
        kind: &'static str,
        /// Decoder message.
        message: String,
    },
}

impl CoreError {
    /// Create an invalid fragment error.
    pub fn invalid(kind: &'static str, err: impl std::fmt::Display) -> Self {
        Self::InvalidFragment {
            kind,
            message: err.to_string(),
        }
    }
}

/// Result type alias using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::invalid("tool-call", "missing field `toolName`");
        assert_eq!(
            err.to_string(),
            "Invalid `tool-call` fragment: missing field `toolName`"
        );
        assert_eq!(CoreError::MissingType.to_string(), "Fragment has no `type` field");
    }
}

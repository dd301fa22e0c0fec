//! # chunkline-core
//!
//! Wire-level types for the chunkline streaming pipeline.
//!
//! This crate provides the data model shared by every stage:
//!
//! - **Fragments**: the tagged union a generation backend streams
//! - **Usage**: aggregate and provider-reported token usage
//! - **Errors**: decoding failures for malformed fragments
//!
//! ## Example
//!
//! ```rust
//! use chunkline_core::{Fragment, FragmentKind};
//!
//! let fragment = Fragment::from_json(r#"{"type":"text-delta","id":"t1","delta":"Hi"}"#).unwrap();
//! assert_eq!(fragment.kind(), FragmentKind::TextDelta);
//! assert_eq!(fragment.delta_text(), Some("Hi"));
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod errors;
pub mod fragment;
pub mod usage;

// Re-exports for convenience
pub use errors::{CoreError, Result};
pub use fragment::{
    FinishFragment, Fragment, FragmentKind, StepResult, ToolCall, ToolError, ToolResult,
};
pub use usage::{CompletionUsage, TokenUsage};

/// Prelude module for common imports.
pub mod prelude {
    pub use crate::errors::{CoreError, Result};
    pub use crate::fragment::{
        FinishFragment, Fragment, FragmentKind, StepResult, ToolCall, ToolError, ToolResult,
    };
    pub use crate::usage::{CompletionUsage, TokenUsage};
}

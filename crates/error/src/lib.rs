//! # fathom-error
//!
//! Unified error types for the fathom query broker.
//!
//! Every error carries:
//! - A stable numeric code (FATHOM-XXXX)
//! - Optional structured JSON context
//! - An optional hint for the operator

mod code;
mod context;
mod convert;

pub use code::{ErrorCategory, ErrorCode};
pub use context::ErrorContext;

use serde::{Deserialize, Serialize};
use std::fmt;

/// The unified error type for all fathom operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FathomError {
    /// Numeric error code (e.g., "FATHOM-2001")
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Structured context for programmatic handling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ErrorContext>,

    /// Suggestion for fixing the problem
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,

    /// Correlation ID (connection id for per-session errors)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

impl FathomError {
    /// Create a new error with code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: None,
            hint: None,
            trace_id: None,
        }
    }

    /// Add structured context
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Add a hint
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Add trace ID for correlation
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// Whether this error must abort process startup.
    pub fn is_fatal(&self) -> bool {
        self.code.category() == ErrorCategory::Bootstrap
    }

    /// Serialize to JSON for API responses and structured logs
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::warn!("Failed to serialize FathomError: {}", e);
            format!(
                r#"{{"code":"{}","message":"Serialization failed"}}"#,
                self.code
            )
        })
    }
}

impl fmt::Display for FathomError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(hint) = &self.hint {
            write!(f, " (Hint: {})", hint)?;
        }
        Ok(())
    }
}

impl std::error::Error for FathomError {}

/// Result type alias for fathom operations
pub type Result<T> = std::result::Result<T, FathomError>;

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// A flow or edit refused before anything ran.
///
/// Rejections never touch session state and never reach a backend. The
/// display text is the guidance shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    #[error("Please upload at least one reference image.")]
    NoReferenceImages,
    #[error("Please generate or write a prompt first.")]
    MissingPrompt,
    #[error("Another operation is already in progress.")]
    Busy,
}

impl Rejection {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoReferenceImages => "no_reference_images",
            Self::MissingPrompt => "missing_prompt",
            Self::Busy => "busy",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SettingsError {
    #[error("unknown setting '{0}'")]
    UnknownKey(String),
    #[error("invalid value '{value}' for {field}; expected {expected}")]
    InvalidValue {
        field: &'static str,
        value: String,
        expected: String,
    },
    #[error("{field} must be within [{min}, {max}], got {value}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendOperation {
    AnalyzeImages,
    GenerateFinalPrompt,
    GenerateImages,
}

impl BackendOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AnalyzeImages => "analyze_images",
            Self::GenerateFinalPrompt => "generate_final_prompt",
            Self::GenerateImages => "generate_images",
        }
    }
}

impl fmt::Display for BackendOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by one of the generation backends.
///
/// Carries the flattened cause chain for diagnostics. Users only ever see a
/// [`FailureNotice`] derived from the flow that failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{backend} {operation} failed: {message}")]
pub struct BackendError {
    pub backend: String,
    pub operation: BackendOperation,
    pub message: String,
}

impl BackendError {
    pub fn new(
        backend: impl Into<String>,
        operation: BackendOperation,
        message: impl Into<String>,
    ) -> Self {
        Self {
            backend: backend.into(),
            operation,
            message: message.into(),
        }
    }

    pub fn from_anyhow(
        backend: impl Into<String>,
        operation: BackendOperation,
        err: &anyhow::Error,
    ) -> Self {
        Self::new(backend, operation, error_chain_text(err, 2048))
    }
}

/// Generic user-facing notice for a flow that failed at a backend call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureNotice {
    PromptFailed,
    GenerationFailed,
}

impl FailureNotice {
    pub fn message(&self) -> &'static str {
        match self {
            Self::PromptFailed => "Failed to generate prompt.",
            Self::GenerationFailed => "Failed to generate images.",
        }
    }
}

impl fmt::Display for FailureNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StudioError {
    #[error(transparent)]
    Rejected(#[from] Rejection),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub type StudioResult<T> = Result<T, StudioError>;

/// Joins an error's cause chain into one line, skipping repeated messages.
pub fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts.last().is_some_and(|existing| existing == trimmed) {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

pub fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

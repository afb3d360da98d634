use std::fmt;

use serde::Serialize;

/// Stage of a long-running flow, shown to the user while it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStage {
    Analyzing,
    GeneratingPrompt,
    GeneratingImages,
}

impl ProgressStage {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Analyzing => "Analyzing images...",
            Self::GeneratingPrompt => "Generating prompt...",
            Self::GeneratingImages => "Generating images...",
        }
    }
}

impl fmt::Display for ProgressStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStatus {
    #[default]
    Idle,
    Busy(ProgressStage),
}

impl SessionStatus {
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy(_))
    }

    pub fn label(&self) -> Option<&'static str> {
        match self {
            Self::Idle => None,
            Self::Busy(stage) => Some(stage.label()),
        }
    }
}

/// Receives stage changes from the composer and orchestrator.
pub trait ProgressSink: Send + Sync {
    fn stage(&self, stage: ProgressStage);
}

/// Sink for callers that do not display progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn stage(&self, _stage: ProgressStage) {}
}

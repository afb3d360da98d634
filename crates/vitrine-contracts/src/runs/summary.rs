use std::path::Path;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub backend: String,
    pub started_at: String,
    pub finished_at: String,
    pub total_generations: u64,
    pub total_images: u64,
    pub last_prompt: Option<String>,
}

pub fn write_summary(path: &Path, summary: &SessionSummary) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(summary)?)?;
    Ok(())
}

pub fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

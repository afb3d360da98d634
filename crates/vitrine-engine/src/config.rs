use std::env;
use std::fmt;
use std::time::Duration;

pub const DEFAULT_BACKEND: &str = "dryrun";
pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_DRYRUN_VARIANTS: usize = 4;

const DEFAULT_REQUEST_TIMEOUT_S: f64 = 90.0;

/// Engine configuration, read from the environment.
///
/// Empty variables count as unset. CLI flags are applied on top by the
/// caller.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub backend: String,
    pub dryrun_variants: usize,
    pub gemini: GeminiConfig,
}

#[derive(Clone, PartialEq)]
pub struct GeminiConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    pub analysis_model: Option<String>,
    pub prompt_model: Option<String>,
    pub image_model: Option<String>,
    pub request_timeout: Duration,
}

impl fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_base", &self.api_base)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("analysis_model", &self.analysis_model)
            .field("prompt_model", &self.prompt_model)
            .field("image_model", &self.image_model)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let request_timeout_s = get("VITRINE_REQUEST_TIMEOUT")
            .and_then(|value| value.parse::<f64>().ok())
            .filter(|value| value.is_finite())
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_S)
            .clamp(5.0, 300.0);
        let dryrun_variants = get("VITRINE_DRYRUN_VARIANTS")
            .and_then(|value| value.parse::<usize>().ok())
            .unwrap_or(DEFAULT_DRYRUN_VARIANTS)
            .clamp(1, 8);

        Self {
            backend: get("VITRINE_BACKEND")
                .map(|value| value.to_ascii_lowercase())
                .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
            dryrun_variants,
            gemini: GeminiConfig {
                api_base: get("GEMINI_API_BASE")
                    .map(|value| value.trim_end_matches('/').to_string())
                    .unwrap_or_else(|| DEFAULT_GEMINI_API_BASE.to_string()),
                api_key: get("GEMINI_API_KEY").or_else(|| get("GOOGLE_API_KEY")),
                analysis_model: get("VITRINE_ANALYSIS_MODEL"),
                prompt_model: get("VITRINE_PROMPT_MODEL"),
                image_model: get("VITRINE_IMAGE_MODEL"),
                request_timeout: Duration::from_secs_f64(request_timeout_s),
            },
        }
    }
}

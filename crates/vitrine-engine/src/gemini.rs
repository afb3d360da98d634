use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use vitrine_contracts::error::truncate_text;
use vitrine_contracts::models::{Capability, ModelSelector};
use vitrine_contracts::{
    BackendError, BackendOperation, GenerationSettings, ReferenceImage, StylePreset,
};

use crate::backend::{PromptSynthesis, StudioBackend};
use crate::config::GeminiConfig;
use crate::instructions::{analysis_instruction, prompt_instruction, PROMPT_SYSTEM_INSTRUCTION};

const BACKEND_NAME: &str = "gemini";

/// Gemini REST backend (`models/{model}:generateContent`).
///
/// One request per call, no retries. The API key is read at call time so a
/// missing key fails the call, not the session.
pub struct GeminiBackend {
    api_base: String,
    api_key: Option<String>,
    analysis_model: String,
    prompt_model: String,
    image_model: String,
    timeout: Duration,
    http: HttpClient,
}

impl GeminiBackend {
    pub fn new(config: &GeminiConfig) -> Result<Self> {
        let selector = ModelSelector::default();
        let pick = |requested: Option<&str>, capability: Capability| -> Result<String> {
            let choice = selector
                .select(BACKEND_NAME, requested, capability)
                .map_err(anyhow::Error::msg)?;
            if let Some(reason) = choice.fallback_reason.as_deref() {
                tracing::warn!(model = %choice.model.name, "{reason}");
            }
            Ok(choice.model.name)
        };

        Ok(Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            analysis_model: pick(config.analysis_model.as_deref(), Capability::Vision)?,
            prompt_model: pick(config.prompt_model.as_deref(), Capability::Text)?,
            image_model: pick(config.image_model.as_deref(), Capability::Image)?,
            timeout: config.request_timeout,
            http: HttpClient::new(),
        })
    }

    pub fn models(&self) -> (&str, &str, &str) {
        (&self.analysis_model, &self.prompt_model, &self.image_model)
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        let Some(api_key) = self.api_key.as_deref() else {
            bail!("GEMINI_API_KEY or GOOGLE_API_KEY not set");
        };
        let endpoint = self.endpoint_for_model(model);
        tracing::debug!(%endpoint, "sending Gemini request");

        let response = self
            .http
            .post(&endpoint)
            .header("x-goog-api-key", api_key)
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .with_context(|| format!("Gemini request failed ({endpoint})"))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Gemini response body read failed")?;
        if !status.is_success() {
            bail!(
                "Gemini request failed ({}): {}",
                status.as_u16(),
                api_error_message(&body)
            );
        }
        serde_json::from_str(&body).context("Gemini returned invalid JSON payload")
    }

    async fn analyze(&self, images: &[ReferenceImage]) -> Result<String> {
        let mut parts: Vec<Part> = images.iter().map(Part::from_image).collect();
        parts.push(Part::text(analysis_instruction(images.len())));
        let request = GenerateContentRequest::user(parts);

        let response = self.generate_content(&self.analysis_model, &request).await?;
        let text = response.text();
        if text.trim().is_empty() {
            bail!("Gemini analysis returned no text");
        }
        Ok(text)
    }

    async fn synthesize(
        &self,
        analysis: &str,
        existing_prompt: &str,
        style_preset: StylePreset,
        settings: &GenerationSettings,
    ) -> Result<PromptSynthesis> {
        let mut request = GenerateContentRequest::user(vec![Part::text(prompt_instruction(
            analysis,
            existing_prompt,
            style_preset,
            settings,
        ))]);
        request.system_instruction = Some(Content {
            role: None,
            parts: vec![Part::text(PROMPT_SYSTEM_INSTRUCTION)],
        });
        request.generation_config = Some(GenerationConfig {
            temperature: Some(settings.temperature()),
            seed: settings.seed(),
            response_mime_type: Some("application/json".to_string()),
            response_schema: Some(json!({
                "type": "OBJECT",
                "properties": { "prompt": { "type": "STRING" } },
                "required": ["prompt"],
            })),
            response_modalities: None,
        });

        let response = self.generate_content(&self.prompt_model, &request).await?;
        let synthesis = parse_prompt_payload(&response.text())?;
        if synthesis.prompt.trim().is_empty() {
            bail!("Gemini returned an empty prompt");
        }
        Ok(synthesis)
    }

    async fn render(&self, prompt: &str, images: &[ReferenceImage]) -> Result<Vec<String>> {
        let mut parts: Vec<Part> = images.iter().map(Part::from_image).collect();
        parts.push(Part::text(prompt));
        let mut request = GenerateContentRequest::user(parts);
        request.generation_config = Some(GenerationConfig {
            response_modalities: Some(vec!["IMAGE".to_string()]),
            ..GenerationConfig::default()
        });

        let response = self.generate_content(&self.image_model, &request).await?;
        let images = response.inline_images();
        if images.is_empty() {
            bail!("Gemini returned no images");
        }
        Ok(images)
    }
}

#[async_trait]
impl StudioBackend for GeminiBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    async fn analyze_images(&self, images: &[ReferenceImage]) -> Result<String, BackendError> {
        self.analyze(images).await.map_err(|err| {
            BackendError::from_anyhow(BACKEND_NAME, BackendOperation::AnalyzeImages, &err)
        })
    }

    async fn generate_final_prompt(
        &self,
        analysis: &str,
        existing_prompt: &str,
        style_preset: StylePreset,
        settings: &GenerationSettings,
    ) -> Result<PromptSynthesis, BackendError> {
        self.synthesize(analysis, existing_prompt, style_preset, settings)
            .await
            .map_err(|err| {
                BackendError::from_anyhow(BACKEND_NAME, BackendOperation::GenerateFinalPrompt, &err)
            })
    }

    async fn generate_images(
        &self,
        prompt: &str,
        images: &[ReferenceImage],
    ) -> Result<Vec<String>, BackendError> {
        self.render(prompt, images).await.map_err(|err| {
            BackendError::from_anyhow(BACKEND_NAME, BackendOperation::GenerateImages, &err)
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

impl GenerateContentRequest {
    fn user(parts: Vec<Part>) -> Self {
        Self {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts,
            }],
            system_instruction: None,
            generation_config: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

impl Part {
    fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    fn from_image(image: &ReferenceImage) -> Self {
        Self::InlineData {
            inline_data: InlineData {
                mime_type: image.mime_type.clone(),
                data: image.base64_data(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_modalities: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
    #[serde(rename = "inlineData", alias = "inline_data")]
    inline_data: Option<ResponseInlineData>,
}

#[derive(Debug, Deserialize)]
struct ResponseInlineData {
    #[serde(rename = "mimeType", alias = "mime_type")]
    mime_type: Option<String>,
    #[serde(default)]
    data: String,
}

impl GenerateContentResponse {
    fn parts(&self) -> impl Iterator<Item = &ResponsePart> {
        self.candidates
            .iter()
            .filter_map(|candidate| candidate.content.as_ref())
            .flat_map(|content| content.parts.iter())
    }

    /// Concatenated text parts of all candidates.
    fn text(&self) -> String {
        self.parts()
            .filter_map(|part| part.text.as_deref())
            .collect::<Vec<&str>>()
            .join("")
    }

    /// Inline images as `data:` URLs, in response order.
    fn inline_images(&self) -> Vec<String> {
        self.parts()
            .filter_map(|part| part.inline_data.as_ref())
            .filter(|inline| !inline.data.is_empty())
            .map(|inline| {
                format!(
                    "data:{};base64,{}",
                    inline.mime_type.as_deref().unwrap_or("image/png"),
                    inline.data
                )
            })
            .collect()
    }
}

#[derive(Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
}

fn api_error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorWrapper>(body) {
        Ok(wrapper) => {
            let message = wrapper
                .error
                .message
                .unwrap_or_else(|| truncate_text(body, 512));
            match wrapper.error.status.filter(|status| !status.is_empty()) {
                Some(status) => format!("{status}: {message}"),
                None => message,
            }
        }
        Err(_) => truncate_text(body, 512),
    }
}

fn parse_prompt_payload(text: &str) -> Result<PromptSynthesis> {
    let trimmed = text.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();
    serde_json::from_str(unfenced).with_context(|| {
        format!(
            "Gemini prompt response was not a prompt object: {}",
            truncate_text(trimmed, 200)
        )
    })
}

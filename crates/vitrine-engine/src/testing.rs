//! In-memory backend and progress sink for engine tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;
use vitrine_contracts::{
    BackendError, BackendOperation, GenerationSettings, ReferenceImage, StylePreset,
};

use crate::backend::{PromptSynthesis, StudioBackend};
use crate::progress::{ProgressSink, ProgressStage};

#[derive(Debug, Clone, PartialEq)]
pub struct PromptCall {
    pub analysis: String,
    pub existing_prompt: String,
    pub style_preset: StylePreset,
    pub settings: GenerationSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageCall {
    pub prompt: String,
    pub reference_count: usize,
}

/// Parks backend calls until the test releases them.
#[derive(Debug, Clone, Default)]
pub struct Gate {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

impl Gate {
    /// Resolves once a backend call is parked on the gate.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }

    async fn pass(&self) {
        self.entered.notify_one();
        self.release.notified().await;
    }
}

pub struct ScriptedBackend {
    analysis: String,
    prompt: String,
    images: Vec<String>,
    failing: Mutex<Option<BackendOperation>>,
    gate: Option<Gate>,
    analysis_calls: AtomicUsize,
    prompt_calls: Mutex<Vec<PromptCall>>,
    image_calls: Mutex<Vec<ImageCall>>,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            analysis: "Matte ceramic, background #F5F5F0, glaze #8FBC8F".to_string(),
            prompt: "matte ceramic mug on a linen backdrop".to_string(),
            images: vec!["data:image/png;base64,AAAA".to_string()],
            failing: Mutex::new(None),
            gate: None,
            analysis_calls: AtomicUsize::new(0),
            prompt_calls: Mutex::new(Vec::new()),
            image_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_analysis(mut self, analysis: &str) -> Self {
        self.analysis = analysis.to_string();
        self
    }

    pub fn with_prompt(mut self, prompt: &str) -> Self {
        self.prompt = prompt.to_string();
        self
    }

    pub fn with_images(mut self, images: &[&str]) -> Self {
        self.images = images.iter().map(|image| image.to_string()).collect();
        self
    }

    pub fn failing(self, operation: BackendOperation) -> Self {
        self.fail_on(operation);
        self
    }

    /// Makes every later call of `operation` fail.
    pub fn fail_on(&self, operation: BackendOperation) {
        if let Ok(mut failing) = self.failing.lock() {
            *failing = Some(operation);
        }
    }

    /// Every call waits on `gate` before answering.
    pub fn with_gate(mut self, gate: &Gate) -> Self {
        self.gate = Some(gate.clone());
        self
    }

    pub fn analysis_calls(&self) -> usize {
        self.analysis_calls.load(Ordering::SeqCst)
    }

    pub fn prompt_calls(&self) -> Vec<PromptCall> {
        self.prompt_calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    pub fn image_calls(&self) -> Vec<ImageCall> {
        self.image_calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    pub fn total_calls(&self) -> usize {
        self.analysis_calls() + self.prompt_calls().len() + self.image_calls().len()
    }

    async fn answer(&self, operation: BackendOperation) -> Result<(), BackendError> {
        if let Some(gate) = self.gate.as_ref() {
            gate.pass().await;
        }
        let failing = self.failing.lock().map(|failing| *failing).unwrap_or(None);
        if failing == Some(operation) {
            return Err(BackendError::new("scripted", operation, "scripted failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl StudioBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn analyze_images(&self, _images: &[ReferenceImage]) -> Result<String, BackendError> {
        self.analysis_calls.fetch_add(1, Ordering::SeqCst);
        self.answer(BackendOperation::AnalyzeImages).await?;
        Ok(self.analysis.clone())
    }

    async fn generate_final_prompt(
        &self,
        analysis: &str,
        existing_prompt: &str,
        style_preset: StylePreset,
        settings: &GenerationSettings,
    ) -> Result<PromptSynthesis, BackendError> {
        if let Ok(mut calls) = self.prompt_calls.lock() {
            calls.push(PromptCall {
                analysis: analysis.to_string(),
                existing_prompt: existing_prompt.to_string(),
                style_preset,
                settings: settings.clone(),
            });
        }
        self.answer(BackendOperation::GenerateFinalPrompt).await?;
        Ok(PromptSynthesis {
            prompt: self.prompt.clone(),
        })
    }

    async fn generate_images(
        &self,
        prompt: &str,
        images: &[ReferenceImage],
    ) -> Result<Vec<String>, BackendError> {
        if let Ok(mut calls) = self.image_calls.lock() {
            calls.push(ImageCall {
                prompt: prompt.to_string(),
                reference_count: images.len(),
            });
        }
        self.answer(BackendOperation::GenerateImages).await?;
        Ok(self.images.clone())
    }
}

#[derive(Debug, Default)]
pub struct RecordingProgress {
    stages: Mutex<Vec<ProgressStage>>,
}

impl RecordingProgress {
    pub fn stages(&self) -> Vec<ProgressStage> {
        self.stages
            .lock()
            .map(|stages| stages.clone())
            .unwrap_or_default()
    }
}

impl ProgressSink for RecordingProgress {
    fn stage(&self, stage: ProgressStage) {
        if let Ok(mut stages) = self.stages.lock() {
            stages.push(stage);
        }
    }
}

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Deserialize;
use vitrine_contracts::{BackendError, GenerationSettings, ReferenceImage, StylePreset};

use crate::config::EngineConfig;
use crate::dryrun::DryrunBackend;
use crate::gemini::GeminiBackend;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PromptSynthesis {
    pub prompt: String,
}

/// The generative service behind the studio.
///
/// Every call is single-shot: a failure is returned to the caller as is,
/// never retried.
#[async_trait]
pub trait StudioBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Describes the reference images in free-form text.
    async fn analyze_images(&self, images: &[ReferenceImage]) -> Result<String, BackendError>;

    async fn generate_final_prompt(
        &self,
        analysis: &str,
        existing_prompt: &str,
        style_preset: StylePreset,
        settings: &GenerationSettings,
    ) -> Result<PromptSynthesis, BackendError>;

    /// Returns one image reference string (URL or `data:` URL) per image.
    async fn generate_images(
        &self,
        prompt: &str,
        images: &[ReferenceImage],
    ) -> Result<Vec<String>, BackendError>;
}

#[derive(Default)]
pub struct BackendRegistry {
    backends: BTreeMap<String, Arc<dyn StudioBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<B: StudioBackend + 'static>(&mut self, backend: B) {
        self.backends
            .insert(backend.name().to_string(), Arc::new(backend));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn StudioBackend>> {
        self.backends.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.backends.keys().cloned().collect()
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn StudioBackend>> {
        match self.get(name) {
            Some(backend) => Ok(backend),
            None => bail!(
                "backend '{}' not registered (available: [{}])",
                name,
                self.names().join(", ")
            ),
        }
    }
}

pub fn default_backend_registry(config: &EngineConfig) -> Result<BackendRegistry> {
    let mut backends = BackendRegistry::new();
    backends.register(DryrunBackend::new(config.dryrun_variants));
    backends.register(GeminiBackend::new(&config.gemini)?);
    Ok(backends)
}

use vitrine_contracts::{
    extract_swatches, BackendError, BackendOperation, ColorSwatch, GenerationSettings,
    ReferenceImage, Rejection, StudioResult,
};

use crate::backend::StudioBackend;
use crate::progress::{ProgressSink, ProgressStage};

/// Output of a successful auto-prompt run.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedPrompt {
    pub prompt: String,
    pub swatches: Vec<ColorSwatch>,
    pub analysis: String,
}

pub fn check_compose(references: &[ReferenceImage]) -> Result<(), Rejection> {
    if references.is_empty() {
        return Err(Rejection::NoReferenceImages);
    }
    Ok(())
}

/// Analyses the references, extracts swatches from the analysis, then asks
/// the backend for a final prompt.
///
/// Runs on snapshots; the caller decides whether to commit the result. The
/// swatches are returned even though they are only committed together with
/// the prompt.
pub async fn compose_prompt(
    backend: &dyn StudioBackend,
    references: &[ReferenceImage],
    current_prompt: &str,
    settings: &GenerationSettings,
    progress: &dyn ProgressSink,
) -> StudioResult<ComposedPrompt> {
    check_compose(references)?;

    progress.stage(ProgressStage::Analyzing);
    let analysis = backend.analyze_images(references).await?;
    let swatches = extract_swatches(&analysis);
    tracing::debug!(
        backend = backend.name(),
        swatches = swatches.len(),
        "reference analysis complete"
    );

    progress.stage(ProgressStage::GeneratingPrompt);
    let synthesis = backend
        .generate_final_prompt(&analysis, current_prompt, settings.style_preset, settings)
        .await?;
    if synthesis.prompt.trim().is_empty() {
        return Err(BackendError::new(
            backend.name(),
            BackendOperation::GenerateFinalPrompt,
            "backend returned an empty prompt",
        )
        .into());
    }

    Ok(ComposedPrompt {
        prompt: synthesis.prompt,
        swatches,
        analysis,
    })
}

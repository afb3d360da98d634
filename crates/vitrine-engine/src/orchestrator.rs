use vitrine_contracts::{
    BackendError, BackendOperation, GenerationSettings, HistoryItem, ReferenceImage, Rejection,
    StudioResult,
};

use crate::backend::StudioBackend;
use crate::progress::{ProgressSink, ProgressStage};

/// Preconditions of a generation, references first.
///
/// A prompt that is empty after trimming counts as missing.
pub fn check_generation(prompt: &str, references: &[ReferenceImage]) -> Result<(), Rejection> {
    if references.is_empty() {
        return Err(Rejection::NoReferenceImages);
    }
    if prompt.trim().is_empty() {
        return Err(Rejection::MissingPrompt);
    }
    Ok(())
}

/// Runs one image generation and captures the result as a history item.
///
/// The item records the prompt, settings and references passed in, not
/// whatever the session holds by the time the backend answers.
pub async fn run_generation(
    backend: &dyn StudioBackend,
    prompt: &str,
    references: &[ReferenceImage],
    settings: &GenerationSettings,
    progress: &dyn ProgressSink,
) -> StudioResult<HistoryItem> {
    check_generation(prompt, references)?;

    progress.stage(ProgressStage::GeneratingImages);
    let images = backend.generate_images(prompt, references).await?;
    if images.is_empty() {
        return Err(BackendError::new(
            backend.name(),
            BackendOperation::GenerateImages,
            "backend returned no images",
        )
        .into());
    }
    tracing::debug!(
        backend = backend.name(),
        images = images.len(),
        "generation complete"
    );

    Ok(HistoryItem::new(prompt, settings, references, images))
}

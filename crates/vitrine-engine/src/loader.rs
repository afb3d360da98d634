use std::path::Path;

use anyhow::{Context, Result};
use vitrine_contracts::ReferenceImage;

/// Reads a reference image from disk.
///
/// The format is sniffed from the bytes; the extension is ignored. Files the
/// `image` crate does not recognise are refused.
pub fn load_reference(path: &Path) -> Result<ReferenceImage> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read reference {}", path.display()))?;
    let format = image::guess_format(&bytes)
        .with_context(|| format!("{} is not a supported image", path.display()))?;
    let file_name = path
        .file_name()
        .and_then(|value| value.to_str())
        .filter(|value| !value.is_empty())
        .unwrap_or("reference")
        .to_string();
    tracing::debug!(
        file = %path.display(),
        format = ?format,
        bytes = bytes.len(),
        "loaded reference"
    );
    Ok(ReferenceImage::new(file_name, format.to_mime_type(), bytes))
}

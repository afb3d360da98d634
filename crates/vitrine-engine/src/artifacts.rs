use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use vitrine_contracts::runs::receipts::{build_receipt, write_receipt};
use vitrine_contracts::HistoryItem;

struct DecodedImage {
    bytes: Vec<u8>,
    mime_type: String,
}

/// Writes the images of one generation plus its receipt under `out_dir`.
///
/// `data:` URLs are decoded to `image-{id8}-{nn}.{ext}`. Anything else is
/// only listed in the receipt. Returns the written image paths.
pub fn save_generation(item: &HistoryItem, out_dir: &Path, backend: &str) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;

    let mut paths = Vec::new();
    for (idx, image) in item.generated_images.iter().enumerate() {
        let Some(decoded) = decode_data_url(image)? else {
            continue;
        };
        let ext = extension_for_mime(&decoded.mime_type);
        let path = out_dir.join(format!("image-{}-{:02}.{ext}", item.short_id(), idx + 1));
        std::fs::write(&path, &decoded.bytes)
            .with_context(|| format!("failed to write {}", path.display()))?;
        paths.push(path);
    }

    let receipt_path = out_dir.join(format!("receipt-{}.json", item.short_id()));
    write_receipt(&receipt_path, &build_receipt(item, backend, &paths))?;
    tracing::info!(
        history_id = %item.id,
        images = paths.len(),
        receipt = %receipt_path.display(),
        "saved generation"
    );
    Ok(paths)
}

fn decode_data_url(value: &str) -> Result<Option<DecodedImage>> {
    let Some(rest) = value.trim().strip_prefix("data:") else {
        return Ok(None);
    };
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| anyhow::anyhow!("invalid data URL image payload"))?;
    let mime_type = meta
        .split(';')
        .next()
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .unwrap_or("image/png")
        .to_string();
    let bytes = BASE64
        .decode(payload.trim().as_bytes())
        .context("image data URL base64 decode failed")?;
    Ok(Some(DecodedImage { bytes, mime_type }))
}

fn extension_for_mime(mime: &str) -> &'static str {
    let lowered = mime.to_ascii_lowercase();
    if lowered.contains("jpeg") || lowered.contains("jpg") {
        return "jpg";
    }
    if lowered.contains("webp") {
        return "webp";
    }
    "png"
}

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::history::HistoryItem;

pub const RECEIPT_SCHEMA_VERSION: u64 = 1;

/// Builds the JSON receipt for one generation.
///
/// `image_paths` lists the files the caller wrote for the generated images.
/// Image payloads are never embedded: any `data:` URL is replaced by a
/// marker.
pub fn build_receipt(item: &HistoryItem, backend: &str, image_paths: &[PathBuf]) -> Value {
    let mut root = Map::new();
    root.insert(
        "schema_version".to_string(),
        Value::Number(RECEIPT_SCHEMA_VERSION.into()),
    );
    root.insert("history_id".to_string(), Value::String(item.id.clone()));
    root.insert("backend".to_string(), Value::String(backend.to_string()));
    root.insert(
        "created_at".to_string(),
        Value::String(item.created_at.to_rfc3339()),
    );
    root.insert("prompt".to_string(), Value::String(item.prompt.clone()));
    root.insert(
        "settings".to_string(),
        serde_json::to_value(&item.settings).unwrap_or(Value::Null),
    );
    root.insert(
        "reference_images".to_string(),
        serde_json::to_value(&item.reference_images).unwrap_or(Value::Null),
    );
    root.insert(
        "generated_images".to_string(),
        Value::Array(
            item.generated_images
                .iter()
                .map(|image| sanitize_image_ref(image))
                .collect(),
        ),
    );
    root.insert(
        "image_paths".to_string(),
        Value::Array(
            image_paths
                .iter()
                .map(|path| Value::String(path.to_string_lossy().to_string()))
                .collect(),
        ),
    );
    Value::Object(root)
}

pub fn write_receipt(path: &Path, payload: &Value) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(payload)?)?;
    Ok(())
}

fn sanitize_image_ref(image: &str) -> Value {
    if let Some(rest) = image.strip_prefix("data:") {
        let mime = rest.split(';').next().unwrap_or("");
        return Value::String(format!("data:{mime};<omitted>"));
    }
    Value::String(image.to_string())
}

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Serialize;
use uuid::Uuid;

/// A reference product photo supplied by the user.
///
/// The payload is immutable and shared, so cloning an image (for a history
/// snapshot) copies a pointer, never the bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceImage {
    pub id: String,
    pub file_name: String,
    pub mime_type: String,
    pub byte_len: usize,
    #[serde(skip)]
    bytes: Arc<[u8]>,
}

impl ReferenceImage {
    pub fn new(
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Self {
        let bytes = bytes.into();
        Self {
            id: Uuid::new_v4().to_string(),
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            byte_len: bytes.len(),
            bytes,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn base64_data(&self) -> String {
        BASE64.encode(&self.bytes)
    }

    /// Renderable preview handle for the image.
    pub fn preview_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64_data())
    }
}

/// Ordered collection of the session's reference images.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceSet {
    images: Vec<ReferenceImage>,
}

impl ReferenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, image: ReferenceImage) -> String {
        let id = image.id.clone();
        self.images.push(image);
        id
    }

    pub fn remove(&mut self, id: &str) -> Option<ReferenceImage> {
        let idx = self.images.iter().position(|image| image.id == id)?;
        Some(self.images.remove(idx))
    }

    pub fn clear(&mut self) {
        self.images.clear();
    }

    pub fn get(&self, id: &str) -> Option<&ReferenceImage> {
        self.images.iter().find(|image| image.id == id)
    }

    pub fn images(&self) -> &[ReferenceImage] {
        self.images.as_slice()
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

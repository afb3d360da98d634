use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::references::ReferenceImage;
use crate::settings::GenerationSettings;

/// Snapshot of one successful generation.
///
/// Everything is captured by value when the generation succeeds; later edits
/// to the live session never reach an item already in the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryItem {
    pub id: String,
    pub prompt: String,
    pub settings: GenerationSettings,
    pub reference_images: Vec<ReferenceImage>,
    pub generated_images: Vec<String>,
    pub image_count: usize,
    pub created_at: DateTime<Utc>,
}

impl HistoryItem {
    pub fn new(
        prompt: &str,
        settings: &GenerationSettings,
        reference_images: &[ReferenceImage],
        generated_images: Vec<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            prompt: prompt.to_string(),
            settings: settings.clone(),
            reference_images: reference_images.to_vec(),
            image_count: generated_images.len(),
            generated_images,
            created_at: Utc::now(),
        }
    }

    /// First eight characters of the id, enough to tell items apart on screen.
    pub fn short_id(&self) -> &str {
        self.id.get(..8).unwrap_or(&self.id)
    }

    /// Copy of this item holding only its first `count` images.
    pub fn first_images(&self, count: usize) -> Self {
        let generated_images: Vec<String> =
            self.generated_images.iter().take(count).cloned().collect();
        Self {
            image_count: generated_images.len(),
            generated_images,
            ..self.clone()
        }
    }
}

/// Append-only, newest-first log of generations in this session.
#[derive(Debug, Clone, Default)]
pub struct HistoryLedger {
    items: VecDeque<HistoryItem>,
}

impl HistoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, item: HistoryItem) {
        self.items.push_front(item);
    }

    pub fn head(&self) -> Option<&HistoryItem> {
        self.items.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryItem> {
        self.items.iter()
    }

    pub fn list(&self) -> Vec<HistoryItem> {
        self.items.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

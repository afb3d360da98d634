//! Data model and parsing shared by the Vitrine engine and CLI.

pub mod chat;
pub mod error;
pub mod events;
pub mod history;
pub mod models;
pub mod references;
pub mod runs;
pub mod settings;
pub mod swatches;

pub use error::{
    BackendError, BackendOperation, FailureNotice, Rejection, SettingsError, StudioError,
    StudioResult,
};
pub use history::{HistoryItem, HistoryLedger};
pub use references::{ReferenceImage, ReferenceSet};
pub use settings::{AspectRatio, GenerationSettings, Mode, StylePreset, VariantCount};
pub use swatches::{extract_swatches, ColorSwatch};

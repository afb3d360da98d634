//! Backends and flows of the Vitrine product studio.
//!
//! [`SessionController`] is the entry point: it owns the session state and
//! runs the auto-prompt and generate flows against a [`StudioBackend`].

pub mod artifacts;
pub mod backend;
pub mod composer;
pub mod config;
pub mod dryrun;
pub mod gemini;
mod instructions;
pub mod loader;
pub mod orchestrator;
pub mod progress;
pub mod session;

#[cfg(test)]
mod testing;

pub use artifacts::save_generation;
pub use backend::{default_backend_registry, BackendRegistry, PromptSynthesis, StudioBackend};
pub use composer::{compose_prompt, ComposedPrompt};
pub use config::{EngineConfig, GeminiConfig};
pub use dryrun::DryrunBackend;
pub use gemini::GeminiBackend;
pub use loader::load_reference;
pub use orchestrator::run_generation;
pub use progress::{NoProgress, ProgressSink, ProgressStage, SessionStatus};
pub use session::{FlowOutcome, Notice, SessionController};

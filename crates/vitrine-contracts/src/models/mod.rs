mod catalog;
mod selectors;

pub use catalog::{Capability, ModelCatalog, ModelSpec};
pub use selectors::{ModelChoice, ModelSelector};

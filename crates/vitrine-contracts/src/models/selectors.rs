use super::catalog::{Capability, ModelCatalog, ModelSpec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelChoice {
    pub model: ModelSpec,
    pub requested: Option<String>,
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ModelSelector {
    pub catalog: ModelCatalog,
}

impl ModelSelector {
    pub fn new(catalog: ModelCatalog) -> Self {
        Self { catalog }
    }

    /// Picks the model a backend should use for one capability.
    ///
    /// An unknown or unsuitable request falls back to the backend's default
    /// and says why.
    pub fn select(
        &self,
        backend: &str,
        requested: Option<&str>,
        capability: Capability,
    ) -> Result<ModelChoice, String> {
        let requested = requested.map(str::trim).filter(|value| !value.is_empty());
        if let Some(name) = requested {
            if let Some(model) = self.catalog.ensure(name, backend, capability) {
                return Ok(ModelChoice {
                    model: model.clone(),
                    requested: Some(name.to_string()),
                    fallback_reason: None,
                });
            }
        }

        let Some(model) = self.catalog.for_backend(backend, capability).first().cloned() else {
            return Err(format!(
                "No {backend} models available for capability '{capability}'."
            ));
        };
        let fallback_reason = requested.map(|name| {
            format!("Requested model '{name}' unavailable for {backend} capability '{capability}'.")
        });
        Ok(ModelChoice {
            model: model.clone(),
            requested: requested.map(str::to_string),
            fallback_reason,
        })
    }
}

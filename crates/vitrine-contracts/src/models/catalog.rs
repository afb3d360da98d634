use std::fmt;

use indexmap::IndexMap;

/// What a backend call needs from a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Reads reference images and describes them.
    Vision,
    /// Turns analysis text into a final prompt.
    Text,
    /// Produces images.
    Image,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vision => "vision",
            Self::Text => "text",
            Self::Image => "image",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub backend: String,
    pub capabilities: Vec<Capability>,
}

impl ModelSpec {
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// Known models in preference order; the first match for a capability is
/// the default.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    models: IndexMap<String, ModelSpec>,
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ModelCatalog {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name)
    }

    /// Models of one backend that support `capability`, in preference order.
    pub fn for_backend(&self, backend: &str, capability: Capability) -> Vec<&ModelSpec> {
        self.models
            .values()
            .filter(|model| model.backend == backend && model.supports(capability))
            .collect()
    }

    pub fn ensure(&self, name: &str, backend: &str, capability: Capability) -> Option<&ModelSpec> {
        self.get(name)
            .filter(|model| model.backend == backend && model.supports(capability))
    }
}

fn default_models() -> IndexMap<String, ModelSpec> {
    let rows: &[(&str, &str, &[Capability])] = &[
        ("dryrun-vision-1", "dryrun", &[Capability::Vision]),
        ("dryrun-text-1", "dryrun", &[Capability::Text]),
        ("dryrun-image-1", "dryrun", &[Capability::Image]),
        (
            "gemini-2.5-flash",
            "gemini",
            &[Capability::Vision, Capability::Text],
        ),
        (
            "gemini-2.5-pro",
            "gemini",
            &[Capability::Vision, Capability::Text],
        ),
        ("gemini-2.5-flash-image", "gemini", &[Capability::Image]),
        ("gemini-3-pro-image-preview", "gemini", &[Capability::Image]),
    ];

    rows.iter()
        .map(|(name, backend, capabilities)| {
            (
                (*name).to_string(),
                ModelSpec {
                    name: (*name).to_string(),
                    backend: (*backend).to_string(),
                    capabilities: capabilities.to_vec(),
                },
            )
        })
        .collect()
}

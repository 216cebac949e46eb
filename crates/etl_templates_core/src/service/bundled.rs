//! Sources of packaged (bundled) template definitions.
//!
//! Discovery of definitions inside distributable archives lives outside the
//! core; the core only consumes an already-listed set once per startup.

use crate::model::template::BundledDefinition;
use crate::service::error::{RegistryError, RegistryResult};
use std::path::{Path, PathBuf};

/// Provider of bundled definitions consumed by `TemplateManager::initialize`.
pub trait BundledSource {
    fn list_bundled_definitions(&self) -> RegistryResult<Vec<BundledDefinition>>;
}

/// In-memory bundled source.
#[derive(Debug, Clone, Default)]
pub struct StaticBundledSource {
    definitions: Vec<BundledDefinition>,
}

impl StaticBundledSource {
    pub fn new(definitions: Vec<BundledDefinition>) -> Self {
        Self { definitions }
    }
}

impl BundledSource for StaticBundledSource {
    fn list_bundled_definitions(&self) -> RegistryResult<Vec<BundledDefinition>> {
        Ok(self.definitions.clone())
    }
}

/// Reads a JSON array of bundled definitions from a file.
#[derive(Debug, Clone)]
pub struct JsonBundledSource {
    path: PathBuf,
}

impl JsonBundledSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl BundledSource for JsonBundledSource {
    fn list_bundled_definitions(&self) -> RegistryResult<Vec<BundledDefinition>> {
        let content = std::fs::read_to_string(&self.path).map_err(|err| {
            RegistryError::MissingInput(format!(
                "cannot read bundled definitions `{}`: {err}",
                self.path.display()
            ))
        })?;
        serde_json::from_str(&content).map_err(|err| {
            RegistryError::MissingInput(format!(
                "cannot parse bundled definitions `{}`: {err}",
                self.path.display()
            ))
        })
    }
}

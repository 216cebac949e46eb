//! Core of the ETL component template registry.
//! This crate is the single source of truth for template invariants.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, RegistryConfig};
pub use logging::{default_log_level, init_from_config, init_logging, logging_status, LoggingError};
pub use model::statement::{Statement, Term, TEMPLATE_PREDICATE};
pub use model::template::{
    BundledDefinition, BundledTemplate, RecordId, RecordKind, ReferenceTemplate,
    RepositoryRecord, Template,
};
pub use repo::template_repo::{
    RepoError, RepoResult, SqliteTemplateRepository, TemplateRepository, LATEST_TEMPLATE_VERSION,
};
pub use service::bundled::{BundledSource, JsonBundledSource, StaticBundledSource};
pub use service::error::{RegistryError, RegistryResult};
pub use service::migration::{MigrationEngine, MigrationError, MigrationReport, MigrationStep};
pub use service::resolver::{resolve_core, ResolveError, TemplateIndex};
pub use service::template_manager::{InitReport, TemplateManager};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}

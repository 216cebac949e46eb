//! Registry configuration.
//!
//! # Responsibility
//! - Load registry settings from JSON and environment overrides.
//! - Normalize the domain used to mint reference template iris.
//!
//! # Invariants
//! - `domain_name` is an absolute `http(s)` base without trailing `/`.

use crate::logging::default_log_level;
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Environment variable overriding `domain_name`.
pub const DOMAIN_ENV: &str = "ETL_TEMPLATES_DOMAIN";
/// Environment variable overriding `database_path`.
pub const DATABASE_ENV: &str = "ETL_TEMPLATES_DB";

#[derive(Debug)]
pub enum ConfigError {
    Read { path: PathBuf, message: String },
    Parse(String),
    InvalidDomain(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read { path, message } => {
                write!(f, "cannot read config `{}`: {message}", path.display())
            }
            Self::Parse(message) => write!(f, "invalid config: {message}"),
            Self::InvalidDomain(value) => write!(
                f,
                "domain_name must be an absolute http(s) iri, got `{value}`"
            ),
        }
    }
}

impl Error for ConfigError {}

/// Settings of one registry instance.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegistryConfig {
    /// Base iri of this instance, e.g. `http://localhost:8080`.
    pub domain_name: String,
    pub database_path: PathBuf,
    #[serde(default = "default_level")]
    pub log_level: String,
    /// Absolute directory for rolling log files; logging stays off when unset.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_level() -> String {
    default_log_level().to_string()
}

impl RegistryConfig {
    /// Builds a validated config with default logging settings.
    pub fn new(
        domain_name: impl Into<String>,
        database_path: impl Into<PathBuf>,
    ) -> Result<Self, ConfigError> {
        Self {
            domain_name: domain_name.into(),
            database_path: database_path.into(),
            log_level: default_level(),
            log_dir: None,
        }
        .validated()
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validated()
    }

    /// Reads a JSON config file, then applies environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|err| ConfigError::Read {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        let mut config: Self =
            serde_json::from_str(&content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validated()
    }

    /// Base for reference template iris: `<domain>/resources/components/`.
    pub fn components_prefix(&self) -> String {
        format!("{}/resources/components/", self.domain_name)
    }

    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(domain) = lookup(DOMAIN_ENV) {
            self.domain_name = domain;
        }
        if let Some(database) = lookup(DATABASE_ENV) {
            self.database_path = PathBuf::from(database);
        }
    }

    fn validated(mut self) -> Result<Self, ConfigError> {
        self.domain_name = normalize_domain(&self.domain_name)?;
        Ok(self)
    }
}

fn normalize_domain(value: &str) -> Result<String, ConfigError> {
    let trimmed = value.trim().trim_end_matches('/');
    let has_scheme = trimmed.starts_with("http://") || trimmed.starts_with("https://");
    let has_host = trimmed
        .split_once("://")
        .is_some_and(|(_, rest)| !rest.is_empty());
    if !has_scheme || !has_host {
        return Err(ConfigError::InvalidDomain(value.to_string()));
    }
    Ok(trimmed.to_string())
}

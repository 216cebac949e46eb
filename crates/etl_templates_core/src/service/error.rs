//! Registry-level error taxonomy.

use crate::model::template::RecordId;
use crate::repo::template_repo::RepoError;
use crate::service::migration::MigrationError;
use crate::service::resolver::ResolveError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors surfaced by template registry operations.
#[derive(Debug)]
pub enum RegistryError {
    /// A required input or dependency cannot be found.
    MissingInput(String),
    /// A stored record cannot be turned into a template.
    InvalidRecord { id: RecordId, reason: String },
    /// A reference chain never reaches a bundled template.
    UnresolvedCore(ResolveError),
    /// At least one record failed a migration step.
    MigrationFailure(MigrationError),
    /// Operation is not allowed for the target template or registry state.
    IllegalOperation(String),
    /// Operation was called before `initialize()` completed.
    NotInitialized,
    Repo(RepoError),
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingInput(message) => write!(f, "missing input: {message}"),
            Self::InvalidRecord { id, reason } => {
                write!(f, "invalid template record {id}: {reason}")
            }
            Self::UnresolvedCore(err) => write!(f, "{err}"),
            Self::MigrationFailure(err) => write!(f, "{err}"),
            Self::IllegalOperation(message) => write!(f, "illegal operation: {message}"),
            Self::NotInitialized => write!(f, "template registry is not initialized"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RegistryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::UnresolvedCore(err) => Some(err),
            Self::MigrationFailure(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for RegistryError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<ResolveError> for RegistryError {
    fn from(value: ResolveError) -> Self {
        Self::UnresolvedCore(value)
    }
}

impl From<MigrationError> for RegistryError {
    fn from(value: MigrationError) -> Self {
        Self::MigrationFailure(value)
    }
}

//! Template domain model.
//!
//! # Responsibility
//! - Define the closed set of template variants (bundled, reference).
//! - Define the durable record header addressed by internal record ids.
//!
//! # Invariants
//! - `iri` is unique across the in-memory index.
//! - A reference template points at its parent by iri only; the resolved
//!   core is a non-owning key recomputed on every index rebuild.
//! - Bundled templates are never user-mutable.

use crate::model::statement::Statement;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Internal durable identifier of a template record.
///
/// Distinct from the template iri; never reused once reserved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Storage category of a template record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Imported from packaged definitions on every startup.
    Bundled,
    /// User-authored customization.
    Reference,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bundled => "bundled",
            Self::Reference => "reference",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "bundled" => Some(Self::Bundled),
            "reference" => Some(Self::Reference),
            _ => None,
        }
    }
}

/// Header of one durable template record.
///
/// Statement sets are read separately through the repository contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryRecord {
    pub id: RecordId,
    pub kind: RecordKind,
    /// Missing for records that were reserved but never completed.
    pub iri: Option<String>,
    /// Back-pointer to the parent template; reference records only.
    pub parent_iri: Option<String>,
}

impl RepositoryRecord {
    /// Header for a completed reference record.
    pub fn reference(id: RecordId, iri: impl Into<String>, parent_iri: impl Into<String>) -> Self {
        Self {
            id,
            kind: RecordKind::Reference,
            iri: Some(iri.into()),
            parent_iri: Some(parent_iri.into()),
        }
    }
}

/// Packaged, read-only root of reference chains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundledTemplate {
    pub id: RecordId,
    pub iri: String,
    pub interface: Vec<Statement>,
    pub description: Vec<Statement>,
}

/// User-authored customization pointing at a parent template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceTemplate {
    pub id: RecordId,
    pub iri: String,
    pub parent_iri: String,
    /// Iri of the resolved bundled ancestor; `None` when resolution failed.
    pub core_iri: Option<String>,
    pub interface: Vec<Statement>,
    pub description: Vec<Statement>,
}

impl ReferenceTemplate {
    /// Whether this reference resolved to a bundled ancestor.
    pub fn is_usable(&self) -> bool {
        self.core_iri.is_some()
    }
}

/// Template held by the in-memory index.
///
/// Configuration statements are not cached here; they are read from the
/// repository on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Template {
    Bundled(BundledTemplate),
    Reference(ReferenceTemplate),
}

impl Template {
    pub fn id(&self) -> &RecordId {
        match self {
            Self::Bundled(template) => &template.id,
            Self::Reference(template) => &template.id,
        }
    }

    pub fn iri(&self) -> &str {
        match self {
            Self::Bundled(template) => &template.iri,
            Self::Reference(template) => &template.iri,
        }
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Bundled(_) => RecordKind::Bundled,
            Self::Reference(_) => RecordKind::Reference,
        }
    }

    pub fn interface(&self) -> &[Statement] {
        match self {
            Self::Bundled(template) => &template.interface,
            Self::Reference(template) => &template.interface,
        }
    }

    pub fn description(&self) -> &[Statement] {
        match self {
            Self::Bundled(template) => &template.description,
            Self::Reference(template) => &template.description,
        }
    }

    pub fn as_reference(&self) -> Option<&ReferenceTemplate> {
        match self {
            Self::Reference(template) => Some(template),
            Self::Bundled(_) => None,
        }
    }

    pub fn as_bundled(&self) -> Option<&BundledTemplate> {
        match self {
            Self::Bundled(template) => Some(template),
            Self::Reference(_) => None,
        }
    }
}

/// Packaged definition handed over by a bundled source at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundledDefinition {
    pub iri: String,
    #[serde(default)]
    pub interface: Vec<Statement>,
    #[serde(default)]
    pub config: Vec<Statement>,
    #[serde(default)]
    pub description: Vec<Statement>,
}

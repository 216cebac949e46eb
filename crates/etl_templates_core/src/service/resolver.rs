//! Reference chain resolution.
//!
//! # Responsibility
//! - Walk a reference template's parent chain to its bundled root.
//!
//! # Invariants
//! - The walk performs at most `index.len()` hops; any longer chain must
//!   revisit a template, so it is reported as a cycle instead of looping.
//! - Results are never persisted; they are recomputed on every index rebuild.

use crate::model::template::{BundledTemplate, ReferenceTemplate, Template};
use std::collections::{BTreeMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// In-memory index: one mapping from iri to template.
pub type TemplateIndex = BTreeMap<String, Template>;

/// Failure to reach a bundled template from a reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// A template in the chain names a parent that is not indexed.
    MissingParent { template: String, parent: String },
    /// The chain revisits a template before reaching a bundled one.
    CyclicReference { start: String, chain: Vec<String> },
}

impl Display for ResolveError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingParent { template, parent } => {
                write!(f, "parent `{parent}` of template `{template}` is not known")
            }
            Self::CyclicReference { start, chain } => write!(
                f,
                "reference chain of `{start}` never reaches a bundled template: {}",
                chain.join(" -> ")
            ),
        }
    }
}

impl Error for ResolveError {}

/// Resolves the bundled ancestor of `start`.
///
/// # Errors
/// - `MissingParent` when a link points outside the index.
/// - `CyclicReference` when the chain loops.
pub fn resolve_core<'a>(
    start: &ReferenceTemplate,
    index: &'a TemplateIndex,
) -> Result<&'a BundledTemplate, ResolveError> {
    let mut visited = HashSet::from([start.iri.as_str()]);
    let mut chain = vec![start.iri.clone()];
    let mut current_iri = start.iri.as_str();
    let mut parent_iri = start.parent_iri.as_str();

    for _ in 0..=index.len() {
        let parent = index
            .get(parent_iri)
            .ok_or_else(|| ResolveError::MissingParent {
                template: current_iri.to_string(),
                parent: parent_iri.to_string(),
            })?;

        match parent {
            Template::Bundled(bundled) => return Ok(bundled),
            Template::Reference(reference) => {
                chain.push(reference.iri.clone());
                if !visited.insert(reference.iri.as_str()) {
                    break;
                }
                current_iri = reference.iri.as_str();
                parent_iri = reference.parent_iri.as_str();
            }
        }
    }

    Err(ResolveError::CyclicReference {
        start: start.iri.clone(),
        chain,
    })
}

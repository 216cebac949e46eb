//! Index rebuild from durable records.
//!
//! # Responsibility
//! - Turn every stored record into an in-memory template.
//! - Resolve the core of every reference template.
//!
//! # Invariants
//! - A malformed record is logged and skipped; it never aborts the load.
//! - A reference whose chain cannot be resolved stays indexed with
//!   `core_iri = None`.
//! - Only failing to enumerate records is fatal.

use crate::model::template::{
    BundledTemplate, RecordKind, ReferenceTemplate, RepositoryRecord, Template,
};
use crate::repo::template_repo::{RepoResult, TemplateRepository};
use crate::service::error::RegistryError;
use crate::service::resolver::{resolve_core, ResolveError, TemplateIndex};
use log::{error, info, warn};

/// Outcome of one index rebuild.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: usize,
    /// Records skipped as `RegistryError::InvalidRecord`.
    pub skipped: Vec<RegistryError>,
    /// References left without a core, keyed by iri.
    pub unresolved: Vec<(String, ResolveError)>,
}

/// Builds a fresh index from every record in `repository`.
pub fn load_index(repository: &dyn TemplateRepository) -> RepoResult<(TemplateIndex, LoadReport)> {
    let mut index = TemplateIndex::new();
    let mut report = LoadReport::default();

    for record in repository.get_references()? {
        let template = match load_template(repository, &record) {
            Ok(template) => template,
            Err(err) => {
                error!(
                    "event=template_load module=service status=skipped record_id={} error={}",
                    record.id, err
                );
                report.skipped.push(err);
                continue;
            }
        };

        if index.contains_key(template.iri()) {
            let err = RegistryError::InvalidRecord {
                id: record.id.clone(),
                reason: format!("duplicate iri `{}`", template.iri()),
            };
            error!(
                "event=template_load module=service status=skipped record_id={} error={}",
                record.id, err
            );
            report.skipped.push(err);
            continue;
        }
        index.insert(template.iri().to_string(), template);
    }

    report.unresolved = resolve_all_cores(&mut index);
    report.loaded = index.len();
    info!(
        "event=template_load module=service status=ok loaded={} skipped={} unresolved={}",
        report.loaded,
        report.skipped.len(),
        report.unresolved.len()
    );
    Ok((index, report))
}

/// Recomputes `core_iri` for every reference in `index`.
pub fn resolve_all_cores(index: &mut TemplateIndex) -> Vec<(String, ResolveError)> {
    let view: &TemplateIndex = index;
    let outcomes: Vec<(String, Result<String, ResolveError>)> = view
        .values()
        .filter_map(Template::as_reference)
        .map(|reference| {
            let core = resolve_core(reference, view).map(|core| core.iri.clone());
            (reference.iri.clone(), core)
        })
        .collect();

    let mut unresolved = Vec::new();
    for (iri, outcome) in outcomes {
        let core_iri = match outcome {
            Ok(core_iri) => Some(core_iri),
            Err(err) => {
                warn!(
                    "event=core_resolve module=service status=error iri={} error={}",
                    iri, err
                );
                unresolved.push((iri.clone(), err));
                None
            }
        };
        if let Some(Template::Reference(reference)) = index.get_mut(&iri) {
            reference.core_iri = core_iri;
        }
    }
    unresolved
}

fn load_template(
    repository: &dyn TemplateRepository,
    record: &RepositoryRecord,
) -> Result<Template, RegistryError> {
    let invalid = |reason: String| RegistryError::InvalidRecord {
        id: record.id.clone(),
        reason,
    };

    let iri = match record.iri.as_deref().map(str::trim) {
        Some(iri) if !iri.is_empty() => iri.to_string(),
        _ => return Err(invalid("record has no iri".to_string())),
    };
    let interface = repository
        .get_interface(&record.id)
        .map_err(|err| invalid(err.to_string()))?;
    let description = repository
        .get_description(&record.id)
        .map_err(|err| invalid(err.to_string()))?;

    match record.kind {
        RecordKind::Bundled => Ok(Template::Bundled(BundledTemplate {
            id: record.id.clone(),
            iri,
            interface,
            description,
        })),
        RecordKind::Reference => {
            let parent_iri = match record.parent_iri.as_deref().map(str::trim) {
                Some(parent) if !parent.is_empty() => parent.to_string(),
                _ => return Err(invalid("reference record has no parent".to_string())),
            };
            Ok(Template::Reference(ReferenceTemplate {
                id: record.id.clone(),
                iri,
                parent_iri,
                core_iri: None,
                interface,
                description,
            }))
        }
    }
}

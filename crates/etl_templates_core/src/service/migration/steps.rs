//! Production migration steps of the template record shape.
//!
//! Bundled records are imported in the latest shape on every startup, so
//! each step only rewrites reference records.

use super::{MigrationStep, StepContext};
use crate::model::statement::{configuration_graph, Statement, Term, TEMPLATE_PREDICATE};
use crate::model::template::{ReferenceTemplate, RepositoryRecord, Template};
use crate::repo::template_repo::{RepoError, RepoResult};
use log::info;

const LEGACY_BUNDLED_SEGMENT: &str = "/resources/jars/";
const BUNDLED_SEGMENT: &str = "/resources/components/";

pub(super) fn standard_steps() -> Vec<MigrationStep> {
    vec![
        MigrationStep::new(1, 2, true, Box::new(only_references(canonical_parent_iri))),
        MigrationStep::new(2, 3, true, Box::new(only_references(interface_into_template_graph))),
        // Configuration is not cached by the index, no reload needed.
        MigrationStep::new(3, 4, false, Box::new(only_references(configuration_into_own_graph))),
    ]
}

fn only_references(
    step: fn(&StepContext<'_>, &ReferenceTemplate) -> RepoResult<()>,
) -> impl Fn(&StepContext<'_>, &Template) -> RepoResult<()> + Send + Sync {
    move |context: &StepContext<'_>, template: &Template| match template {
        Template::Reference(reference) => step(context, reference),
        Template::Bundled(_) => Ok(()),
    }
}

/// 1 -> 2: parent pointers naming a bundled component by its archive iri are
/// rewritten to the component iri. A legacy parent with no imported bundled
/// counterpart fails the record, so the store stays at version 1.
fn canonical_parent_iri(context: &StepContext<'_>, template: &ReferenceTemplate) -> RepoResult<()> {
    if context.index.contains_key(&template.parent_iri) {
        return Ok(());
    }
    let Some(canonical) = canonical_bundled_iri(&template.parent_iri) else {
        return Ok(());
    };
    let known_bundled = context
        .index
        .get(&canonical)
        .is_some_and(|parent| parent.as_bundled().is_some());
    if !known_bundled {
        return Err(RepoError::InvalidData(format!(
            "unknown canonical parent `{canonical}` for legacy parent `{}`",
            template.parent_iri
        )));
    }

    let repository = context.repository;
    repository.set_record(&RepositoryRecord::reference(
        template.id.clone(),
        template.iri.as_str(),
        canonical.as_str(),
    ))?;

    let interface: Vec<Statement> = repository
        .get_interface(&template.id)?
        .into_iter()
        .map(|mut statement| {
            if statement.predicate == TEMPLATE_PREDICATE
                && statement.object.as_iri() == Some(template.parent_iri.as_str())
            {
                statement.object = Term::iri(canonical.as_str());
            }
            statement
        })
        .collect();
    repository.set_interface(&template.id, &interface)?;

    info!(
        "event=migration_record module=migration status=ok to_version=2 iri={}",
        template.iri
    );
    Ok(())
}

/// 2 -> 3: interface statements move into the template's own graph.
fn interface_into_template_graph(
    context: &StepContext<'_>,
    template: &ReferenceTemplate,
) -> RepoResult<()> {
    let repository = context.repository;
    let interface = repository.get_interface(&template.id)?;
    if let Some(rewritten) = rewrite_contexts(interface, &template.iri) {
        repository.set_interface(&template.id, &rewritten)?;
    }
    Ok(())
}

/// 3 -> 4: configuration statements move into `<iri>/configuration`.
fn configuration_into_own_graph(
    context: &StepContext<'_>,
    template: &ReferenceTemplate,
) -> RepoResult<()> {
    let repository = context.repository;
    let config = repository.get_config(&template.id)?;
    let graph = configuration_graph(&template.iri);
    if let Some(rewritten) = rewrite_contexts(config, &graph) {
        repository.set_config(&template.id, &rewritten)?;
    }
    Ok(())
}

/// Returns the statements placed into `graph`, or `None` when all of them
/// already are.
fn rewrite_contexts(statements: Vec<Statement>, graph: &str) -> Option<Vec<Statement>> {
    if statements
        .iter()
        .all(|statement| statement.context.as_deref() == Some(graph))
    {
        return None;
    }
    Some(
        statements
            .into_iter()
            .map(|statement| statement.in_graph(graph))
            .collect(),
    )
}

fn canonical_bundled_iri(legacy_iri: &str) -> Option<String> {
    legacy_iri
        .contains(LEGACY_BUNDLED_SEGMENT)
        .then(|| legacy_iri.replacen(LEGACY_BUNDLED_SEGMENT, BUNDLED_SEGMENT, 1))
}

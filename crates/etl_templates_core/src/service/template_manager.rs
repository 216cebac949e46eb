//! Template registry orchestration.
//!
//! # Responsibility
//! - Import bundled definitions, load and resolve stored templates, and run
//!   pending schema migrations at startup.
//! - Provide create/update/remove operations over the in-memory index and
//!   the durable repository.
//!
//! # Invariants
//! - Mutations are serialized by one lock; readers get immutable snapshots
//!   published after every successful mutation.
//! - The durable store is the source of truth. Each mutation writes the
//!   repository first and the index second.
//! - Bundled templates can only have their configuration replaced.
//! - `update_finished()` is called once per startup, only after every pending
//!   migration succeeded.

use crate::config::RegistryConfig;
use crate::model::statement::{
    configuration_graph, description_graph, force_context, Statement, Term, TEMPLATE_PREDICATE,
};
use crate::model::template::{
    BundledDefinition, BundledTemplate, RecordId, ReferenceTemplate, RepositoryRecord, Template,
};
use crate::repo::template_repo::{RepoResult, TemplateRepository};
use crate::service::bundled::BundledSource;
use crate::service::error::{RegistryError, RegistryResult};
use crate::service::loader::{load_index, LoadReport};
use crate::service::migration::{MigrationEngine, MigrationReport, MigrationTarget};
use crate::service::patch::{patch, replace_all};
use crate::service::resolver::{resolve_core, TemplateIndex};
use log::{error, info, warn};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Instant;

/// Outcome of a successful `initialize()`.
#[derive(Debug)]
pub struct InitReport {
    pub bundled_imported: usize,
    /// Report of the last index rebuild.
    pub load: LoadReport,
    /// `None` when the store was already at the latest version.
    pub migration: Option<MigrationReport>,
}

struct RegistryState<R> {
    repository: R,
    index: TemplateIndex,
    last_load: LoadReport,
    initialized: bool,
}

impl<R: TemplateRepository> MigrationTarget for RegistryState<R> {
    fn repository(&self) -> &dyn TemplateRepository {
        &self.repository
    }

    fn index(&self) -> &TemplateIndex {
        &self.index
    }

    fn reload(&mut self) -> RepoResult<()> {
        info!("event=index_reload module=service status=start");
        let (index, report) = load_index(&self.repository)?;
        self.index = index;
        self.last_load = report;
        Ok(())
    }
}

/// Registry of bundled and reference templates.
pub struct TemplateManager<R: TemplateRepository> {
    components_prefix: String,
    migrations: MigrationEngine,
    state: Mutex<RegistryState<R>>,
    snapshot: RwLock<Arc<TemplateIndex>>,
}

impl<R: TemplateRepository> TemplateManager<R> {
    /// Creates a manager with the production migration table.
    pub fn new(repository: R, config: &RegistryConfig) -> Self {
        Self::with_migrations(repository, config, MigrationEngine::standard())
    }

    /// Creates a manager with a custom migration table.
    pub fn with_migrations(
        repository: R,
        config: &RegistryConfig,
        migrations: MigrationEngine,
    ) -> Self {
        Self {
            components_prefix: config.components_prefix(),
            migrations,
            state: Mutex::new(RegistryState {
                repository,
                index: TemplateIndex::new(),
                last_load: LoadReport::default(),
                initialized: false,
            }),
            snapshot: RwLock::new(Arc::new(TemplateIndex::new())),
        }
    }

    /// Brings the registry to a ready state.
    ///
    /// # Errors
    /// Any error is fatal to startup. A `MigrationFailure` leaves the stored
    /// version untouched, so a retry starts again from the old version.
    pub fn initialize(&self, source: &dyn BundledSource) -> RegistryResult<InitReport> {
        let mut state = self.lock_state();
        if state.initialized {
            return Err(RegistryError::IllegalOperation(
                "registry is already initialized".to_string(),
            ));
        }

        let started_at = Instant::now();
        info!("event=registry_init module=service status=start");
        match self.initialize_locked(&mut state, source) {
            Ok(report) => {
                state.initialized = true;
                self.publish(&state.index);
                info!(
                    "event=registry_init module=service status=ok duration_ms={} bundled={} templates={} migrated={}",
                    started_at.elapsed().as_millis(),
                    report.bundled_imported,
                    state.index.len(),
                    report.migration.is_some()
                );
                Ok(report)
            }
            Err(err) => {
                error!(
                    "event=registry_init module=service status=error duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    fn initialize_locked(
        &self,
        state: &mut RegistryState<R>,
        source: &dyn BundledSource,
    ) -> RegistryResult<InitReport> {
        let definitions = valid_bundled_definitions(source.list_bundled_definitions()?);
        let bundled_imported = state.repository.replace_bundled(&definitions)?.len();
        info!(
            "event=bundled_import module=service status=ok count={}",
            bundled_imported
        );

        state.reload()?;

        let initial_version = state.repository.get_initial_version();
        let migration = if initial_version != self.migrations.latest_version() {
            Some(self.migrations.run(initial_version, state)?)
        } else {
            None
        };
        state.repository.update_finished()?;

        Ok(InitReport {
            bundled_imported,
            load: std::mem::take(&mut state.last_load),
            migration,
        })
    }

    /// Point-in-time snapshot of every indexed template, keyed by iri.
    pub fn get_templates(&self) -> Arc<TemplateIndex> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn get_template(&self, iri: &str) -> Option<Template> {
        self.get_templates().get(iri).cloned()
    }

    /// Resolved bundled ancestor of `iri`; a bundled template is its own core.
    pub fn core_of(&self, iri: &str) -> Option<BundledTemplate> {
        let templates = self.get_templates();
        let core_iri = match templates.get(iri)? {
            Template::Bundled(bundled) => return Some(bundled.clone()),
            Template::Reference(reference) => reference.core_iri.as_deref()?,
        };
        templates.get(core_iri)?.as_bundled().cloned()
    }

    /// Creates a reference template from user-supplied statement sets.
    ///
    /// The interface must link exactly one resource to its parent template
    /// via the template predicate; that resource is renamed to the new iri.
    ///
    /// # Errors
    /// On any failure after the id is reserved, the reserved record is
    /// deleted (best effort) and the original error is returned.
    pub fn create_template(
        &self,
        interface: Vec<Statement>,
        config: Vec<Statement>,
        description: Option<Vec<Statement>>,
    ) -> RegistryResult<ReferenceTemplate> {
        let mut state = self.ready_state()?;
        let id = state.repository.reserve_new_id()?;
        let iri = format!("{}{}", self.components_prefix, id);

        match build_reference(&state, &id, &iri, interface, config, description.unwrap_or_default())
        {
            Ok(template) => {
                state
                    .index
                    .insert(iri.clone(), Template::Reference(template.clone()));
                self.publish(&state.index);
                info!(
                    "event=template_create module=service status=ok record_id={} iri={} parent={}",
                    id, iri, template.parent_iri
                );
                Ok(template)
            }
            Err(err) => {
                if let Err(cleanup) = state.repository.remove(&id) {
                    warn!(
                        "event=template_create module=service status=rollback_failed record_id={} error={}",
                        id, cleanup
                    );
                }
                error!(
                    "event=template_create module=service status=error record_id={} error={}",
                    id, err
                );
                Err(err)
            }
        }
    }

    /// Patches the interface of a reference template with `diff`.
    ///
    /// # Errors
    /// - `IllegalOperation` for bundled templates and for diffs that touch
    ///   the parent link; the parent of a reference is fixed at creation.
    pub fn update_interface(&self, template: &Template, diff: Vec<Statement>) -> RegistryResult<()> {
        let mut state = self.ready_state()?;
        let current = reference_in(&state.index, template, "only reference templates can be updated")?;
        let id = current.id.clone();
        let iri = current.iri.clone();
        if diff
            .iter()
            .any(|statement| statement.predicate == TEMPLATE_PREDICATE)
        {
            return Err(RegistryError::IllegalOperation(format!(
                "interface update cannot change the parent link of `{iri}`"
            )));
        }

        let diff = force_context(diff, &iri);
        let original = state.repository.get_interface(&id)?;
        let merged = patch(&original, &diff);
        state.repository.set_interface(&id, &merged)?;

        if let Some(Template::Reference(reference)) = state.index.get_mut(&iri) {
            reference.interface = merged;
        }
        self.publish(&state.index);
        info!(
            "event=template_update_interface module=service status=ok iri={} diff={}",
            iri,
            diff.len()
        );
        Ok(())
    }

    /// Replaces the whole configuration of any template.
    pub fn update_config(&self, template: &Template, statements: Vec<Statement>) -> RegistryResult<()> {
        let state = self.ready_state()?;
        let current = indexed(&state.index, template)?;
        let config = replace_all(statements, &configuration_graph(current.iri()));
        state.repository.set_config(current.id(), &config)?;
        info!(
            "event=template_update_config module=service status=ok iri={} statements={}",
            current.iri(),
            config.len()
        );
        Ok(())
    }

    /// Removes a reference template from the index and the durable store.
    ///
    /// Templates still pointing at the removed one are left in place; they
    /// keep their current core until the next reload fails to resolve them.
    pub fn remove(&self, template: &Template) -> RegistryResult<()> {
        let mut state = self.ready_state()?;
        let current = reference_in(&state.index, template, "only reference templates can be removed")?;
        let id = current.id.clone();
        let iri = current.iri.clone();

        state.repository.remove(&id)?;
        state.index.remove(&iri);
        let dependents = state
            .index
            .values()
            .filter_map(Template::as_reference)
            .filter(|reference| reference.parent_iri == iri)
            .count();
        self.publish(&state.index);

        if dependents > 0 {
            warn!(
                "event=template_remove module=service status=ok iri={} dangling_children={}",
                iri, dependents
            );
        } else {
            info!("event=template_remove module=service status=ok iri={}", iri);
        }
        Ok(())
    }

    /// Stored interface statements of `template`.
    pub fn get_interface(&self, template: &Template) -> RegistryResult<Vec<Statement>> {
        let state = self.ready_state()?;
        let id = indexed(&state.index, template)?.id().clone();
        Ok(state.repository.get_interface(&id)?)
    }

    /// Stored configuration statements of `template`.
    pub fn get_config(&self, template: &Template) -> RegistryResult<Vec<Statement>> {
        let state = self.ready_state()?;
        let id = indexed(&state.index, template)?.id().clone();
        Ok(state.repository.get_config(&id)?)
    }

    /// Stored description statements of `template`.
    pub fn get_description(&self, template: &Template) -> RegistryResult<Vec<Statement>> {
        let state = self.ready_state()?;
        let id = indexed(&state.index, template)?.id().clone();
        Ok(state.repository.get_description(&id)?)
    }

    /// Runs `action` with exclusive access to the repository.
    pub fn with_repository<T>(&self, action: impl FnOnce(&R) -> T) -> T {
        action(&self.lock_state().repository)
    }

    fn lock_state(&self) -> MutexGuard<'_, RegistryState<R>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ready_state(&self) -> RegistryResult<MutexGuard<'_, RegistryState<R>>> {
        let state = self.lock_state();
        if !state.initialized {
            return Err(RegistryError::NotInitialized);
        }
        Ok(state)
    }

    fn publish(&self, index: &TemplateIndex) {
        let next = Arc::new(index.clone());
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = next;
    }
}

fn indexed<'a>(index: &'a TemplateIndex, template: &Template) -> RegistryResult<&'a Template> {
    index.get(template.iri()).ok_or_else(|| {
        RegistryError::IllegalOperation(format!("unknown template `{}`", template.iri()))
    })
}

fn reference_in<'a>(
    index: &'a TemplateIndex,
    template: &Template,
    message: &str,
) -> RegistryResult<&'a ReferenceTemplate> {
    indexed(index, template)?
        .as_reference()
        .ok_or_else(|| RegistryError::IllegalOperation(format!("{message}: `{}`", template.iri())))
}

fn build_reference<R: TemplateRepository>(
    state: &RegistryState<R>,
    id: &RecordId,
    iri: &str,
    interface: Vec<Statement>,
    config: Vec<Statement>,
    description: Vec<Statement>,
) -> RegistryResult<ReferenceTemplate> {
    let (resource, parent_iri) = template_link(&interface)?;
    let interface = force_context(rename_subject(interface, &resource, iri), iri);
    let description = force_context(
        rename_subject(description, &resource, iri),
        &description_graph(iri),
    );
    let config = force_context(config, &configuration_graph(iri));

    let mut template = ReferenceTemplate {
        id: id.clone(),
        iri: iri.to_string(),
        parent_iri: parent_iri.clone(),
        core_iri: None,
        interface,
        description,
    };
    template.core_iri = Some(resolve_core(&template, &state.index)?.iri.clone());

    let repository = &state.repository;
    repository.set_record(&RepositoryRecord::reference(id.clone(), iri, parent_iri))?;
    repository.set_interface(id, &template.interface)?;
    repository.set_config(id, &config)?;
    repository.set_description(id, &template.description)?;
    Ok(template)
}

/// Finds the single `(resource, parent iri)` link in a new interface.
fn template_link(interface: &[Statement]) -> RegistryResult<(Term, String)> {
    let links: HashSet<(&Term, &Term)> = interface
        .iter()
        .filter(|statement| statement.predicate == TEMPLATE_PREDICATE)
        .map(|statement| (&statement.subject, &statement.object))
        .collect();

    let mut links = links.into_iter();
    match (links.next(), links.next()) {
        (Some((resource, parent)), None) => {
            let parent = parent.as_iri().ok_or_else(|| {
                RegistryError::MissingInput(format!("parent template must be an iri, got {parent}"))
            })?;
            Ok((resource.clone(), parent.to_string()))
        }
        (None, _) => Err(RegistryError::MissingInput(
            "interface does not name a parent template".to_string(),
        )),
        (Some(_), Some(_)) => Err(RegistryError::MissingInput(
            "interface names more than one parent template".to_string(),
        )),
    }
}

fn rename_subject(statements: Vec<Statement>, from: &Term, to: &str) -> Vec<Statement> {
    statements
        .into_iter()
        .map(|mut statement| {
            if &statement.subject == from {
                statement.subject = Term::iri(to);
            }
            statement
        })
        .collect()
}

/// Drops definitions without an iri or with a repeated one; kept iris are
/// stored trimmed.
fn valid_bundled_definitions(definitions: Vec<BundledDefinition>) -> Vec<BundledDefinition> {
    let mut seen = HashSet::new();
    definitions
        .into_iter()
        .filter_map(|mut definition| {
            definition.iri = definition.iri.trim().to_string();
            if definition.iri.is_empty() {
                error!("event=bundled_import module=service status=skipped reason=missing_iri");
                return None;
            }
            if !seen.insert(definition.iri.clone()) {
                error!(
                    "event=bundled_import module=service status=skipped reason=duplicate_iri iri={}",
                    definition.iri
                );
                return None;
            }
            Some(definition)
        })
        .collect()
}

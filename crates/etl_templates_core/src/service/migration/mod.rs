//! Template schema migration engine.
//!
//! # Responsibility
//! - Hold the ordered table of `(from_version, step, requires_reload)`.
//! - Apply every pending step to every indexed template.
//!
//! # Invariants
//! - Steps run in increasing version order and never backward.
//! - Records failing a step do not stop sibling records, but any failure
//!   fails the step and halts the engine; later steps never run.
//! - A step flagged `requires_reload` is followed by a full index rebuild
//!   before the next step starts.
//! - The engine never persists a version; the caller does so only after a
//!   successful run.

mod steps;

use crate::model::template::Template;
use crate::repo::template_repo::{RepoError, RepoResult, TemplateRepository, LATEST_TEMPLATE_VERSION};
use crate::service::resolver::TemplateIndex;
use log::{error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Inputs available to a step while it migrates one template.
pub struct StepContext<'a> {
    pub repository: &'a dyn TemplateRepository,
    pub index: &'a TemplateIndex,
}

/// Per-template transformation of a migration step.
pub type StepFn = Box<dyn Fn(&StepContext<'_>, &Template) -> RepoResult<()> + Send + Sync>;

/// One versioned upgrade of the durable record shape.
pub struct MigrationStep {
    pub from_version: u32,
    pub to_version: u32,
    /// The step changes data cached by the in-memory index.
    pub requires_reload: bool,
    apply: StepFn,
}

impl MigrationStep {
    pub fn new(from_version: u32, to_version: u32, requires_reload: bool, apply: StepFn) -> Self {
        Self {
            from_version,
            to_version,
            requires_reload,
            apply,
        }
    }
}

/// Owner of the index the engine migrates.
pub trait MigrationTarget {
    fn repository(&self) -> &dyn TemplateRepository;
    fn index(&self) -> &TemplateIndex;
    /// Rebuilds the index from the repository.
    fn reload(&mut self) -> RepoResult<()>;
}

/// One template that failed a step.
#[derive(Debug)]
pub struct RecordFailure {
    pub iri: String,
    pub error: RepoError,
}

/// Migration engine failure.
#[derive(Debug)]
pub enum MigrationError {
    /// Stored version is newer than this binary understands.
    UnsupportedVersion { found: u32, latest: u32 },
    /// At least one template failed the step.
    StepFailed {
        from_version: u32,
        to_version: u32,
        failures: Vec<RecordFailure>,
    },
    /// Index rebuild after a step failed.
    Reload { after_version: u32, error: RepoError },
}

impl Display for MigrationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedVersion { found, latest } => write!(
                f,
                "template schema version {found} is newer than supported {latest}"
            ),
            Self::StepFailed {
                from_version,
                to_version,
                failures,
            } => {
                write!(
                    f,
                    "migration {from_version} -> {to_version} failed for {} template(s)",
                    failures.len()
                )?;
                for failure in failures {
                    write!(f, "; {}: {}", failure.iri, failure.error)?;
                }
                Ok(())
            }
            Self::Reload {
                after_version,
                error,
            } => write!(f, "reload after migration to {after_version} failed: {error}"),
        }
    }
}

impl Error for MigrationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Reload { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// One executed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedStep {
    pub from_version: u32,
    pub to_version: u32,
    pub reloaded: bool,
}

/// Steps executed by a successful run, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub applied: Vec<AppliedStep>,
}

/// Ordered table of migration steps.
pub struct MigrationEngine {
    steps: Vec<MigrationStep>,
    latest_version: u32,
}

impl MigrationEngine {
    /// Builds an engine over `steps`, sorted by source version.
    pub fn new(mut steps: Vec<MigrationStep>, latest_version: u32) -> Self {
        steps.sort_by_key(|step| step.from_version);
        Self {
            steps,
            latest_version,
        }
    }

    /// Engine with the production step table.
    pub fn standard() -> Self {
        Self::new(steps::standard_steps(), LATEST_TEMPLATE_VERSION)
    }

    pub fn latest_version(&self) -> u32 {
        self.latest_version
    }

    /// Steps that a store at `version` still needs, in execution order.
    pub fn pending_steps(&self, version: u32) -> impl Iterator<Item = &MigrationStep> {
        self.steps
            .iter()
            .filter(move |step| step.to_version > version)
    }

    /// Runs every pending step starting from `initial_version`.
    ///
    /// # Errors
    /// - `UnsupportedVersion` when `initial_version` is newer than the table.
    /// - `StepFailed` with every failing template of the first failed step.
    /// - `Reload` when the index rebuild between steps fails.
    pub fn run(
        &self,
        initial_version: u32,
        target: &mut dyn MigrationTarget,
    ) -> Result<MigrationReport, MigrationError> {
        if initial_version > self.latest_version {
            return Err(MigrationError::UnsupportedVersion {
                found: initial_version,
                latest: self.latest_version,
            });
        }

        let mut report = MigrationReport::default();
        for step in self.pending_steps(initial_version) {
            info!(
                "event=migration_step module=migration status=start from_version={} to_version={} templates={}",
                step.from_version,
                step.to_version,
                target.index().len()
            );

            let failures = apply_step(step, &*target);
            if !failures.is_empty() {
                error!(
                    "event=migration_step module=migration status=error from_version={} to_version={} failed={}",
                    step.from_version,
                    step.to_version,
                    failures.len()
                );
                return Err(MigrationError::StepFailed {
                    from_version: step.from_version,
                    to_version: step.to_version,
                    failures,
                });
            }

            if step.requires_reload {
                info!(
                    "event=index_reload module=migration status=start after_version={}",
                    step.to_version
                );
                target.reload().map_err(|error| MigrationError::Reload {
                    after_version: step.to_version,
                    error,
                })?;
            }

            info!(
                "event=migration_step module=migration status=ok from_version={} to_version={} reloaded={}",
                step.from_version, step.to_version, step.requires_reload
            );
            report.applied.push(AppliedStep {
                from_version: step.from_version,
                to_version: step.to_version,
                reloaded: step.requires_reload,
            });
        }

        Ok(report)
    }
}

fn apply_step(step: &MigrationStep, target: &dyn MigrationTarget) -> Vec<RecordFailure> {
    let context = StepContext {
        repository: target.repository(),
        index: target.index(),
    };

    let mut failures = Vec::new();
    for template in context.index.values() {
        if let Err(error) = (step.apply)(&context, template) {
            error!(
                "event=migration_record module=migration status=error to_version={} iri={} error={}",
                step.to_version,
                template.iri(),
                error
            );
            failures.push(RecordFailure {
                iri: template.iri().to_string(),
                error,
            });
        }
    }
    failures
}

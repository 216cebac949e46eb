use etl_templates_core::db::{open_db, open_db_in_memory};
use etl_templates_core::service::migration::{AppliedStep, StepContext};
use etl_templates_core::{
    BundledDefinition, MigrationEngine, MigrationError, MigrationStep, RegistryConfig,
    RegistryError, RepoError, SqliteTemplateRepository, StaticBundledSource, Statement, Template,
    TemplateManager, TemplateRepository, Term, LATEST_TEMPLATE_VERSION, TEMPLATE_PREDICATE,
};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};

const DOMAIN: &str = "http://localhost:8080";
const CORE: &str = "http://etl.linkedpipes.com/resources/components/e-textHolder/0.0.0";
const LEGACY_CORE: &str = "http://etl.linkedpipes.com/resources/jars/e-textHolder/0.0.0";
const LABEL: &str = "http://www.w3.org/2004/02/skos/core#prefLabel";

type StepLog = Arc<Mutex<Vec<(u32, String)>>>;

fn config() -> RegistryConfig {
    RegistryConfig::new(DOMAIN, "unused.db").unwrap()
}

fn source() -> StaticBundledSource {
    StaticBundledSource::new(vec![BundledDefinition {
        iri: CORE.to_string(),
        interface: vec![Statement::new(Term::iri(CORE), LABEL, Term::literal("Text holder"))],
        config: Vec::new(),
        description: Vec::new(),
    }])
}

fn set_stored_version(conn: &Connection, version: u32) {
    conn.execute(
        "INSERT INTO registry_meta (key, value) VALUES ('template_schema_version', ?1)
         ON CONFLICT (key) DO UPDATE SET value = excluded.value;",
        [version.to_string()],
    )
    .unwrap();
}

fn insert_reference(conn: &Connection, id: &str, iri: &str, parent: &str) {
    conn.execute(
        "INSERT INTO template_records (id, kind, iri, parent_iri) VALUES (?1, 'reference', ?2, ?3);",
        params![id, iri, parent],
    )
    .unwrap();
}

fn insert_statement(
    conn: &Connection,
    id: &str,
    section: &str,
    position: i64,
    statement: (&str, &str, &str, bool, Option<&str>),
) {
    let (subject, predicate, object, object_is_iri, context) = statement;
    conn.execute(
        "INSERT INTO template_statements
            (record_id, section, position, subject_kind, subject, predicate, object_kind, object_value, context)
         VALUES (?1, ?2, ?3, 'iri', ?4, ?5, ?6, ?7, ?8);",
        params![
            id,
            section,
            position,
            subject,
            predicate,
            if object_is_iri { "iri" } else { "literal" },
            object,
            context
        ],
    )
    .unwrap();
}

/// Repository at stored version `version` holding one plain reference.
fn store_at_version(path: &Path, version: u32) -> SqliteTemplateRepository {
    let conn = open_db(path).unwrap();
    insert_reference(&conn, "r1", "urn:r1", CORE);
    set_stored_version(&conn, version);
    SqliteTemplateRepository::try_new(conn).unwrap()
}

fn recording_step(from: u32, to: u32, reload: bool, log: &StepLog) -> MigrationStep {
    let log = Arc::clone(log);
    MigrationStep::new(
        from,
        to,
        reload,
        Box::new(move |_: &StepContext<'_>, template: &Template| {
            log.lock().unwrap().push((to, template.iri().to_string()));
            Ok(())
        }),
    )
}

fn failing_step(from: u32, to: u32, failing_iri: &'static str, log: &StepLog) -> MigrationStep {
    let log = Arc::clone(log);
    MigrationStep::new(
        from,
        to,
        true,
        Box::new(move |_: &StepContext<'_>, template: &Template| {
            if template.iri() == failing_iri {
                return Err(RepoError::InvalidData("cannot migrate".to_string()));
            }
            log.lock().unwrap().push((to, template.iri().to_string()));
            Ok(())
        }),
    )
}

fn recording_engine(log: &StepLog) -> MigrationEngine {
    MigrationEngine::new(
        vec![
            recording_step(3, 4, false, log),
            recording_step(1, 2, true, log),
            recording_step(2, 3, true, log),
        ],
        LATEST_TEMPLATE_VERSION,
    )
}

#[test]
fn version_one_runs_every_step_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let log = StepLog::default();
    let repo = store_at_version(&dir.path().join("t.db"), 1);
    let manager = TemplateManager::with_migrations(repo, &config(), recording_engine(&log));

    let report = manager.initialize(&source()).unwrap();

    assert_eq!(
        report.migration.unwrap().applied,
        vec![
            AppliedStep { from_version: 1, to_version: 2, reloaded: true },
            AppliedStep { from_version: 2, to_version: 3, reloaded: true },
            AppliedStep { from_version: 3, to_version: 4, reloaded: false },
        ]
    );
    let versions: Vec<u32> = log.lock().unwrap().iter().map(|(to, _)| *to).collect();
    assert_eq!(versions, vec![2, 2, 3, 3, 4, 4]);
    let stored = manager.with_repository(|repo| repo.stored_version().unwrap());
    assert_eq!(stored, Some(LATEST_TEMPLATE_VERSION));
}

#[test]
fn version_three_runs_only_last_step() {
    let dir = tempfile::tempdir().unwrap();
    let log = StepLog::default();
    let repo = store_at_version(&dir.path().join("t.db"), 3);
    let manager = TemplateManager::with_migrations(repo, &config(), recording_engine(&log));

    let report = manager.initialize(&source()).unwrap();

    let applied = report.migration.unwrap().applied;
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].to_version, 4);
    assert!(!applied[0].reloaded);
    assert!(log.lock().unwrap().iter().all(|(to, _)| *to == 4));
}

#[test]
fn failed_step_halts_engine_and_keeps_stored_version() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("t.db");
    let log = StepLog::default();
    let engine = MigrationEngine::new(
        vec![
            recording_step(1, 2, true, &log),
            failing_step(2, 3, "urn:r1", &log),
            recording_step(3, 4, false, &log),
        ],
        LATEST_TEMPLATE_VERSION,
    );
    let manager = TemplateManager::with_migrations(store_at_version(&path, 1), &config(), engine);

    let err = manager.initialize(&source()).unwrap_err();

    match err {
        RegistryError::MigrationFailure(MigrationError::StepFailed {
            from_version,
            to_version,
            failures,
        }) => {
            assert_eq!((from_version, to_version), (2, 3));
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].iri, "urn:r1");
        }
        other => panic!("unexpected error: {other}"),
    }
    let entries = log.lock().unwrap().clone();
    assert!(entries.contains(&(3, CORE.to_string())), "sibling must still migrate");
    assert!(entries.iter().all(|(to, _)| *to != 4));
    let stored = manager.with_repository(|repo| repo.stored_version().unwrap());
    assert_eq!(stored, Some(1));
    assert!(manager.get_templates().is_empty());
    drop(manager);

    let retry_log = StepLog::default();
    let retry_repo = SqliteTemplateRepository::try_new(open_db(&path).unwrap()).unwrap();
    assert_eq!(retry_repo.get_initial_version(), 1);
    let retry = TemplateManager::with_migrations(retry_repo, &config(), recording_engine(&retry_log));
    let report = retry.initialize(&source()).unwrap();
    assert_eq!(report.migration.unwrap().applied[0].from_version, 1);
}

#[test]
fn newer_stored_version_is_refused() {
    let conn = open_db_in_memory().unwrap();
    set_stored_version(&conn, LATEST_TEMPLATE_VERSION + 1);
    let repo = SqliteTemplateRepository::try_new(conn).unwrap();
    let manager = TemplateManager::new(repo, &config());

    let err = manager.initialize(&source()).unwrap_err();
    assert!(matches!(
        err,
        RegistryError::MigrationFailure(MigrationError::UnsupportedVersion { .. })
    ));
    let stored = manager.with_repository(|repo| repo.stored_version().unwrap());
    assert_eq!(stored, Some(LATEST_TEMPLATE_VERSION + 1));
}

#[test]
fn standard_steps_upgrade_legacy_records() {
    let conn = open_db_in_memory().unwrap();
    insert_reference(&conn, "r1", "urn:r1", LEGACY_CORE);
    insert_statement(&conn, "r1", "interface", 0, ("urn:r1", TEMPLATE_PREDICATE, LEGACY_CORE, true, None));
    insert_statement(&conn, "r1", "interface", 1, ("urn:r1", LABEL, "legacy", false, Some("urn:other")));
    insert_statement(&conn, "r1", "config", 0, ("urn:cfg", LABEL, "value", false, Some("urn:r1")));
    insert_reference(&conn, "r2", "urn:r2", "urn:r1");
    set_stored_version(&conn, 1);
    let manager = TemplateManager::new(SqliteTemplateRepository::try_new(conn).unwrap(), &config());

    let report = manager.initialize(&source()).unwrap();

    let applied = report.migration.unwrap().applied;
    assert_eq!(applied.len(), 3);
    assert!(report.load.unresolved.is_empty());

    let r1 = manager.get_template("urn:r1").unwrap();
    let r1_reference = r1.as_reference().unwrap();
    assert_eq!(r1_reference.parent_iri, CORE);
    assert_eq!(r1_reference.core_iri.as_deref(), Some(CORE));
    assert!(r1
        .interface()
        .iter()
        .all(|statement| statement.context.as_deref() == Some("urn:r1")));
    assert!(r1.interface().iter().any(|statement| {
        statement.predicate == TEMPLATE_PREDICATE && statement.object == Term::iri(CORE)
    }));

    let config = manager.get_config(&r1).unwrap();
    assert_eq!(config[0].context.as_deref(), Some("urn:r1/configuration"));

    let r2 = manager.get_template("urn:r2").unwrap();
    assert_eq!(r2.as_reference().unwrap().core_iri.as_deref(), Some(CORE));
    let stored = manager.with_repository(|repo| repo.stored_version().unwrap());
    assert_eq!(stored, Some(LATEST_TEMPLATE_VERSION));
}

#[test]
fn latest_store_skips_migration() {
    let log = StepLog::default();
    let repo = SqliteTemplateRepository::try_new(open_db_in_memory().unwrap()).unwrap();
    let manager = TemplateManager::with_migrations(repo, &config(), recording_engine(&log));

    let report = manager.initialize(&source()).unwrap();

    assert!(report.migration.is_none());
    assert!(log.lock().unwrap().is_empty());
    let stored = manager.with_repository(|repo| repo.stored_version().unwrap());
    assert_eq!(stored, Some(LATEST_TEMPLATE_VERSION));
}

#[test]
fn legacy_parent_without_bundled_counterpart_fails_until_imported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("t.db");
    let conn = open_db(&path).unwrap();
    insert_reference(&conn, "r1", "urn:r1", LEGACY_CORE);
    insert_statement(&conn, "r1", "interface", 0, ("urn:r1", TEMPLATE_PREDICATE, LEGACY_CORE, true, None));
    set_stored_version(&conn, 1);
    let manager = TemplateManager::new(SqliteTemplateRepository::try_new(conn).unwrap(), &config());

    let err = manager
        .initialize(&StaticBundledSource::new(Vec::new()))
        .unwrap_err();

    match err {
        RegistryError::MigrationFailure(MigrationError::StepFailed {
            from_version,
            to_version,
            failures,
        }) => {
            assert_eq!((from_version, to_version), (1, 2));
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].iri, "urn:r1");
            assert!(matches!(failures[0].error, RepoError::InvalidData(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
    let stored = manager.with_repository(|repo| repo.stored_version().unwrap());
    assert_eq!(stored, Some(1));
    drop(manager);

    let repo = SqliteTemplateRepository::try_new(open_db(&path).unwrap()).unwrap();
    let restarted = TemplateManager::new(repo, &config());
    let report = restarted.initialize(&source()).unwrap();

    assert_eq!(report.migration.unwrap().applied.len(), 3);
    let r1 = restarted.get_template("urn:r1").unwrap();
    assert_eq!(r1.as_reference().unwrap().parent_iri, CORE);
    assert_eq!(r1.as_reference().unwrap().core_iri.as_deref(), Some(CORE));
    let stored = restarted.with_repository(|repo| repo.stored_version().unwrap());
    assert_eq!(stored, Some(LATEST_TEMPLATE_VERSION));
}

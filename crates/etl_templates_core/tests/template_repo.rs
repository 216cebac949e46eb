use etl_templates_core::db::migrations::{latest_layout_version, read_layout_version};
use etl_templates_core::db::{open_db, open_db_in_memory, DbError, LayoutVersion};
use etl_templates_core::{
    BundledDefinition, RecordId, RecordKind, RepoError, RepositoryRecord, SqliteTemplateRepository,
    Statement, TemplateRepository, Term, LATEST_TEMPLATE_VERSION,
};
use rusqlite::Connection;

fn label(subject: &str, value: &str) -> Statement {
    Statement::new(
        Term::iri(subject),
        "http://www.w3.org/2004/02/skos/core#prefLabel",
        Term::literal(value),
    )
}

fn bundled(iri: &str) -> BundledDefinition {
    BundledDefinition {
        iri: iri.to_string(),
        interface: vec![label(iri, "bundled").in_graph(iri)],
        config: Vec::new(),
        description: Vec::new(),
    }
}

#[test]
fn open_db_in_memory_applies_layout_migrations() {
    let conn = open_db_in_memory().unwrap();
    assert_eq!(read_layout_version(&conn).unwrap(), latest_layout_version());
}

#[test]
fn older_layout_is_upgraded_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("layout-v1.db");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(include_str!("../src/db/migrations/0001_init.sql"))
        .unwrap();
    conn.execute_batch("PRAGMA user_version = 1;").unwrap();
    conn.execute(
        "INSERT INTO template_records (id, kind, iri, parent_iri)
         VALUES ('kept', 'reference', 'urn:kept', 'urn:p');",
        [],
    )
    .unwrap();
    drop(conn);

    let conn = open_db(&path).unwrap();
    assert_eq!(read_layout_version(&conn).unwrap(), LayoutVersion(2));
    let indexes: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master
             WHERE type = 'index' AND name = 'idx_template_records_iri';",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(indexes, 1);

    let repo = SqliteTemplateRepository::try_new(conn).unwrap();
    assert_eq!(repo.get_references().unwrap().len(), 1);
}

#[test]
fn repository_rejects_uninitialized_connection() {
    let conn = Connection::open_in_memory().unwrap();

    match SqliteTemplateRepository::try_new(conn) {
        Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        }) => {
            assert_eq!(expected_version, latest_layout_version());
            assert_eq!(actual_version, LayoutVersion(0));
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("uninitialized connection must be rejected"),
    }
}

#[test]
fn opening_database_with_newer_layout_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    assert!(matches!(
        err,
        DbError::LayoutTooNew {
            found: LayoutVersion(999),
            ..
        }
    ));
}

#[test]
fn fresh_store_starts_at_latest_version() {
    let repo = SqliteTemplateRepository::try_new(open_db_in_memory().unwrap()).unwrap();
    assert_eq!(repo.get_initial_version(), LATEST_TEMPLATE_VERSION);
    assert_eq!(repo.stored_version().unwrap(), None);
}

#[test]
fn unversioned_store_with_references_starts_at_zero() {
    let conn = open_db_in_memory().unwrap();
    conn.execute(
        "INSERT INTO template_records (id, kind, iri, parent_iri)
         VALUES ('legacy', 'reference', 'http://localhost/resources/components/legacy', 'urn:p');",
        [],
    )
    .unwrap();

    let repo = SqliteTemplateRepository::try_new(conn).unwrap();
    assert_eq!(repo.get_initial_version(), 0);
}

#[test]
fn update_finished_persists_latest_version_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("templates.db");

    let repo = SqliteTemplateRepository::try_new(open_db(&path).unwrap()).unwrap();
    repo.update_finished().unwrap();
    drop(repo);

    let reopened = SqliteTemplateRepository::try_new(open_db(&path).unwrap()).unwrap();
    assert_eq!(reopened.stored_version().unwrap(), Some(LATEST_TEMPLATE_VERSION));
    assert_eq!(reopened.get_initial_version(), LATEST_TEMPLATE_VERSION);
}

#[test]
fn reserved_ids_are_unique_and_listed_without_iri() {
    let repo = SqliteTemplateRepository::try_new(open_db_in_memory().unwrap()).unwrap();

    let first = repo.reserve_new_id().unwrap();
    let second = repo.reserve_new_id().unwrap();
    assert_ne!(first, second);

    let records = repo.get_references().unwrap();
    assert_eq!(records.len(), 2);
    assert!(records
        .iter()
        .all(|record| record.kind == RecordKind::Reference && record.iri.is_none()));
}

#[test]
fn statement_sections_roundtrip_independently() {
    let repo = SqliteTemplateRepository::try_new(open_db_in_memory().unwrap()).unwrap();
    let id = repo.reserve_new_id().unwrap();
    let iri = "http://localhost/resources/components/t1";

    let interface = vec![
        label(iri, "first").in_graph(iri),
        Statement::new(
            Term::iri(iri),
            "urn:p:lang",
            Term::Literal {
                value: "název".to_string(),
                language: Some("cs".to_string()),
                datatype: None,
            },
        ),
        Statement::new(Term::blank("b0"), "urn:p:link", Term::iri("urn:o")),
    ];
    let config = vec![label("urn:config", "cfg").in_graph(format!("{iri}/configuration"))];

    repo.set_interface(&id, &interface).unwrap();
    repo.set_config(&id, &config).unwrap();

    assert_eq!(repo.get_interface(&id).unwrap(), interface);
    assert_eq!(repo.get_config(&id).unwrap(), config);
    assert!(repo.get_description(&id).unwrap().is_empty());

    repo.set_interface(&id, &interface[..1]).unwrap();
    assert_eq!(repo.get_interface(&id).unwrap(), interface[..1].to_vec());
    assert_eq!(repo.get_config(&id).unwrap(), config);
}

#[test]
fn literal_subject_is_rejected() {
    let repo = SqliteTemplateRepository::try_new(open_db_in_memory().unwrap()).unwrap();
    let id = repo.reserve_new_id().unwrap();
    let bad = vec![Statement::new(Term::literal("x"), "urn:p", Term::literal("y"))];

    let err = repo.set_interface(&id, &bad).unwrap_err();
    assert!(matches!(err, RepoError::InvalidData(_)));
}

#[test]
fn set_record_upserts_header() {
    let repo = SqliteTemplateRepository::try_new(open_db_in_memory().unwrap()).unwrap();
    let id = repo.reserve_new_id().unwrap();

    repo.set_record(&RepositoryRecord::reference(id.clone(), "urn:t", "urn:p1"))
        .unwrap();
    repo.set_record(&RepositoryRecord::reference(id.clone(), "urn:t", "urn:p2"))
        .unwrap();

    let records = repo.get_references().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].parent_iri.as_deref(), Some("urn:p2"));
}

#[test]
fn replace_bundled_swaps_whole_bundled_set() {
    let repo = SqliteTemplateRepository::try_new(open_db_in_memory().unwrap()).unwrap();
    repo.replace_bundled(&[bundled("urn:b1"), bundled("urn:b2")])
        .unwrap();
    let ids = repo.replace_bundled(&[bundled("urn:b2")]).unwrap();

    let records = repo.get_references().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].iri.as_deref(), Some("urn:b2"));
    assert_eq!(records[0].kind, RecordKind::Bundled);
    assert_eq!(records[0].id, ids[0]);
    assert_eq!(repo.get_interface(&ids[0]).unwrap().len(), 1);
}

#[test]
fn remove_deletes_record_and_statements() {
    let repo = SqliteTemplateRepository::try_new(open_db_in_memory().unwrap()).unwrap();
    let id = repo.reserve_new_id().unwrap();
    repo.set_interface(&id, &[label("urn:t", "x")]).unwrap();

    repo.remove(&id).unwrap();

    assert!(matches!(repo.get_interface(&id), Err(RepoError::NotFound(_))));
    let orphaned: i64 = repo
        .connection()
        .query_row("SELECT COUNT(*) FROM template_statements;", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(orphaned, 0);
    assert!(matches!(repo.remove(&id), Err(RepoError::NotFound(_))));
}

#[test]
fn unknown_record_reads_return_not_found() {
    let repo = SqliteTemplateRepository::try_new(open_db_in_memory().unwrap()).unwrap();
    let missing = RecordId::new("missing");

    assert!(matches!(
        repo.get_config(&missing),
        Err(RepoError::NotFound(id)) if id == missing
    ));
}

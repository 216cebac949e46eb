//! Template repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide the durable record contract consumed by the template manager.
//! - Keep SQL details inside the core persistence boundary.
//!
//! # Invariants
//! - The template schema version is read once, when the repository opens.
//! - `update_finished()` is the only writer of the template schema version.
//! - Reserved ids are never handed out twice.
//! - Every statement-set write replaces the whole section atomically.

use crate::db::migrations::{latest_layout_version, read_layout_version};
use crate::db::{DbError, LayoutVersion};
use crate::model::statement::{Statement, Term};
use crate::model::template::{BundledDefinition, RecordId, RecordKind, RepositoryRecord};
use log::info;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Template schema version written by this binary on a successful startup.
pub const LATEST_TEMPLATE_VERSION: u32 = 4;

const SCHEMA_VERSION_KEY: &str = "template_schema_version";

const RECORD_SELECT_SQL: &str = "SELECT id, kind, iri, parent_iri FROM template_records";

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for template persistence operations.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    NotFound(RecordId),
    InvalidData(String),
    /// Connection was not bootstrapped through `open_db`.
    UninitializedConnection {
        expected_version: LayoutVersion,
        actual_version: LayoutVersion,
    },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "template record not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted template data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "connection storage layout is {actual_version}, expected {expected_version}; open it with open_db"
            ),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Statement set stored for one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Interface,
    Config,
    Description,
}

impl Section {
    fn as_str(self) -> &'static str {
        match self {
            Self::Interface => "interface",
            Self::Config => "config",
            Self::Description => "description",
        }
    }
}

/// Durable store of template records and the template schema version.
pub trait TemplateRepository {
    /// Template schema version found when the store was opened.
    fn get_initial_version(&self) -> u32;
    /// Headers of every stored record, bundled and reference.
    fn get_references(&self) -> RepoResult<Vec<RepositoryRecord>>;
    /// Reserves a fresh reference record id and persists an empty record.
    fn reserve_new_id(&self) -> RepoResult<RecordId>;
    /// Upserts the header (iri, parent) of a record.
    fn set_record(&self, record: &RepositoryRecord) -> RepoResult<()>;
    fn get_interface(&self, id: &RecordId) -> RepoResult<Vec<Statement>>;
    fn set_interface(&self, id: &RecordId, statements: &[Statement]) -> RepoResult<()>;
    fn get_config(&self, id: &RecordId) -> RepoResult<Vec<Statement>>;
    fn set_config(&self, id: &RecordId, statements: &[Statement]) -> RepoResult<()>;
    fn get_description(&self, id: &RecordId) -> RepoResult<Vec<Statement>>;
    fn set_description(&self, id: &RecordId, statements: &[Statement]) -> RepoResult<()>;
    /// Replaces every bundled record with `definitions` in one transaction.
    fn replace_bundled(&self, definitions: &[BundledDefinition]) -> RepoResult<Vec<RecordId>>;
    /// Deletes a record together with all its statements.
    fn remove(&self, id: &RecordId) -> RepoResult<()>;
    /// Persists `LATEST_TEMPLATE_VERSION` once all pending migrations succeeded.
    fn update_finished(&self) -> RepoResult<()>;
}

/// SQLite-backed template repository.
pub struct SqliteTemplateRepository {
    conn: Connection,
    initial_version: u32,
}

impl SqliteTemplateRepository {
    /// Wraps a connection returned by `open_db`/`open_db_in_memory`.
    ///
    /// # Errors
    /// - `UninitializedConnection` when the storage layout is not current.
    pub fn try_new(conn: Connection) -> RepoResult<Self> {
        let actual_version = read_layout_version(&conn)?;
        let expected_version = latest_layout_version();
        if actual_version != expected_version {
            return Err(RepoError::UninitializedConnection {
                expected_version,
                actual_version,
            });
        }

        let initial_version = match read_schema_version(&conn)? {
            Some(version) => version,
            None if count_references(&conn)? == 0 => LATEST_TEMPLATE_VERSION,
            None => 0,
        };
        info!(
            "event=repo_open module=repo status=ok template_version={}",
            initial_version
        );

        Ok(Self {
            conn,
            initial_version,
        })
    }

    /// Underlying connection, for maintenance tooling.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Template schema version currently persisted, if any.
    pub fn stored_version(&self) -> RepoResult<Option<u32>> {
        read_schema_version(&self.conn)
    }

    fn ensure_exists(&self, id: &RecordId) -> RepoResult<()> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM template_records WHERE id = ?1);",
            [id.as_str()],
            |row| row.get(0),
        )?;
        if exists == 0 {
            return Err(RepoError::NotFound(id.clone()));
        }
        Ok(())
    }

    fn read_section(&self, id: &RecordId, section: Section) -> RepoResult<Vec<Statement>> {
        self.ensure_exists(id)?;
        read_section(&self.conn, id, section)
    }

    fn write_section(
        &self,
        id: &RecordId,
        section: Section,
        statements: &[Statement],
    ) -> RepoResult<()> {
        self.ensure_exists(id)?;
        let tx = self.conn.unchecked_transaction()?;
        write_section(&tx, id, section, statements)?;
        tx.execute(
            "UPDATE template_records
             SET updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            [id.as_str()],
        )?;
        tx.commit()?;
        Ok(())
    }
}

impl TemplateRepository for SqliteTemplateRepository {
    fn get_initial_version(&self) -> u32 {
        self.initial_version
    }

    fn get_references(&self) -> RepoResult<Vec<RepositoryRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{RECORD_SELECT_SQL} ORDER BY kind ASC, id ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(parse_record_row(row)?);
        }
        Ok(records)
    }

    fn reserve_new_id(&self) -> RepoResult<RecordId> {
        let id = RecordId::new(Uuid::new_v4().to_string());
        self.conn.execute(
            "INSERT INTO template_records (id, kind) VALUES (?1, ?2);",
            params![id.as_str(), RecordKind::Reference.as_str()],
        )?;
        Ok(id)
    }

    fn set_record(&self, record: &RepositoryRecord) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO template_records (id, kind, iri, parent_iri)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (id) DO UPDATE SET
                kind = excluded.kind,
                iri = excluded.iri,
                parent_iri = excluded.parent_iri,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![
                record.id.as_str(),
                record.kind.as_str(),
                record.iri.as_deref(),
                record.parent_iri.as_deref(),
            ],
        )?;
        Ok(())
    }

    fn get_interface(&self, id: &RecordId) -> RepoResult<Vec<Statement>> {
        self.read_section(id, Section::Interface)
    }

    fn set_interface(&self, id: &RecordId, statements: &[Statement]) -> RepoResult<()> {
        self.write_section(id, Section::Interface, statements)
    }

    fn get_config(&self, id: &RecordId) -> RepoResult<Vec<Statement>> {
        self.read_section(id, Section::Config)
    }

    fn set_config(&self, id: &RecordId, statements: &[Statement]) -> RepoResult<()> {
        self.write_section(id, Section::Config, statements)
    }

    fn get_description(&self, id: &RecordId) -> RepoResult<Vec<Statement>> {
        self.read_section(id, Section::Description)
    }

    fn set_description(&self, id: &RecordId, statements: &[Statement]) -> RepoResult<()> {
        self.write_section(id, Section::Description, statements)
    }

    fn replace_bundled(&self, definitions: &[BundledDefinition]) -> RepoResult<Vec<RecordId>> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM template_records WHERE kind = ?1;",
            [RecordKind::Bundled.as_str()],
        )?;

        let mut ids = Vec::with_capacity(definitions.len());
        for definition in definitions {
            let id = bundled_record_id(&definition.iri);
            tx.execute(
                "INSERT INTO template_records (id, kind, iri) VALUES (?1, ?2, ?3);",
                params![
                    id.as_str(),
                    RecordKind::Bundled.as_str(),
                    definition.iri.as_str()
                ],
            )?;
            write_section(&tx, &id, Section::Interface, &definition.interface)?;
            write_section(&tx, &id, Section::Config, &definition.config)?;
            write_section(&tx, &id, Section::Description, &definition.description)?;
            ids.push(id);
        }
        tx.commit()?;
        Ok(ids)
    }

    fn remove(&self, id: &RecordId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM template_records WHERE id = ?1;", [id.as_str()])?;
        if changed == 0 {
            return Err(RepoError::NotFound(id.clone()));
        }
        Ok(())
    }

    fn update_finished(&self) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO registry_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT (key) DO UPDATE SET value = excluded.value;",
            params![SCHEMA_VERSION_KEY, LATEST_TEMPLATE_VERSION.to_string()],
        )?;
        info!(
            "event=repo_version_persist module=repo status=ok template_version={}",
            LATEST_TEMPLATE_VERSION
        );
        Ok(())
    }
}

/// Stable record id of a bundled template, derived from its iri.
pub fn bundled_record_id(iri: &str) -> RecordId {
    RecordId::new(Uuid::new_v5(&Uuid::NAMESPACE_URL, iri.as_bytes()).to_string())
}

fn read_schema_version(conn: &Connection) -> RepoResult<Option<u32>> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM registry_meta WHERE key = ?1;",
            [SCHEMA_VERSION_KEY],
            |row| row.get(0),
        )
        .optional()?;

    value
        .map(|text| {
            text.parse::<u32>().map_err(|_| {
                RepoError::InvalidData(format!(
                    "invalid template schema version `{text}` in registry_meta"
                ))
            })
        })
        .transpose()
}

fn count_references(conn: &Connection) -> RepoResult<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM template_records WHERE kind = ?1;",
        [RecordKind::Reference.as_str()],
        |row| row.get(0),
    )?;
    Ok(count)
}

fn read_section(conn: &Connection, id: &RecordId, section: Section) -> RepoResult<Vec<Statement>> {
    let mut stmt = conn.prepare(
        "SELECT
            subject_kind,
            subject,
            predicate,
            object_kind,
            object_value,
            object_language,
            object_datatype,
            context
         FROM template_statements
         WHERE record_id = ?1 AND section = ?2
         ORDER BY position ASC;",
    )?;
    let mut rows = stmt.query(params![id.as_str(), section.as_str()])?;
    let mut statements = Vec::new();
    while let Some(row) = rows.next()? {
        statements.push(parse_statement_row(row)?);
    }
    Ok(statements)
}

fn write_section(
    conn: &Connection,
    id: &RecordId,
    section: Section,
    statements: &[Statement],
) -> RepoResult<()> {
    conn.execute(
        "DELETE FROM template_statements WHERE record_id = ?1 AND section = ?2;",
        params![id.as_str(), section.as_str()],
    )?;

    let mut insert = conn.prepare(
        "INSERT INTO template_statements (
            record_id,
            section,
            position,
            subject_kind,
            subject,
            predicate,
            object_kind,
            object_value,
            object_language,
            object_datatype,
            context
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11);",
    )?;
    for (position, statement) in statements.iter().enumerate() {
        let subject_kind = match &statement.subject {
            Term::Iri { .. } => "iri",
            Term::Blank { .. } => "blank",
            Term::Literal { .. } => {
                return Err(RepoError::InvalidData(format!(
                    "literal subject is not allowed: {statement}"
                )));
            }
        };
        let (object_kind, language, datatype) = match &statement.object {
            Term::Iri { .. } => ("iri", None, None),
            Term::Blank { .. } => ("blank", None, None),
            Term::Literal {
                language, datatype, ..
            } => ("literal", language.as_deref(), datatype.as_deref()),
        };
        insert.execute(params![
            id.as_str(),
            section.as_str(),
            i64::try_from(position).unwrap_or(i64::MAX),
            subject_kind,
            statement.subject.value(),
            statement.predicate.as_str(),
            object_kind,
            statement.object.value(),
            language,
            datatype,
            statement.context.as_deref(),
        ])?;
    }
    Ok(())
}

fn parse_record_row(row: &Row<'_>) -> RepoResult<RepositoryRecord> {
    let id: String = row.get("id")?;
    let kind_text: String = row.get("kind")?;
    let kind = RecordKind::parse(&kind_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid record kind `{kind_text}` in template_records.kind"
        ))
    })?;

    Ok(RepositoryRecord {
        id: RecordId::new(id),
        kind,
        iri: row.get("iri")?,
        parent_iri: row.get("parent_iri")?,
    })
}

fn parse_statement_row(row: &Row<'_>) -> RepoResult<Statement> {
    let subject_kind: String = row.get("subject_kind")?;
    let subject_value: String = row.get("subject")?;
    let subject = match subject_kind.as_str() {
        "iri" => Term::iri(subject_value),
        "blank" => Term::blank(subject_value),
        other => {
            return Err(RepoError::InvalidData(format!(
                "invalid subject kind `{other}` in template_statements.subject_kind"
            )));
        }
    };

    let object_kind: String = row.get("object_kind")?;
    let object_value: String = row.get("object_value")?;
    let object = match object_kind.as_str() {
        "iri" => Term::iri(object_value),
        "blank" => Term::blank(object_value),
        "literal" => Term::Literal {
            value: object_value,
            language: row.get("object_language")?,
            datatype: row.get("object_datatype")?,
        },
        other => {
            return Err(RepoError::InvalidData(format!(
                "invalid object kind `{other}` in template_statements.object_kind"
            )));
        }
    };

    Ok(Statement {
        subject,
        predicate: row.get("predicate")?,
        object,
        context: row.get("context")?,
    })
}

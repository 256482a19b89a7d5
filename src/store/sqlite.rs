use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, ErrorCode};
use uuid::Uuid;

use super::{ResultStore, StoreError};
use crate::models::{Assessment, Grade, NewAssessment};

/// Durable store in a single SQLite file.
///
/// One connection behind a mutex: writes are single-row inserts, so
/// serializing them costs little and keeps SQLite's locking out of the way.
pub struct SqliteResultStore {
    conn: Mutex<Connection>,
}

impl SqliteResultStore {
    /// Open (or create) the database at `path` and run migrations.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::MigrationFailed {
                version: 0,
                reason: format!("cannot create {}: {e}", parent.display()),
            })?;
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        configure_pragmas(&conn)?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn insert(
        conn: &Connection,
        id: &Uuid,
        assessment: &NewAssessment,
        created_at: &DateTime<Utc>,
    ) -> rusqlite::Result<usize> {
        conn.execute(
            "INSERT INTO assessments (id, target_id, score, grade, feedback, drawing_png, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id.to_string(),
                assessment.target_id,
                assessment.score as i64,
                assessment.grade.as_str(),
                assessment.feedback,
                assessment.drawing_png,
                created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            ],
        )
    }
}

fn configure_pragmas(conn: &Connection) -> Result<(), StoreError> {
    // journal_mode returns a row, so it goes through query_row
    conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))?;
    conn.execute_batch("PRAGMA synchronous=NORMAL;")?;
    Ok(())
}

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    let current_version = get_current_version(conn);

    let migrations: Vec<(i64, &str)> = vec![(
        1,
        include_str!("../../resources/migrations/001_assessments.sql"),
    )];

    for (version, sql) in migrations {
        if version > current_version {
            tracing::info!("Running migration v{version}");
            conn.execute_batch(sql).map_err(|e| StoreError::MigrationFailed {
                version,
                reason: e.to_string(),
            })?;
        }
    }

    Ok(())
}

/// Get the current schema version (0 if no schema exists yet)
fn get_current_version(conn: &Connection) -> i64 {
    conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
        row.get::<_, Option<i64>>(0)
    })
    .ok()
    .flatten()
    .unwrap_or(0)
}

struct AssessmentRow {
    id: String,
    target_id: String,
    score: i64,
    grade: String,
    feedback: String,
    drawing_png: Vec<u8>,
    created_at: String,
}

fn assessment_from_row(row: AssessmentRow) -> Result<Assessment, StoreError> {
    let corrupt = |field: &str, value: &str| StoreError::CorruptValue {
        field: field.into(),
        value: value.into(),
    };
    Ok(Assessment {
        id: Uuid::parse_str(&row.id).map_err(|_| corrupt("id", &row.id))?,
        target_id: row.target_id,
        score: u8::try_from(row.score)
            .ok()
            .filter(|s| *s <= 100)
            .ok_or_else(|| corrupt("score", &row.score.to_string()))?,
        grade: Grade::from_str(&row.grade)?,
        feedback: row.feedback,
        drawing_png: row.drawing_png,
        created_at: DateTime::parse_from_rfc3339(&row.created_at)
            .map_err(|_| corrupt("created_at", &row.created_at))?
            .with_timezone(&Utc),
    })
}

impl ResultStore for SqliteResultStore {
    fn record(&self, assessment: NewAssessment) -> Result<Uuid, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        let created_at = Utc::now();

        // The primary key rejects a repeated id; draw again in that case
        loop {
            let id = Uuid::new_v4();
            match Self::insert(&conn, &id, &assessment, &created_at) {
                Ok(_) => {
                    tracing::debug!(%id, target = %assessment.target_id, "Assessment recorded");
                    return Ok(id);
                }
                Err(rusqlite::Error::SqliteFailure(err, _))
                    if err.code == ErrorCode::ConstraintViolation
                        && err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
                {
                    tracing::warn!(%id, "Identifier collision, drawing a new one");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn get(&self, id: &Uuid) -> Result<Assessment, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        let mut stmt = conn.prepare(
            "SELECT id, target_id, score, grade, feedback, drawing_png, created_at
             FROM assessments WHERE id = ?1",
        )?;

        let result = stmt.query_row(params![id.to_string()], |row| {
            Ok(AssessmentRow {
                id: row.get::<_, String>(0)?,
                target_id: row.get::<_, String>(1)?,
                score: row.get::<_, i64>(2)?,
                grade: row.get::<_, String>(3)?,
                feedback: row.get::<_, String>(4)?,
                drawing_png: row.get::<_, Vec<u8>>(5)?,
                created_at: row.get::<_, String>(6)?,
            })
        });

        match result {
            Ok(row) => assessment_from_row(row),
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(StoreError::NotFound(*id)),
            Err(e) => Err(e.into()),
        }
    }
}

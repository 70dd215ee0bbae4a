use crate::migration::run::{Run, RunStatus, StepLogEntry, StepRecord, StepStatus};
use crate::migration::store::{ensure_steps_belong_to, sort_newest_first, RunStore, StoreError};
use crate::shared::ids::{ActorId, ProfileId, RunId};
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_DB_FILE_NAME: &str = "sitelift.db";

/// `runs` and `migration_steps` tables; step rows cascade with their run.
#[derive(Debug, Clone)]
pub struct SqliteRunStore {
    db_path: PathBuf,
}

impl SqliteRunStore {
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }

        let store = Self {
            db_path: db_path.to_path_buf(),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn ensure_schema(&self) -> Result<(), StoreError> {
        let connection = self.connect()?;
        connection
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS runs (
                    id TEXT PRIMARY KEY,
                    profile TEXT NOT NULL,
                    status TEXT NOT NULL,
                    owner_id TEXT NOT NULL,
                    site_url TEXT,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL,
                    completed_at INTEGER
                );

                CREATE TABLE IF NOT EXISTS migration_steps (
                    id TEXT PRIMARY KEY,
                    run_id TEXT NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
                    step_name TEXT NOT NULL,
                    step_order INTEGER NOT NULL,
                    status TEXT NOT NULL,
                    progress INTEGER NOT NULL CHECK (progress BETWEEN 0 AND 100),
                    start_time INTEGER,
                    end_time INTEGER,
                    failure_reason TEXT,
                    logs TEXT NOT NULL DEFAULT '[]',
                    UNIQUE (run_id, step_order)
                );

                CREATE INDEX IF NOT EXISTS idx_migration_steps_run
                    ON migration_steps(run_id, step_order);
                ",
            )
            .map_err(sql_error)
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        let connection = Connection::open(&self.db_path).map_err(|source| StoreError::Open {
            path: self.db_path.display().to_string(),
            source,
        })?;
        connection
            .execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(sql_error)?;
        Ok(connection)
    }
}

impl RunStore for SqliteRunStore {
    fn save(&self, run: &Run, steps: &[StepRecord]) -> Result<(), StoreError> {
        ensure_steps_belong_to(run, steps)?;
        let mut connection = self.connect()?;
        let tx = connection.transaction().map_err(sql_error)?;
        tx.execute(
            "INSERT INTO runs (id, profile, status, owner_id, site_url, created_at, updated_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                profile = excluded.profile,
                status = excluded.status,
                owner_id = excluded.owner_id,
                site_url = excluded.site_url,
                updated_at = excluded.updated_at,
                completed_at = excluded.completed_at",
            params![
                run.id.as_str(),
                run.profile.as_str(),
                run.status.as_str(),
                run.owner_id.as_str(),
                run.site_url,
                run.created_at,
                run.updated_at,
                run.completed_at,
            ],
        )
        .map_err(sql_error)?;

        for step in steps {
            let logs = serde_json::to_string(&step.logs).map_err(|source| StoreError::Json {
                path: format!("{}#migration_steps/{}", self.db_path.display(), step.id),
                source,
            })?;
            tx.execute(
                "INSERT INTO migration_steps
                    (id, run_id, step_name, step_order, status, progress, start_time, end_time, failure_reason, logs)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(id) DO UPDATE SET
                    step_name = excluded.step_name,
                    status = excluded.status,
                    progress = excluded.progress,
                    start_time = excluded.start_time,
                    end_time = excluded.end_time,
                    failure_reason = excluded.failure_reason,
                    logs = excluded.logs",
                params![
                    step.id,
                    step.run_id.as_str(),
                    step.step_name,
                    i64::from(step.order),
                    step.status.as_str(),
                    i64::from(step.progress),
                    step.started_at,
                    step.ended_at,
                    step.failure_reason,
                    logs,
                ],
            )
            .map_err(sql_error)?;
        }
        tx.commit().map_err(sql_error)
    }

    fn load_run(&self, run_id: &RunId) -> Result<Option<Run>, StoreError> {
        let connection = self.connect()?;
        let row = connection
            .query_row(
                "SELECT id, profile, status, owner_id, site_url, created_at, updated_at, completed_at
                 FROM runs WHERE id = ?1",
                params![run_id.as_str()],
                RunRow::from_row,
            )
            .optional()
            .map_err(sql_error)?;
        row.map(RunRow::into_run).transpose()
    }

    fn load_steps(&self, run_id: &RunId) -> Result<Vec<StepRecord>, StoreError> {
        let connection = self.connect()?;
        let mut statement = connection
            .prepare(
                "SELECT id, run_id, step_name, step_order, status, progress, start_time, end_time, failure_reason, logs
                 FROM migration_steps WHERE run_id = ?1 ORDER BY step_order ASC",
            )
            .map_err(sql_error)?;
        let rows = statement
            .query_map(params![run_id.as_str()], StepRow::from_row)
            .map_err(sql_error)?;
        let mut steps = Vec::new();
        for row in rows {
            steps.push(row.map_err(sql_error)?.into_step()?);
        }
        Ok(steps)
    }

    fn list_runs(&self) -> Result<Vec<Run>, StoreError> {
        let connection = self.connect()?;
        let mut statement = connection
            .prepare(
                "SELECT id, profile, status, owner_id, site_url, created_at, updated_at, completed_at
                 FROM runs",
            )
            .map_err(sql_error)?;
        let rows = statement
            .query_map([], RunRow::from_row)
            .map_err(sql_error)?;
        let mut runs = Vec::new();
        for row in rows {
            runs.push(row.map_err(sql_error)?.into_run()?);
        }
        sort_newest_first(&mut runs);
        Ok(runs)
    }

    fn delete_run(&self, run_id: &RunId) -> Result<bool, StoreError> {
        let connection = self.connect()?;
        let deleted = connection
            .execute("DELETE FROM runs WHERE id = ?1", params![run_id.as_str()])
            .map_err(sql_error)?;
        Ok(deleted > 0)
    }
}

struct RunRow {
    id: String,
    profile: String,
    status: String,
    owner_id: String,
    site_url: Option<String>,
    created_at: i64,
    updated_at: i64,
    completed_at: Option<i64>,
}

impl RunRow {
    fn from_row(row: &rusqlite::Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get(0)?,
            profile: row.get(1)?,
            status: row.get(2)?,
            owner_id: row.get(3)?,
            site_url: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
            completed_at: row.get(7)?,
        })
    }

    fn into_run(self) -> Result<Run, StoreError> {
        Ok(Run {
            id: RunId::parse(&self.id).map_err(StoreError::Corrupt)?,
            profile: ProfileId::parse(&self.profile).map_err(StoreError::Corrupt)?,
            status: RunStatus::parse(&self.status).map_err(StoreError::Corrupt)?,
            owner_id: ActorId::parse(&self.owner_id).map_err(StoreError::Corrupt)?,
            site_url: self.site_url,
            created_at: self.created_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
        })
    }
}

struct StepRow {
    id: String,
    run_id: String,
    step_name: String,
    step_order: i64,
    status: String,
    progress: i64,
    start_time: Option<i64>,
    end_time: Option<i64>,
    failure_reason: Option<String>,
    logs: String,
}

impl StepRow {
    fn from_row(row: &rusqlite::Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get(0)?,
            run_id: row.get(1)?,
            step_name: row.get(2)?,
            step_order: row.get(3)?,
            status: row.get(4)?,
            progress: row.get(5)?,
            start_time: row.get(6)?,
            end_time: row.get(7)?,
            failure_reason: row.get(8)?,
            logs: row.get(9)?,
        })
    }

    fn into_step(self) -> Result<StepRecord, StoreError> {
        let order = u32::try_from(self.step_order).map_err(|_| {
            StoreError::Corrupt(format!(
                "step `{}` has invalid order {}",
                self.id, self.step_order
            ))
        })?;
        let progress = u8::try_from(self.progress)
            .ok()
            .filter(|value| *value <= 100)
            .ok_or_else(|| {
                StoreError::Corrupt(format!(
                    "step `{}` has invalid progress {}",
                    self.id, self.progress
                ))
            })?;
        let logs: Vec<StepLogEntry> = serde_json::from_str(&self.logs).map_err(|err| {
            StoreError::Corrupt(format!("step `{}` logs are not valid json: {err}", self.id))
        })?;
        Ok(StepRecord {
            run_id: RunId::parse(&self.run_id).map_err(StoreError::Corrupt)?,
            step_name: self.step_name,
            order,
            status: StepStatus::parse(&self.status).map_err(StoreError::Corrupt)?,
            progress,
            started_at: self.start_time,
            ended_at: self.end_time,
            failure_reason: self.failure_reason,
            logs,
            id: self.id,
        })
    }
}

fn sql_error(source: rusqlite::Error) -> StoreError {
    StoreError::Sql { source }
}

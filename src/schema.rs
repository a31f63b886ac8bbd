//! Persistence schema: tables, constraints, and revision verification
//!
//! The schema mirrors the write-time invariants:
//! - `experiments.name` UNIQUE backs duplicate-name rejection;
//! - `params (run_uuid, key)` PRIMARY KEY backs write-once params under
//!   concurrent writers;
//! - the all-columns `metrics` PRIMARY KEY makes identical re-logs no-ops
//!   while keeping history append-only;
//! - CHECK constraints pin lifecycle stages and run statuses to their
//!   canonical string forms.
//!
//! A fresh database is initialized to [`SCHEMA_REVISION`] and stamped in
//! `schema_revisions`; any other recorded revision makes the store refuse to
//! operate with `OutOfDateSchema` (migration tooling is an external
//! collaborator).

use chrono::Utc;
use rusqlite::Connection;
use tracing::info;

use crate::{Error, Result};

/// Schema revision this build of the store requires.
pub const SCHEMA_REVISION: i64 = 1;

const REVISION_TABLE: &str = "
CREATE TABLE IF NOT EXISTS schema_revisions (
    revision    INTEGER PRIMARY KEY,
    description TEXT NOT NULL,
    applied_at  INTEGER NOT NULL
);
";

const REVISION_1: &str = "
CREATE TABLE experiments (
    experiment_id     INTEGER PRIMARY KEY AUTOINCREMENT,
    name              TEXT NOT NULL UNIQUE,
    artifact_location TEXT NOT NULL DEFAULT '',
    lifecycle_stage   TEXT NOT NULL DEFAULT 'active'
                      CHECK (lifecycle_stage IN ('active', 'deleted')),
    description       TEXT,
    create_time       INTEGER NOT NULL
);

CREATE TABLE runs (
    run_uuid        TEXT PRIMARY KEY,
    experiment_id   INTEGER NOT NULL REFERENCES experiments (experiment_id),
    user_id         TEXT,
    status          TEXT NOT NULL DEFAULT 'SCHEDULED'
                    CHECK (status IN ('SCHEDULED', 'RUNNING', 'FINISHED', 'FAILED')),
    start_time      INTEGER NOT NULL,
    end_time        INTEGER,
    artifact_uri    TEXT NOT NULL,
    lifecycle_stage TEXT NOT NULL DEFAULT 'active'
                    CHECK (lifecycle_stage IN ('active', 'deleted'))
);

CREATE TABLE metrics (
    run_uuid  TEXT NOT NULL REFERENCES runs (run_uuid),
    key       TEXT NOT NULL,
    value     REAL NOT NULL,
    timestamp INTEGER NOT NULL,
    step      INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (run_uuid, key, timestamp, step, value)
);

CREATE TABLE params (
    run_uuid TEXT NOT NULL REFERENCES runs (run_uuid),
    key      TEXT NOT NULL,
    value    TEXT NOT NULL,
    PRIMARY KEY (run_uuid, key)
);

CREATE TABLE tags (
    run_uuid TEXT NOT NULL REFERENCES runs (run_uuid),
    key      TEXT NOT NULL,
    value    TEXT NOT NULL,
    PRIMARY KEY (run_uuid, key)
);

CREATE INDEX index_runs_experiment_id ON runs (experiment_id);
CREATE INDEX index_metrics_run_uuid ON metrics (run_uuid);
";

/// Bring a connection to the expected schema revision, or refuse.
///
/// A database with no tracking tables is initialized from scratch and
/// stamped. Anything else must already be at [`SCHEMA_REVISION`].
///
/// # Errors
///
/// Returns `OutOfDateSchema` when the recorded revision differs from the
/// expected one, `Storage` on SQLite failures.
pub(crate) fn ensure_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(REVISION_TABLE)?;
    match current_revision(conn)? {
        None => initialize(conn),
        Some(found) if found == SCHEMA_REVISION => Ok(()),
        Some(found) => Err(Error::OutOfDateSchema {
            found: found.to_string(),
            expected: SCHEMA_REVISION.to_string(),
        }),
    }
}

/// Highest revision stamped in `schema_revisions`, if any.
fn current_revision(conn: &Connection) -> Result<Option<i64>> {
    let revision = conn.query_row("SELECT MAX(revision) FROM schema_revisions", [], |row| {
        row.get::<_, Option<i64>>(0)
    })?;
    Ok(revision)
}

fn initialize(conn: &Connection) -> Result<()> {
    info!(revision = SCHEMA_REVISION, "initializing tracking database tables");
    conn.execute_batch(REVISION_1)?;
    stamp_revision(conn, SCHEMA_REVISION, "baseline tracking tables")?;
    Ok(())
}

pub(crate) fn stamp_revision(conn: &Connection, revision: i64, description: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_revisions (revision, description, applied_at) VALUES (?1, ?2, ?3)",
        rusqlite::params![revision, description, Utc::now().timestamp_millis()],
    )?;
    Ok(())
}

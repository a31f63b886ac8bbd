//! Lifecycle engine: entity resolution and state-machine gates
//!
//! ```text
//! Experiment: ACTIVE <-> DELETED   (delete: ACTIVE->DELETED; restore: DELETED->ACTIVE)
//! Run:        ACTIVE <-> DELETED   (same transitions)
//! ```
//!
//! Single-entity lookups resolve exactly one row: zero rows is `NotFound`,
//! more than one is `CorruptState` (a uniqueness constraint was violated
//! upstream and the operation must not proceed). Stage gates reject
//! mutations against entities outside the required stage with
//! `InvalidState`.

use rusqlite::Connection;

use crate::entity::{Experiment, LifecycleStage, RunInfo, RunStatus, ViewType};
use crate::{Error, Result};

const EXPERIMENT_COLUMNS: &str =
    "experiment_id, name, artifact_location, lifecycle_stage, description, create_time";

const RUN_COLUMNS: &str = "run_uuid, experiment_id, user_id, status, start_time, end_time, \
                           artifact_uri, lifecycle_stage";

/// Parse a facade-level experiment id into the persistence representation.
pub(crate) fn parse_experiment_id(experiment_id: &str) -> Result<i64> {
    experiment_id.parse::<i64>().map_err(|_| {
        Error::InvalidArgument(format!("malformed experiment id '{experiment_id}'"))
    })
}

/// Resolve one experiment by id under the caller's visibility filter.
pub(crate) fn experiment_by_id(
    conn: &Connection,
    experiment_id: &str,
    view: ViewType,
) -> Result<Experiment> {
    let id = parse_experiment_id(experiment_id)?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {EXPERIMENT_COLUMNS} FROM experiments WHERE experiment_id = ?1"
    ))?;
    let rows = stmt
        .query_map([id], experiment_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    if rows.len() > 1 {
        return Err(Error::CorruptState(format!(
            "expected exactly 1 experiment with id={experiment_id}, found {}",
            rows.len()
        )));
    }
    let experiment = rows.into_iter().next().ok_or_else(|| {
        Error::NotFound(format!("no experiment with id={experiment_id} exists"))
    })?;

    if view.admits(experiment.lifecycle_stage()) {
        Ok(experiment)
    } else {
        Err(Error::NotFound(format!(
            "no experiment with id={experiment_id} exists in the requested view"
        )))
    }
}

/// Resolve one experiment by name, any stage. `None` when absent.
pub(crate) fn experiment_by_name(conn: &Connection, name: &str) -> Result<Option<Experiment>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {EXPERIMENT_COLUMNS} FROM experiments WHERE name = ?1"
    ))?;
    let rows = stmt
        .query_map([name], experiment_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    match rows.len() {
        0 | 1 => Ok(rows.into_iter().next()),
        n => Err(Error::CorruptState(format!(
            "expected at most 1 experiment with name='{name}', found {n}"
        ))),
    }
}

/// All experiments visible under `view`, ordered by id.
pub(crate) fn list_experiments(conn: &Connection, view: ViewType) -> Result<Vec<Experiment>> {
    let collect = |sql: &str, params: &[&dyn rusqlite::ToSql]| -> Result<Vec<Experiment>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, experiment_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    };

    match view {
        ViewType::All => collect(
            &format!("SELECT {EXPERIMENT_COLUMNS} FROM experiments ORDER BY experiment_id"),
            &[],
        ),
        ViewType::ActiveOnly | ViewType::DeletedOnly => {
            let stage = view.stages()[0].as_str();
            collect(
                &format!(
                    "SELECT {EXPERIMENT_COLUMNS} FROM experiments \
                     WHERE lifecycle_stage = ?1 ORDER BY experiment_id"
                ),
                &[&stage],
            )
        }
    }
}

/// Resolve one run by id, any stage.
pub(crate) fn run_by_id(conn: &Connection, run_id: &str) -> Result<RunInfo> {
    let mut stmt =
        conn.prepare(&format!("SELECT {RUN_COLUMNS} FROM runs WHERE run_uuid = ?1"))?;
    let rows = stmt
        .query_map([run_id], run_info_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    if rows.len() > 1 {
        return Err(Error::CorruptState(format!(
            "expected exactly 1 run with id={run_id}, found {}",
            rows.len()
        )));
    }
    rows.into_iter()
        .next()
        .ok_or_else(|| Error::NotFound(format!("run with id={run_id} not found")))
}

/// All runs of an experiment whose stage is admitted by `view`.
pub(crate) fn runs_for_experiment(
    conn: &Connection,
    experiment_id: i64,
    view: ViewType,
) -> Result<Vec<RunInfo>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RUN_COLUMNS} FROM runs WHERE experiment_id = ?1"
    ))?;
    let rows = stmt
        .query_map([experiment_id], run_info_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows
        .into_iter()
        .filter(|info| view.admits(info.lifecycle_stage()))
        .collect())
}

/// Gate: the experiment must currently be ACTIVE.
pub(crate) fn ensure_experiment_active(experiment: &Experiment) -> Result<()> {
    ensure_stage(
        "experiment",
        experiment.experiment_id(),
        experiment.lifecycle_stage(),
        LifecycleStage::Active,
    )
}

/// Gate: the experiment must currently be DELETED.
pub(crate) fn ensure_experiment_deleted(experiment: &Experiment) -> Result<()> {
    ensure_stage(
        "experiment",
        experiment.experiment_id(),
        experiment.lifecycle_stage(),
        LifecycleStage::Deleted,
    )
}

/// Gate: the run must currently be ACTIVE.
pub(crate) fn ensure_run_active(info: &RunInfo) -> Result<()> {
    ensure_stage("run", info.run_id(), info.lifecycle_stage(), LifecycleStage::Active)
}

/// Gate: the run must currently be DELETED.
pub(crate) fn ensure_run_deleted(info: &RunInfo) -> Result<()> {
    ensure_stage("run", info.run_id(), info.lifecycle_stage(), LifecycleStage::Deleted)
}

fn ensure_stage(
    kind: &str,
    id: &str,
    current: LifecycleStage,
    required: LifecycleStage,
) -> Result<()> {
    if current == required {
        Ok(())
    } else {
        Err(Error::InvalidState(format!(
            "the {kind} {id} must be in the '{required}' state; current state is '{current}'"
        )))
    }
}

fn experiment_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Experiment> {
    let id: i64 = row.get(0)?;
    let stage: String = row.get(3)?;
    Ok(Experiment::from_parts(
        id.to_string(),
        row.get(1)?,
        row.get(2)?,
        decode_stage(&stage, 3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn run_info_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RunInfo> {
    let experiment_id: i64 = row.get(1)?;
    let status: String = row.get(3)?;
    let stage: String = row.get(7)?;
    Ok(RunInfo::from_parts(
        row.get(0)?,
        experiment_id.to_string(),
        row.get(2)?,
        RunStatus::parse(&status).ok_or_else(|| decode_error(3, &status))?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        decode_stage(&stage, 7)?,
    ))
}

fn decode_stage(value: &str, column: usize) -> rusqlite::Result<LifecycleStage> {
    LifecycleStage::parse(value).ok_or_else(|| decode_error(column, value))
}

// The CHECK constraints make these unreachable on a healthy database; a row
// that trips them is corrupt and surfaces through the Storage error path.
fn decode_error(column: usize, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        rusqlite::types::Type::Text,
        format!("unrecognized enum value '{value}'").into(),
    )
}

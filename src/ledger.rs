//! Metric/param/tag ledger
//!
//! Storage discipline per kind:
//! - **metrics**: append-only history; the all-columns primary key dedups
//!   identical re-logs and nothing is ever updated in place;
//! - **params**: write-once per `(run, key)`, enforced by the primary key —
//!   the insert is attempted unconditionally and a constraint conflict is
//!   translated by re-reading the existing value inside the same
//!   transaction (no read-then-write race window);
//! - **tags**: upsert per `(run, key)`.
//!
//! Callers gate on run lifecycle before invoking these; the ledger owns
//! value validation (finite metrics) and batch limits.

use rusqlite::{params, Connection};

use crate::entity::{Metric, Param, RunTag};
use crate::error::is_constraint_violation;
use crate::{Error, Result};

/// Maximum number of metrics in one `log_batch` call.
pub const MAX_METRICS_PER_BATCH: usize = 1000;

/// Maximum number of params in one `log_batch` call.
pub const MAX_PARAMS_PER_BATCH: usize = 100;

/// Maximum number of tags in one `log_batch` call.
pub const MAX_TAGS_PER_BATCH: usize = 100;

/// Maximum total number of items in one `log_batch` call.
pub const MAX_ENTITIES_PER_BATCH: usize = 1000;

/// Append one metric history entry.
///
/// `INSERT OR IGNORE` against the all-columns primary key: an identical
/// tuple is a no-op, any new tuple is a new history entry.
pub(crate) fn insert_metric(conn: &Connection, run_id: &str, metric: &Metric) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO metrics (run_uuid, key, value, timestamp, step)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            run_id,
            metric.key(),
            metric.value(),
            metric.timestamp(),
            metric.step()
        ],
    )?;
    Ok(())
}

/// Record a write-once param.
///
/// Identical re-log succeeds as a no-op; a different value for an existing
/// key fails with `ImmutableParam` naming the retained value. Safe under
/// concurrent callers: the losing insert hits the `(run, key)` primary key
/// and is translated here, never surfaced as a generic storage error.
pub(crate) fn insert_param(conn: &Connection, run_id: &str, param: &Param) -> Result<()> {
    let inserted = conn.execute(
        "INSERT INTO params (run_uuid, key, value) VALUES (?1, ?2, ?3)",
        params![run_id, param.key(), param.value()],
    );
    match inserted {
        Ok(_) => Ok(()),
        Err(err) if is_constraint_violation(&err) => {
            let existing: String = conn.query_row(
                "SELECT value FROM params WHERE run_uuid = ?1 AND key = ?2",
                params![run_id, param.key()],
                |row| row.get(0),
            )?;
            if existing == param.value() {
                Ok(())
            } else {
                Err(Error::ImmutableParam {
                    key: param.key().to_string(),
                    existing,
                    attempted: param.value().to_string(),
                })
            }
        }
        Err(err) => Err(err.into()),
    }
}

/// Upsert a tag by `(run, key)`.
pub(crate) fn upsert_tag(conn: &Connection, run_id: &str, tag: &RunTag) -> Result<()> {
    conn.execute(
        "INSERT INTO tags (run_uuid, key, value) VALUES (?1, ?2, ?3)
         ON CONFLICT (run_uuid, key) DO UPDATE SET value = excluded.value",
        params![run_id, tag.key(), tag.value()],
    )?;
    Ok(())
}

/// Full metric history for one `(run, key)`.
pub(crate) fn metric_history(conn: &Connection, run_id: &str, key: &str) -> Result<Vec<Metric>> {
    let mut stmt = conn.prepare(
        "SELECT key, value, timestamp, step FROM metrics WHERE run_uuid = ?1 AND key = ?2",
    )?;
    let rows = stmt
        .query_map(params![run_id, key], metric_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Full metric history across all keys of a run.
pub(crate) fn metrics_for_run(conn: &Connection, run_id: &str) -> Result<Vec<Metric>> {
    let mut stmt =
        conn.prepare("SELECT key, value, timestamp, step FROM metrics WHERE run_uuid = ?1")?;
    let rows = stmt
        .query_map([run_id], metric_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// All params of a run, ordered by key.
pub(crate) fn params_for_run(conn: &Connection, run_id: &str) -> Result<Vec<Param>> {
    let mut stmt =
        conn.prepare("SELECT key, value FROM params WHERE run_uuid = ?1 ORDER BY key")?;
    let rows = stmt
        .query_map([run_id], |row| Ok(Param::from_parts(row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// All tags of a run, ordered by key.
pub(crate) fn tags_for_run(conn: &Connection, run_id: &str) -> Result<Vec<RunTag>> {
    let mut stmt = conn.prepare("SELECT key, value FROM tags WHERE run_uuid = ?1 ORDER BY key")?;
    let rows = stmt
        .query_map([run_id], |row| Ok(RunTag::from_parts(row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Collapse a metric history to the latest entry per key.
///
/// Latest = lexicographically greatest `(step, timestamp, value)` among
/// entries sharing a key. The projection is ordered by key for
/// deterministic materialization.
pub(crate) fn latest_per_key(history: Vec<Metric>) -> Vec<Metric> {
    let mut latest: Vec<Metric> = Vec::new();
    for metric in history {
        match latest.iter_mut().find(|m| m.key() == metric.key()) {
            Some(current) => {
                if metric.supersedes(current) {
                    *current = metric;
                }
            }
            None => latest.push(metric),
        }
    }
    latest.sort_by(|a, b| a.key().cmp(b.key()));
    latest
}

/// Validate a batch against size/count limits before any write.
pub(crate) fn validate_batch(metrics: &[Metric], params: &[Param], tags: &[RunTag]) -> Result<()> {
    if metrics.len() > MAX_METRICS_PER_BATCH {
        return Err(Error::InvalidArgument(format!(
            "batch contains {} metrics, maximum is {MAX_METRICS_PER_BATCH}",
            metrics.len()
        )));
    }
    if params.len() > MAX_PARAMS_PER_BATCH {
        return Err(Error::InvalidArgument(format!(
            "batch contains {} params, maximum is {MAX_PARAMS_PER_BATCH}",
            params.len()
        )));
    }
    if tags.len() > MAX_TAGS_PER_BATCH {
        return Err(Error::InvalidArgument(format!(
            "batch contains {} tags, maximum is {MAX_TAGS_PER_BATCH}",
            tags.len()
        )));
    }
    let total = metrics.len() + params.len() + tags.len();
    if total > MAX_ENTITIES_PER_BATCH {
        return Err(Error::InvalidArgument(format!(
            "batch contains {total} items, maximum is {MAX_ENTITIES_PER_BATCH}"
        )));
    }
    Ok(())
}

fn metric_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Metric> {
    Ok(Metric::from_parts(
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
    ))
}

//! Tracking store facade
//!
//! [`TrackingStore`] is the public operation surface: every operation is one
//! transaction-manager invocation composing the lifecycle engine, the
//! ledger, and the search engine. Returns are materialized snapshots
//! (experiments, runs with the latest-metric projection), never live
//! persistence handles.
//!
//! The store is an explicitly constructed value: the caller that opens it
//! owns the connection lifecycle. There is no process-global instance.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use rusqlite::{params, Connection};
use tracing::debug;
use uuid::Uuid;

use crate::entity::{
    self, Experiment, Metric, Param, Run, RunData, RunInfo, RunStatus, RunTag, ViewType,
};
use crate::error::is_constraint_violation;
use crate::search::{RunFilter, SEARCH_MAX_RESULTS_THRESHOLD};
use crate::txn::run_in_transaction;
use crate::{ledger, lifecycle, schema, search, Error, Result};

const BUSY_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Folder name appended to a run's artifact root.
const ARTIFACTS_FOLDER_NAME: &str = "artifacts";

/// SQLite-backed tracking metadata store.
///
/// Cheap to clone; clones share one connection. Cross-process concurrency is
/// delegated to SQLite (WAL, busy timeout, constraint conflicts), so two
/// stores opened on the same database file coordinate without any
/// application-level locking.
#[derive(Clone, Debug)]
pub struct TrackingStore {
    conn: Arc<Mutex<Connection>>,
    artifact_root: String,
}

impl TrackingStore {
    /// Open (creating if necessary) a tracking database at `path`.
    ///
    /// A fresh database is initialized to the expected schema revision.
    ///
    /// # Errors
    ///
    /// Returns `OutOfDateSchema` when the database is at a different
    /// revision than this build expects, `Storage` on SQLite failures.
    pub fn open(path: impl AsRef<Path>, artifact_root: impl Into<String>) -> Result<Self> {
        Self::from_connection(Connection::open(path)?, artifact_root)
    }

    /// Open a private in-memory store (tests, benches, scratch work).
    ///
    /// # Errors
    ///
    /// Returns `Storage` on SQLite failures.
    pub fn open_in_memory(artifact_root: impl Into<String>) -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, artifact_root)
    }

    fn from_connection(conn: Connection, artifact_root: impl Into<String>) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )?;
        schema::ensure_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            artifact_root: artifact_root.into(),
        })
    }

    /// Create an experiment and return its id.
    ///
    /// When `artifact_location` is not supplied, the default location embeds
    /// the store-assigned id under the configured artifact root.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an empty/over-length name, `AlreadyExists` when
    /// the name is taken by any non-terminal experiment.
    pub fn create_experiment(
        &self,
        name: &str,
        artifact_location: Option<&str>,
    ) -> Result<String> {
        entity::validate_experiment_name(name)?;
        let artifact_root = &self.artifact_root;
        run_in_transaction(&self.conn, |tx| {
            let inserted = tx.execute(
                "INSERT INTO experiments (name, artifact_location, lifecycle_stage, create_time)
                 VALUES (?1, ?2, 'active', ?3)",
                params![
                    name,
                    artifact_location.unwrap_or_default(),
                    Utc::now().timestamp_millis()
                ],
            );
            if let Err(err) = inserted {
                if is_constraint_violation(&err) {
                    return Err(Error::AlreadyExists(format!(
                        "experiment with name '{name}' already exists"
                    )));
                }
                return Err(err.into());
            }

            let experiment_id = tx.last_insert_rowid();
            if artifact_location.is_none() {
                // Second write: the default location embeds the assigned id.
                tx.execute(
                    "UPDATE experiments SET artifact_location = ?1 WHERE experiment_id = ?2",
                    params![
                        default_artifact_location(artifact_root, experiment_id),
                        experiment_id
                    ],
                )?;
            }
            debug!(experiment_id, name, "created experiment");
            Ok(experiment_id.to_string())
        })
    }

    /// Fetch one experiment by id, any lifecycle stage.
    ///
    /// # Errors
    ///
    /// `NotFound` when the id does not exist, `CorruptState` when the id
    /// resolves to more than one row.
    pub fn get_experiment(&self, experiment_id: &str) -> Result<Experiment> {
        run_in_transaction(&self.conn, |tx| {
            lifecycle::experiment_by_id(tx, experiment_id, ViewType::All)
        })
    }

    /// Fetch one experiment by name, any lifecycle stage.
    ///
    /// # Errors
    ///
    /// `CorruptState` when the name resolves to more than one row.
    pub fn get_experiment_by_name(&self, name: &str) -> Result<Option<Experiment>> {
        run_in_transaction(&self.conn, |tx| lifecycle::experiment_by_name(tx, name))
    }

    /// List experiments visible under `view`, ordered by id.
    ///
    /// # Errors
    ///
    /// `Storage` on SQLite failures.
    pub fn list_experiments(&self, view: ViewType) -> Result<Vec<Experiment>> {
        run_in_transaction(&self.conn, |tx| lifecycle::list_experiments(tx, view))
    }

    /// Soft-delete an ACTIVE experiment.
    ///
    /// Runs keep their own lifecycle stage; deleting the experiment only
    /// blocks new run creation.
    ///
    /// # Errors
    ///
    /// `NotFound`, or `InvalidState` when the experiment is not ACTIVE.
    pub fn delete_experiment(&self, experiment_id: &str) -> Result<()> {
        run_in_transaction(&self.conn, |tx| {
            let experiment = lifecycle::experiment_by_id(tx, experiment_id, ViewType::All)?;
            lifecycle::ensure_experiment_active(&experiment)?;
            tx.execute(
                "UPDATE experiments SET lifecycle_stage = 'deleted' WHERE experiment_id = ?1",
                [lifecycle::parse_experiment_id(experiment_id)?],
            )?;
            debug!(experiment_id, "deleted experiment");
            Ok(())
        })
    }

    /// Restore a DELETED experiment to ACTIVE.
    ///
    /// # Errors
    ///
    /// `NotFound`, or `InvalidState` when the experiment is not DELETED.
    pub fn restore_experiment(&self, experiment_id: &str) -> Result<()> {
        run_in_transaction(&self.conn, |tx| {
            let experiment = lifecycle::experiment_by_id(tx, experiment_id, ViewType::All)?;
            lifecycle::ensure_experiment_deleted(&experiment)?;
            tx.execute(
                "UPDATE experiments SET lifecycle_stage = 'active' WHERE experiment_id = ?1",
                [lifecycle::parse_experiment_id(experiment_id)?],
            )?;
            debug!(experiment_id, "restored experiment");
            Ok(())
        })
    }

    /// Rename an ACTIVE experiment.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a bad name, `NotFound`, `InvalidState` when the
    /// experiment is not ACTIVE, `AlreadyExists` when the name is taken.
    pub fn rename_experiment(&self, experiment_id: &str, new_name: &str) -> Result<()> {
        entity::validate_experiment_name(new_name)?;
        run_in_transaction(&self.conn, |tx| {
            let experiment = lifecycle::experiment_by_id(tx, experiment_id, ViewType::All)?;
            lifecycle::ensure_experiment_active(&experiment)?;
            let updated = tx.execute(
                "UPDATE experiments SET name = ?1 WHERE experiment_id = ?2",
                params![new_name, lifecycle::parse_experiment_id(experiment_id)?],
            );
            match updated {
                Ok(_) => Ok(()),
                Err(err) if is_constraint_violation(&err) => Err(Error::AlreadyExists(format!(
                    "experiment with name '{new_name}' already exists"
                ))),
                Err(err) => Err(err.into()),
            }
        })
    }

    /// Create a run under an ACTIVE experiment and return it materialized.
    ///
    /// The run starts RUNNING with the caller-supplied `start_time`; its
    /// artifact URI is derived from the experiment's artifact location and
    /// the generated run id. Duplicate keys in the creation tag set collapse
    /// last-writer-wins.
    ///
    /// # Errors
    ///
    /// `NotFound` for a missing experiment, `InvalidState` when the
    /// experiment is not ACTIVE.
    pub fn create_run(
        &self,
        experiment_id: &str,
        user_id: Option<&str>,
        start_time: i64,
        tags: &[RunTag],
    ) -> Result<Run> {
        run_in_transaction(&self.conn, |tx| {
            let experiment = lifecycle::experiment_by_id(tx, experiment_id, ViewType::All)?;
            lifecycle::ensure_experiment_active(&experiment)?;

            let run_id = Uuid::new_v4().simple().to_string();
            let artifact_uri = format!(
                "{}/{run_id}/{ARTIFACTS_FOLDER_NAME}",
                experiment.artifact_location().trim_end_matches('/')
            );
            tx.execute(
                "INSERT INTO runs (run_uuid, experiment_id, user_id, status, start_time,
                                   end_time, artifact_uri, lifecycle_stage)
                 VALUES (?1, ?2, ?3, 'RUNNING', ?4, NULL, ?5, 'active')",
                params![
                    run_id,
                    lifecycle::parse_experiment_id(experiment_id)?,
                    user_id,
                    start_time,
                    artifact_uri
                ],
            )?;
            for tag in tags {
                ledger::upsert_tag(tx, &run_id, tag)?;
            }

            debug!(experiment_id, %run_id, "created run");
            let info = lifecycle::run_by_id(tx, &run_id)?;
            materialize_run(tx, info)
        })
    }

    /// Fetch one run by id, materialized, any lifecycle stage.
    ///
    /// # Errors
    ///
    /// `NotFound` when the id does not exist, `CorruptState` when the id
    /// resolves to more than one row.
    pub fn get_run(&self, run_id: &str) -> Result<Run> {
        run_in_transaction(&self.conn, |tx| {
            let info = lifecycle::run_by_id(tx, run_id)?;
            materialize_run(tx, info)
        })
    }

    /// Update an ACTIVE run's status and end time.
    ///
    /// # Errors
    ///
    /// `NotFound`, or `InvalidState` when the run is not ACTIVE.
    pub fn update_run_info(
        &self,
        run_id: &str,
        status: RunStatus,
        end_time: Option<i64>,
    ) -> Result<RunInfo> {
        run_in_transaction(&self.conn, |tx| {
            let info = lifecycle::run_by_id(tx, run_id)?;
            lifecycle::ensure_run_active(&info)?;
            tx.execute(
                "UPDATE runs SET status = ?1, end_time = ?2 WHERE run_uuid = ?3",
                params![status.as_str(), end_time, run_id],
            )?;
            lifecycle::run_by_id(tx, run_id)
        })
    }

    /// Soft-delete an ACTIVE run.
    ///
    /// # Errors
    ///
    /// `NotFound`, or `InvalidState` when the run is not ACTIVE.
    pub fn delete_run(&self, run_id: &str) -> Result<()> {
        run_in_transaction(&self.conn, |tx| {
            let info = lifecycle::run_by_id(tx, run_id)?;
            lifecycle::ensure_run_active(&info)?;
            tx.execute(
                "UPDATE runs SET lifecycle_stage = 'deleted' WHERE run_uuid = ?1",
                [run_id],
            )?;
            debug!(run_id, "deleted run");
            Ok(())
        })
    }

    /// Restore a DELETED run to ACTIVE.
    ///
    /// # Errors
    ///
    /// `NotFound`, or `InvalidState` when the run is not DELETED.
    pub fn restore_run(&self, run_id: &str) -> Result<()> {
        run_in_transaction(&self.conn, |tx| {
            let info = lifecycle::run_by_id(tx, run_id)?;
            lifecycle::ensure_run_deleted(&info)?;
            tx.execute(
                "UPDATE runs SET lifecycle_stage = 'active' WHERE run_uuid = ?1",
                [run_id],
            )?;
            debug!(run_id, "restored run");
            Ok(())
        })
    }

    /// Append one metric history entry to an ACTIVE run.
    ///
    /// # Errors
    ///
    /// `NotFound`, or `InvalidState` when the run is not ACTIVE.
    pub fn log_metric(&self, run_id: &str, metric: &Metric) -> Result<()> {
        run_in_transaction(&self.conn, |tx| {
            let info = lifecycle::run_by_id(tx, run_id)?;
            lifecycle::ensure_run_active(&info)?;
            ledger::insert_metric(tx, run_id, metric)
        })
    }

    /// Full, unordered metric history for one `(run, key)`.
    ///
    /// # Errors
    ///
    /// `NotFound` when the run does not exist.
    pub fn get_metric_history(&self, run_id: &str, key: &str) -> Result<Vec<Metric>> {
        run_in_transaction(&self.conn, |tx| {
            lifecycle::run_by_id(tx, run_id)?;
            ledger::metric_history(tx, run_id, key)
        })
    }

    /// Record a write-once param on an ACTIVE run.
    ///
    /// Re-logging the identical value is a no-op.
    ///
    /// # Errors
    ///
    /// `NotFound`, `InvalidState` when the run is not ACTIVE, or
    /// `ImmutableParam` when the key already holds a different value.
    pub fn log_param(&self, run_id: &str, param: &Param) -> Result<()> {
        run_in_transaction(&self.conn, |tx| {
            let info = lifecycle::run_by_id(tx, run_id)?;
            lifecycle::ensure_run_active(&info)?;
            ledger::insert_param(tx, run_id, param)
        })
    }

    /// Upsert a tag on an ACTIVE run.
    ///
    /// # Errors
    ///
    /// `NotFound`, or `InvalidState` when the run is not ACTIVE.
    pub fn set_tag(&self, run_id: &str, tag: &RunTag) -> Result<()> {
        run_in_transaction(&self.conn, |tx| {
            let info = lifecycle::run_by_id(tx, run_id)?;
            lifecycle::ensure_run_active(&info)?;
            ledger::upsert_tag(tx, run_id, tag)
        })
    }

    /// Log params, then metrics, then tags against an ACTIVE run.
    ///
    /// The whole batch is validated against count limits before any write,
    /// and the run-state check is one transaction. Application is per item:
    /// a failing item surfaces its specific error and aborts the remainder,
    /// but items already applied stay committed. Callers wanting stronger
    /// guarantees retry the whole batch or inspect the failing item.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an over-limit batch, `NotFound`,
    /// `InvalidState` when the run is not ACTIVE, or the failing item's
    /// error (e.g. `ImmutableParam`).
    pub fn log_batch(
        &self,
        run_id: &str,
        metrics: &[Metric],
        params: &[Param],
        tags: &[RunTag],
    ) -> Result<()> {
        ledger::validate_batch(metrics, params, tags)?;
        run_in_transaction(&self.conn, |tx| {
            let info = lifecycle::run_by_id(tx, run_id)?;
            lifecycle::ensure_run_active(&info)
        })?;

        for param in params {
            self.log_param(run_id, param)?;
        }
        for metric in metrics {
            self.log_metric(run_id, metric)?;
        }
        for tag in tags {
            self.set_tag(run_id, tag)?;
        }
        debug!(
            run_id,
            metrics = metrics.len(),
            params = params.len(),
            tags = tags.len(),
            "logged batch"
        );
        Ok(())
    }

    /// Search runs across experiments.
    ///
    /// Candidates are the runs of each listed experiment whose lifecycle
    /// stage is admitted by `view`; the filter is evaluated against each
    /// candidate's materialized snapshot taken inside one transaction.
    /// Survivors are ordered by `start_time` descending then run id
    /// ascending and truncated to `max_results`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an over-threshold `max_results` or malformed
    /// filter, `NotFound` for a missing experiment id.
    pub fn search_runs<S: AsRef<str>>(
        &self,
        experiment_ids: &[S],
        filter: &str,
        view: ViewType,
        max_results: usize,
    ) -> Result<Vec<Run>> {
        if max_results > SEARCH_MAX_RESULTS_THRESHOLD {
            return Err(Error::InvalidArgument(format!(
                "invalid value for max_results: must be at most \
                 {SEARCH_MAX_RESULTS_THRESHOLD}, got {max_results}"
            )));
        }
        let filter = RunFilter::parse(filter)?;

        let survivors = run_in_transaction(&self.conn, |tx| {
            let mut survivors = Vec::new();
            for experiment_id in experiment_ids {
                let experiment_id = experiment_id.as_ref();
                lifecycle::experiment_by_id(tx, experiment_id, ViewType::All)?;
                let candidates = lifecycle::runs_for_experiment(
                    tx,
                    lifecycle::parse_experiment_id(experiment_id)?,
                    view,
                )?;
                for info in candidates {
                    let run = materialize_run(tx, info)?;
                    if filter.matches(&run) {
                        survivors.push(run);
                    }
                }
            }
            Ok(survivors)
        })?;

        Ok(search::order_and_truncate(survivors, max_results))
    }
}

/// Resolve a run's data and wrap it with its info into a snapshot.
fn materialize_run(conn: &Connection, info: RunInfo) -> Result<Run> {
    let metrics = ledger::latest_per_key(ledger::metrics_for_run(conn, info.run_id())?);
    let params = ledger::params_for_run(conn, info.run_id())?;
    let tags = ledger::tags_for_run(conn, info.run_id())?;
    Ok(Run::from_parts(info, RunData::from_parts(metrics, params, tags)))
}

fn default_artifact_location(artifact_root: &str, experiment_id: i64) -> String {
    format!("{}/{experiment_id}", artifact_root.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory_round_trip() {
        let store = TrackingStore::open_in_memory("file:///tmp/artifacts").unwrap();
        let experiment_id = store.create_experiment("demo", None).unwrap();
        let experiment = store.get_experiment(&experiment_id).unwrap();
        assert_eq!(experiment.name(), "demo");
        assert_eq!(
            experiment.artifact_location(),
            format!("file:///tmp/artifacts/{experiment_id}")
        );
    }

    #[test]
    fn test_default_artifact_location_trims_trailing_slash() {
        assert_eq!(default_artifact_location("s3://bucket/", 3), "s3://bucket/3");
        assert_eq!(default_artifact_location("s3://bucket", 3), "s3://bucket/3");
    }

    #[test]
    fn test_run_artifact_uri_derivation() {
        let store = TrackingStore::open_in_memory("file:///tmp/artifacts").unwrap();
        let experiment_id = store.create_experiment("demo", None).unwrap();
        let run = store.create_run(&experiment_id, None, 0, &[]).unwrap();
        assert_eq!(
            run.info().artifact_uri(),
            format!(
                "file:///tmp/artifacts/{experiment_id}/{}/artifacts",
                run.info().run_id()
            )
        );
    }
}

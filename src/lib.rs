//! # Registro-DB: Embedded ML Experiment Tracking Store
//!
//! Registro-DB is a SQLite-backed metadata store for machine-learning
//! experimentation: it records experiments, runs, and their metrics,
//! params, and tags, and answers get/list/search queries over them.
//!
//! ## Invariants the store protects
//!
//! - Experiment names are unique across active and deleted experiments
//! - Metric history is append-only; the current value per key is the entry
//!   with the greatest `(step, timestamp, value)` tuple
//! - Params are write-once per `(run, key)`, safe under concurrent writers
//!   via constraint-driven conflict detection
//! - Delete/restore are state-machine gated; mutations against non-active
//!   entities are rejected
//!
//! ## Example Usage
//!
//! ```rust
//! use registro_db::entity::{Metric, Param, ViewType};
//! use registro_db::TrackingStore;
//!
//! let store = TrackingStore::open_in_memory("file:///tmp/artifacts")?;
//!
//! let experiment_id = store.create_experiment("mnist baseline", None)?;
//! let run = store.create_run(&experiment_id, Some("ada"), 1_700_000_000_000, &[])?;
//! let run_id = run.info().run_id().to_string();
//!
//! store.log_param(&run_id, &Param::new("lr", "0.01")?)?;
//! store.log_metric(&run_id, &Metric::new("loss", 0.42, 1_700_000_001_000, 1)?)?;
//!
//! let found = store.search_runs(&[&experiment_id], "metrics.loss < 0.5", ViewType::ActiveOnly, 10)?;
//! assert_eq!(found.len(), 1);
//! # Ok::<(), registro_db::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod entity;
pub mod error;
mod ledger;
mod lifecycle;
mod schema;
pub mod search;
mod store;
mod txn;

pub use error::{Error, Result};
pub use ledger::{
    MAX_ENTITIES_PER_BATCH, MAX_METRICS_PER_BATCH, MAX_PARAMS_PER_BATCH, MAX_TAGS_PER_BATCH,
};
pub use schema::SCHEMA_REVISION;
pub use search::SEARCH_MAX_RESULTS_THRESHOLD;
pub use store::TrackingStore;

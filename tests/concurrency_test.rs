//! Concurrency tests: constraint-driven conflict detection across writers
//!
//! Two stores opened on the same database file model independent
//! request-handling processes with no coordination beyond SQLite itself
//! (WAL, busy timeout, unique constraints).

use std::sync::{Arc, Barrier};
use std::thread;

use registro_db::entity::{Metric, Param};
use registro_db::{Error, TrackingStore};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn two_stores() -> anyhow::Result<(tempfile::TempDir, TrackingStore, TrackingStore)> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("tracking.db");
    let a = TrackingStore::open(&path, "file:///tmp/registro/artifacts")?;
    let b = TrackingStore::open(&path, "file:///tmp/registro/artifacts")?;
    Ok((dir, a, b))
}

#[test]
fn test_concurrent_log_param_exactly_one_wins() -> anyhow::Result<()> {
    init_tracing();
    let (_dir, store_a, store_b) = two_stores()?;

    let experiment_id = store_a.create_experiment("race", None)?;
    let run = store_a.create_run(&experiment_id, None, 0, &[])?;
    let run_id = run.info().run_id().to_string();

    let barrier = Arc::new(Barrier::new(2));
    let spawn = |store: TrackingStore, run_id: String, value: &'static str, barrier: Arc<Barrier>| {
        thread::spawn(move || {
            let param = Param::new("lr", value).unwrap();
            barrier.wait();
            store.log_param(&run_id, &param)
        })
    };

    let left = spawn(store_a.clone(), run_id.clone(), "0.01", Arc::clone(&barrier));
    let right = spawn(store_b.clone(), run_id.clone(), "0.02", barrier);

    let results = [left.join().unwrap(), right.join().unwrap()];
    let wins = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(Error::ImmutableParam { .. })))
        .count();
    assert_eq!(wins, 1, "exactly one writer must win: {results:?}");
    assert_eq!(conflicts, 1, "the loser must observe ImmutableParam: {results:?}");

    // The winner's value is permanently retained and visible from both stores.
    let retained = store_a.get_run(&run_id)?.param("lr").unwrap().to_string();
    assert!(retained == "0.01" || retained == "0.02");
    assert_eq!(store_b.get_run(&run_id)?.param("lr"), Some(retained.as_str()));
    Ok(())
}

#[test]
fn test_concurrent_create_experiment_same_name() -> anyhow::Result<()> {
    init_tracing();
    let (_dir, store_a, store_b) = two_stores()?;

    let barrier = Arc::new(Barrier::new(2));
    let spawn = |store: TrackingStore, barrier: Arc<Barrier>| {
        thread::spawn(move || {
            barrier.wait();
            store.create_experiment("contested", None)
        })
    };

    let left = spawn(store_a.clone(), Arc::clone(&barrier));
    let right = spawn(store_b, barrier);

    let results = [left.join().unwrap(), right.join().unwrap()];
    let wins = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(Error::AlreadyExists(_))))
        .count();
    assert_eq!(wins, 1, "exactly one creation must win: {results:?}");
    assert_eq!(conflicts, 1, "the loser must observe AlreadyExists: {results:?}");

    let survivor = store_a.get_experiment_by_name("contested")?.unwrap();
    assert_eq!(
        survivor.experiment_id(),
        results.iter().find_map(|r| r.as_ref().ok()).unwrap()
    );
    Ok(())
}

#[test]
fn test_concurrent_metric_appends_both_land() -> anyhow::Result<()> {
    init_tracing();
    let (_dir, store_a, store_b) = two_stores()?;

    let experiment_id = store_a.create_experiment("append race", None)?;
    let run = store_a.create_run(&experiment_id, None, 0, &[])?;
    let run_id = run.info().run_id().to_string();

    let barrier = Arc::new(Barrier::new(2));
    let spawn = |store: TrackingStore, run_id: String, step: i64, barrier: Arc<Barrier>| {
        thread::spawn(move || {
            let metric = Metric::new("loss", 0.5, 100 + step, step).unwrap();
            barrier.wait();
            store.log_metric(&run_id, &metric)
        })
    };

    let left = spawn(store_a.clone(), run_id.clone(), 1, Arc::clone(&barrier));
    let right = spawn(store_b, run_id.clone(), 2, barrier);
    left.join().unwrap()?;
    right.join().unwrap()?;

    // Appends never conflict; both history entries land.
    assert_eq!(store_a.get_metric_history(&run_id, "loss")?.len(), 2);
    Ok(())
}

//! Ledger tests: append-only metrics, write-once params, upsert tags, batch
//!
//! Exercises the storage discipline per kind through the public facade.

use registro_db::entity::{Metric, Param, RunTag};
use registro_db::{Error, TrackingStore, MAX_PARAMS_PER_BATCH};

fn store_with_run() -> (TrackingStore, String) {
    let store = TrackingStore::open_in_memory("file:///tmp/registro/artifacts").unwrap();
    let experiment_id = store.create_experiment("ledger", None).unwrap();
    let run = store.create_run(&experiment_id, None, 0, &[]).unwrap();
    let run_id = run.info().run_id().to_string();
    (store, run_id)
}

// =============================================================================
// Metrics
// =============================================================================

#[test]
fn test_metric_history_and_current_projection() {
    let (store, run_id) = store_with_run();
    store
        .log_metric(&run_id, &Metric::new("loss", 0.9, 100, 0).unwrap())
        .unwrap();
    store
        .log_metric(&run_id, &Metric::new("loss", 0.5, 200, 1).unwrap())
        .unwrap();

    let history = store.get_metric_history(&run_id, "loss").unwrap();
    assert_eq!(history.len(), 2);

    // Higher step wins the materialized current value.
    let run = store.get_run(&run_id).unwrap();
    let current = run.latest_metric("loss").unwrap();
    assert!((current.value() - 0.5).abs() < f64::EPSILON);
    assert_eq!(current.step(), 1);
}

#[test]
fn test_metric_projection_tie_breaks_on_timestamp() {
    let (store, run_id) = store_with_run();
    store
        .log_metric(&run_id, &Metric::new("loss", 0.3, 100, 5).unwrap())
        .unwrap();
    store
        .log_metric(&run_id, &Metric::new("loss", 0.4, 200, 5).unwrap())
        .unwrap();

    let run = store.get_run(&run_id).unwrap();
    assert!((run.latest_metric("loss").unwrap().value() - 0.4).abs() < f64::EPSILON);
}

#[test]
fn test_identical_metric_tuple_logged_twice_appears_once() {
    let (store, run_id) = store_with_run();
    let metric = Metric::new("loss", 0.9, 100, 0).unwrap();
    store.log_metric(&run_id, &metric).unwrap();
    store.log_metric(&run_id, &metric).unwrap();

    assert_eq!(store.get_metric_history(&run_id, "loss").unwrap().len(), 1);
}

#[test]
fn test_non_finite_metric_values_rejected_at_construction() {
    assert!(matches!(
        Metric::new("loss", f64::NAN, 0, 0),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        Metric::new("loss", f64::INFINITY, 0, 0),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn test_metric_history_for_missing_run_is_not_found() {
    let (store, _) = store_with_run();
    assert!(matches!(
        store.get_metric_history("deadbeef", "loss"),
        Err(Error::NotFound(_))
    ));
}

#[test]
fn test_metric_history_for_unknown_key_is_empty() {
    let (store, run_id) = store_with_run();
    assert!(store.get_metric_history(&run_id, "absent").unwrap().is_empty());
}

// =============================================================================
// Params
// =============================================================================

#[test]
fn test_param_write_once_with_identity_no_op() {
    let (store, run_id) = store_with_run();
    store
        .log_param(&run_id, &Param::new("lr", "0.01").unwrap())
        .unwrap();

    // Re-logging the identical value is a no-op.
    store
        .log_param(&run_id, &Param::new("lr", "0.01").unwrap())
        .unwrap();

    // A different value must fail, naming the retained value.
    let err = store
        .log_param(&run_id, &Param::new("lr", "0.02").unwrap())
        .unwrap_err();
    match err {
        Error::ImmutableParam { key, existing, attempted } => {
            assert_eq!(key, "lr");
            assert_eq!(existing, "0.01");
            assert_eq!(attempted, "0.02");
        }
        other => panic!("expected ImmutableParam, got {other:?}"),
    }

    let run = store.get_run(&run_id).unwrap();
    assert_eq!(run.param("lr"), Some("0.01"));
}

#[test]
fn test_params_materialize_on_run() {
    let (store, run_id) = store_with_run();
    store
        .log_param(&run_id, &Param::new("batch_size", "32").unwrap())
        .unwrap();
    store
        .log_param(&run_id, &Param::new("lr", "0.01").unwrap())
        .unwrap();

    let run = store.get_run(&run_id).unwrap();
    let keys: Vec<&str> = run.data().params().iter().map(|p| p.key()).collect();
    assert_eq!(keys, ["batch_size", "lr"]);
}

// =============================================================================
// Tags
// =============================================================================

#[test]
fn test_tag_upsert_replaces_value() {
    let (store, run_id) = store_with_run();
    store
        .set_tag(&run_id, &RunTag::new("stage", "dev").unwrap())
        .unwrap();
    store
        .set_tag(&run_id, &RunTag::new("stage", "prod").unwrap())
        .unwrap();

    let run = store.get_run(&run_id).unwrap();
    assert_eq!(run.data().tags().len(), 1);
    assert_eq!(run.tag("stage"), Some("prod"));
}

// =============================================================================
// Batch logging
// =============================================================================

#[test]
fn test_log_batch_applies_all_categories() {
    let (store, run_id) = store_with_run();
    let metrics = vec![
        Metric::new("loss", 0.9, 100, 0).unwrap(),
        Metric::new("loss", 0.5, 200, 1).unwrap(),
    ];
    let params = vec![Param::new("lr", "0.01").unwrap()];
    let tags = vec![RunTag::new("model", "mlp").unwrap()];

    store.log_batch(&run_id, &metrics, &params, &tags).unwrap();

    let run = store.get_run(&run_id).unwrap();
    assert_eq!(store.get_metric_history(&run_id, "loss").unwrap().len(), 2);
    assert_eq!(run.param("lr"), Some("0.01"));
    assert_eq!(run.tag("model"), Some("mlp"));
}

#[test]
fn test_log_batch_over_limit_rejected_before_any_write() {
    let (store, run_id) = store_with_run();
    let params: Vec<Param> = (0..=MAX_PARAMS_PER_BATCH)
        .map(|i| Param::new(format!("p{i}"), "v").unwrap())
        .collect();
    let metrics = vec![Metric::new("loss", 1.0, 0, 0).unwrap()];

    let err = store.log_batch(&run_id, &metrics, &params, &[]).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)), "got {err:?}");

    // Nothing was applied, metrics included.
    assert!(store.get_metric_history(&run_id, "loss").unwrap().is_empty());
    assert!(store.get_run(&run_id).unwrap().data().params().is_empty());
}

#[test]
fn test_log_batch_surfaces_param_conflict_and_stops() {
    let (store, run_id) = store_with_run();
    store
        .log_param(&run_id, &Param::new("lr", "0.01").unwrap())
        .unwrap();

    let metrics = vec![Metric::new("loss", 0.5, 100, 0).unwrap()];
    let params = vec![Param::new("lr", "0.02").unwrap()];
    let tags = vec![RunTag::new("model", "mlp").unwrap()];

    let err = store.log_batch(&run_id, &metrics, &params, &tags).unwrap_err();
    assert!(matches!(err, Error::ImmutableParam { .. }), "got {err:?}");

    // Params run first; the failing item aborts the remainder, so no
    // metrics or tags land.
    let run = store.get_run(&run_id).unwrap();
    assert!(store.get_metric_history(&run_id, "loss").unwrap().is_empty());
    assert!(run.data().tags().is_empty());
    assert_eq!(run.param("lr"), Some("0.01"));
}

#[test]
fn test_log_batch_on_deleted_run_is_invalid_state() {
    let (store, run_id) = store_with_run();
    store.delete_run(&run_id).unwrap();

    let metrics = vec![Metric::new("loss", 0.5, 100, 0).unwrap()];
    assert!(matches!(
        store.log_batch(&run_id, &metrics, &[], &[]),
        Err(Error::InvalidState(_))
    ));
}

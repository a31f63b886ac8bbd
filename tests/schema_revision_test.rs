//! Schema initialization and revision verification tests

use registro_db::{Error, TrackingStore, SCHEMA_REVISION};

const ARTIFACT_ROOT: &str = "file:///tmp/registro/artifacts";

#[test]
fn test_fresh_open_initializes_and_reopen_succeeds() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("tracking.db");

    let store = TrackingStore::open(&path, ARTIFACT_ROOT)?;
    let experiment_id = store.create_experiment("persisted", None)?;
    drop(store);

    // Data written through the first handle is visible after reopen.
    let reopened = TrackingStore::open(&path, ARTIFACT_ROOT)?;
    assert_eq!(reopened.get_experiment(&experiment_id)?.name(), "persisted");
    Ok(())
}

#[test]
fn test_open_refuses_unknown_revision() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("tracking.db");
    TrackingStore::open(&path, ARTIFACT_ROOT)?;

    // Stamp a revision this build does not understand.
    let conn = rusqlite::Connection::open(&path)?;
    conn.execute(
        "INSERT INTO schema_revisions (revision, description, applied_at) VALUES (?1, 'future', 0)",
        [SCHEMA_REVISION + 1],
    )?;
    drop(conn);

    let err = TrackingStore::open(&path, ARTIFACT_ROOT).unwrap_err();
    match err {
        Error::OutOfDateSchema { found, expected } => {
            assert_eq!(found, (SCHEMA_REVISION + 1).to_string());
            assert_eq!(expected, SCHEMA_REVISION.to_string());
        }
        other => panic!("expected OutOfDateSchema, got {other:?}"),
    }
    Ok(())
}

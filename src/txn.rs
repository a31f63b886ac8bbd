//! Transaction manager: one unit-of-work per facade operation
//!
//! `run_in_transaction` commits on success, rolls back on any failure, and
//! never leaves the unit of work open: the `rusqlite::Transaction` drop guard
//! rolls back on early return and on unwind, so an aborted caller cannot
//! leak a half-applied operation.

use std::sync::Mutex;

use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::{Error, Result};

/// Execute `work` against a single immediate transaction.
///
/// IMMEDIATE acquires the write lock up front, so concurrent writers
/// serialize at the storage layer and constraint conflicts surface inside
/// the losing transaction rather than at commit.
pub(crate) fn run_in_transaction<T, F>(conn: &Mutex<Connection>, work: F) -> Result<T>
where
    F: FnOnce(&Transaction<'_>) -> Result<T>,
{
    let mut guard = conn
        .lock()
        .map_err(|_| Error::Internal("connection mutex poisoned".to_string()))?;
    let tx = guard.transaction_with_behavior(TransactionBehavior::Immediate)?;
    match work(&tx) {
        Ok(value) => {
            tx.commit()?;
            Ok(value)
        }
        Err(err) => {
            // Explicit for the success of the rollback itself being
            // irrelevant; the drop guard would roll back regardless.
            let _ = tx.rollback();
            Err(err)
        }
    }
}

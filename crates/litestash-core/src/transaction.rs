//! Atomic batches
//!
//! `execute_in_transaction` runs a closure against the repository inside one
//! SQLite transaction. Either every write in the closure becomes visible or
//! none does.

use rusqlite::{Transaction, TransactionBehavior};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::repository::Repository;

impl Repository {
    /// Run `batch` inside a transaction
    ///
    /// Commits when `batch` returns `Ok`. When it returns `Err`, or the
    /// commit itself fails, every write in the batch is rolled back and the
    /// original error comes back wrapped in `StoreError::Transaction`.
    ///
    /// The write lock is taken when the batch starts, so other handles
    /// cannot write until it finishes.
    ///
    /// Transactions do not nest: calling this from inside a batch returns
    /// `StoreError::NestedTransaction` and leaves the outer batch running.
    pub fn execute_in_transaction<R, F>(&self, batch: F) -> StoreResult<R>
    where
        F: FnOnce(&Repository) -> StoreResult<R>,
    {
        let conn = self.conn()?;
        if !conn.is_autocommit() {
            return Err(StoreError::NestedTransaction);
        }

        // IMMEDIATE takes the write lock up front, so contention with other
        // handles surfaces here and waits out the busy timeout
        let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
        debug!("Transaction started on {:?}", self.path());

        match batch(self) {
            Ok(value) => match tx.commit() {
                Ok(()) => {
                    debug!("Transaction committed on {:?}", self.path());
                    Ok(value)
                }
                // A failed commit drops the transaction, which rolls it back
                Err(e) => {
                    warn!("Commit failed on {:?}, rolled back: {}", self.path(), e);
                    Err(StoreError::Transaction {
                        source: Box::new(StoreError::Database(e)),
                    })
                }
            },
            Err(e) => {
                match tx.rollback() {
                    Ok(()) => warn!("Transaction rolled back on {:?}: {}", self.path(), e),
                    Err(rollback_err) => warn!(
                        "Rollback failed on {:?} after {}: {}",
                        self.path(),
                        e,
                        rollback_err
                    ),
                }
                Err(StoreError::Transaction {
                    source: Box::new(e),
                })
            }
        }
    }
}

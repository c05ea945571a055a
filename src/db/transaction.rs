//! Unit-of-work helper around sea-orm transactions.
//!
//! Every workflow that touches more than one row goes through [`unit_of_work`]:
//! the closure's writes commit together or roll back together, and the
//! closure's own [`ServiceError`] comes back to the caller unchanged.

use crate::errors::ServiceError;
use metrics::{counter, histogram};
use sea_orm::{DatabaseConnection, DatabaseTransaction, TransactionError, TransactionTrait};
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, warn};

/// Type alias for boxed future used in transactions
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Runs `f` inside a database transaction.
///
/// The database's default isolation level is used (READ COMMITTED on
/// Postgres). Callers that change shared counters do so with guarded
/// single-statement updates instead of read-modify-write.
pub async fn unit_of_work<F, T>(db: &DatabaseConnection, f: F) -> Result<T, ServiceError>
where
    F: for<'c> FnOnce(&'c DatabaseTransaction) -> BoxFuture<'c, Result<T, ServiceError>> + Send,
    T: Send,
{
    let start = std::time::Instant::now();
    let result = db.transaction::<_, T, ServiceError>(f).await;
    histogram!("warehouse_db.transaction.duration", start.elapsed());

    match result {
        Ok(value) => {
            counter!("warehouse_db.transaction.committed", 1);
            debug!("Transaction committed in {:?}", start.elapsed());
            Ok(value)
        }
        Err(TransactionError::Connection(db_err)) => {
            counter!("warehouse_db.transaction.failed", 1);
            warn!(error = %db_err, "Transaction could not be started or committed");
            Err(ServiceError::DatabaseError(db_err))
        }
        Err(TransactionError::Transaction(err)) => {
            counter!("warehouse_db.transaction.rolled_back", 1);
            debug!(error = %err, "Transaction rolled back");
            Err(err)
        }
    }
}

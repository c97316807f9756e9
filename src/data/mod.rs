pub mod migrations;
pub mod repository;

use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;

use crate::error::AppError;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens a catalog connection ready for use. Each task calls this for itself;
/// connections are never shared across tasks.
pub fn open_connection(db_path: &Path) -> Result<Connection, AppError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    migrations::run_migrations(&conn)?;
    Ok(conn)
}

/// Opens a write transaction for the batch loops, which commit on their own
/// cadence. The write lock is taken up front so the snapshot cannot go stale
/// under a concurrent writer.
pub(crate) fn begin(conn: &Connection) -> Result<(), AppError> {
    conn.execute_batch("BEGIN IMMEDIATE")?;
    Ok(())
}

/// Commits the open transaction. On failure the uncommitted tail is rolled back
/// and the error is returned to abort the task.
pub(crate) fn commit(conn: &Connection) -> Result<(), AppError> {
    if let Err(err) = conn.execute_batch("COMMIT") {
        let _ = conn.execute_batch("ROLLBACK");
        return Err(err.into());
    }
    Ok(())
}

/// Commits and immediately opens the next transaction.
pub(crate) fn checkpoint(conn: &Connection) -> Result<(), AppError> {
    commit(conn)?;
    begin(conn)
}

pub(crate) fn rollback(conn: &Connection) {
    if !conn.is_autocommit() {
        let _ = conn.execute_batch("ROLLBACK");
    }
}

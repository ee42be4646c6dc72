use crate::cache::CacheError;

pub fn map_sqlx_error(op: &'static str, err: sqlx::Error) -> CacheError {
    match err {
        sqlx::Error::PoolTimedOut => CacheError::storage(op, "timed out waiting for a connection"),
        sqlx::Error::Database(db) if db.message().contains("database is locked") => {
            CacheError::storage(op, "database is locked by another writer")
        }
        other => CacheError::storage(op, other),
    }
}

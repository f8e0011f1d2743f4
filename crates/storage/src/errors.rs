use imeicheck_domain::storage::StorageError;
use sea_orm::{DbErr, SqlErr};

/// Maps SeaORM errors onto the domain error type. Unique-key collisions are
/// the duplicate-delivery signal for the reconciler, so they get their own
/// variant; the string sniff covers backends that do not surface a typed
/// `SqlErr`.
pub(crate) fn map_db_err(err: DbErr) -> StorageError {
    if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
        || err.to_string().to_lowercase().contains("unique")
    {
        StorageError::Duplicate
    } else {
        StorageError::Database(err.to_string())
    }
}

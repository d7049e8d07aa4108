use ormq_data::DataError;
use sqlx::error::ErrorKind;

/// Extension trait for converting `sqlx::Error` into `DataError`.
///
/// Due to Rust's orphan rules, we can't implement `From<sqlx::Error> for DataError`
/// in this crate. Instead, use `.into_data_error()`.
pub trait SqlxErrorExt {
    fn into_data_error(self) -> DataError;
}

impl SqlxErrorExt for sqlx::Error {
    fn into_data_error(self) -> DataError {
        let kind = match &self {
            sqlx::Error::RowNotFound => return DataError::NotFound("Row not found".into()),
            sqlx::Error::Database(db) => Some(db.kind()),
            _ => None,
        };
        match kind {
            Some(
                ErrorKind::UniqueViolation
                | ErrorKind::ForeignKeyViolation
                | ErrorKind::NotNullViolation
                | ErrorKind::CheckViolation,
            ) => DataError::integrity(self),
            _ => DataError::database(self),
        }
    }
}

/// Convenience alias for data-layer results using `DataError`.
pub type SqlxResult<T> = Result<T, DataError>;

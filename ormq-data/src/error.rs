use serde::Serialize;

/// A field-level validation failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Errors that can occur in the data layer.
#[derive(Debug)]
pub enum DataError {
    /// An operation ran before the session provider received its pool.
    NotInitialized,
    /// `init` was called on a provider that already has a pool.
    AlreadyInitialized,
    /// The payload or the query failed validation. Raised before any
    /// statement reaches the database.
    Validation(Vec<FieldError>),
    /// No row matched a single-result query.
    NotFound(String),
    /// A constraint violation reported by the database.
    Integrity(Box<dyn std::error::Error + Send + Sync>),
    /// Beginning, committing or rolling back a transaction failed.
    TransactionFailure(Box<dyn std::error::Error + Send + Sync>),
    /// A mutation was attempted on an append-only table.
    ReadOnly(&'static str),
    Database(Box<dyn std::error::Error + Send + Sync>),
    Other(String),
}

impl DataError {
    /// Construct a `Database` variant from any error type.
    ///
    /// Used by backend crates (e.g. `ormq-data-sqlx`) to wrap driver-specific
    /// errors.
    pub fn database(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        DataError::Database(Box::new(err))
    }

    pub fn integrity(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        DataError::Integrity(Box::new(err))
    }

    pub fn transaction(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        DataError::TransactionFailure(Box::new(err))
    }

    /// Shorthand for a validation error on a single field.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        DataError::Validation(vec![FieldError::new(field, message)])
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DataError::NotFound(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, DataError::Validation(_))
    }

    pub fn is_integrity(&self) -> bool {
        matches!(self, DataError::Integrity(_))
    }
}

impl std::fmt::Display for DataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataError::NotInitialized => {
                write!(f, "Session provider is not initialized; call init first")
            }
            DataError::AlreadyInitialized => write!(f, "Session provider is already initialized"),
            DataError::Validation(errors) => {
                write!(f, "Validation failed:")?;
                for error in errors {
                    write!(f, "\n  - {error}")?;
                }
                Ok(())
            }
            DataError::NotFound(msg) => write!(f, "Not found: {msg}"),
            DataError::Integrity(err) => write!(f, "Integrity violation: {err}"),
            DataError::TransactionFailure(err) => write!(f, "Transaction failure: {err}"),
            DataError::ReadOnly(table) => write!(f, "Table '{table}' is append-only"),
            DataError::Database(err) => write!(f, "Database error: {err}"),
            DataError::Other(msg) => write!(f, "Data error: {msg}"),
        }
    }
}

impl std::error::Error for DataError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DataError::Integrity(err)
            | DataError::TransactionFailure(err)
            | DataError::Database(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<crate::query::QueryError> for DataError {
    fn from(err: crate::query::QueryError) -> Self {
        match err {
            crate::query::QueryError::InvalidIdentifier { kind, ident } => {
                DataError::invalid(ident, format!("invalid {kind} identifier"))
            }
            crate::query::QueryError::EmptyChangeSet => {
                DataError::invalid("data", "update payload is empty")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_display_lists_fields() {
        let err = DataError::Validation(vec![
            FieldError::new("name", "length is lower than 1"),
            FieldError::new("email", "not a valid email"),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("name: length is lower than 1"));
        assert!(msg.contains("email: not a valid email"));
        assert!(err.is_validation());
    }

    #[test]
    fn test_source_is_exposed() {
        let io = std::io::Error::other("disk");
        let err = DataError::database(io);
        assert!(std::error::Error::source(&err).is_some());
        assert!(std::error::Error::source(&DataError::NotInitialized).is_none());
    }
}

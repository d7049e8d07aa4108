//! Optional schema validation for `create` / `update` payloads.
//!
//! The façade always checks that payload keys are declared columns. A
//! [`Validator`] adds a shape-and-constraint check on top; [`Schema`] does it
//! by deserializing the payload into a `serde` type and running its `garde`
//! rules.
//!
//! ```ignore
//! #[derive(Deserialize, garde::Validate)]
//! #[serde(deny_unknown_fields)]
//! struct NewPerson {
//!     #[garde(length(min = 1, max = 100))]
//!     name: String,
//!     #[garde(email)]
//!     email: String,
//! }
//!
//! let repo = CrudRepository::<Person, Sqlite>::new(provider)
//!     .with_validator(Schema::<NewPerson>::new());
//! ```

use crate::error::FieldError;
use crate::value::Record;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;

/// Validates payloads before any statement is executed.
pub trait Validator: Send + Sync {
    fn validate_create(&self, data: &Record) -> Result<(), Vec<FieldError>>;

    /// Partial payloads; accepts everything unless overridden.
    fn validate_update(&self, _changes: &Record) -> Result<(), Vec<FieldError>> {
        Ok(())
    }
}

/// Validates create payloads against `C`.
pub struct Schema<C> {
    _marker: PhantomData<fn() -> C>,
}

impl<C> Schema<C> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }

    /// Also validate update payloads against `U` (typically all-`Option`
    /// fields).
    pub fn with_updates<U>(self) -> PatchedSchema<C, U> {
        PatchedSchema {
            _marker: PhantomData,
        }
    }
}

impl<C> Default for Schema<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Validator for Schema<C>
where
    C: DeserializeOwned + garde::Validate,
    C::Context: Default,
{
    fn validate_create(&self, data: &Record) -> Result<(), Vec<FieldError>> {
        check::<C>(data)
    }
}

/// Validates create payloads against `C` and update payloads against `U`.
pub struct PatchedSchema<C, U> {
    _marker: PhantomData<fn() -> (C, U)>,
}

impl<C, U> Validator for PatchedSchema<C, U>
where
    C: DeserializeOwned + garde::Validate,
    C::Context: Default,
    U: DeserializeOwned + garde::Validate,
    U::Context: Default,
{
    fn validate_create(&self, data: &Record) -> Result<(), Vec<FieldError>> {
        check::<C>(data)
    }

    fn validate_update(&self, changes: &Record) -> Result<(), Vec<FieldError>> {
        check::<U>(changes)
    }
}

fn check<T>(record: &Record) -> Result<(), Vec<FieldError>>
where
    T: DeserializeOwned + garde::Validate,
    T::Context: Default,
{
    let payload: T = serde_json::from_value(record.to_json())
        .map_err(|err| vec![FieldError::new("payload", err.to_string())])?;
    payload
        .validate()
        .map_err(|report| convert_garde_report(&report))
}

fn convert_garde_report(report: &garde::Report) -> Vec<FieldError> {
    report
        .iter()
        .map(|(path, error)| {
            let field = {
                let s = path.to_string();
                if s.is_empty() { "value".to_string() } else { s }
            };
            FieldError::new(field, error.message().to_string())
        })
        .collect()
}

/// Check that every key of `record` is one of `columns`.
pub fn check_columns(record: &Record, columns: &[&str]) -> Result<(), Vec<FieldError>> {
    let errors: Vec<_> = record
        .columns()
        .filter(|col| !columns.contains(col))
        .map(|col| FieldError::new(col, "unknown column"))
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

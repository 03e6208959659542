use std::str::FromStr;

use nanopay_domain::model::Raw;
pub(crate) use nanopay_domain::storage::StorageError;
use nanopay_domain::storage::StorageResult;
use sea_orm::{DbErr, SqlErr};

/// Maps unique-constraint violations to `Duplicate(what)`; everything else
/// is reported as a database failure.
pub(crate) fn insert_error(err: DbErr, what: &'static str) -> StorageError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => StorageError::Duplicate(what),
        _ => StorageError::from_source(err),
    }
}

pub(crate) fn parse_column<T>(value: &str, column: &str) -> StorageResult<T>
where
    T: FromStr,
{
    value
        .parse::<T>()
        .map_err(|_| StorageError::Corrupt(format!("{column} `{value}`")))
}

pub(crate) fn parse_amount(value: &str, column: &str) -> StorageResult<Raw> {
    Raw::parse_raw(value).map_err(|err| StorageError::Corrupt(format!("{column}: {err}")))
}

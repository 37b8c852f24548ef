/*! This module sets up the application's database and provides the shared column helpers. */

use std::str::FromStr;

use rusqlite::{
    Connection, Row, Transaction as SqlTransaction, TransactionBehavior, types::Type,
};
use rust_decimal::Decimal;
use time::OffsetDateTime;

use crate::{
    Error, account::create_account_table, audit::create_audit_log_table,
    auth::create_user_table, branch::create_branch_table, loan::create_loan_table,
    transaction::create_transaction_table,
};

/// Create the application tables if they do not exist yet.
///
/// All tables are created in one exclusive transaction so a half-initialised
/// database is never left behind.
///
/// # Errors
/// Returns an [Error::SqlError] if any of the tables could not be created.
pub fn initialize(connection: &Connection) -> Result<(), Error> {
    connection.pragma_update(None, "foreign_keys", "ON")?;

    let transaction = SqlTransaction::new_unchecked(connection, TransactionBehavior::Exclusive)?;

    create_branch_table(&transaction)?;
    create_user_table(&transaction)?;
    create_account_table(&transaction)?;
    create_loan_table(&transaction)?;
    create_transaction_table(&transaction)?;
    create_audit_log_table(&transaction)?;

    transaction.commit()?;

    Ok(())
}

/// Read a money or rate column that is stored as exact decimal text.
pub fn get_decimal(row: &Row, index: usize) -> Result<Decimal, rusqlite::Error> {
    let raw: String = row.get(index)?;

    Decimal::from_str(&raw)
        .map_err(|error| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(error)))
}

/// Read a nullable money column that is stored as exact decimal text.
pub fn get_optional_decimal(row: &Row, index: usize) -> Result<Option<Decimal>, rusqlite::Error> {
    let raw: Option<String> = row.get(index)?;

    raw.map(|raw| {
        Decimal::from_str(&raw).map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(error))
        })
    })
    .transpose()
}

/// The current UTC time truncated to whole seconds, for `created_at` style columns.
///
/// Truncating keeps values identical after a round trip through SQLite text.
pub fn now_utc_seconds() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();

    now.replace_nanosecond(0).unwrap_or(now)
}

/// The error returned when a text column holds a value that does not name an enum variant.
#[derive(Debug, thiserror::Error, PartialEq)]
#[error("unknown {kind} \"{value}\"")]
pub struct UnknownVariant {
    /// The name of the enum being parsed, e.g. "loan status".
    pub kind: &'static str,
    /// The text that could not be parsed.
    pub value: String,
}

/// Implement [rusqlite::ToSql], [rusqlite::types::FromSql] and [std::fmt::Display]
/// for a fieldless enum that has `as_str` and [std::str::FromStr] with [UnknownVariant] as the error.
macro_rules! impl_text_column {
    ($enum_type:ty) => {
        impl rusqlite::ToSql for $enum_type {
            fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
                Ok(rusqlite::types::ToSqlOutput::from(self.as_str()))
            }
        }

        impl rusqlite::types::FromSql for $enum_type {
            fn column_result(
                value: rusqlite::types::ValueRef<'_>,
            ) -> rusqlite::types::FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|error| rusqlite::types::FromSqlError::Other(Box::new(error)))
            }
        }

        impl std::fmt::Display for $enum_type {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

pub(crate) use impl_text_column;

#[cfg(test)]
mod tests {
    use rusqlite::Connection;
    use rust_decimal_macros::dec;

    use super::{get_decimal, get_optional_decimal, initialize};

    #[test]
    fn initialize_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        initialize(&conn).expect("first initialisation failed");
        initialize(&conn).expect("second initialisation failed");
    }

    #[test]
    fn decimal_text_round_trips_exactly() {
        let conn = Connection::open_in_memory().unwrap();
        let want = dec!(531.8473230330935);

        let got = conn
            .query_row("SELECT ?1", [want.to_string()], |row| get_decimal(row, 0))
            .unwrap();

        assert_eq!(got, want);
    }

    #[test]
    fn null_decimal_is_none() {
        let conn = Connection::open_in_memory().unwrap();

        let got = conn
            .query_row("SELECT NULL", [], |row| get_optional_decimal(row, 0))
            .unwrap();

        assert_eq!(got, None);
    }

    #[test]
    fn malformed_decimal_is_an_error() {
        let conn = Connection::open_in_memory().unwrap();

        let got = conn.query_row("SELECT 'twelve'", [], |row| get_decimal(row, 0));

        assert!(got.is_err());
    }
}

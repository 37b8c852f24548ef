//! Defines the core data models and database queries for ledger transactions.
//!
//! Ledger transactions are append only. There is deliberately no update or delete query.

use std::str::FromStr;

use rusqlite::{Connection, Row, Transaction as SqlTransaction, params, types::Type};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;

use crate::{
    Error,
    database_id::{AccountId, LoanId, TransactionId},
    db::{UnknownVariant, get_decimal, impl_text_column, now_utc_seconds},
};

// ============================================================================
// MODELS
// ============================================================================

/// The business event that caused money to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    Transfer,
    /// A repayment from the borrower's checking account towards a loan.
    Payment,
    /// The principal of an approved loan paid into the borrower's checking account.
    LoanDisbursement,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "deposit",
            TransactionType::Withdrawal => "withdrawal",
            TransactionType::Transfer => "transfer",
            TransactionType::Payment => "payment",
            TransactionType::LoanDisbursement => "loan_disbursement",
        }
    }
}

impl FromStr for TransactionType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(TransactionType::Deposit),
            "withdrawal" => Ok(TransactionType::Withdrawal),
            "transfer" => Ok(TransactionType::Transfer),
            "payment" => Ok(TransactionType::Payment),
            "loan_disbursement" => Ok(TransactionType::LoanDisbursement),
            other => Err(UnknownVariant {
                kind: "transaction type",
                value: other.to_owned(),
            }),
        }
    }
}

impl_text_column!(TransactionType);

/// Where a ledger transaction is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Reversed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Reversed => "reversed",
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "completed" => Ok(TransactionStatus::Completed),
            "failed" => Ok(TransactionStatus::Failed),
            "reversed" => Ok(TransactionStatus::Reversed),
            other => Err(UnknownVariant {
                kind: "transaction status",
                value: other.to_owned(),
            }),
        }
    }
}

impl_text_column!(TransactionStatus);

/// An immutable record of money moving into or out of an account.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    /// The ID of the transaction.
    pub id: TransactionId,
    /// The unique, human readable reference code, e.g. "LN000042-P003".
    pub reference: String,
    /// The account money was taken from, if any.
    pub from_account_id: Option<AccountId>,
    /// The account money was paid into, if any.
    pub to_account_id: Option<AccountId>,
    /// The amount of money that moved. Always positive.
    pub amount: Decimal,
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    /// A text description of what the transaction was for.
    pub description: String,
    /// Extra details, e.g. `{"loan_id": 42, "payment_number": 3}`.
    pub metadata: Value,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// The details needed to record a ledger transaction.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub reference: String,
    pub from_account_id: Option<AccountId>,
    pub to_account_id: Option<AccountId>,
    pub amount: Decimal,
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    pub description: String,
    pub metadata: Value,
}

/// The reference code for the disbursement of `loan_id`.
pub fn disbursement_reference(loan_id: LoanId) -> String {
    format!("LN{loan_id:06}-D")
}

/// The reference code for payment number `payment_number` (1-based) of `loan_id`.
pub fn payment_reference(loan_id: LoanId, payment_number: u32) -> String {
    format!("LN{loan_id:06}-P{payment_number:03}")
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

/// Create the ledger transaction table.
///
/// The table is named `ledger_transaction` since `transaction` is an SQL keyword.
///
/// # Errors
/// Returns an error if the table could not be created.
pub fn create_transaction_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS ledger_transaction (
            id INTEGER PRIMARY KEY,
            reference TEXT NOT NULL UNIQUE,
            from_account_id INTEGER REFERENCES account(id) ON UPDATE CASCADE,
            to_account_id INTEGER REFERENCES account(id) ON UPDATE CASCADE,
            amount TEXT NOT NULL,
            transaction_type TEXT NOT NULL,
            status TEXT NOT NULL,
            description TEXT NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            CHECK (from_account_id IS NOT NULL OR to_account_id IS NOT NULL)
        )",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_ledger_transaction_loan
         ON ledger_transaction(json_extract(metadata, '$.loan_id'))",
        (),
    )?;

    Ok(())
}

/// Map a database row to a [Transaction].
pub fn map_transaction_row(row: &Row) -> Result<Transaction, rusqlite::Error> {
    let raw_metadata: String = row.get(8)?;
    let metadata = serde_json::from_str(&raw_metadata).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(8, Type::Text, Box::new(error))
    })?;

    Ok(Transaction {
        id: row.get(0)?,
        reference: row.get(1)?,
        from_account_id: row.get(2)?,
        to_account_id: row.get(3)?,
        amount: get_decimal(row, 4)?,
        transaction_type: row.get(5)?,
        status: row.get(6)?,
        description: row.get(7)?,
        metadata,
        created_at: row.get(9)?,
    })
}

const SELECT_TRANSACTION: &str = "SELECT id, reference, from_account_id, to_account_id, amount, \
     transaction_type, status, description, metadata, created_at FROM ledger_transaction";

/// Record a ledger transaction.
///
/// Takes an open database transaction so that the record is committed together
/// with the balance change it describes.
///
/// # Errors
/// Returns an [Error::SqlError] if the reference is already in use, an account does not exist,
/// or there is some other SQL error.
pub fn record_transaction(
    new_transaction: NewTransaction,
    tx: &SqlTransaction,
) -> Result<Transaction, Error> {
    let created_at = now_utc_seconds();

    tx.execute(
        "INSERT INTO ledger_transaction (reference, from_account_id, to_account_id, amount, \
         transaction_type, status, description, metadata, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            new_transaction.reference,
            new_transaction.from_account_id,
            new_transaction.to_account_id,
            new_transaction.amount.to_string(),
            new_transaction.transaction_type,
            new_transaction.status,
            new_transaction.description,
            new_transaction.metadata.to_string(),
            created_at,
        ],
    )?;

    Ok(Transaction {
        id: tx.last_insert_rowid(),
        reference: new_transaction.reference,
        from_account_id: new_transaction.from_account_id,
        to_account_id: new_transaction.to_account_id,
        amount: new_transaction.amount,
        transaction_type: new_transaction.transaction_type,
        status: new_transaction.status,
        description: new_transaction.description,
        metadata: new_transaction.metadata,
        created_at,
    })
}

/// Retrieve the ledger transactions recorded against `loan_id`, oldest first.
pub fn get_transactions_for_loan(
    loan_id: LoanId,
    connection: &Connection,
) -> Result<Vec<Transaction>, Error> {
    connection
        .prepare(&format!(
            "{SELECT_TRANSACTION} WHERE json_extract(metadata, '$.loan_id') = ?1 ORDER BY id ASC"
        ))?
        .query_map(params![loan_id], map_transaction_row)?
        .map(|maybe_transaction| maybe_transaction.map_err(Error::from))
        .collect()
}

/// Count the ledger transactions recorded against `loan_id`.
#[cfg(test)]
pub fn count_transactions_for_loan(loan_id: LoanId, connection: &Connection) -> Result<i64, Error> {
    connection
        .query_row(
            "SELECT COUNT(id) FROM ledger_transaction WHERE json_extract(metadata, '$.loan_id') = ?1",
            params![loan_id],
            |row| row.get(0),
        )
        .map_err(Error::from)
}

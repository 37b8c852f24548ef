//! Database ID type definitions.

/// Alias for the integer type used for mapping to database IDs.
pub type DatabaseId = i64;
/// The ID of a row in the `loan` table.
pub type LoanId = DatabaseId;
/// The ID of a row in the `account` table.
pub type AccountId = DatabaseId;
/// The ID of a row in the `branch` table.
pub type BranchId = DatabaseId;
/// The ID of a row in the `ledger_transaction` table.
pub type TransactionId = DatabaseId;

//! The money movement ledger.
//!
//! Every change to an account balance made by the loan workflows is paired with exactly one
//! [Transaction] written in the same database transaction.

mod core;

pub use core::{
    NewTransaction, Transaction, TransactionStatus, TransactionType, create_transaction_table,
    disbursement_reference, get_transactions_for_loan, payment_reference, record_transaction,
};

#[cfg(test)]
pub use core::count_transactions_for_loan;

#![allow(missing_docs)]

//! Fixtures shared by the unit tests.

use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use time::macros::date;

use crate::{
    account::{Account, AccountType, NewAccount, create_account, credit_account, get_active_checking_account},
    auth::{NewUser, PasswordHash, Role, User, UserID, create_user},
    branch::{Branch, assign_branch_manager, create_branch},
    database_id::BranchId,
    db::initialize,
    loan::{Loan, LoanState, LoanType, NewLoan, activate_loan, insert_loan},
    pagination::PaginationConfig,
    transaction::{
        NewTransaction, TransactionStatus, TransactionType, disbursement_reference,
        record_transaction,
    },
};

/// An in-memory database with every table created.
pub fn get_test_connection() -> Connection {
    let conn = Connection::open_in_memory().expect("Could not open database in memory.");
    initialize(&conn).expect("Could not initialize database.");
    conn
}

/// The loan endpoint state wrapping `conn`, in UTC.
pub fn get_loan_state(conn: Connection) -> LoanState {
    LoanState {
        db_connection: Arc::new(Mutex::new(conn)),
        local_timezone: "Etc/UTC".to_owned(),
        pagination_config: PaginationConfig::default(),
    }
}

pub fn seed_user(conn: &Connection, email: &str, role: Role, branch_id: Option<BranchId>) -> User {
    create_user(
        NewUser {
            email: email.to_owned(),
            name: email.split('@').next().unwrap_or(email).to_owned(),
            role,
            branch_id,
            password_hash: PasswordHash::new_unchecked("not a real hash"),
        },
        conn,
    )
    .expect("Could not create test user")
}

/// A manager assigned to `branch_id`.
pub fn seed_manager(conn: &Connection, email: &str, branch_id: BranchId) -> User {
    let manager = seed_user(conn, email, Role::Manager, Some(branch_id));
    assign_branch_manager(branch_id, manager.id, conn).expect("Could not assign manager");
    manager
}

pub fn seed_branch(conn: &Connection, name: &str) -> Branch {
    create_branch(name, conn).expect("Could not create test branch")
}

pub fn seed_checking_account(conn: &Connection, owner_id: UserID, balance: Decimal) -> Account {
    create_account(
        NewAccount {
            owner_id,
            account_type: AccountType::Checking,
            opening_balance: balance,
        },
        conn,
    )
    .expect("Could not create test account")
}

/// A pending personal loan at 6% over 24 months.
pub fn seed_loan(conn: &Connection, borrower_id: UserID, branch_id: BranchId, amount: Decimal) -> Loan {
    insert_loan(
        NewLoan {
            borrower_id,
            branch_id,
            loan_type: LoanType::Personal,
            amount,
            interest_rate: dec!(0.06),
            term_months: 24,
            purpose: "Consolidate existing debts".to_owned(),
            collateral_description: None,
            collateral_value: None,
            employment_status: None,
            annual_income: None,
            credit_score: None,
            application_date: date!(2025 - 01 - 10),
        },
        conn,
    )
    .expect("Could not create test loan")
}

/// A loan that has been approved on 2025-01-15 and disbursed into the borrower's checking
/// account, which must already exist.
pub fn seed_active_loan(
    conn: &Connection,
    borrower_id: UserID,
    branch_id: BranchId,
    amount: Decimal,
) -> Loan {
    let loan = seed_loan(conn, borrower_id, branch_id, amount);
    let approver = seed_user(
        conn,
        &format!("approver{}@bank.test", loan.id),
        Role::Admin,
        None,
    );
    let account = get_active_checking_account(borrower_id, conn)
        .unwrap()
        .expect("The borrower needs a checking account before a loan can be disbursed");

    let tx = conn.unchecked_transaction().unwrap();
    record_transaction(
        NewTransaction {
            reference: disbursement_reference(loan.id),
            from_account_id: None,
            to_account_id: Some(account.id),
            amount,
            transaction_type: TransactionType::LoanDisbursement,
            status: TransactionStatus::Completed,
            description: format!("Disbursement of loan {}", loan.id),
            metadata: json!({"loan_id": loan.id}),
        },
        &tx,
    )
    .unwrap();
    credit_account(account.id, amount, &tx).unwrap();
    let loan = activate_loan(
        &loan,
        approver.id,
        date!(2025 - 01 - 15),
        date!(2025 - 02 - 01),
        &tx,
    )
    .unwrap();
    tx.commit().unwrap();

    loan
}

/// Make every later update to `table` fail, to simulate a crash part way through an operation.
pub fn fail_updates_to(conn: &Connection, table: &str) {
    conn.execute_batch(&format!(
        "CREATE TRIGGER fail_{table}_updates BEFORE UPDATE ON {table}
         BEGIN SELECT RAISE(ABORT, 'forced failure'); END;"
    ))
    .expect("Could not create failure trigger");
}

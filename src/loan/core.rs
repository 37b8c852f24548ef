//! Defines the loan model, its status lifecycle and the database queries for loans.

use std::str::FromStr;

use rusqlite::{Connection, Row, Transaction as SqlTransaction, params};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::Date;

use crate::{
    Error,
    auth::UserID,
    database_id::{BranchId, LoanId},
    db::{UnknownVariant, get_decimal, get_optional_decimal, impl_text_column},
    loan::amortization::LoanTerms,
    pagination::PageRequest,
};

// ============================================================================
// MODELS
// ============================================================================

/// What the money is being borrowed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanType {
    Personal,
    Mortgage,
    Auto,
    Business,
}

impl LoanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanType::Personal => "personal",
            LoanType::Mortgage => "mortgage",
            LoanType::Auto => "auto",
            LoanType::Business => "business",
        }
    }
}

impl FromStr for LoanType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "personal" => Ok(LoanType::Personal),
            "mortgage" => Ok(LoanType::Mortgage),
            "auto" => Ok(LoanType::Auto),
            "business" => Ok(LoanType::Business),
            other => Err(UnknownVariant {
                kind: "loan type",
                value: other.to_owned(),
            }),
        }
    }
}

impl_text_column!(LoanType);

/// Where a loan is in its life.
///
/// Loans only move forward: pending loans are approved (and immediately disbursed, becoming
/// active) or rejected, and active loans are paid off or defaulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    /// Waiting for a manager or admin to decide.
    Pending,
    /// Approved but not yet disbursed.
    Approved,
    Rejected,
    /// Disbursed and accepting payments.
    Active,
    PaidOff,
    Defaulted,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Pending => "pending",
            LoanStatus::Approved => "approved",
            LoanStatus::Rejected => "rejected",
            LoanStatus::Active => "active",
            LoanStatus::PaidOff => "paid_off",
            LoanStatus::Defaulted => "defaulted",
        }
    }

    /// Whether a loan may move from `self` to `next`.
    pub fn can_transition_to(&self, next: LoanStatus) -> bool {
        matches!(
            (self, next),
            (LoanStatus::Pending, LoanStatus::Approved)
                | (LoanStatus::Pending, LoanStatus::Active)
                | (LoanStatus::Pending, LoanStatus::Rejected)
                | (LoanStatus::Approved, LoanStatus::Active)
                | (LoanStatus::Active, LoanStatus::PaidOff)
                | (LoanStatus::Active, LoanStatus::Defaulted)
        )
    }
}

impl FromStr for LoanStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(LoanStatus::Pending),
            "approved" => Ok(LoanStatus::Approved),
            "rejected" => Ok(LoanStatus::Rejected),
            "active" => Ok(LoanStatus::Active),
            "paid_off" => Ok(LoanStatus::PaidOff),
            "defaulted" => Ok(LoanStatus::Defaulted),
            other => Err(UnknownVariant {
                kind: "loan status",
                value: other.to_owned(),
            }),
        }
    }
}

impl_text_column!(LoanStatus);

/// A loan as stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Loan {
    /// The ID of the loan.
    pub id: LoanId,
    /// The customer who borrowed the money.
    pub borrower_id: UserID,
    /// The branch responsible for the loan, taken from the borrower when they applied.
    pub branch_id: BranchId,
    pub loan_type: LoanType,
    /// The principal.
    pub amount: Decimal,
    /// The annual interest rate as a fraction.
    pub interest_rate: Decimal,
    pub term_months: u32,
    /// The monthly payment computed at application time. Clients see the rounded value on the
    /// loan view instead.
    #[serde(skip_serializing)]
    pub monthly_payment: Decimal,
    pub purpose: String,
    pub collateral_description: Option<String>,
    pub collateral_value: Option<Decimal>,
    pub employment_status: Option<String>,
    pub annual_income: Option<Decimal>,
    pub credit_score: Option<u16>,
    pub status: LoanStatus,
    /// The number of payments received.
    pub payments_made: u32,
    /// The sum of all payments received, principal and interest.
    pub total_paid: Decimal,
    pub application_date: Date,
    pub approval_date: Option<Date>,
    /// The manager or admin who approved or rejected the loan.
    pub reviewed_by: Option<UserID>,
    pub first_payment_date: Option<Date>,
    pub rejection_reason: Option<String>,
}

impl Loan {
    /// The fixed terms used for the repayment calculations.
    pub fn terms(&self) -> LoanTerms {
        LoanTerms {
            principal: self.amount,
            annual_rate: self.interest_rate,
            term_months: self.term_months,
        }
    }

    /// The principal still owed, zero once the loan is paid off.
    pub fn remaining_balance(&self) -> Decimal {
        match self.status {
            LoanStatus::PaidOff => Decimal::ZERO,
            _ => self
                .terms()
                .remaining_balance(self.payments_made, self.total_paid),
        }
    }
}

/// A validated loan application ready to be saved.
#[derive(Debug, Clone)]
pub struct NewLoan {
    pub borrower_id: UserID,
    pub branch_id: BranchId,
    pub loan_type: LoanType,
    pub amount: Decimal,
    pub interest_rate: Decimal,
    pub term_months: u32,
    pub purpose: String,
    pub collateral_description: Option<String>,
    pub collateral_value: Option<Decimal>,
    pub employment_status: Option<String>,
    pub annual_income: Option<Decimal>,
    pub credit_score: Option<u16>,
    pub application_date: Date,
}

/// Filters for listing the loans that staff can see.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct LoanFilter {
    /// Only include loans from this branch. `None` means every branch.
    pub branch_id: Option<BranchId>,
    pub status: Option<LoanStatus>,
    pub loan_type: Option<LoanType>,
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

/// Create the loan table.
///
/// # Errors
/// Returns an error if the table could not be created.
pub fn create_loan_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS loan (
            id INTEGER PRIMARY KEY,
            borrower_id INTEGER NOT NULL REFERENCES user(id) ON UPDATE CASCADE,
            branch_id INTEGER NOT NULL REFERENCES branch(id) ON UPDATE CASCADE,
            loan_type TEXT NOT NULL CHECK (loan_type IN ('personal', 'mortgage', 'auto', 'business')),
            amount TEXT NOT NULL,
            interest_rate TEXT NOT NULL,
            term_months INTEGER NOT NULL CHECK (term_months BETWEEN 6 AND 480),
            monthly_payment TEXT NOT NULL,
            purpose TEXT NOT NULL,
            collateral_description TEXT,
            collateral_value TEXT,
            employment_status TEXT,
            annual_income TEXT,
            credit_score INTEGER CHECK (credit_score BETWEEN 300 AND 850),
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'approved', 'rejected', 'active', 'paid_off', 'defaulted')),
            payments_made INTEGER NOT NULL DEFAULT 0 CHECK (payments_made >= 0),
            total_paid TEXT NOT NULL DEFAULT '0',
            application_date TEXT NOT NULL,
            approval_date TEXT,
            reviewed_by INTEGER REFERENCES user(id) ON UPDATE CASCADE ON DELETE SET NULL,
            first_payment_date TEXT,
            rejection_reason TEXT
        )",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_loan_branch_status ON loan(branch_id, status)",
        (),
    )?;

    Ok(())
}

const SELECT_LOAN: &str = "SELECT id, borrower_id, branch_id, loan_type, amount, interest_rate, \
     term_months, monthly_payment, purpose, collateral_description, collateral_value, \
     employment_status, annual_income, credit_score, status, payments_made, total_paid, \
     application_date, approval_date, reviewed_by, first_payment_date, rejection_reason FROM loan";

/// Map a database row selected with the columns of `SELECT_LOAN` to a [Loan].
pub fn map_row_to_loan(row: &Row) -> Result<Loan, rusqlite::Error> {
    let reviewed_by: Option<i64> = row.get(19)?;

    Ok(Loan {
        id: row.get(0)?,
        borrower_id: UserID::new(row.get(1)?),
        branch_id: row.get(2)?,
        loan_type: row.get(3)?,
        amount: get_decimal(row, 4)?,
        interest_rate: get_decimal(row, 5)?,
        term_months: row.get(6)?,
        monthly_payment: get_decimal(row, 7)?,
        purpose: row.get(8)?,
        collateral_description: row.get(9)?,
        collateral_value: get_optional_decimal(row, 10)?,
        employment_status: row.get(11)?,
        annual_income: get_optional_decimal(row, 12)?,
        credit_score: row.get(13)?,
        status: row.get(14)?,
        payments_made: row.get(15)?,
        total_paid: get_decimal(row, 16)?,
        application_date: row.get(17)?,
        approval_date: row.get(18)?,
        reviewed_by: reviewed_by.map(UserID::new),
        first_payment_date: row.get(20)?,
        rejection_reason: row.get(21)?,
    })
}

/// Save a new loan with the status pending.
///
/// The monthly payment is computed from the terms and stored alongside them.
///
/// # Errors
/// Returns an [Error::SqlError] if the borrower or branch does not exist, or there is some other
/// SQL error.
pub fn insert_loan(new_loan: NewLoan, connection: &Connection) -> Result<Loan, Error> {
    let terms = LoanTerms {
        principal: new_loan.amount,
        annual_rate: new_loan.interest_rate,
        term_months: new_loan.term_months,
    };
    let monthly_payment = terms.monthly_payment();

    connection.execute(
        "INSERT INTO loan (borrower_id, branch_id, loan_type, amount, interest_rate, term_months, \
         monthly_payment, purpose, collateral_description, collateral_value, employment_status, \
         annual_income, credit_score, status, payments_made, total_paid, application_date)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, 0, '0', ?15)",
        params![
            new_loan.borrower_id.as_i64(),
            new_loan.branch_id,
            new_loan.loan_type,
            new_loan.amount.to_string(),
            new_loan.interest_rate.to_string(),
            new_loan.term_months,
            monthly_payment.to_string(),
            new_loan.purpose,
            new_loan.collateral_description,
            new_loan.collateral_value.map(|value| value.to_string()),
            new_loan.employment_status,
            new_loan.annual_income.map(|value| value.to_string()),
            new_loan.credit_score,
            LoanStatus::Pending,
            new_loan.application_date,
        ],
    )?;

    Ok(Loan {
        id: connection.last_insert_rowid(),
        borrower_id: new_loan.borrower_id,
        branch_id: new_loan.branch_id,
        loan_type: new_loan.loan_type,
        amount: new_loan.amount,
        interest_rate: new_loan.interest_rate,
        term_months: new_loan.term_months,
        monthly_payment,
        purpose: new_loan.purpose,
        collateral_description: new_loan.collateral_description,
        collateral_value: new_loan.collateral_value,
        employment_status: new_loan.employment_status,
        annual_income: new_loan.annual_income,
        credit_score: new_loan.credit_score,
        status: LoanStatus::Pending,
        payments_made: 0,
        total_paid: Decimal::ZERO,
        application_date: new_loan.application_date,
        approval_date: None,
        reviewed_by: None,
        first_payment_date: None,
        rejection_reason: None,
    })
}

/// Retrieve a loan by its `id`.
///
/// Pass an open database transaction as `connection` to read the loan from the same snapshot that
/// later writes will commit into.
///
/// # Errors
/// Returns [Error::NotFound] if there is no loan with `id`.
pub fn get_loan(id: LoanId, connection: &Connection) -> Result<Loan, Error> {
    connection
        .query_row(
            &format!("{SELECT_LOAN} WHERE id = ?1"),
            params![id],
            map_row_to_loan,
        )
        .map_err(|error| match error {
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound("loan"),
            error => error.into(),
        })
}

/// Retrieve the loans of `borrower_id`, newest first.
pub fn get_loans_for_borrower(
    borrower_id: UserID,
    connection: &Connection,
) -> Result<Vec<Loan>, Error> {
    connection
        .prepare(&format!("{SELECT_LOAN} WHERE borrower_id = ?1 ORDER BY id DESC"))?
        .query_map(params![borrower_id.as_i64()], map_row_to_loan)?
        .map(|maybe_loan| maybe_loan.map_err(Error::from))
        .collect()
}

/// Retrieve one page of the loans matching `filter`, newest first, and the total number of
/// matching loans.
///
/// # Errors
/// Returns an [Error::Validation] if the page lies beyond what SQLite can address.
pub fn query_loans(
    filter: LoanFilter,
    page: PageRequest,
    connection: &Connection,
) -> Result<(Vec<Loan>, u64), Error> {
    const FILTER_CLAUSE: &str = "WHERE (?1 IS NULL OR branch_id = ?1) \
         AND (?2 IS NULL OR status = ?2) \
         AND (?3 IS NULL OR loan_type = ?3)";

    let limit = page.limit()?;
    let offset = page.offset()?;

    let total: i64 = connection.query_row(
        &format!("SELECT COUNT(id) FROM loan {FILTER_CLAUSE}"),
        params![filter.branch_id, filter.status, filter.loan_type],
        |row| row.get(0),
    )?;
    // COUNT is never negative.
    let total = u64::try_from(total).unwrap_or_default();

    let loans = connection
        .prepare(&format!(
            "{SELECT_LOAN} {FILTER_CLAUSE} ORDER BY id DESC LIMIT ?4 OFFSET ?5"
        ))?
        .query_map(
            params![
                filter.branch_id,
                filter.status,
                filter.loan_type,
                limit,
                offset
            ],
            map_row_to_loan,
        )?
        .map(|maybe_loan| maybe_loan.map_err(Error::from))
        .collect::<Result<Vec<_>, _>>()?;

    Ok((loans, total))
}

/// Add a payment of `amount` to an active loan and return the updated loan.
///
/// # Errors
/// Returns [Error::LoanNotPayable] if the loan is no longer active in this transaction.
pub fn apply_loan_payment(
    loan: &Loan,
    amount: Decimal,
    pays_off: bool,
    tx: &SqlTransaction,
) -> Result<Loan, Error> {
    let status = if pays_off {
        LoanStatus::PaidOff
    } else {
        LoanStatus::Active
    };
    let total_paid = loan.total_paid + amount;

    let rows_affected = tx.execute(
        "UPDATE loan SET payments_made = payments_made + 1, total_paid = ?1, status = ?2
         WHERE id = ?3 AND status = 'active'",
        params![total_paid.to_string(), status, loan.id],
    )?;

    if rows_affected == 0 {
        return Err(Error::LoanNotPayable(loan.status));
    }

    Ok(Loan {
        payments_made: loan.payments_made + 1,
        total_paid,
        status,
        ..loan.clone()
    })
}

/// Mark a pending loan as disbursed and payable.
///
/// # Errors
/// Returns [Error::LoanNotPending] if the loan is no longer pending in this transaction.
pub fn activate_loan(
    loan: &Loan,
    approver: UserID,
    approval_date: Date,
    first_payment_date: Date,
    tx: &SqlTransaction,
) -> Result<Loan, Error> {
    let rows_affected = tx.execute(
        "UPDATE loan SET status = ?1, reviewed_by = ?2, approval_date = ?3, first_payment_date = ?4
         WHERE id = ?5 AND status = 'pending'",
        params![
            LoanStatus::Active,
            approver.as_i64(),
            approval_date,
            first_payment_date,
            loan.id
        ],
    )?;

    if rows_affected == 0 {
        return Err(Error::LoanNotPending(loan.status));
    }

    Ok(Loan {
        status: LoanStatus::Active,
        reviewed_by: Some(approver),
        approval_date: Some(approval_date),
        first_payment_date: Some(first_payment_date),
        ..loan.clone()
    })
}

/// Mark a pending loan as rejected.
///
/// # Errors
/// Returns [Error::LoanNotPending] if the loan is no longer pending.
pub fn reject_loan(
    loan: &Loan,
    reviewer: UserID,
    reason: &str,
    connection: &Connection,
) -> Result<Loan, Error> {
    let rows_affected = connection.execute(
        "UPDATE loan SET status = ?1, reviewed_by = ?2, rejection_reason = ?3
         WHERE id = ?4 AND status = 'pending'",
        params![LoanStatus::Rejected, reviewer.as_i64(), reason, loan.id],
    )?;

    if rows_affected == 0 {
        return Err(Error::LoanNotPending(loan.status));
    }

    Ok(Loan {
        status: LoanStatus::Rejected,
        reviewed_by: Some(reviewer),
        rejection_reason: Some(reason.to_owned()),
        ..loan.clone()
    })
}

/// Mark an active loan as defaulted.
///
/// # Errors
/// Returns [Error::LoanNotPayable] if the loan is no longer active.
pub fn mark_loan_defaulted(
    loan: &Loan,
    reviewer: UserID,
    connection: &Connection,
) -> Result<Loan, Error> {
    let rows_affected = connection.execute(
        "UPDATE loan SET status = ?1, reviewed_by = ?2 WHERE id = ?3 AND status = 'active'",
        params![LoanStatus::Defaulted, reviewer.as_i64(), loan.id],
    )?;

    if rows_affected == 0 {
        return Err(Error::LoanNotPayable(loan.status));
    }

    Ok(Loan {
        status: LoanStatus::Defaulted,
        reviewed_by: Some(reviewer),
        ..loan.clone()
    })
}

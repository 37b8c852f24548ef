//! Validating and saving loan applications.

use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};
use rusqlite::{Connection, TransactionBehavior};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use serde_json::json;
use time::Date;
use unicode_segmentation::UnicodeSegmentation;

use crate::{
    Error,
    audit::{AuditAction, AuditEvent, record_audit_event},
    auth::{User, UserID, get_user_by_id},
    loan::{Loan, LoanState, LoanType, LoanView, NewLoan, insert_loan},
};

const MIN_AMOUNT: Decimal = dec!(1000);
const MAX_AMOUNT: Decimal = dec!(10000000);
const MIN_INTEREST_RATE: Decimal = dec!(0.0001);
const MAX_INTEREST_RATE: Decimal = dec!(0.5);
const MIN_TERM_MONTHS: u32 = 6;
const MAX_TERM_MONTHS: u32 = 480;
const MIN_PURPOSE_LENGTH: usize = 10;
const MAX_PURPOSE_LENGTH: usize = 1000;
const MIN_CREDIT_SCORE: u16 = 300;
const MAX_CREDIT_SCORE: u16 = 850;

/// A loan application as sent by the client.
#[derive(Debug, Clone, Deserialize)]
pub struct LoanApplication {
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
}

/// Check that the principal is within the range the bank lends.
pub fn validate_amount(amount: Decimal) -> Result<(), Error> {
    if amount < MIN_AMOUNT || amount > MAX_AMOUNT {
        return Err(Error::validation(
            "amount",
            format!("must be between {MIN_AMOUNT} and {MAX_AMOUNT}"),
        ));
    }

    Ok(())
}

/// Check that the annual interest rate is within the range the bank lends at.
pub fn validate_interest_rate(interest_rate: Decimal) -> Result<(), Error> {
    if interest_rate < MIN_INTEREST_RATE || interest_rate > MAX_INTEREST_RATE {
        return Err(Error::validation(
            "interest_rate",
            format!("must be between {MIN_INTEREST_RATE} and {MAX_INTEREST_RATE}"),
        ));
    }

    Ok(())
}

/// Check that the term is within the range the bank lends for.
pub fn validate_term_months(term_months: u32) -> Result<(), Error> {
    if !(MIN_TERM_MONTHS..=MAX_TERM_MONTHS).contains(&term_months) {
        return Err(Error::validation(
            "term_months",
            format!("must be between {MIN_TERM_MONTHS} and {MAX_TERM_MONTHS} months"),
        ));
    }

    Ok(())
}

fn validate_non_negative(field: &'static str, value: Option<Decimal>) -> Result<(), Error> {
    match value {
        Some(value) if value < Decimal::ZERO => {
            Err(Error::validation(field, "must not be negative"))
        }
        _ => Ok(()),
    }
}

fn trimmed_or_none(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

/// Check an application from `borrower` and turn it into a loan ready to be saved.
///
/// The loan is assigned to the borrower's branch.
///
/// # Errors
/// Returns an [Error::Validation] tagged with the first offending field.
pub fn validate_application(
    application: LoanApplication,
    borrower: &User,
    application_date: Date,
) -> Result<NewLoan, Error> {
    validate_amount(application.amount)?;
    validate_interest_rate(application.interest_rate)?;
    validate_term_months(application.term_months)?;

    let purpose = application.purpose.trim().to_owned();
    let purpose_length = purpose.graphemes(true).count();
    if !(MIN_PURPOSE_LENGTH..=MAX_PURPOSE_LENGTH).contains(&purpose_length) {
        return Err(Error::validation(
            "purpose",
            format!("must be between {MIN_PURPOSE_LENGTH} and {MAX_PURPOSE_LENGTH} characters"),
        ));
    }

    validate_non_negative("collateral_value", application.collateral_value)?;
    validate_non_negative("annual_income", application.annual_income)?;

    if application
        .credit_score
        .is_some_and(|credit_score| !(MIN_CREDIT_SCORE..=MAX_CREDIT_SCORE).contains(&credit_score))
    {
        return Err(Error::validation(
            "credit_score",
            format!("must be between {MIN_CREDIT_SCORE} and {MAX_CREDIT_SCORE}"),
        ));
    }

    let branch_id = borrower.branch_id.ok_or_else(|| {
        Error::validation("branch", "you must be assigned to a branch before applying")
    })?;

    Ok(NewLoan {
        borrower_id: borrower.id,
        branch_id,
        loan_type: application.loan_type,
        amount: application.amount,
        interest_rate: application.interest_rate,
        term_months: application.term_months,
        purpose,
        collateral_description: trimmed_or_none(application.collateral_description),
        collateral_value: application.collateral_value,
        employment_status: trimmed_or_none(application.employment_status),
        annual_income: application.annual_income,
        credit_score: application.credit_score,
        application_date,
    })
}

/// Validate and save a loan application from `borrower_id` with the status pending.
///
/// No money moves until the loan is approved.
///
/// # Errors
/// Returns an [Error::Validation] if the application is invalid, or an [Error::SqlError] if it
/// could not be saved.
pub fn apply_for_loan(
    borrower_id: UserID,
    application: LoanApplication,
    today: Date,
    connection: &mut Connection,
) -> Result<Loan, Error> {
    let borrower = get_user_by_id(borrower_id, connection)?;
    let new_loan = validate_application(application, &borrower, today)?;

    let tx = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let loan = insert_loan(new_loan, &tx)?;
    record_audit_event(
        AuditEvent {
            user_id: borrower_id,
            action: AuditAction::LoanApplied,
            entity: "loan",
            entity_id: loan.id,
            details: json!({
                "loan_type": loan.loan_type,
                "amount": loan.amount.to_string(),
                "term_months": loan.term_months,
            }),
        },
        &tx,
    )?;
    tx.commit()?;

    tracing::info!(
        "User {borrower_id} applied for loan {} of {} at branch {}",
        loan.id,
        loan.amount,
        loan.branch_id
    );

    Ok(loan)
}

/// A route handler for applying for a loan.
///
/// Responds with the created loan and its repayment figures.
pub async fn create_loan_endpoint(
    State(state): State<LoanState>,
    Extension(user_id): Extension<UserID>,
    body: Result<Json<LoanApplication>, JsonRejection>,
) -> Result<(StatusCode, Json<LoanView>), Error> {
    let Json(application) = body?;
    let today = state.today()?;
    let mut connection = state.lock_connection()?;

    let loan = apply_for_loan(user_id, application, today, &mut connection)?;

    Ok((StatusCode::CREATED, Json(LoanView::new(loan, today))))
}

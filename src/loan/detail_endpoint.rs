//! Endpoints for a single loan: its details, repayment schedule and ledger.

use axum::{
    Extension, Json,
    extract::{Path, State},
};
use rusqlite::Connection;

use crate::{
    Error,
    auth::UserID,
    authorization::{authorize_branch_access, load_caller},
    database_id::LoanId,
    loan::{Loan, LoanState, LoanView, amortization::ScheduledPayment, get_loan},
    transaction::{Transaction, get_transactions_for_loan},
};

/// Fetch a loan that `user_id` is allowed to see: their own, or one from a branch they may access.
///
/// # Errors
/// Returns [Error::NotFound] if the loan does not exist, or [Error::Forbidden] if the user may not
/// see it.
pub fn get_visible_loan(
    loan_id: LoanId,
    user_id: UserID,
    connection: &Connection,
) -> Result<Loan, Error> {
    let loan = get_loan(loan_id, connection)?;

    if loan.borrower_id != user_id {
        let caller = load_caller(user_id, connection)?;
        authorize_branch_access(&caller, loan.branch_id)?;
    }

    Ok(loan)
}

/// A route handler that returns a loan with its repayment figures.
pub async fn get_loan_endpoint(
    State(state): State<LoanState>,
    Extension(user_id): Extension<UserID>,
    Path(loan_id): Path<LoanId>,
) -> Result<Json<LoanView>, Error> {
    let today = state.today()?;
    let connection = state.lock_connection()?;

    let loan = get_visible_loan(loan_id, user_id, &connection)?;

    Ok(Json(LoanView::new(loan, today)))
}

/// A route handler that returns the full amortization schedule of a loan.
pub async fn get_loan_schedule_endpoint(
    State(state): State<LoanState>,
    Extension(user_id): Extension<UserID>,
    Path(loan_id): Path<LoanId>,
) -> Result<Json<Vec<ScheduledPayment>>, Error> {
    let connection = state.lock_connection()?;

    let loan = get_visible_loan(loan_id, user_id, &connection)?;

    Ok(Json(loan.terms().schedule(loan.first_payment_date)))
}

/// A route handler that returns the ledger transactions of a loan, oldest first.
pub async fn get_loan_transactions_endpoint(
    State(state): State<LoanState>,
    Extension(user_id): Extension<UserID>,
    Path(loan_id): Path<LoanId>,
) -> Result<Json<Vec<Transaction>>, Error> {
    let connection = state.lock_connection()?;

    let loan = get_visible_loan(loan_id, user_id, &connection)?;

    get_transactions_for_loan(loan.id, &connection).map(Json)
}

//! The loan as shown to clients, with the repayment figures worked out.

use rust_decimal::Decimal;
use serde::Serialize;
use time::Date;

use crate::loan::{
    Loan, LoanStatus,
    amortization::{
        days_overdue, is_overdue, next_payment_due, progress_percentage, round_cents,
    },
};

/// A loan together with its derived repayment figures, rounded to cents.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanView {
    #[serde(flatten)]
    pub loan: Loan,
    pub monthly_payment: Decimal,
    pub total_amount: Decimal,
    pub total_interest: Decimal,
    pub remaining_balance: Decimal,
    /// Only known for active loans.
    pub next_payment_due: Option<Date>,
    pub is_overdue: bool,
    pub days_overdue: i64,
    pub progress_percentage: Decimal,
}

impl LoanView {
    /// Work out the repayment figures for `loan` as of `today`.
    pub fn new(loan: Loan, today: Date) -> Self {
        let terms = loan.terms();

        let next_payment_due = match (loan.status, loan.first_payment_date) {
            (LoanStatus::Active, Some(first_payment_date)) => {
                next_payment_due(first_payment_date, loan.payments_made)
            }
            _ => None,
        };
        let days_overdue = next_payment_due.map_or(0, |due_date| days_overdue(due_date, today));
        let progress_percentage = match loan.status {
            LoanStatus::PaidOff => Decimal::ONE_HUNDRED,
            _ => progress_percentage(loan.payments_made, loan.term_months),
        };

        Self {
            monthly_payment: round_cents(terms.monthly_payment()),
            total_amount: round_cents(terms.total_amount()),
            total_interest: round_cents(terms.total_interest()),
            remaining_balance: round_cents(loan.remaining_balance()),
            next_payment_due,
            is_overdue: next_payment_due.is_some_and(|due_date| is_overdue(due_date, today)),
            days_overdue,
            progress_percentage: round_cents(progress_percentage),
            loan,
        }
    }
}

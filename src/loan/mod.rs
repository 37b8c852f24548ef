//! The loan lifecycle: applications, approval and disbursement, payments and the figures derived
//! from a loan's terms.

pub mod amortization;
mod application;
mod approval;
mod calculator;
mod core;
mod detail_endpoint;
mod list_endpoint;
mod payment;
mod state;
mod view;

pub use application::create_loan_endpoint;
pub use approval::{branch_approval_endpoint, update_status_endpoint};
pub use calculator::calculate_loan_endpoint;
pub use core::{
    Loan, LoanFilter, LoanStatus, LoanType, NewLoan, activate_loan, apply_loan_payment,
    create_loan_table, get_loan, get_loans_for_borrower, insert_loan, mark_loan_defaulted,
    query_loans, reject_loan,
};
pub use detail_endpoint::{
    get_loan_endpoint, get_loan_schedule_endpoint, get_loan_transactions_endpoint,
};
pub use list_endpoint::{get_branch_loans_endpoint, get_loans_endpoint};
pub use payment::make_payment_endpoint;
pub use state::LoanState;
pub use view::LoanView;

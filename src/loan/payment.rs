//! Applying a borrower's payment to their loan.

use axum::{
    Extension, Json,
    extract::{Path, State, rejection::JsonRejection},
};
use rusqlite::{Connection, Transaction as SqlTransaction, TransactionBehavior};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    Error,
    account::{debit_account, get_active_checking_account},
    audit::{AuditAction, AuditEvent, record_audit_event},
    auth::UserID,
    database_id::LoanId,
    loan::{
        Loan, LoanState, LoanStatus, LoanView, amortization::round_cents, apply_loan_payment,
        get_loan,
    },
    transaction::{
        NewTransaction, Transaction, TransactionStatus, TransactionType, payment_reference,
        record_transaction,
    },
};

/// The body of a payment request.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentRequest {
    pub amount: Decimal,
}

/// What a payment did, rounded to cents.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSummary {
    pub amount: Decimal,
    /// The principal still owed after the payment.
    pub remaining_balance: Decimal,
    pub paid_off: bool,
    /// The balance of the checking account the payment was taken from.
    pub new_account_balance: Decimal,
    /// The reference of the ledger transaction for the payment.
    pub transaction_ref: String,
}

/// The result of a committed payment.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentOutcome {
    pub loan: Loan,
    pub transaction: Transaction,
    pub summary: PaymentSummary,
}

/// Pay `amount` off loan `loan_id` from the borrower's checking account.
///
/// The balance check, the debit, the ledger record, the loan update and the audit entry happen in
/// one immediate database transaction. Any failure rolls all of them back, leaving the account
/// and the loan exactly as they were.
///
/// # Errors
/// Returns a:
/// - [Error::Validation] if `amount` is not a positive number of cents,
/// - [Error::NotFound] if the loan does not exist or the borrower has no active checking account,
/// - [Error::Forbidden] if `payer` is not the borrower,
/// - [Error::LoanNotPayable] if the loan is not active,
/// - [Error::ExceedsRemainingBalance] if `amount` is more than is left to pay,
/// - [Error::InsufficientFunds] if the checking account balance is less than `amount`,
/// - [Error::SqlError] if any of the writes fail.
pub fn process_payment(
    loan_id: LoanId,
    payer: UserID,
    amount: Decimal,
    connection: &mut Connection,
) -> Result<PaymentOutcome, Error> {
    if amount <= Decimal::ZERO {
        return Err(Error::validation("amount", "must be greater than zero"));
    }

    if amount.normalize().scale() > 2 {
        return Err(Error::validation("amount", "must be a whole number of cents"));
    }

    let tx = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;

    match make_payment(loan_id, payer, amount, &tx) {
        Ok(outcome) => {
            tx.commit()?;
            tracing::info!(
                "Committed payment {} of {amount} against loan {loan_id} from account {:?}, paid off: {}",
                outcome.transaction.reference,
                outcome.transaction.from_account_id,
                outcome.summary.paid_off
            );

            Ok(outcome)
        }
        Err(error) => {
            tracing::warn!("Rolled back payment of {amount} against loan {loan_id}: {error}");

            Err(error)
        }
    }
}

fn make_payment(
    loan_id: LoanId,
    payer: UserID,
    amount: Decimal,
    tx: &SqlTransaction,
) -> Result<PaymentOutcome, Error> {
    let loan = get_loan(loan_id, tx)?;

    if loan.borrower_id != payer {
        return Err(Error::Forbidden);
    }

    if loan.status != LoanStatus::Active {
        return Err(Error::LoanNotPayable(loan.status));
    }

    let remaining_balance = round_cents(loan.remaining_balance());
    if amount > remaining_balance {
        return Err(Error::ExceedsRemainingBalance {
            remaining: remaining_balance,
            requested: amount,
        });
    }

    let account = get_active_checking_account(loan.borrower_id, tx)?
        .ok_or(Error::NotFound("checking account"))?;

    let new_account_balance = debit_account(account.id, amount, tx)?;

    let payment_number = loan.payments_made + 1;
    let transaction = record_transaction(
        NewTransaction {
            reference: payment_reference(loan.id, payment_number),
            from_account_id: Some(account.id),
            to_account_id: None,
            amount,
            transaction_type: TransactionType::Payment,
            status: TransactionStatus::Completed,
            description: format!("Payment {payment_number} for loan {}", loan.id),
            metadata: json!({"loan_id": loan.id, "payment_number": payment_number}),
        },
        tx,
    )?;

    let pays_off = amount >= remaining_balance;
    let loan = apply_loan_payment(&loan, amount, pays_off, tx)?;

    record_audit_event(
        AuditEvent {
            user_id: payer,
            action: AuditAction::LoanPayment,
            entity: "loan",
            entity_id: loan.id,
            details: json!({
                "amount": amount.to_string(),
                "payment_number": payment_number,
                "reference": transaction.reference,
                "paid_off": pays_off,
            }),
        },
        tx,
    )?;

    let summary = PaymentSummary {
        amount,
        remaining_balance: round_cents(loan.remaining_balance()),
        paid_off: pays_off,
        new_account_balance: round_cents(new_account_balance),
        transaction_ref: transaction.reference.clone(),
    };

    Ok(PaymentOutcome {
        loan,
        transaction,
        summary,
    })
}

/// The response to a payment request.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentResponse {
    pub loan: LoanView,
    pub payment: PaymentSummary,
}

/// A route handler for the borrower to make a payment against their loan.
pub async fn make_payment_endpoint(
    State(state): State<LoanState>,
    Extension(user_id): Extension<UserID>,
    Path(loan_id): Path<LoanId>,
    body: Result<Json<PaymentRequest>, JsonRejection>,
) -> Result<Json<PaymentResponse>, Error> {
    let Json(request) = body?;
    let today = state.today()?;
    let mut connection = state.lock_connection()?;

    let outcome = process_payment(loan_id, user_id, request.amount, &mut connection)?;

    Ok(Json(PaymentResponse {
        loan: LoanView::new(outcome.loan, today),
        payment: outcome.summary,
    }))
}

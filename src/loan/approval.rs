//! Approving, disbursing, rejecting and defaulting loans.

use axum::{
    Extension, Json,
    extract::{Path, State, rejection::JsonRejection},
};
use rusqlite::{Connection, Transaction as SqlTransaction, TransactionBehavior};
use serde::Deserialize;
use serde_json::json;
use time::Date;

use crate::{
    Error,
    account::{credit_account, get_active_checking_account},
    audit::{AuditAction, AuditEvent, record_audit_event},
    auth::UserID,
    authorization::{Caller, authorize_branch_access, load_caller},
    database_id::LoanId,
    loan::{
        Loan, LoanState, LoanStatus, LoanView, activate_loan, amortization::first_day_of_next_month,
        get_loan, mark_loan_defaulted, reject_loan,
    },
    transaction::{
        NewTransaction, TransactionStatus, TransactionType, disbursement_reference,
        record_transaction,
    },
};

/// The status a manager or admin is moving a loan to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Approve and immediately disburse a pending loan.
    Approved,
    /// Turn down a pending loan.
    Rejected,
    /// Write off an active loan.
    Defaulted,
}

/// The body of an approval request.
#[derive(Debug, Clone, Deserialize)]
pub struct DecisionRequest {
    pub status: Decision,
    /// Required when rejecting.
    pub rejection_reason: Option<String>,
}

/// Apply a manager's or admin's `request` to loan `loan_id`.
///
/// The caller is checked against the loan's branch before anything else happens.
///
/// Approval disburses the principal into the borrower's active checking account, records the
/// disbursement in the ledger and makes the loan active with its first payment due on the first
/// day of next month. All of this happens in one immediate database transaction, so a failure
/// leaves the loan pending and the account untouched.
///
/// # Errors
/// Returns a:
/// - [Error::NotFound] if the loan does not exist,
/// - [Error::Forbidden] if the caller may not act on the loan's branch,
/// - [Error::LoanNotPending] if approving or rejecting a loan that is not pending,
/// - [Error::LoanNotPayable] if defaulting a loan that is not active,
/// - [Error::Validation] if a rejection has no reason or the borrower has no checking account,
/// - [Error::SqlError] if any of the writes fail.
pub fn decide_loan(
    loan_id: LoanId,
    caller: &Caller,
    request: DecisionRequest,
    today: Date,
    connection: &mut Connection,
) -> Result<Loan, Error> {
    let tx = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;

    match apply_decision(loan_id, caller, request, today, &tx) {
        Ok(loan) => {
            tx.commit()?;
            tracing::info!(
                "Loan {loan_id} is now {} by decision of user {}",
                loan.status,
                caller.user_id
            );

            Ok(loan)
        }
        Err(error) => {
            tracing::warn!(
                "Rolled back decision by user {} on loan {loan_id}: {error}",
                caller.user_id
            );

            Err(error)
        }
    }
}

fn apply_decision(
    loan_id: LoanId,
    caller: &Caller,
    request: DecisionRequest,
    today: Date,
    tx: &SqlTransaction,
) -> Result<Loan, Error> {
    let loan = get_loan(loan_id, tx)?;

    authorize_branch_access(caller, loan.branch_id)?;

    match request.status {
        Decision::Approved => {
            if !loan.status.can_transition_to(LoanStatus::Active) {
                return Err(Error::LoanNotPending(loan.status));
            }

            disburse(&loan, caller.user_id, today, tx)
        }
        Decision::Rejected => {
            if !loan.status.can_transition_to(LoanStatus::Rejected) {
                return Err(Error::LoanNotPending(loan.status));
            }

            let reason = request
                .rejection_reason
                .as_deref()
                .map(str::trim)
                .filter(|reason| !reason.is_empty())
                .ok_or_else(|| {
                    Error::validation("rejection_reason", "a reason is required to reject a loan")
                })?;

            let loan = reject_loan(&loan, caller.user_id, reason, tx)?;
            record_audit_event(
                AuditEvent {
                    user_id: caller.user_id,
                    action: AuditAction::LoanRejected,
                    entity: "loan",
                    entity_id: loan.id,
                    details: json!({"reason": reason}),
                },
                tx,
            )?;

            Ok(loan)
        }
        Decision::Defaulted => {
            if !loan.status.can_transition_to(LoanStatus::Defaulted) {
                return Err(Error::LoanNotPayable(loan.status));
            }

            let loan = mark_loan_defaulted(&loan, caller.user_id, tx)?;
            record_audit_event(
                AuditEvent {
                    user_id: caller.user_id,
                    action: AuditAction::LoanDefaulted,
                    entity: "loan",
                    entity_id: loan.id,
                    details: json!({
                        "payments_made": loan.payments_made,
                        "total_paid": loan.total_paid.to_string(),
                    }),
                },
                tx,
            )?;

            Ok(loan)
        }
    }
}

fn disburse(
    loan: &Loan,
    approver: UserID,
    today: Date,
    tx: &SqlTransaction,
) -> Result<Loan, Error> {
    let account = get_active_checking_account(loan.borrower_id, tx)?.ok_or_else(|| {
        Error::validation(
            "account",
            "the borrower has no active checking account to disburse the loan into",
        )
    })?;

    let transaction = record_transaction(
        NewTransaction {
            reference: disbursement_reference(loan.id),
            from_account_id: None,
            to_account_id: Some(account.id),
            amount: loan.amount,
            transaction_type: TransactionType::LoanDisbursement,
            status: TransactionStatus::Completed,
            description: format!("Disbursement of loan {}", loan.id),
            metadata: json!({"loan_id": loan.id}),
        },
        tx,
    )?;

    let new_balance = credit_account(account.id, loan.amount, tx)?;

    let first_payment_date = first_day_of_next_month(today)
        .ok_or_else(|| Error::validation("approval_date", "the first payment date is out of range"))?;
    let loan = activate_loan(loan, approver, today, first_payment_date, tx)?;

    for action in [AuditAction::LoanApproved, AuditAction::LoanDisbursed] {
        record_audit_event(
            AuditEvent {
                user_id: approver,
                action,
                entity: "loan",
                entity_id: loan.id,
                details: json!({
                    "account_id": account.id,
                    "amount": loan.amount.to_string(),
                    "reference": transaction.reference,
                }),
            },
            tx,
        )?;
    }

    tracing::info!(
        "Disbursing {} for loan {} into account {} ({}), new balance {new_balance}",
        loan.amount,
        loan.id,
        account.id,
        transaction.reference
    );

    Ok(loan)
}

/// A route handler for a branch manager, or an admin, to approve or reject a pending loan.
pub async fn branch_approval_endpoint(
    State(state): State<LoanState>,
    Extension(user_id): Extension<UserID>,
    Path(loan_id): Path<LoanId>,
    body: Result<Json<DecisionRequest>, JsonRejection>,
) -> Result<Json<LoanView>, Error> {
    let Json(request) = body?;
    if request.status == Decision::Defaulted {
        return Err(Error::validation(
            "status",
            "a branch approval must either approve or reject the loan",
        ));
    }

    decide(state, user_id, loan_id, request)
}

/// A route handler for staff to set the status of a loan, including marking it as defaulted.
pub async fn update_status_endpoint(
    State(state): State<LoanState>,
    Extension(user_id): Extension<UserID>,
    Path(loan_id): Path<LoanId>,
    body: Result<Json<DecisionRequest>, JsonRejection>,
) -> Result<Json<LoanView>, Error> {
    let Json(request) = body?;
    decide(state, user_id, loan_id, request)
}

fn decide(
    state: LoanState,
    user_id: UserID,
    loan_id: LoanId,
    request: DecisionRequest,
) -> Result<Json<LoanView>, Error> {
    let today = state.today()?;
    let mut connection = state.lock_connection()?;

    let caller = load_caller(user_id, &connection)?;
    let loan = decide_loan(loan_id, &caller, request, today, &mut connection)?;

    Ok(Json(LoanView::new(loan, today)))
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use time::macros::date;

    use crate::{
        Error,
        account::get_account,
        audit::get_audit_actions,
        auth::Role,
        authorization::load_caller,
        loan::{LoanStatus, get_loan},
        test_utils::{
            fail_updates_to, get_test_connection, seed_active_loan, seed_branch,
            seed_checking_account, seed_loan, seed_manager, seed_user,
        },
        transaction::{TransactionType, get_transactions_for_loan},
    };

    use super::{Decision, DecisionRequest, decide_loan};

    fn approve() -> DecisionRequest {
        DecisionRequest {
            status: Decision::Approved,
            rejection_reason: None,
        }
    }

    fn reject(reason: Option<&str>) -> DecisionRequest {
        DecisionRequest {
            status: Decision::Rejected,
            rejection_reason: reason.map(str::to_owned),
        }
    }

    #[test]
    fn approval_disburses_principal() {
        let mut conn = get_test_connection();
        let branch = seed_branch(&conn, "Downtown");
        let manager = seed_manager(&conn, "manager@bank.test", branch.id);
        let borrower = seed_user(&conn, "borrower@bank.test", Role::Customer, Some(branch.id));
        let account = seed_checking_account(&conn, borrower.id, dec!(250));
        let loan = seed_loan(&conn, borrower.id, branch.id, dec!(12000));
        let caller = load_caller(manager.id, &conn).unwrap();

        let got = decide_loan(loan.id, &caller, approve(), date!(2025 - 01 - 15), &mut conn)
            .unwrap();

        assert_eq!(got.status, LoanStatus::Active);
        assert_eq!(got.reviewed_by, Some(manager.id));
        assert_eq!(got.approval_date, Some(date!(2025 - 01 - 15)));
        assert_eq!(got.first_payment_date, Some(date!(2025 - 02 - 01)));
        assert_eq!(get_loan(loan.id, &conn).unwrap(), got);
        assert_eq!(get_account(account.id, &conn).unwrap().balance, dec!(12250));

        let transactions = get_transactions_for_loan(loan.id, &conn).unwrap();
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].transaction_type, TransactionType::LoanDisbursement);
        assert_eq!(transactions[0].to_account_id, Some(account.id));
        assert_eq!(transactions[0].amount, dec!(12000));
        assert_eq!(transactions[0].reference, format!("LN{:06}-D", loan.id));
        assert_eq!(
            get_audit_actions("loan", loan.id, &conn).unwrap(),
            vec!["loan_approved", "loan_disbursed"]
        );
    }

    #[test]
    fn approval_in_december_is_due_in_january() {
        let mut conn = get_test_connection();
        let branch = seed_branch(&conn, "Downtown");
        let admin = seed_user(&conn, "admin@bank.test", Role::Admin, None);
        let borrower = seed_user(&conn, "borrower@bank.test", Role::Customer, Some(branch.id));
        seed_checking_account(&conn, borrower.id, dec!(0));
        let loan = seed_loan(&conn, borrower.id, branch.id, dec!(5000));
        let caller = load_caller(admin.id, &conn).unwrap();

        let got = decide_loan(loan.id, &caller, approve(), date!(2025 - 12 - 31), &mut conn)
            .unwrap();

        assert_eq!(got.first_payment_date, Some(date!(2026 - 01 - 01)));
    }

    #[test]
    fn manager_of_other_branch_is_forbidden() {
        let mut conn = get_test_connection();
        let downtown = seed_branch(&conn, "Downtown");
        let uptown = seed_branch(&conn, "Uptown");
        let uptown_manager = seed_manager(&conn, "manager@bank.test", uptown.id);
        let admin = seed_user(&conn, "admin@bank.test", Role::Admin, None);
        let borrower = seed_user(&conn, "borrower@bank.test", Role::Customer, Some(downtown.id));
        let account = seed_checking_account(&conn, borrower.id, dec!(250));
        let loan = seed_loan(&conn, borrower.id, downtown.id, dec!(12000));

        let manager = load_caller(uptown_manager.id, &conn).unwrap();
        let result = decide_loan(loan.id, &manager, approve(), date!(2025 - 01 - 15), &mut conn);

        assert_eq!(result, Err(Error::Forbidden));
        assert_eq!(get_loan(loan.id, &conn).unwrap(), loan);
        assert_eq!(get_account(account.id, &conn).unwrap().balance, dec!(250));
        assert!(get_transactions_for_loan(loan.id, &conn).unwrap().is_empty());

        let admin = load_caller(admin.id, &conn).unwrap();
        let got = decide_loan(loan.id, &admin, approve(), date!(2025 - 01 - 15), &mut conn);

        assert_eq!(got.map(|loan| loan.status), Ok(LoanStatus::Active));
    }

    #[test]
    fn customer_cannot_decide() {
        let mut conn = get_test_connection();
        let branch = seed_branch(&conn, "Downtown");
        let borrower = seed_user(&conn, "borrower@bank.test", Role::Customer, Some(branch.id));
        let loan = seed_loan(&conn, borrower.id, branch.id, dec!(12000));
        let caller = load_caller(borrower.id, &conn).unwrap();

        let result = decide_loan(loan.id, &caller, approve(), date!(2025 - 01 - 15), &mut conn);

        assert_eq!(result, Err(Error::Forbidden));
    }

    #[test]
    fn approval_without_checking_account_is_invalid() {
        let mut conn = get_test_connection();
        let branch = seed_branch(&conn, "Downtown");
        let manager = seed_manager(&conn, "manager@bank.test", branch.id);
        let borrower = seed_user(&conn, "borrower@bank.test", Role::Customer, Some(branch.id));
        let loan = seed_loan(&conn, borrower.id, branch.id, dec!(12000));
        let caller = load_caller(manager.id, &conn).unwrap();

        let result = decide_loan(loan.id, &caller, approve(), date!(2025 - 01 - 15), &mut conn);

        assert!(matches!(result, Err(Error::Validation { field: "account", .. })));
        assert_eq!(get_loan(loan.id, &conn).unwrap().status, LoanStatus::Pending);
    }

    #[test]
    fn failure_during_disbursement_rolls_back() {
        let mut conn = get_test_connection();
        let branch = seed_branch(&conn, "Downtown");
        let manager = seed_manager(&conn, "manager@bank.test", branch.id);
        let borrower = seed_user(&conn, "borrower@bank.test", Role::Customer, Some(branch.id));
        let account = seed_checking_account(&conn, borrower.id, dec!(250));
        let loan = seed_loan(&conn, borrower.id, branch.id, dec!(12000));
        let caller = load_caller(manager.id, &conn).unwrap();
        fail_updates_to(&conn, "loan");

        let result = decide_loan(loan.id, &caller, approve(), date!(2025 - 01 - 15), &mut conn);

        assert!(matches!(result, Err(Error::SqlError(_))));
        assert_eq!(get_loan(loan.id, &conn).unwrap().status, LoanStatus::Pending);
        assert_eq!(get_account(account.id, &conn).unwrap().balance, dec!(250));
        assert!(get_transactions_for_loan(loan.id, &conn).unwrap().is_empty());
        assert!(get_audit_actions("loan", loan.id, &conn).unwrap().is_empty());
    }

    #[test]
    fn rejection_requires_reason() {
        let mut conn = get_test_connection();
        let branch = seed_branch(&conn, "Downtown");
        let manager = seed_manager(&conn, "manager@bank.test", branch.id);
        let borrower = seed_user(&conn, "borrower@bank.test", Role::Customer, Some(branch.id));
        let loan = seed_loan(&conn, borrower.id, branch.id, dec!(12000));
        let caller = load_caller(manager.id, &conn).unwrap();
        let today = date!(2025 - 01 - 15);

        let missing = decide_loan(loan.id, &caller, reject(None), today, &mut conn);
        let blank = decide_loan(loan.id, &caller, reject(Some("   ")), today, &mut conn);
        let got = decide_loan(loan.id, &caller, reject(Some("Income too low")), today, &mut conn)
            .unwrap();

        assert!(matches!(missing, Err(Error::Validation { field: "rejection_reason", .. })));
        assert!(matches!(blank, Err(Error::Validation { field: "rejection_reason", .. })));
        assert_eq!(got.status, LoanStatus::Rejected);
        assert_eq!(got.rejection_reason.as_deref(), Some("Income too low"));
        assert_eq!(got.reviewed_by, Some(manager.id));
        assert_eq!(get_audit_actions("loan", loan.id, &conn).unwrap(), vec!["loan_rejected"]);
    }

    #[test]
    fn decided_loan_cannot_be_approved_again() {
        let mut conn = get_test_connection();
        let branch = seed_branch(&conn, "Downtown");
        let manager = seed_manager(&conn, "manager@bank.test", branch.id);
        let borrower = seed_user(&conn, "borrower@bank.test", Role::Customer, Some(branch.id));
        seed_checking_account(&conn, borrower.id, dec!(250));
        let loan = seed_active_loan(&conn, borrower.id, branch.id, dec!(12000));
        let caller = load_caller(manager.id, &conn).unwrap();

        let result = decide_loan(loan.id, &caller, approve(), date!(2025 - 01 - 15), &mut conn);

        assert_eq!(result, Err(Error::LoanNotPending(LoanStatus::Active)));
    }

    #[test]
    fn active_loan_can_be_defaulted() {
        let mut conn = get_test_connection();
        let branch = seed_branch(&conn, "Downtown");
        let admin = seed_user(&conn, "admin@bank.test", Role::Admin, None);
        let borrower = seed_user(&conn, "borrower@bank.test", Role::Customer, Some(branch.id));
        seed_checking_account(&conn, borrower.id, dec!(250));
        let pending = seed_loan(&conn, borrower.id, branch.id, dec!(5000));
        let active = seed_active_loan(&conn, borrower.id, branch.id, dec!(12000));
        let caller = load_caller(admin.id, &conn).unwrap();
        let default = || DecisionRequest {
            status: Decision::Defaulted,
            rejection_reason: None,
        };

        let got = decide_loan(active.id, &caller, default(), date!(2025 - 06 - 15), &mut conn);
        let result = decide_loan(pending.id, &caller, default(), date!(2025 - 06 - 15), &mut conn);

        assert_eq!(got.map(|loan| loan.status), Ok(LoanStatus::Defaulted));
        assert_eq!(result, Err(Error::LoanNotPayable(LoanStatus::Pending)));
    }
}

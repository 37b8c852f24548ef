//! Endpoints for listing loans.

use axum::{
    Extension, Json,
    extract::{Query, State, rejection::QueryRejection},
};
use serde::{Deserialize, Serialize};

use crate::{
    Error,
    auth::{Role, UserID},
    authorization::{Caller, authorize_branch_access, load_caller, require_staff},
    database_id::BranchId,
    loan::{LoanFilter, LoanState, LoanStatus, LoanType, LoanView, get_loans_for_borrower, query_loans},
    pagination::{PageInfo, PageRequest},
};

/// A route handler that returns the logged in user's own loans, newest first.
pub async fn get_loans_endpoint(
    State(state): State<LoanState>,
    Extension(user_id): Extension<UserID>,
) -> Result<Json<Vec<LoanView>>, Error> {
    let today = state.today()?;
    let connection = state.lock_connection()?;

    let loans = get_loans_for_borrower(user_id, &connection)?
        .into_iter()
        .map(|loan| LoanView::new(loan, today))
        .collect();

    Ok(Json(loans))
}

/// The query parameters for listing branch loans.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct BranchLoansQuery {
    pub status: Option<LoanStatus>,
    pub loan_type: Option<LoanType>,
    /// Only admins may choose the branch, managers always see their own.
    pub branch_id: Option<BranchId>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

/// A page of branch loans.
#[derive(Debug, Clone, Serialize)]
pub struct BranchLoans {
    pub loans: Vec<LoanView>,
    #[serde(flatten)]
    pub page: PageInfo,
}

/// Work out which branch a staff member's listing covers.
fn resolve_branch_filter(
    caller: &Caller,
    requested_branch: Option<BranchId>,
) -> Result<Option<BranchId>, Error> {
    require_staff(caller)?;

    match (caller.role, requested_branch) {
        (Role::Admin, branch_id) => Ok(branch_id),
        (Role::Manager, Some(branch_id)) => {
            authorize_branch_access(caller, branch_id)?;
            Ok(Some(branch_id))
        }
        (Role::Manager, None) => Ok(caller.managed_branch),
        (Role::Customer, _) => Err(Error::Forbidden),
    }
}

/// A route handler for managers and admins to list the loans of a branch.
///
/// Managers only see the loans of the branch they manage. Admins see every branch unless they
/// filter by `branch_id`.
pub async fn get_branch_loans_endpoint(
    State(state): State<LoanState>,
    Extension(user_id): Extension<UserID>,
    query: Result<Query<BranchLoansQuery>, QueryRejection>,
) -> Result<Json<BranchLoans>, Error> {
    let Query(query) = query?;
    let today = state.today()?;
    let page = PageRequest::resolve(query.page, query.per_page, &state.pagination_config);
    let connection = state.lock_connection()?;

    let caller = load_caller(user_id, &connection)?;
    let filter = LoanFilter {
        branch_id: resolve_branch_filter(&caller, query.branch_id)?,
        status: query.status,
        loan_type: query.loan_type,
    };

    let (loans, total) = query_loans(filter, page, &connection)?;

    Ok(Json(BranchLoans {
        loans: loans
            .into_iter()
            .map(|loan| LoanView::new(loan, today))
            .collect(),
        page: PageInfo::new(page, total),
    }))
}

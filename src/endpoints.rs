//! The API endpoints URIs.
//!
//! For endpoints that take a parameter, e.g., '/api/loans/{loan_id}', use [format_endpoint].

/// The route to check that the server is up.
pub const HEALTH: &str = "/api/health";
/// The route for logging in a user.
pub const LOG_IN_API: &str = "/api/log_in";
/// The route for the client to log out the current user.
pub const LOG_OUT: &str = "/api/log_out";
/// The route for listing the current user's accounts.
pub const ACCOUNTS: &str = "/api/accounts";
/// The route to apply for a loan (POST) or list the current user's loans (GET).
pub const LOANS: &str = "/api/loans";
/// The route to calculate loan repayments without saving anything.
pub const LOAN_CALCULATOR: &str = "/api/loans/calculate";
/// The route for staff to list the loans of a branch.
pub const BRANCH_LOANS: &str = "/api/loans/branch/all";
/// The route to access a single loan.
pub const LOAN: &str = "/api/loans/{loan_id}";
/// The route to make a payment against a loan.
pub const LOAN_PAYMENT: &str = "/api/loans/{loan_id}/payment";
/// The route for a branch manager to approve or reject a loan.
pub const LOAN_BRANCH_APPROVAL: &str = "/api/loans/{loan_id}/branch-approval";
/// The route for an admin to approve or reject a loan.
pub const LOAN_STATUS: &str = "/api/loans/{loan_id}/status";
/// The route for the amortization schedule of a loan.
pub const LOAN_SCHEDULE: &str = "/api/loans/{loan_id}/schedule";
/// The route for the ledger transactions of a loan.
pub const LOAN_TRANSACTIONS: &str = "/api/loans/{loan_id}/transactions";

/// Replace the parameter in `endpoint_path` with `id`.
///
/// A parameter is a string that starts with a left brace, followed by
/// lowercase letters or underscores, and ends with a right brace.
/// For example, in the endpoint path '/users/{user_id}', '{user_id}' is the parameter.
///
/// This function assumes that an endpoint path only contains ASCII characters
/// and a single parameter.
///
/// If no parameter is found in `endpoint_path`, the function returns the
/// the original `endpoint_path`.
pub fn format_endpoint(endpoint_path: &str, id: i64) -> String {
    let mut param_start = None;
    let mut param_end = None;

    for (i, c) in endpoint_path.chars().enumerate() {
        if c == '{' {
            param_start = Some(i);
        } else if param_start.is_some() && c == '}' {
            param_end = Some(i + 1);
            break;
        }
    }

    let param_start = match param_start {
        Some(start) => start,
        None => return endpoint_path.to_string(),
    };

    let param_end = param_end.unwrap_or(endpoint_path.len());

    format!(
        "{}{}{}",
        &endpoint_path[..param_start],
        id,
        &endpoint_path[param_end..]
    )
}

//! Application router configuration with protected and unprotected route definitions.

use axum::{
    Json, Router, middleware,
    routing::{get, post, put},
};
use serde_json::{Value, json};

use crate::{
    AppState, Error,
    account::get_accounts_endpoint,
    auth::{auth_guard, get_log_out, post_log_in},
    endpoints,
    loan::{
        branch_approval_endpoint, calculate_loan_endpoint, create_loan_endpoint,
        get_branch_loans_endpoint, get_loan_endpoint, get_loan_schedule_endpoint,
        get_loan_transactions_endpoint, get_loans_endpoint, make_payment_endpoint,
        update_status_endpoint,
    },
};

/// Return a router with all the app's routes.
pub fn build_router(state: AppState) -> Router {
    let unprotected_routes = Router::new()
        .route(endpoints::HEALTH, get(get_health))
        .route(endpoints::LOG_IN_API, post(post_log_in))
        .route(endpoints::LOG_OUT, get(get_log_out));

    let protected_routes = Router::new()
        .route(endpoints::ACCOUNTS, get(get_accounts_endpoint))
        .route(
            endpoints::LOANS,
            get(get_loans_endpoint).post(create_loan_endpoint),
        )
        .route(endpoints::LOAN_CALCULATOR, post(calculate_loan_endpoint))
        .route(endpoints::BRANCH_LOANS, get(get_branch_loans_endpoint))
        .route(endpoints::LOAN, get(get_loan_endpoint))
        .route(endpoints::LOAN_PAYMENT, post(make_payment_endpoint))
        .route(
            endpoints::LOAN_BRANCH_APPROVAL,
            put(branch_approval_endpoint),
        )
        .route(endpoints::LOAN_STATUS, put(update_status_endpoint))
        .route(endpoints::LOAN_SCHEDULE, get(get_loan_schedule_endpoint))
        .route(
            endpoints::LOAN_TRANSACTIONS,
            get(get_loan_transactions_endpoint),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_guard));

    protected_routes
        .merge(unprotected_routes)
        .fallback(get_404_not_found)
        .with_state(state)
}

/// Report that the server is up.
async fn get_health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

async fn get_404_not_found() -> Error {
    Error::NotFound("endpoint")
}

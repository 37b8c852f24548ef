//! Loan Ledger is the loan module of a retail bank.
//!
//! Customers apply for loans, branch managers and admins approve or reject them, approved loans
//! are disbursed into the borrower's checking account, and the borrower repays them from that
//! same account. Every movement of money is written to a ledger and every decision to an audit
//! log. The library provides a JSON REST API on top of a SQLite database.

#![warn(missing_docs)]

use std::{net::SocketAddr, time::Duration};

use axum_server::Handle;
use tokio::signal;

mod account;
mod app_state;
mod audit;
mod auth;
mod authorization;
mod branch;
mod database_id;
mod db;
mod endpoints;
mod error;
mod loan;
mod logging;
mod pagination;
mod routing;
mod timezone;
mod transaction;

#[cfg(test)]
mod test_utils;

pub use account::{Account, AccountType, NewAccount, close_account, create_account, get_account};
pub use app_state::AppState;
pub use auth::{
    NewUser, PasswordHash, Role, User, UserID, ValidatedPassword, create_user, set_user_branch,
};
pub use branch::{Branch, assign_branch_manager, create_branch, get_branch};
pub use database_id::{AccountId, BranchId};
pub use db::initialize as initialize_db;
pub use error::Error;
pub use logging::{LOG_BODY_LENGTH_LIMIT, logging_middleware};
pub use pagination::PaginationConfig;
pub use routing::build_router;

/// An async task that waits for either the ctrl+c or terminate signal, whichever comes first, and
/// then signals the server to shut down gracefully.
///
/// `handle` is a handle to an Axum `Server`.
pub async fn graceful_shutdown(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {error}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::error!("Failed to install terminate signal handler: {error}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
    }
}

use std::sync::{Arc, Mutex, MutexGuard};

use axum::extract::FromRef;
use rusqlite::Connection;
use time::Date;

use crate::{AppState, Error, pagination::PaginationConfig, timezone::local_today};

/// The state needed by the loan endpoints.
#[derive(Debug, Clone)]
pub struct LoanState {
    /// The database connection for managing loans, accounts and the ledger.
    pub db_connection: Arc<Mutex<Connection>>,
    /// The local timezone as a canonical timezone name, e.g. "Pacific/Auckland".
    pub local_timezone: String,
    /// The config that controls how to display pages of loans.
    pub pagination_config: PaginationConfig,
}

impl FromRef<AppState> for LoanState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            local_timezone: state.local_timezone.clone(),
            pagination_config: state.pagination_config.clone(),
        }
    }
}

impl LoanState {
    /// Today's date in the bank's timezone.
    pub fn today(&self) -> Result<Date, Error> {
        local_today(&self.local_timezone)
    }

    /// Lock the shared database connection.
    ///
    /// Holding the guard serialises every request that moves money.
    pub fn lock_connection(&self) -> Result<MutexGuard<'_, Connection>, Error> {
        self.db_connection.lock().map_err(|error| {
            tracing::error!("Could not acquire database lock: {error}");
            Error::DatabaseLockError
        })
    }
}

//! Defines the endpoint for listing the current user's accounts.
use std::sync::{Arc, Mutex};

use axum::{
    Extension, Json,
    extract::{FromRef, State},
};
use rusqlite::Connection;

use crate::{
    AppState, Error,
    account::{Account, get_accounts_for_owner},
    auth::UserID,
};

/// The state needed to list accounts.
#[derive(Debug, Clone)]
pub struct AccountsState {
    /// The database connection for managing accounts.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for AccountsState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// A route handler that returns the logged in user's accounts, oldest first.
pub async fn get_accounts_endpoint(
    State(state): State<AccountsState>,
    Extension(user_id): Extension<UserID>,
) -> Result<Json<Vec<Account>>, Error> {
    let connection = state.db_connection.lock().map_err(|error| {
        tracing::error!("Could not acquire database lock: {error}");
        Error::DatabaseLockError
    })?;

    get_accounts_for_owner(user_id, &connection).map(Json)
}

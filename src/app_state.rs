//! Implements a struct that holds the state of the REST server.

use std::sync::{Arc, Mutex};

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;
use rusqlite::Connection;
use sha2::{Digest, Sha512};
use time::Duration;

use crate::{
    Error, auth::DEFAULT_COOKIE_DURATION, db::initialize, pagination::PaginationConfig,
    timezone::get_local_offset,
};

/// The state of the REST server.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The key to be used for signing and encrypting private cookies.
    pub cookie_key: Key,

    /// The duration for which cookies used for authentication are valid.
    pub cookie_duration: Duration,

    /// The bank's timezone as a canonical timezone name, e.g. "Pacific/Auckland".
    ///
    /// Due dates and overdue checks use the current date in this timezone.
    pub local_timezone: String,

    /// The config that controls how to page branch loan listings.
    pub pagination_config: PaginationConfig,

    /// The database connection.
    ///
    /// Every request that moves money holds this lock for the whole of its database transaction.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl AppState {
    /// Create a new [AppState] with a SQLite database connection.
    ///
    /// This function will initialize the database by adding the tables for the domain models.
    ///
    /// # Errors
    /// Returns an:
    /// - [Error::InvalidTimezoneError] if `local_timezone` is not a valid, canonical timezone name,
    /// - [Error::SqlError] if the database cannot be initialized.
    pub fn new(
        db_connection: Connection,
        cookie_secret: &str,
        local_timezone: &str,
        pagination_config: PaginationConfig,
    ) -> Result<Self, Error> {
        if get_local_offset(local_timezone).is_none() {
            return Err(Error::InvalidTimezoneError(local_timezone.to_owned()));
        }

        initialize(&db_connection)?;

        Ok(Self {
            cookie_key: create_cookie_key(cookie_secret),
            cookie_duration: DEFAULT_COOKIE_DURATION,
            local_timezone: local_timezone.to_owned(),
            pagination_config,
            db_connection: Arc::new(Mutex::new(db_connection)),
        })
    }
}

// this impl tells `PrivateCookieJar` how to access the key from our state
impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}

/// Create a signing key for cookies from a `secret`s string.
pub fn create_cookie_key(secret: &str) -> Key {
    let hash = Sha512::digest(secret);

    Key::from(&hash)
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;

    use crate::{Error, pagination::PaginationConfig};

    use super::AppState;

    #[test]
    fn new_state_initializes_database() {
        let state = AppState::new(
            Connection::open_in_memory().unwrap(),
            "secret",
            "Pacific/Auckland",
            PaginationConfig::default(),
        )
        .unwrap();

        let connection = state.db_connection.lock().unwrap();
        let loan_table_count: i64 = connection
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'loan'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(loan_table_count, 1);
    }

    #[test]
    fn rejects_unknown_timezone() {
        let result = AppState::new(
            Connection::open_in_memory().unwrap(),
            "secret",
            "Mars/Olympus_Mons",
            PaginationConfig::default(),
        );

        assert!(matches!(result, Err(Error::InvalidTimezoneError(_))));
    }
}

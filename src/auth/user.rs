//! Code for creating the user table and fetching users from the database.

use std::{fmt::Display, str::FromStr};

use rusqlite::{Connection, Row, params};
use serde::{Deserialize, Serialize};

use crate::{
    Error,
    auth::PasswordHash,
    database_id::BranchId,
    db::{UnknownVariant, impl_text_column},
};

/// A newtype wrapper for integer user IDs.
///
/// This helps disambiguate user IDs from other types of IDs, leading to better compile time
/// errors, and more flexible generics that can have distinct implementations for multiple ID types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct UserID(i64);

impl UserID {
    /// Create a new user ID.
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Cast the user ID to a 64 bit integer.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl Display for UserID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// What a user is allowed to do in the bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A customer who holds accounts and borrows money.
    Customer,
    /// Staff who manage the loans of the branch they are assigned to.
    Manager,
    /// Staff with access to every branch.
    Admin,
}

impl Role {
    /// The text stored in the database for this role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Manager => "manager",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Role::Customer),
            "manager" => Ok(Role::Manager),
            "admin" => Ok(Role::Admin),
            other => Err(UnknownVariant {
                kind: "role",
                value: other.to_owned(),
            }),
        }
    }
}

impl_text_column!(Role);

/// A user of the application.
///
/// The caller should ensure that `id` is unique.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    /// The user's ID in the application database.
    pub id: UserID,
    /// The address the user logs in with.
    pub email: String,
    /// The user's display name.
    pub name: String,
    /// What the user is allowed to do.
    pub role: Role,
    /// The branch the user banks with, if they have been assigned one.
    pub branch_id: Option<BranchId>,
    /// The user's password hash.
    #[serde(skip)]
    pub password_hash: PasswordHash,
}

/// The details needed to create a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    /// The address the user logs in with.
    pub email: String,
    /// The user's display name.
    pub name: String,
    /// What the user is allowed to do.
    pub role: Role,
    /// The branch the user banks with.
    pub branch_id: Option<BranchId>,
    /// The user's password hash.
    pub password_hash: PasswordHash,
}

/// Create the user table.
///
/// # Errors
///
/// This function will return an error if the SQL query failed.
pub fn create_user_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS user (
                id INTEGER PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                role TEXT NOT NULL CHECK (role IN ('customer', 'manager', 'admin')),
                branch_id INTEGER REFERENCES branch(id) ON UPDATE CASCADE ON DELETE SET NULL,
                password TEXT NOT NULL
                )",
        (),
    )?;

    Ok(())
}

fn map_row_to_user(row: &Row) -> Result<User, rusqlite::Error> {
    let raw_password_hash: String = row.get(5)?;

    Ok(User {
        id: UserID::new(row.get(0)?),
        email: row.get(1)?,
        name: row.get(2)?,
        role: row.get(3)?,
        branch_id: row.get(4)?,
        password_hash: PasswordHash::new_unchecked(&raw_password_hash),
    })
}

/// Create and insert a new user into the database.
///
/// # Errors
///
/// Returns a:
/// - [Error::DuplicateEmail] if the email is already registered,
/// - [Error::SqlError] if some other SQL related error occurred.
pub fn create_user(new_user: NewUser, connection: &Connection) -> Result<User, Error> {
    connection.execute(
        "INSERT INTO user (email, name, role, branch_id, password) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            new_user.email,
            new_user.name,
            new_user.role,
            new_user.branch_id,
            new_user.password_hash.as_ref()
        ],
    )?;

    let id = UserID::new(connection.last_insert_rowid());

    Ok(User {
        id,
        email: new_user.email,
        name: new_user.name,
        role: new_user.role,
        branch_id: new_user.branch_id,
        password_hash: new_user.password_hash,
    })
}

/// Get the user from the database with an ID equal to `user_id`.
///
/// # Errors
///
/// This function will return an error if:
/// - `user_id` does not belong to a registered user.
/// - there was an error trying to access the store.
pub fn get_user_by_id(user_id: UserID, connection: &Connection) -> Result<User, Error> {
    connection
        .prepare(
            "SELECT id, email, name, role, branch_id, password FROM user WHERE id = :id",
        )?
        .query_row(&[(":id", &user_id.as_i64())], map_row_to_user)
        .map_err(|error| match error {
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound("user"),
            error => error.into(),
        })
}

/// Get the user registered with `email`.
///
/// # Errors
///
/// Returns [Error::NotFound] if nobody has registered with `email`.
pub fn get_user_by_email(email: &str, connection: &Connection) -> Result<User, Error> {
    connection
        .prepare(
            "SELECT id, email, name, role, branch_id, password FROM user WHERE email = :email",
        )?
        .query_row(&[(":email", &email)], map_row_to_user)
        .map_err(|error| match error {
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound("user"),
            error => error.into(),
        })
}

/// Assign `user_id` to bank with `branch_id`.
///
/// # Errors
///
/// Returns [Error::NotFound] if the user does not exist.
pub fn set_user_branch(
    user_id: UserID,
    branch_id: Option<BranchId>,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "UPDATE user SET branch_id = ?1 WHERE id = ?2",
        params![branch_id, user_id.as_i64()],
    )?;

    if rows_affected == 0 {
        return Err(Error::NotFound("user"));
    }

    Ok(())
}

#[cfg(test)]
mod user_tests {
    use rusqlite::Connection;

    use crate::{
        Error,
        auth::{PasswordHash, Role},
        db::initialize,
    };

    use super::{NewUser, UserID, create_user, get_user_by_email, get_user_by_id, set_user_branch};

    fn get_db_connection() -> Connection {
        let conn =
            Connection::open_in_memory().expect("Could not create in-memory SQLite database");
        initialize(&conn).expect("Could not initialise database");

        conn
    }

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.to_owned(),
            name: "Test User".to_owned(),
            role: Role::Customer,
            branch_id: None,
            password_hash: PasswordHash::new_unchecked("hunter2"),
        }
    }

    #[test]
    fn insert_user_succeeds() {
        let db_connection = get_db_connection();

        let inserted_user = create_user(new_user("foo@bar.baz"), &db_connection).unwrap();

        assert!(inserted_user.id.as_i64() > 0);
        assert_eq!(inserted_user.role, Role::Customer);
        assert_eq!(inserted_user.password_hash, PasswordHash::new_unchecked("hunter2"));
    }

    #[test]
    fn insert_user_fails_with_duplicate_email() {
        let db_connection = get_db_connection();
        create_user(new_user("foo@bar.baz"), &db_connection).unwrap();

        let result = create_user(new_user("foo@bar.baz"), &db_connection);

        assert_eq!(result, Err(Error::DuplicateEmail));
    }

    #[test]
    fn get_user_fails_with_non_existent_id() {
        let db_connection = get_db_connection();

        let id = UserID::new(42);

        assert_eq!(get_user_by_id(id, &db_connection), Err(Error::NotFound("user")));
    }

    #[test]
    fn get_user_succeeds_with_existing_id() {
        let db_connection = get_db_connection();
        let test_user = create_user(new_user("foo@bar.baz"), &db_connection).unwrap();

        let retrieved_user = get_user_by_id(test_user.id, &db_connection).unwrap();

        assert_eq!(retrieved_user, test_user);
    }

    #[test]
    fn get_user_by_email_succeeds() {
        let db_connection = get_db_connection();
        let test_user = create_user(new_user("foo@bar.baz"), &db_connection).unwrap();

        let retrieved_user = get_user_by_email("foo@bar.baz", &db_connection).unwrap();

        assert_eq!(retrieved_user, test_user);
    }

    #[test]
    fn set_branch_fails_for_missing_user() {
        let db_connection = get_db_connection();

        let result = set_user_branch(UserID::new(99), None, &db_connection);

        assert_eq!(result, Err(Error::NotFound("user")));
    }

    #[test]
    fn role_text_round_trips() {
        for role in [Role::Customer, Role::Manager, Role::Admin] {
            assert_eq!(role.as_str().parse::<Role>(), Ok(role));
        }

        assert!("teller".parse::<Role>().is_err());
    }
}

//! Bank branches and the managers assigned to them.

use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;

use crate::{Error, auth::UserID, database_id::BranchId};

/// A physical branch of the bank.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Branch {
    /// The id for the branch.
    pub id: BranchId,
    /// The branch's name, e.g. "Downtown".
    pub name: String,
    /// The staff member managing the branch, if one has been assigned.
    pub manager_id: Option<UserID>,
}

pub fn create_branch_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS branch (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            manager_id INTEGER UNIQUE REFERENCES user(id) ON UPDATE CASCADE ON DELETE SET NULL
        )",
        (),
    )?;

    Ok(())
}

fn map_row_to_branch(row: &Row) -> Result<Branch, rusqlite::Error> {
    let manager_id: Option<i64> = row.get(2)?;

    Ok(Branch {
        id: row.get(0)?,
        name: row.get(1)?,
        manager_id: manager_id.map(UserID::new),
    })
}

/// Create a branch with no manager.
pub fn create_branch(name: &str, connection: &Connection) -> Result<Branch, Error> {
    connection.execute("INSERT INTO branch (name) VALUES (?1)", params![name])?;

    Ok(Branch {
        id: connection.last_insert_rowid(),
        name: name.to_owned(),
        manager_id: None,
    })
}

/// Retrieve a branch by its `id`.
///
/// # Errors
/// Returns [Error::NotFound] if there is no branch with `id`.
pub fn get_branch(id: BranchId, connection: &Connection) -> Result<Branch, Error> {
    connection
        .query_row(
            "SELECT id, name, manager_id FROM branch WHERE id = ?1",
            params![id],
            map_row_to_branch,
        )
        .map_err(|error| match error {
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound("branch"),
            error => error.into(),
        })
}

/// Make `manager_id` the manager of `branch_id`.
///
/// A user manages at most one branch, so any previous assignment of the same
/// user is cleared in the same transaction.
///
/// # Errors
/// Returns [Error::NotFound] if the branch does not exist.
pub fn assign_branch_manager(
    branch_id: BranchId,
    manager_id: UserID,
    connection: &Connection,
) -> Result<(), Error> {
    let tx = connection.unchecked_transaction()?;

    tx.execute(
        "UPDATE branch SET manager_id = NULL WHERE manager_id = ?1",
        params![manager_id.as_i64()],
    )?;
    let rows_affected = tx.execute(
        "UPDATE branch SET manager_id = ?1 WHERE id = ?2",
        params![manager_id.as_i64(), branch_id],
    )?;

    if rows_affected == 0 {
        return Err(Error::NotFound("branch"));
    }

    tx.commit()?;

    Ok(())
}

/// The branch where `manager_id` is the assigned manager, if any.
pub fn get_managed_branch_id(
    manager_id: UserID,
    connection: &Connection,
) -> Result<Option<BranchId>, Error> {
    connection
        .query_row(
            "SELECT id FROM branch WHERE manager_id = ?1",
            params![manager_id.as_i64()],
            |row| row.get(0),
        )
        .optional()
        .map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use crate::{
        Error,
        auth::{Role, UserID},
        test_utils::{get_test_connection, seed_user},
    };

    use super::{
        assign_branch_manager, create_branch, get_branch, get_managed_branch_id,
    };

    #[test]
    fn can_create_and_get_branch() {
        let conn = get_test_connection();

        let branch = create_branch("Downtown", &conn).unwrap();

        assert_eq!(get_branch(branch.id, &conn).unwrap(), branch);
    }

    #[test]
    fn get_missing_branch_is_not_found() {
        let conn = get_test_connection();

        assert_eq!(get_branch(404, &conn), Err(Error::NotFound("branch")));
    }

    #[test]
    fn assigned_manager_manages_branch() {
        let conn = get_test_connection();
        let branch = create_branch("Downtown", &conn).unwrap();
        let manager = seed_user(&conn, "manager@bank.test", Role::Manager, None);

        assign_branch_manager(branch.id, manager.id, &conn).unwrap();

        assert_eq!(get_managed_branch_id(manager.id, &conn), Ok(Some(branch.id)));
        assert_eq!(get_branch(branch.id, &conn).unwrap().manager_id, Some(manager.id));
    }

    #[test]
    fn reassigning_manager_moves_them() {
        let conn = get_test_connection();
        let downtown = create_branch("Downtown", &conn).unwrap();
        let uptown = create_branch("Uptown", &conn).unwrap();
        let manager = seed_user(&conn, "manager@bank.test", Role::Manager, None);

        assign_branch_manager(downtown.id, manager.id, &conn).unwrap();
        assign_branch_manager(uptown.id, manager.id, &conn).unwrap();

        assert_eq!(get_managed_branch_id(manager.id, &conn), Ok(Some(uptown.id)));
        assert_eq!(get_branch(downtown.id, &conn).unwrap().manager_id, None);
    }

    #[test]
    fn unassigned_user_manages_nothing() {
        let conn = get_test_connection();

        assert_eq!(get_managed_branch_id(UserID::new(1), &conn), Ok(None));
    }

    #[test]
    fn assigning_to_missing_branch_is_not_found() {
        let conn = get_test_connection();
        let manager = seed_user(&conn, "manager@bank.test", Role::Manager, None);

        let result = assign_branch_manager(99, manager.id, &conn);

        assert_eq!(result, Err(Error::NotFound("branch")));
    }
}

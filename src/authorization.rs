//! Decides which branch scoped operations a user may perform.

use rusqlite::Connection;

use crate::{
    Error,
    auth::{Role, UserID, get_user_by_id},
    branch::get_managed_branch_id,
    database_id::BranchId,
};

/// The identity and scope of the user making a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: UserID,
    pub role: Role,
    /// The branch the caller is the assigned manager of. Only ever set for managers.
    pub managed_branch: Option<BranchId>,
}

/// Look up the role and managed branch of `user_id`.
///
/// # Errors
/// Returns [Error::Unauthenticated] if the user no longer exists.
pub fn load_caller(user_id: UserID, connection: &Connection) -> Result<Caller, Error> {
    let user = match get_user_by_id(user_id, connection) {
        Ok(user) => user,
        Err(Error::NotFound(_)) => return Err(Error::Unauthenticated),
        Err(error) => return Err(error),
    };

    let managed_branch = match user.role {
        Role::Manager => get_managed_branch_id(user.id, connection)?,
        Role::Admin | Role::Customer => None,
    };

    Ok(Caller {
        user_id: user.id,
        role: user.role,
        managed_branch,
    })
}

/// Check that `caller` may act on the loans of `branch_id`.
///
/// Admins may act on every branch, managers only on the branch they manage, and customers on none.
///
/// # Errors
/// Returns [Error::Forbidden] if the caller is not allowed.
pub fn authorize_branch_access(caller: &Caller, branch_id: BranchId) -> Result<(), Error> {
    match caller.role {
        Role::Admin => Ok(()),
        Role::Manager if caller.managed_branch == Some(branch_id) => Ok(()),
        Role::Manager | Role::Customer => {
            tracing::warn!(
                "User {} ({}) was refused access to branch {branch_id}",
                caller.user_id,
                caller.role
            );
            Err(Error::Forbidden)
        }
    }
}

/// Check that `caller` may act on branch loans at all, i.e. is an admin or a manager with a branch.
///
/// # Errors
/// Returns [Error::Forbidden] for customers and for managers without a branch.
pub fn require_staff(caller: &Caller) -> Result<(), Error> {
    match (caller.role, caller.managed_branch) {
        (Role::Admin, _) | (Role::Manager, Some(_)) => Ok(()),
        (Role::Manager, None) | (Role::Customer, _) => Err(Error::Forbidden),
    }
}

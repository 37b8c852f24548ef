//! Users, passwords and cookie based sessions.

mod cookie;
mod log_in;
mod middleware;
mod password;
mod token;
mod user;

pub use cookie::{DEFAULT_COOKIE_DURATION, invalidate_auth_cookie, set_auth_cookie};
pub use log_in::{get_log_out, post_log_in};
pub use middleware::auth_guard;
pub use password::{PasswordHash, ValidatedPassword};
pub(super) use token::Token;
pub use user::{
    NewUser, Role, User, UserID, create_user, create_user_table, get_user_by_email,
    get_user_by_id, set_user_branch,
};

#[cfg(test)]
pub(crate) use cookie::COOKIE_TOKEN;

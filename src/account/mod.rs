//! Customer deposit accounts and the balance mutations that loans rely on.

mod core;
mod list_endpoint;

pub use core::{
    Account, AccountType, NewAccount, close_account, create_account, create_account_table,
    credit_account, debit_account, get_account, get_accounts_for_owner,
    get_active_checking_account,
};
pub use list_endpoint::get_accounts_endpoint;

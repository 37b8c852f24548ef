//! Defines the account model and the balance mutations used by money movement.

use std::str::FromStr;

use rusqlite::{Connection, OptionalExtension, Row, Transaction as SqlTransaction, params};
use rust_decimal::Decimal;
use serde::Serialize;
use time::OffsetDateTime;

use crate::{
    Error,
    auth::UserID,
    database_id::AccountId,
    db::{UnknownVariant, get_decimal, impl_text_column, now_utc_seconds},
};

/// The kinds of deposit account the bank offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    /// An everyday account that loans are disbursed into and repaid from.
    Checking,
    /// An interest bearing account.
    Savings,
}

impl AccountType {
    /// The text stored in the database for this account type.
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Checking => "checking",
            AccountType::Savings => "savings",
        }
    }

    fn number_prefix(&self) -> &'static str {
        match self {
            AccountType::Checking => "CHK",
            AccountType::Savings => "SAV",
        }
    }
}

impl FromStr for AccountType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "checking" => Ok(AccountType::Checking),
            "savings" => Ok(AccountType::Savings),
            other => Err(UnknownVariant {
                kind: "account type",
                value: other.to_owned(),
            }),
        }
    }
}

impl_text_column!(AccountType);

/// A customer's deposit account.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Account {
    /// The id for the account.
    pub id: AccountId,
    /// The customer who owns the account.
    pub owner_id: UserID,
    /// Whether this is a checking or savings account.
    pub account_type: AccountType,
    /// The human facing account number, e.g. "CHK-00000001".
    pub account_number: String,
    /// The amount of money in the account.
    pub balance: Decimal,
    /// Closed accounts are kept for the ledger but cannot move money.
    pub is_active: bool,
    /// When the account was opened.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// The details needed to open an account.
#[derive(Debug, Clone)]
pub struct NewAccount {
    /// The customer who will own the account.
    pub owner_id: UserID,
    /// Whether to open a checking or savings account.
    pub account_type: AccountType,
    /// The amount deposited when the account is opened.
    pub opening_balance: Decimal,
}

pub fn create_account_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS account (
            id INTEGER PRIMARY KEY,
            owner_id INTEGER NOT NULL REFERENCES user(id) ON UPDATE CASCADE ON DELETE CASCADE,
            account_type TEXT NOT NULL CHECK (account_type IN ('checking', 'savings')),
            account_number TEXT NOT NULL UNIQUE,
            balance TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        )",
        (),
    )?;

    Ok(())
}

pub fn map_row_to_account(row: &Row) -> Result<Account, rusqlite::Error> {
    Ok(Account {
        id: row.get(0)?,
        owner_id: UserID::new(row.get(1)?),
        account_type: row.get(2)?,
        account_number: row.get(3)?,
        balance: get_decimal(row, 4)?,
        is_active: row.get(5)?,
        created_at: row.get(6)?,
    })
}

const SELECT_ACCOUNT: &str =
    "SELECT id, owner_id, account_type, account_number, balance, is_active, created_at FROM account";

/// Open a new active account.
///
/// # Errors
/// Returns a:
/// - [Error::Validation] if the opening balance is negative,
/// - [Error::SqlError] if `owner_id` does not refer to a user or there is some other SQL error.
pub fn create_account(new_account: NewAccount, connection: &Connection) -> Result<Account, Error> {
    if new_account.opening_balance.is_sign_negative() {
        return Err(Error::validation(
            "opening_balance",
            "an account cannot be opened with a negative balance",
        ));
    }

    let created_at = now_utc_seconds();
    let tx = connection.unchecked_transaction()?;

    // The account number is derived from the row id, so insert a unique placeholder first.
    tx.execute(
        "INSERT INTO account (owner_id, account_type, account_number, balance, is_active, created_at)
         VALUES (?1, ?2, 'pending-' || hex(randomblob(8)), ?3, 1, ?4)",
        params![
            new_account.owner_id.as_i64(),
            new_account.account_type,
            new_account.opening_balance.to_string(),
            created_at
        ],
    )?;
    let id = tx.last_insert_rowid();
    let account_number = format!("{}-{id:08}", new_account.account_type.number_prefix());
    tx.execute(
        "UPDATE account SET account_number = ?1 WHERE id = ?2",
        params![account_number, id],
    )?;

    tx.commit()?;

    Ok(Account {
        id,
        owner_id: new_account.owner_id,
        account_type: new_account.account_type,
        account_number,
        balance: new_account.opening_balance,
        is_active: true,
        created_at,
    })
}

/// Retrieve an account by its `id`.
///
/// # Errors
/// Returns [Error::NotFound] if there is no account with `id`.
pub fn get_account(id: AccountId, connection: &Connection) -> Result<Account, Error> {
    connection
        .query_row(
            &format!("{SELECT_ACCOUNT} WHERE id = ?1"),
            params![id],
            map_row_to_account,
        )
        .map_err(|error| match error {
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound("account"),
            error => error.into(),
        })
}

/// Retrieve every account owned by `owner_id`, oldest first.
pub fn get_accounts_for_owner(
    owner_id: UserID,
    connection: &Connection,
) -> Result<Vec<Account>, Error> {
    connection
        .prepare(&format!("{SELECT_ACCOUNT} WHERE owner_id = ?1 ORDER BY id ASC"))?
        .query_map(params![owner_id.as_i64()], map_row_to_account)?
        .map(|maybe_account| maybe_account.map_err(Error::from))
        .collect()
}

/// The checking account that loans for `owner_id` are disbursed into and repaid from.
///
/// If the customer has more than one active checking account, the oldest is used.
pub fn get_active_checking_account(
    owner_id: UserID,
    connection: &Connection,
) -> Result<Option<Account>, Error> {
    connection
        .query_row(
            &format!(
                "{SELECT_ACCOUNT} WHERE owner_id = ?1 AND account_type = 'checking' AND is_active = 1
                 ORDER BY id ASC LIMIT 1"
            ),
            params![owner_id.as_i64()],
            map_row_to_account,
        )
        .optional()
        .map_err(Error::from)
}

fn get_active_balance(account_id: AccountId, tx: &SqlTransaction) -> Result<Decimal, Error> {
    tx.query_row(
        "SELECT balance FROM account WHERE id = ?1 AND is_active = 1",
        params![account_id],
        |row| get_decimal(row, 0),
    )
    .map_err(|error| match error {
        rusqlite::Error::QueryReturnedNoRows => Error::NotFound("account"),
        error => error.into(),
    })
}

fn set_balance(account_id: AccountId, balance: Decimal, tx: &SqlTransaction) -> Result<(), Error> {
    tx.execute(
        "UPDATE account SET balance = ?1 WHERE id = ?2",
        params![balance.to_string(), account_id],
    )?;

    Ok(())
}

/// Take `amount` out of an active account and return the new balance.
///
/// Requires an open database transaction so that the balance check and the
/// write see the same snapshot.
///
/// # Errors
/// Returns a:
/// - [Error::InsufficientFunds] if the balance is less than `amount`,
/// - [Error::NotFound] if the account does not exist or has been closed.
pub fn debit_account(
    account_id: AccountId,
    amount: Decimal,
    tx: &SqlTransaction,
) -> Result<Decimal, Error> {
    let balance = get_active_balance(account_id, tx)?;

    if balance < amount {
        return Err(Error::InsufficientFunds {
            available: balance,
            requested: amount,
        });
    }

    let new_balance = balance - amount;
    set_balance(account_id, new_balance, tx)?;

    Ok(new_balance)
}

/// Add `amount` to an active account and return the new balance.
///
/// # Errors
/// Returns [Error::NotFound] if the account does not exist or has been closed.
pub fn credit_account(
    account_id: AccountId,
    amount: Decimal,
    tx: &SqlTransaction,
) -> Result<Decimal, Error> {
    let new_balance = get_active_balance(account_id, tx)? + amount;
    set_balance(account_id, new_balance, tx)?;

    Ok(new_balance)
}

/// Mark an account as closed.
pub fn close_account(account_id: AccountId, connection: &Connection) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "UPDATE account SET is_active = 0 WHERE id = ?1",
        params![account_id],
    )?;

    if rows_affected == 0 {
        return Err(Error::NotFound("account"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use rusqlite::TransactionBehavior;
    use rust_decimal_macros::dec;

    use crate::{
        Error,
        account::{AccountType, NewAccount},
        auth::Role,
        test_utils::{get_test_connection, seed_user},
    };

    use super::{
        close_account, create_account, credit_account, debit_account, get_account,
        get_accounts_for_owner, get_active_checking_account,
    };

    #[test]
    fn can_create_account() {
        let conn = get_test_connection();
        let owner = seed_user(&conn, "owner@bank.test", Role::Customer, None);

        let account = create_account(
            NewAccount {
                owner_id: owner.id,
                account_type: AccountType::Checking,
                opening_balance: dec!(123.45),
            },
            &conn,
        )
        .unwrap();

        assert_eq!(account.account_number, format!("CHK-{:08}", account.id));
        assert_eq!(get_account(account.id, &conn).unwrap(), account);
    }

    #[test]
    fn rejects_negative_opening_balance() {
        let conn = get_test_connection();
        let owner = seed_user(&conn, "owner@bank.test", Role::Customer, None);

        let result = create_account(
            NewAccount {
                owner_id: owner.id,
                account_type: AccountType::Checking,
                opening_balance: dec!(-1),
            },
            &conn,
        );

        assert!(matches!(result, Err(Error::Validation { field: "opening_balance", .. })));
    }

    #[test]
    fn checking_lookup_skips_savings_and_closed_accounts() {
        let conn = get_test_connection();
        let owner = seed_user(&conn, "owner@bank.test", Role::Customer, None);
        let open = |account_type| {
            create_account(
                NewAccount {
                    owner_id: owner.id,
                    account_type,
                    opening_balance: dec!(10),
                },
                &conn,
            )
            .unwrap()
        };
        let _savings = open(AccountType::Savings);
        let closed = open(AccountType::Checking);
        let checking = open(AccountType::Checking);
        close_account(closed.id, &conn).unwrap();

        let got = get_active_checking_account(owner.id, &conn).unwrap();

        assert_eq!(got.map(|account| account.id), Some(checking.id));
        assert_eq!(get_accounts_for_owner(owner.id, &conn).unwrap().len(), 3);
    }

    #[test]
    fn no_checking_account_is_none() {
        let conn = get_test_connection();
        let owner = seed_user(&conn, "owner@bank.test", Role::Customer, None);

        assert_eq!(get_active_checking_account(owner.id, &conn), Ok(None));
    }

    #[test]
    fn debit_refuses_to_overdraw() {
        let mut conn = get_test_connection();
        let owner = seed_user(&conn, "owner@bank.test", Role::Customer, None);
        let account = create_account(
            NewAccount {
                owner_id: owner.id,
                account_type: AccountType::Checking,
                opening_balance: dec!(100),
            },
            &conn,
        )
        .unwrap();

        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .unwrap();
        let result = debit_account(account.id, dec!(100.01), &tx);
        drop(tx);

        assert_eq!(
            result,
            Err(Error::InsufficientFunds {
                available: dec!(100),
                requested: dec!(100.01),
            })
        );
        assert_eq!(get_account(account.id, &conn).unwrap().balance, dec!(100));
    }

    #[test]
    fn debit_and_credit_commit_together() {
        let mut conn = get_test_connection();
        let owner = seed_user(&conn, "owner@bank.test", Role::Customer, None);
        let account = create_account(
            NewAccount {
                owner_id: owner.id,
                account_type: AccountType::Checking,
                opening_balance: dec!(100),
            },
            &conn,
        )
        .unwrap();

        let tx = conn.transaction().unwrap();
        assert_eq!(debit_account(account.id, dec!(40), &tx), Ok(dec!(60)));
        assert_eq!(credit_account(account.id, dec!(0.50), &tx), Ok(dec!(60.50)));
        tx.commit().unwrap();

        assert_eq!(get_account(account.id, &conn).unwrap().balance, dec!(60.50));
    }

    #[test]
    fn closed_account_cannot_be_credited() {
        let mut conn = get_test_connection();
        let owner = seed_user(&conn, "owner@bank.test", Role::Customer, None);
        let account = create_account(
            NewAccount {
                owner_id: owner.id,
                account_type: AccountType::Checking,
                opening_balance: dec!(100),
            },
            &conn,
        )
        .unwrap();
        close_account(account.id, &conn).unwrap();

        let tx = conn.transaction().unwrap();
        let result = credit_account(account.id, dec!(1), &tx);

        assert_eq!(result, Err(Error::NotFound("account")));
    }
}

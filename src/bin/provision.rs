use std::{error::Error, io, path::Path, process::exit};

use bcrypt::DEFAULT_COST;
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use rust_decimal::Decimal;

use loan_ledger::{
    AccountId, AccountType, BranchId, NewAccount, NewUser, PasswordHash, Role, UserID,
    ValidatedPassword, assign_branch_manager, close_account, create_account, create_branch,
    create_user, get_account, get_branch, initialize_db, set_user_branch,
};

/// A utility for setting up branches, staff and customers of the bank.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to the application SQLite database.
    #[arg(long)]
    db_path: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a branch with no manager.
    CreateBranch {
        /// The branch's name, e.g. "Downtown".
        name: String,
    },
    /// Create a user. The password is read from the terminal.
    CreateUser {
        email: String,
        name: String,
        /// One of "customer", "manager" or "admin".
        #[arg(long, default_value = "customer")]
        role: Role,
        /// The branch a customer banks with.
        #[arg(long)]
        branch: Option<BranchId>,
    },
    /// Make a user the manager of a branch.
    AssignManager {
        #[arg(long)]
        branch: BranchId,
        #[arg(long)]
        user: i64,
    },
    /// Move a customer to another branch, or remove them from their branch.
    SetBranch {
        #[arg(long)]
        user: i64,
        /// Leave out to remove the user from their branch.
        #[arg(long)]
        branch: Option<BranchId>,
    },
    /// Open an account for a user.
    OpenAccount {
        #[arg(long)]
        owner: i64,
        /// One of "checking" or "savings".
        #[arg(long, default_value = "checking")]
        account_type: AccountType,
        #[arg(long, default_value = "0")]
        opening_balance: Decimal,
    },
    /// Close an account. Closed accounts cannot receive disbursements or pay loans.
    CloseAccount {
        account: AccountId,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let db_path = Path::new(&args.db_path);
    validate_db_path(db_path);

    let conn = Connection::open(db_path)?;
    initialize_db(&conn)?;

    match args.command {
        Command::CreateBranch { name } => {
            let branch = create_branch(&name, &conn)?;
            println!("Created branch {} with ID {}", branch.name, branch.id);
        }
        Command::CreateUser {
            email,
            name,
            role,
            branch,
        } => {
            let password_hash = match get_new_password_hash() {
                Some(password_hash) => password_hash,
                None => return Ok(()),
            };

            let user = create_user(
                NewUser {
                    email,
                    name,
                    role,
                    branch_id: branch,
                    password_hash,
                },
                &conn,
            )?;
            println!("Created {} {} with ID {}", user.role, user.email, user.id);
        }
        Command::AssignManager { branch, user } => {
            assign_branch_manager(branch, UserID::new(user), &conn)?;
            let branch = get_branch(branch, &conn)?;
            println!("User {user} now manages {} (ID {})", branch.name, branch.id);
        }
        Command::SetBranch { user, branch } => {
            set_user_branch(UserID::new(user), branch, &conn)?;
            match branch {
                Some(branch) => println!("User {user} now banks with branch {branch}"),
                None => println!("User {user} no longer has a branch"),
            }
        }
        Command::OpenAccount {
            owner,
            account_type,
            opening_balance,
        } => {
            let account = create_account(
                NewAccount {
                    owner_id: UserID::new(owner),
                    account_type,
                    opening_balance,
                },
                &conn,
            )?;
            println!(
                "Opened {} account {} with a balance of {}",
                account.account_type, account.account_number, account.balance
            );
        }
        Command::CloseAccount { account } => {
            close_account(account, &conn)?;
            let account = get_account(account, &conn)?;
            println!(
                "Closed account {} with a balance of {}",
                account.account_number, account.balance
            );
        }
    }

    Ok(())
}

fn validate_db_path(db_path: &Path) {
    match db_path.extension() {
        None => {
            print_error("Database path must include a file extension (e.g., 'bank.db').");
            exit(1);
        }
        Some(extension) if extension.is_empty() => {
            print_error("Database path must include a file extension (e.g., 'bank.db').");
            exit(1);
        }
        _ => {}
    }
}

fn get_new_password_hash() -> Option<PasswordHash> {
    loop {
        println!();

        let first_password = match rpassword::prompt_password("Enter a password: ") {
            Ok(string) => string,
            Err(error) if error.kind() == io::ErrorKind::UnexpectedEof => {
                return None;
            }
            Err(error) => {
                print_error(format!("Could not read password from stdin: {error}"));
                return None;
            }
        };

        let validated_password = match ValidatedPassword::new(&first_password) {
            Ok(password) => password,
            Err(error) => {
                print_error(error);
                continue;
            }
        };

        let second_password = match rpassword::prompt_password("Enter the same password again: ") {
            Ok(string) => string,
            Err(error) if error.kind() == io::ErrorKind::UnexpectedEof => {
                return None;
            }
            Err(error) => {
                print_error(format!("Could not read password from stdin: {error}"));
                return None;
            }
        };

        if first_password != second_password {
            print_error("Passwords must match, try again.");
            continue;
        }

        match PasswordHash::new(validated_password, DEFAULT_COST) {
            Ok(password_hash) => return Some(password_hash),
            Err(error) => {
                print_error(format!("Could not hash password: {error}. Try again."));
            }
        }
    }
}

fn print_error(error: impl ToString) {
    eprintln!("\x1b[31;1m{}\x1b[0m", error.to_string());
}

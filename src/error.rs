//! Defines the app level error type and its conversion to JSON error responses.
use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::loan::LoanStatus;

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// A request field was missing, malformed or outside its allowed range.
    #[error("invalid {field}: {message}")]
    Validation {
        /// The name of the offending field as the client sent it.
        field: &'static str,
        /// A human readable explanation of what is wrong with the field.
        message: String,
    },

    /// The checking account does not hold enough money for a debit.
    #[error("insufficient funds: the account has {available} available but {requested} was requested")]
    InsufficientFunds {
        /// The balance of the account at the time of the check.
        available: Decimal,
        /// The amount that was to be debited.
        requested: Decimal,
    },

    /// A loan payment is larger than what is left to pay on the loan.
    #[error("payment of {requested} exceeds the remaining balance of {remaining}")]
    ExceedsRemainingBalance {
        /// The remaining balance of the loan, rounded to cents.
        remaining: Decimal,
        /// The payment amount.
        requested: Decimal,
    },

    /// Payments can only be made against active loans.
    #[error("the loan is {0} and cannot accept payments")]
    LoanNotPayable(LoanStatus),

    /// Only pending loans can be approved or rejected.
    #[error("the loan is {0} and can no longer be approved or rejected")]
    LoanNotPending(LoanStatus),

    /// The requested resource was not found.
    ///
    /// Internally, this error may occur when a query returns no rows.
    #[error("the requested {0} could not be found")]
    NotFound(&'static str),

    /// The caller is authenticated but not allowed to perform the operation.
    #[error("you are not allowed to perform this operation")]
    Forbidden,

    /// The request did not carry a valid auth cookie.
    #[error("you must be logged in to perform this operation")]
    Unauthenticated,

    /// The user provided an invalid combination of email and password.
    #[error("invalid email or password")]
    InvalidCredentials,

    /// The user provided a password that is too easy to guess.
    #[error("password is too weak: {0}")]
    TooWeak(String),

    /// An unexpected error occurred with the underlying hashing library.
    ///
    /// The error string should only be logged for debugging on the server.
    #[error("hashing failed: {0}")]
    HashingError(String),

    /// The email address is already registered to another user.
    #[error("the email address is already in use")]
    DuplicateEmail,

    /// An error occurred while getting the local timezone from a canonical timezone string.
    #[error("invalid timezone {0}")]
    InvalidTimezoneError(String),

    /// Could not acquire the database lock.
    #[error("could not acquire the database lock")]
    DatabaseLockError,

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),
}

/// The coarse classification of an [Error] that is exposed to API clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input or a violated business rule.
    ValidationError,
    /// A loan, account, branch or user does not exist.
    NotFound,
    /// The authorization guard refused the operation.
    Forbidden,
    /// No valid session.
    Unauthenticated,
    /// Something unexpected went wrong on the server.
    InternalError,
}

impl Error {
    /// Shortcut for building an [Error::Validation].
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Error::Validation {
            field,
            message: message.into(),
        }
    }

    /// The kind of error as reported to the client.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation { .. }
            | Error::InsufficientFunds { .. }
            | Error::ExceedsRemainingBalance { .. }
            | Error::LoanNotPayable(_)
            | Error::LoanNotPending(_)
            | Error::TooWeak(_)
            | Error::DuplicateEmail => ErrorKind::ValidationError,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Forbidden => ErrorKind::Forbidden,
            Error::Unauthenticated | Error::InvalidCredentials => ErrorKind::Unauthenticated,
            Error::HashingError(_)
            | Error::InvalidTimezoneError(_)
            | Error::DatabaseLockError
            | Error::SqlError(_) => ErrorKind::InternalError,
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            // Code 2067 occurs when a UNIQUE constraint failed.
            rusqlite::Error::SqliteFailure(sql_error, Some(ref desc))
                if sql_error.extended_code == 2067 && desc.ends_with("user.email") =>
            {
                Error::DuplicateEmail
            }
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound("record"),
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!("Rejected request body: {rejection}");
        Error::validation("body", rejection.body_text())
    }
}

impl From<QueryRejection> for Error {
    fn from(rejection: QueryRejection) -> Self {
        tracing::debug!("Rejected query string: {rejection}");
        Error::validation("query", rejection.body_text())
    }
}

/// The JSON body sent to clients for failed requests.
#[derive(Debug, Serialize)]
struct ErrorBody {
    kind: ErrorKind,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<&'static str>,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status_code = match kind {
            ErrorKind::ValidationError => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorKind::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let field = match &self {
            Error::Validation { field, .. } => Some(*field),
            _ => None,
        };

        // Internal errors are not intended to be shown to the client.
        let message = if kind == ErrorKind::InternalError {
            tracing::error!("An unexpected error occurred: {}", self);
            "An unexpected error occurred, check the server logs for more details.".to_owned()
        } else {
            self.to_string()
        };

        (
            status_code,
            Json(ErrorBody {
                kind,
                message,
                field,
            }),
        )
            .into_response()
    }
}

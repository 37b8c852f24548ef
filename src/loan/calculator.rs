//! Quoting repayments without saving anything.

use axum::{Json, extract::rejection::JsonRejection};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    Error,
    loan::{
        amortization::{LoanTerms, round_cents},
        application::{validate_amount, validate_interest_rate, validate_term_months},
    },
};

/// The terms a client wants a quote for.
#[derive(Debug, Clone, Deserialize)]
pub struct CalculationRequest {
    pub amount: Decimal,
    pub interest_rate: Decimal,
    pub term_months: u32,
}

/// The repayments for a quote, rounded to cents.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Calculation {
    pub monthly_payment: Decimal,
    pub total_amount: Decimal,
    pub total_interest: Decimal,
}

/// Work out the repayments for `request` using the same limits as a loan application.
pub fn calculate(request: &CalculationRequest) -> Result<Calculation, Error> {
    validate_amount(request.amount)?;
    validate_interest_rate(request.interest_rate)?;
    validate_term_months(request.term_months)?;

    let terms = LoanTerms {
        principal: request.amount,
        annual_rate: request.interest_rate,
        term_months: request.term_months,
    };

    Ok(Calculation {
        monthly_payment: round_cents(terms.monthly_payment()),
        total_amount: round_cents(terms.total_amount()),
        total_interest: round_cents(terms.total_interest()),
    })
}

/// A route handler that quotes the repayments for a loan.
pub async fn calculate_loan_endpoint(
    body: Result<Json<CalculationRequest>, JsonRejection>,
) -> Result<Json<Calculation>, Error> {
    let Json(request) = body?;
    calculate(&request).map(Json)
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use crate::Error;

    use super::{Calculation, CalculationRequest, calculate};

    #[test]
    fn quotes_example_loan() {
        let got = calculate(&CalculationRequest {
            amount: dec!(12000),
            interest_rate: dec!(0.06),
            term_months: 24,
        });

        assert_eq!(
            got,
            Ok(Calculation {
                monthly_payment: dec!(531.85),
                total_amount: dec!(12764.34),
                total_interest: dec!(764.34),
            })
        );
    }

    #[test]
    fn rejects_terms_outside_lending_limits() {
        let got = calculate(&CalculationRequest {
            amount: dec!(12000),
            interest_rate: dec!(0.06),
            term_months: 2,
        });

        assert!(matches!(got, Err(Error::Validation { field: "term_months", .. })));
    }
}

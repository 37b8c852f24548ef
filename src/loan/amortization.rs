//! Pure functions that derive repayment figures from the terms of a loan.
//!
//! Nothing in here reads the clock or the database, so the same inputs always give the same
//! outputs. Values are kept at full precision and only rounded by callers when shown to clients.

use rust_decimal::{Decimal, MathematicalOps, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::Serialize;
use time::{Date, Month};

/// Round an amount of money to whole cents, with halves rounded away from zero.
pub fn round_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// The fixed terms a loan was issued under.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoanTerms {
    /// The amount borrowed.
    pub principal: Decimal,
    /// The annual interest rate as a fraction, e.g. 0.06 for 6%.
    pub annual_rate: Decimal,
    /// The number of monthly payments.
    pub term_months: u32,
}

impl LoanTerms {
    /// The interest rate applied each month.
    pub fn monthly_rate(&self) -> Decimal {
        self.annual_rate / dec!(12)
    }

    /// The fixed monthly payment that repays the loan over its term.
    ///
    /// Uses the standard amortization formula `P·r·(1+r)^n / ((1+r)^n - 1)`, or `P / n` for an
    /// interest free loan.
    pub fn monthly_payment(&self) -> Decimal {
        if self.term_months == 0 {
            return self.principal;
        }

        let rate = self.monthly_rate();

        if rate.is_zero() {
            return self.principal / Decimal::from(self.term_months);
        }

        match (Decimal::ONE + rate).checked_powu(u64::from(self.term_months)) {
            Some(growth) => self.principal * rate * growth / (growth - Decimal::ONE),
            // The growth factor only overflows for absurd terms, where the payment tends to the
            // interest on the principal.
            None => self.principal * rate,
        }
    }

    /// The sum of every scheduled payment.
    pub fn total_amount(&self) -> Decimal {
        self.monthly_payment() * Decimal::from(self.term_months)
    }

    /// The interest paid over the life of the loan if every payment is made on schedule.
    pub fn total_interest(&self) -> Decimal {
        self.total_amount() - self.principal
    }

    /// The principal still owed after `payments_made` payments totalling `total_paid`.
    ///
    /// `total_paid` is cash paid, i.e. principal plus interest. The payments are treated as
    /// `payments_made` equal payments of `total_paid / payments_made`, which is exact when the
    /// borrower has paid the scheduled amount each time. The result never exceeds what is left of
    /// [LoanTerms::total_amount] and is never negative.
    pub fn remaining_balance(&self, payments_made: u32, total_paid: Decimal) -> Decimal {
        if payments_made == 0 {
            return (self.principal - total_paid).max(Decimal::ZERO);
        }

        let rate = self.monthly_rate();
        let amortized = if rate.is_zero() {
            self.principal - total_paid
        } else {
            let average_payment = total_paid / Decimal::from(payments_made);

            match (Decimal::ONE + rate).checked_powu(u64::from(payments_made)) {
                Some(growth) => {
                    self.principal * growth - average_payment * (growth - Decimal::ONE) / rate
                }
                None => Decimal::ZERO,
            }
        };

        amortized
            .min(self.total_amount() - total_paid)
            .max(Decimal::ZERO)
    }

    /// The full repayment schedule for the loan, starting at `first_payment_date` if known.
    ///
    /// The final payment is adjusted so that the balance ends at exactly zero.
    pub fn schedule(&self, first_payment_date: Option<Date>) -> Vec<ScheduledPayment> {
        let rate = self.monthly_rate();
        let payment = self.monthly_payment();
        let mut balance = self.principal;
        let mut schedule = Vec::with_capacity(self.term_months as usize);

        for payment_number in 1..=self.term_months {
            let interest = balance * rate;
            let principal = if payment_number == self.term_months {
                balance
            } else {
                (payment - interest).min(balance)
            };
            balance -= principal;

            schedule.push(ScheduledPayment {
                payment_number,
                due_date: first_payment_date
                    .and_then(|first| add_months(first, payment_number - 1)),
                payment: round_cents(principal + interest),
                principal: round_cents(principal),
                interest: round_cents(interest),
                balance: round_cents(balance),
            });
        }

        schedule
    }
}

/// One row of an amortization schedule, rounded to cents.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledPayment {
    /// The 1-based payment number.
    pub payment_number: u32,
    /// When the payment is due. Unknown until the loan has been disbursed.
    pub due_date: Option<Date>,
    pub payment: Decimal,
    /// The part of the payment that reduces the balance.
    pub principal: Decimal,
    /// The part of the payment that is interest.
    pub interest: Decimal,
    /// The principal still owed after this payment.
    pub balance: Decimal,
}

/// The date `months` calendar months after `date`.
///
/// The day of month is clamped to the length of the target month, e.g. 31 January plus one
/// month is 28 or 29 February. Returns `None` if the result is outside the supported date range.
pub fn add_months(date: Date, months: u32) -> Option<Date> {
    let month_index = i64::from(u8::from(date.month())) - 1 + i64::from(months);
    let year = i32::try_from(i64::from(date.year()) + month_index.div_euclid(12)).ok()?;
    let month = Month::try_from(u8::try_from(month_index.rem_euclid(12) + 1).ok()?).ok()?;
    let day = date.day().min(last_day_of_month(year, month));

    Date::from_calendar_date(year, month, day).ok()
}

/// The first day of the month after the one `date` falls in.
pub fn first_day_of_next_month(date: Date) -> Option<Date> {
    add_months(date.replace_day(1).ok()?, 1)
}

/// When the next payment is due, given the first due date and how many payments were made.
pub fn next_payment_due(first_payment_date: Date, payments_made: u32) -> Option<Date> {
    add_months(first_payment_date, payments_made)
}

/// The number of whole days `due_date` is in the past as of `today`, or zero if it is not.
pub fn days_overdue(due_date: Date, today: Date) -> i64 {
    (today - due_date).whole_days().max(0)
}

/// Whether `due_date` has passed as of `today`.
pub fn is_overdue(due_date: Date, today: Date) -> bool {
    due_date < today
}

/// How far through the term the borrower is, as a percentage between 0 and 100.
pub fn progress_percentage(payments_made: u32, term_months: u32) -> Decimal {
    if term_months == 0 {
        return dec!(100);
    }

    (Decimal::from(payments_made) * dec!(100) / Decimal::from(term_months)).min(dec!(100))
}

fn last_day_of_month(year: i32, month: Month) -> u8 {
    match month {
        Month::January
        | Month::March
        | Month::May
        | Month::July
        | Month::August
        | Month::October
        | Month::December => 31,
        Month::April | Month::June | Month::September | Month::November => 30,
        Month::February if time::util::is_leap_year(year) => 29,
        Month::February => 28,
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use time::macros::date;

    use super::{
        LoanTerms, add_months, days_overdue, first_day_of_next_month, is_overdue,
        next_payment_due, progress_percentage, round_cents,
    };

    #[test]
    fn round_cents_rounds_halves_away_from_zero() {
        assert_eq!(round_cents(dec!(0.125)), dec!(0.13));
        assert_eq!(round_cents(dec!(0.135)), dec!(0.14));
        assert_eq!(round_cents(dec!(-0.125)), dec!(-0.13));
        assert_eq!(round_cents(dec!(531.8473)), dec!(531.85));
    }

    fn example_terms() -> LoanTerms {
        LoanTerms {
            principal: dec!(12000),
            annual_rate: dec!(0.06),
            term_months: 24,
        }
    }

    fn assert_close(got: Decimal, want: Decimal, tolerance: Decimal) {
        assert!(
            (got - want).abs() <= tolerance,
            "got {got}, want {want} ± {tolerance}"
        );
    }

    #[test]
    fn monthly_payment_is_deterministic() {
        let terms = example_terms();

        let first = terms.monthly_payment();

        for _ in 0..10 {
            assert_eq!(terms.monthly_payment(), first);
        }
    }

    #[test]
    fn monthly_payment_matches_amortization_formula() {
        let got = example_terms().monthly_payment().round_dp(2);

        assert_eq!(got, dec!(531.85));
    }

    #[test]
    fn interest_free_payment_is_principal_over_term() {
        let terms = LoanTerms {
            principal: dec!(1000),
            annual_rate: Decimal::ZERO,
            term_months: 8,
        };

        assert_eq!(terms.monthly_payment(), dec!(125));
        assert_eq!(terms.total_interest(), Decimal::ZERO);
    }

    #[test]
    fn totals_follow_from_monthly_payment() {
        let terms = example_terms();

        assert_eq!(
            terms.total_amount(),
            terms.monthly_payment() * Decimal::from(terms.term_months)
        );
        assert_close(terms.total_interest(), dec!(764.34), dec!(0.01));
    }

    #[test]
    fn remaining_balance_after_first_payment() {
        let got = example_terms().remaining_balance(1, dec!(531.68));

        assert_close(got, dec!(11528.65), dec!(1));
    }

    #[test]
    fn remaining_balance_before_any_payment_is_principal() {
        assert_eq!(example_terms().remaining_balance(0, Decimal::ZERO), dec!(12000));
    }

    #[test]
    fn remaining_balance_is_zero_after_every_scheduled_payment() {
        let terms = example_terms();
        let total = terms.monthly_payment() * dec!(24);

        assert_close(terms.remaining_balance(24, total), Decimal::ZERO, dec!(0.01));
    }

    #[test]
    fn remaining_balance_is_never_negative() {
        let terms = example_terms();

        assert_eq!(terms.remaining_balance(2, dec!(20000)), Decimal::ZERO);
    }

    #[test]
    fn interest_free_remaining_balance_is_principal_less_paid() {
        let terms = LoanTerms {
            principal: dec!(1000),
            annual_rate: Decimal::ZERO,
            term_months: 8,
        };

        assert_eq!(terms.remaining_balance(3, dec!(375)), dec!(625));
    }

    #[test]
    fn schedule_ends_at_zero() {
        let schedule = example_terms().schedule(Some(date!(2025 - 02 - 01)));

        assert_eq!(schedule.len(), 24);
        assert_eq!(schedule[0].payment, dec!(531.85));
        assert_eq!(schedule[0].interest, dec!(60.00));
        assert_eq!(schedule[0].due_date, Some(date!(2025 - 02 - 01)));
        assert_eq!(schedule[23].due_date, Some(date!(2027 - 01 - 01)));
        assert_eq!(schedule[23].balance, Decimal::ZERO);
        assert_close(schedule[23].payment, dec!(531.85), dec!(0.02));
    }

    #[test]
    fn schedule_without_start_date_has_no_due_dates() {
        let schedule = example_terms().schedule(None);

        assert!(schedule.iter().all(|row| row.due_date.is_none()));
    }

    #[test]
    fn add_months_clamps_day() {
        assert_eq!(add_months(date!(2024 - 01 - 31), 1), Some(date!(2024 - 02 - 29)));
        assert_eq!(add_months(date!(2023 - 01 - 31), 1), Some(date!(2023 - 02 - 28)));
        assert_eq!(add_months(date!(2024 - 11 - 15), 3), Some(date!(2025 - 02 - 15)));
        assert_eq!(add_months(date!(2024 - 05 - 10), 0), Some(date!(2024 - 05 - 10)));
    }

    #[test]
    fn first_day_of_next_month_rolls_over_year() {
        assert_eq!(first_day_of_next_month(date!(2024 - 12 - 17)), Some(date!(2025 - 01 - 01)));
        assert_eq!(first_day_of_next_month(date!(2024 - 03 - 01)), Some(date!(2024 - 04 - 01)));
    }

    #[test]
    fn next_payment_follows_payments_made() {
        assert_eq!(next_payment_due(date!(2025 - 01 - 01), 0), Some(date!(2025 - 01 - 01)));
        assert_eq!(next_payment_due(date!(2025 - 01 - 01), 13), Some(date!(2026 - 02 - 01)));
    }

    #[test]
    fn overdue_is_strictly_after_due_date() {
        let due = date!(2025 - 03 - 01);

        assert!(!is_overdue(due, date!(2025 - 03 - 01)));
        assert!(is_overdue(due, date!(2025 - 03 - 02)));
        assert_eq!(days_overdue(due, date!(2025 - 03 - 11)), 10);
        assert_eq!(days_overdue(due, date!(2025 - 02 - 11)), 0);
    }

    #[test]
    fn progress_is_capped() {
        assert_eq!(progress_percentage(6, 24), dec!(25));
        assert_eq!(progress_percentage(30, 24), dec!(100));
        assert_eq!(progress_percentage(0, 24), Decimal::ZERO);
    }
}

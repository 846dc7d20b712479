use crate::error::{Field, Reason, ValidationError};
use crate::loan::{LoanRequest, PaymentMethod, MONTHS_PER_YEAR};
use log::debug;

/// Longest loan term accepted, in years.
pub const MAX_TERM_YEARS: u32 = 100;

/// Largest price accepted. Keeps every schedule total finite.
pub const MAX_PRICE: u64 = 1_000_000_000_000_000;

/// Largest annual rate accepted, in percent.
pub const MAX_RATE_PERCENT: u64 = 1_000;

/// Turns the raw form values into a `LoanRequest`.
///
/// Price and term must be strictly positive; down payment and rate may be
/// zero. Amounts are capped at `MAX_PRICE` and the rate at
/// `MAX_RATE_PERCENT`. The term is given in whole years. The down payment
/// must leave something to borrow.
pub fn validate(
    price: &str,
    down_payment: &str,
    term: &str,
    rate: &str,
    method: PaymentMethod,
) -> Result<LoanRequest, ValidationError> {
    let price = parse_positive(price, Field::Price, MAX_PRICE)?;
    let down_payment = parse_number(down_payment, Field::DownPayment, MAX_PRICE)?;
    let term_years = parse_term_years(term)?;
    let annual_rate_percent = parse_number(rate, Field::Rate, MAX_RATE_PERCENT)?;

    if down_payment >= price {
        return Err(ValidationError::new(
            Field::DownPayment,
            Reason::DownPaymentTooLarge,
        ));
    }

    let request = LoanRequest {
        price,
        down_payment,
        term_months: term_years * MONTHS_PER_YEAR,
        annual_rate_percent,
        method,
    };
    debug!("validated {:?}", request);
    Ok(request)
}

/// Parses the payment method label picked by the user.
pub fn validate_method(label: &str) -> Result<PaymentMethod, ValidationError> {
    label.parse()
}

// zero passes; negatives fail as not positive
fn parse_number(raw: &str, field: Field, max: u64) -> Result<f64, ValidationError> {
    let value = raw
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite() && *value >= 0.)
        .ok_or(ValidationError::new(field, Reason::NotPositive))?;
    if value > max as f64 {
        return Err(ValidationError::new(field, Reason::TooLarge(max)));
    }
    Ok(value)
}

fn parse_positive(raw: &str, field: Field, max: u64) -> Result<f64, ValidationError> {
    let value = parse_number(raw, field, max)?;
    if value == 0. {
        return Err(ValidationError::new(field, Reason::NotPositive));
    }
    Ok(value)
}

fn parse_term_years(raw: &str) -> Result<u32, ValidationError> {
    let years = raw
        .trim()
        .parse::<u32>()
        .ok()
        .filter(|&years| years > 0)
        .ok_or(ValidationError::new(Field::Term, Reason::NotPositive))?;
    if years > MAX_TERM_YEARS {
        return Err(ValidationError::new(
            Field::Term,
            Reason::TermTooLong(MAX_TERM_YEARS),
        ));
    }
    Ok(years)
}

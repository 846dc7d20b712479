use std::fmt;
use thiserror::Error;

/// Input the caller collected from the user.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Field {
    Price,
    DownPayment,
    Term,
    Rate,
    Method,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Field::Price => "price",
            Field::DownPayment => "down payment",
            Field::Term => "term",
            Field::Rate => "rate",
            Field::Method => "method",
        };
        write!(f, "{}", label)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Reason {
    #[error("must be a positive number")]
    NotPositive,
    #[error("must not exceed {0}")]
    TooLarge(u64),
    #[error("must not exceed {0} years")]
    TermTooLong(u32),
    #[error("down payment must be less than price")]
    DownPaymentTooLarge,
    #[error("must be either annuity or differentiated")]
    UnknownMethod,
}

/// Bad user input. The caller re-prompts; the engine never sees it.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[error("{field}: {reason}")]
pub struct ValidationError {
    pub field: Field,
    pub reason: Reason,
}

impl ValidationError {
    pub fn new(field: Field, reason: Reason) -> Self {
        Self { field, reason }
    }
}

/// A request reached the engine in a state validation should have rejected.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum DomainError {
    #[error("loan amount must be positive, got {0}")]
    NonPositiveLoan(f64),

    #[error("loan term must be at least one month")]
    ZeroTerm,

    #[error("monthly rate must not be negative, got {0}")]
    NegativeRate(f64),

    #[error("non-finite result in {context}")]
    NonFinite { context: String },

    #[error("payment {month_index} falls outside the supported date range")]
    DateOutOfRange { month_index: u32 },
}

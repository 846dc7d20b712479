//! Mortgage repayment calculator: validates raw loan inputs and builds annuity
//! or differentiated amortization schedules.
pub mod error;
pub mod loan;
pub mod validate;

pub use error::{DomainError, Field, Reason, ValidationError};
pub use loan::{
    compute_schedule, DatedPayment, LoanRequest, LoanSummary, PaymentEntry, PaymentMethod,
    Schedule,
};
pub use validate::{validate, validate_method};

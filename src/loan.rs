use crate::error::{DomainError, Field, Reason, ValidationError};
use chrono::{Months, NaiveDate};
use log::{debug, error, trace};
use std::{fmt, str::FromStr};

pub const MONTHS_PER_YEAR: u32 = 12;

/// Largest share of monthly income a mortgage payment may take. The required
/// income is the first month's payment divided by this ratio.
pub const MAX_PAYMENT_TO_INCOME: f64 = 0.3;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PaymentMethod {
    /// level payment every month
    Annuity,
    /// equal principal every month, declining total
    Differentiated,
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentMethod::Annuity => write!(f, "annuity"),
            PaymentMethod::Differentiated => write!(f, "differentiated"),
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = ValidationError;

    // also accepts the Russian form labels
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "annuity" | "a" | "аннуитетный" => Ok(PaymentMethod::Annuity),
            "differentiated" | "d" | "дифференцированный" => Ok(PaymentMethod::Differentiated),
            _ => Err(ValidationError::new(Field::Method, Reason::UnknownMethod)),
        }
    }
}

/// A loan that passed validation. Only `validate` builds one outside this crate.
#[derive(Clone, Copy, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct LoanRequest {
    pub(crate) price: f64,
    pub(crate) down_payment: f64,
    pub(crate) term_months: u32,
    pub(crate) annual_rate_percent: f64,
    pub(crate) method: PaymentMethod,
}

impl LoanRequest {
    pub fn price(&self) -> f64 {
        self.price
    }

    pub fn down_payment(&self) -> f64 {
        self.down_payment
    }

    pub fn term_months(&self) -> u32 {
        self.term_months
    }

    pub fn annual_rate_percent(&self) -> f64 {
        self.annual_rate_percent
    }

    pub fn method(&self) -> PaymentMethod {
        self.method
    }

    pub fn loan_amount(&self) -> f64 {
        self.price - self.down_payment
    }

    /// annual percent -> monthly fraction
    pub fn monthly_rate(&self) -> f64 {
        self.annual_rate_percent / MONTHS_PER_YEAR as f64 / 100.
    }
}

#[derive(Clone, Copy, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PaymentEntry {
    pub month_index: u32,
    pub principal_portion: f64,
    pub interest_portion: f64,
    pub total_payment: f64,
    pub remaining_balance: f64,
}

impl PaymentEntry {
    pub fn new(
        month_index: u32,
        principal_portion: f64,
        interest_portion: f64,
        total_payment: f64,
        remaining_balance: f64,
    ) -> Self {
        Self {
            month_index,
            principal_portion,
            interest_portion,
            total_payment,
            remaining_balance,
        }
    }
}

impl fmt::Display for PaymentEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pmt number {}, payment {:.2}, principal paid {:.2}, interest paid {:.2}, ending balance {:.2}",
            self.month_index,
            self.total_payment,
            self.principal_portion,
            self.interest_portion,
            self.remaining_balance
        )
    }
}

/// A scheduled payment pinned to a calendar date.
#[derive(Clone, Copy, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DatedPayment {
    pub pmt_date: NaiveDate,
    pub entry: PaymentEntry,
}

impl fmt::Display for DatedPayment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pmt number {}, date {}, payment {:.2}, principal paid {:.2}, interest paid {:.2}, ending balance {:.2}",
            self.entry.month_index,
            self.pmt_date,
            self.entry.total_payment,
            self.entry.principal_portion,
            self.entry.interest_portion,
            self.entry.remaining_balance
        )
    }
}

#[derive(Clone, Copy, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct LoanSummary {
    pub first_month_payment: f64,
    pub total_interest: f64,
    pub total_payment: f64,
    pub minimum_required_income: f64,
}

impl LoanSummary {
    fn is_finite(&self) -> bool {
        self.first_month_payment.is_finite()
            && self.total_interest.is_finite()
            && self.total_payment.is_finite()
            && self.minimum_required_income.is_finite()
    }
}

impl fmt::Display for LoanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "monthly payment: {:.2}", self.first_month_payment)?;
        writeln!(f, "total interest: {:.2}", self.total_interest)?;
        writeln!(f, "total payment: {:.2}", self.total_payment)?;
        write!(f, "required income: {:.2}", self.minimum_required_income)
    }
}

/// Full result of a calculation: every monthly payment plus the totals
/// derived from them.
#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Schedule {
    method: PaymentMethod,
    loan_amount: f64,
    entries: Vec<PaymentEntry>,
    summary: LoanSummary,
}

impl Schedule {
    pub fn method(&self) -> PaymentMethod {
        self.method
    }

    pub fn loan_amount(&self) -> f64 {
        self.loan_amount
    }

    pub fn entries(&self) -> &[PaymentEntry] {
        &self.entries
    }

    pub fn get_summary(&self) -> &LoanSummary {
        &self.summary
    }

    pub fn get_pmt_count(&self) -> usize {
        self.entries.len()
    }

    /// 1-based, like `PaymentEntry::month_index`
    pub fn get_pmt_detail(&self, pmt_number: usize) -> Option<&PaymentEntry> {
        pmt_number
            .checked_sub(1)
            .and_then(|idx| self.entries.get(idx))
    }

    pub fn get_pmt_info(&self, pmt_number: usize) -> String {
        match self.get_pmt_detail(pmt_number) {
            Some(entry) => entry.to_string(),
            None => "No payment information.".to_string(),
        }
    }

    /// Dates payment `i` on `first_pmt_date` plus `i - 1` months. Month-end
    /// dates clamp to the last day of shorter months.
    pub fn dated(&self, first_pmt_date: NaiveDate) -> Result<Vec<DatedPayment>, DomainError> {
        self.entries
            .iter()
            .map(|entry| {
                first_pmt_date
                    .checked_add_months(Months::new(entry.month_index - 1))
                    .map(|pmt_date| DatedPayment {
                        pmt_date,
                        entry: *entry,
                    })
                    .ok_or(DomainError::DateOutOfRange {
                        month_index: entry.month_index,
                    })
            })
            .collect()
    }

    pub fn show_amortization(&self) {
        for pmt in &self.entries {
            println!("{}", pmt);
        }
    }
}

/// Runs the amortization policy the request selects.
pub fn compute_schedule(request: &LoanRequest) -> Result<Schedule, DomainError> {
    if let Err(e) = check_request(request) {
        error!("loan request {:?} reached the engine unvalidated: {}", request, e);
        return Err(e);
    }

    let loan_amount = request.loan_amount();
    let monthly_rate = request.monthly_rate();
    let months = request.term_months;

    let (entries, total_interest) = match request.method {
        PaymentMethod::Annuity => annuity_schedule(loan_amount, monthly_rate, months),
        PaymentMethod::Differentiated => {
            let entries = differentiated_payments(loan_amount, monthly_rate, months);
            let total_interest = entries.iter().map(|e| e.interest_portion).sum();
            (entries, total_interest)
        }
    };

    let summary = summarize(&entries, loan_amount, total_interest)?;
    debug!(
        "{} schedule: {} payments, first {:.2}, total interest {:.2}",
        request.method,
        entries.len(),
        summary.first_month_payment,
        summary.total_interest
    );

    Ok(Schedule {
        method: request.method,
        loan_amount,
        entries,
        summary,
    })
}

fn check_request(request: &LoanRequest) -> Result<(), DomainError> {
    let loan_amount = request.loan_amount();
    if !(loan_amount.is_finite() && loan_amount > 0.) {
        return Err(DomainError::NonPositiveLoan(loan_amount));
    }
    if request.term_months == 0 {
        return Err(DomainError::ZeroTerm);
    }
    let monthly_rate = request.monthly_rate();
    if !(monthly_rate.is_finite() && monthly_rate >= 0.) {
        return Err(DomainError::NegativeRate(monthly_rate));
    }
    Ok(())
}

/// Fixed monthly payment that retires `loan_amount` in `months` payments.
/// A zero rate spreads the principal evenly.
pub fn annuity_payment(loan_amount: f64, monthly_rate: f64, months: u32) -> f64 {
    if monthly_rate == 0. {
        return loan_amount / months as f64;
    }

    // r / (1 - (1 + r)^-n): ln_1p/exp_m1 keep tiny rates precise and the
    // negative exponent cannot overflow for long terms or steep rates
    let growth = months as f64 * monthly_rate.ln_1p();
    loan_amount * monthly_rate / -(-growth).exp_m1()
}

fn annuity_schedule(loan_amount: f64, monthly_rate: f64, months: u32) -> (Vec<PaymentEntry>, f64) {
    let payment = annuity_payment(loan_amount, monthly_rate, months);
    let total_interest = if monthly_rate == 0. {
        0.
    } else {
        payment * months as f64 - loan_amount
    };

    let mut entries = Vec::with_capacity(months as usize);
    let mut balance = loan_amount;

    for month_index in 1..=months {
        let interest = balance * monthly_rate;
        let principal = payment - interest;
        balance = (balance - principal).max(0.);
        trace!(
            "pmt # {}, interest {}, principal {}, end bal {}",
            month_index,
            interest,
            principal,
            balance
        );
        entries.push(PaymentEntry::new(
            month_index,
            principal,
            interest,
            payment,
            balance,
        ));
    }

    (entries, total_interest)
}

/// Equal principal each month; interest accrues on what is still owed.
pub fn differentiated_payments(loan_amount: f64, monthly_rate: f64, months: u32) -> Vec<PaymentEntry> {
    let principal = loan_amount / months as f64;

    (1..=months)
        .map(|month_index| {
            let outstanding = loan_amount - (month_index - 1) as f64 * principal;
            let interest = outstanding * monthly_rate;
            trace!(
                "pmt # {}, outstanding {}, interest {}",
                month_index,
                outstanding,
                interest
            );
            PaymentEntry::new(
                month_index,
                principal,
                interest,
                principal + interest,
                (outstanding - principal).max(0.),
            )
        })
        .collect()
}

fn summarize(
    entries: &[PaymentEntry],
    loan_amount: f64,
    total_interest: f64,
) -> Result<LoanSummary, DomainError> {
    let first_month_payment = entries
        .first()
        .map(|e| e.total_payment)
        .ok_or(DomainError::ZeroTerm)?;

    let summary = LoanSummary {
        first_month_payment,
        total_interest,
        total_payment: loan_amount + total_interest,
        minimum_required_income: first_month_payment / MAX_PAYMENT_TO_INCOME,
    };

    if !summary.is_finite() {
        error!("loan summary overflowed: {:?}", summary);
        return Err(DomainError::NonFinite {
            context: "loan summary".to_string(),
        });
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::{
        annuity_payment, compute_schedule, differentiated_payments, LoanRequest, PaymentMethod,
        Schedule, MAX_PAYMENT_TO_INCOME,
    };
    use crate::error::{DomainError, Field, Reason, ValidationError};
    use chrono::NaiveDate;
    use test_log::test;

    fn request(
        price: f64,
        down_payment: f64,
        term_years: u32,
        rate: f64,
        method: PaymentMethod,
    ) -> LoanRequest {
        LoanRequest {
            price,
            down_payment,
            term_months: term_years * 12,
            annual_rate_percent: rate,
            method,
        }
    }

    fn scenario(method: PaymentMethod) -> Schedule {
        compute_schedule(&request(3_000_000., 500_000., 10, 9., method)).unwrap()
    }

    fn assert_close(actual: f64, expected: f64, tolerance: f64) {
        assert!(
            (actual - expected).abs() <= tolerance,
            "expected {} +/- {}, got {}",
            expected,
            tolerance,
            actual
        );
    }

    #[test]
    fn test_request_derived_values() {
        let req = request(3_000_000., 500_000., 10, 9., PaymentMethod::Annuity);
        assert_eq!(req.loan_amount(), 2_500_000.);
        assert_close(req.monthly_rate(), 0.0075, 1e-15);
        assert_eq!(req.term_months(), 120);
    }

    #[test]
    fn test_annuity_scenario() {
        let schedule = scenario(PaymentMethod::Annuity);
        let summary = schedule.get_summary();

        assert_eq!(schedule.get_pmt_count(), 120);
        assert_eq!(schedule.loan_amount(), 2_500_000.);
        assert_close(summary.first_month_payment, 31_668.94, 0.01);
        assert_close(summary.total_interest, 1_300_273.21, 0.01);
        assert_close(summary.total_payment, 3_800_273.21, 0.01);
        assert_close(summary.minimum_required_income, 105_563.14, 0.01);
        assert_eq!(summary.total_payment, 2_500_000. + summary.total_interest);
        assert!(summary.total_interest > 0.);
    }

    #[test]
    fn test_annuity_schedule_amortizes() {
        let schedule = scenario(PaymentMethod::Annuity);
        let entries = schedule.entries();
        let payment = schedule.get_summary().first_month_payment;

        for pair in entries.windows(2) {
            assert_eq!(pair[0].total_payment, payment);
            assert!(pair[1].interest_portion < pair[0].interest_portion);
            assert!(pair[1].principal_portion > pair[0].principal_portion);
        }

        // first month: 2,500,000 * 0.0075
        assert_close(entries[0].interest_portion, 18_750., 1e-6);
        assert_close(entries[119].remaining_balance, 0., 1e-4);

        let interest: f64 = entries.iter().map(|e| e.interest_portion).sum();
        assert_close(interest, schedule.get_summary().total_interest, 1e-3);
    }

    #[test]
    fn test_annuity_zero_rate() {
        let schedule =
            compute_schedule(&request(1_000_000., 100_000., 7, 0., PaymentMethod::Annuity)).unwrap();
        let summary = schedule.get_summary();

        assert_eq!(summary.total_interest, 0.);
        assert_eq!(summary.first_month_payment, 900_000. / 84.);
        assert_eq!(summary.total_payment, 900_000.);
        assert_eq!(annuity_payment(900_000., 0., 84), 900_000. / 84.);
        assert!(schedule.entries().iter().all(|e| e.interest_portion == 0.));
    }

    #[test]
    fn test_annuity_tiny_rate_stays_finite() {
        let payment = annuity_payment(100_000., 1e-18, 360);
        assert!(payment.is_finite());
        assert_close(payment, 100_000. / 360., 1e-6);
    }

    #[test]
    fn test_annuity_steep_rate_stays_finite() {
        // (1 + r)^n alone would overflow here
        let payment = annuity_payment(1_000_000., 1000. / 12. / 100., 1200);
        assert!(payment.is_finite());
        assert_close(payment, 1_000_000. * 1000. / 12. / 100., 1e-3);
    }

    #[test]
    fn test_differentiated_scenario() {
        let annuity = scenario(PaymentMethod::Annuity);
        let schedule = scenario(PaymentMethod::Differentiated);
        let summary = schedule.get_summary();

        assert_close(summary.first_month_payment, 39_583.33, 0.01);
        assert_close(summary.total_interest, 1_134_375., 0.01);
        assert_close(summary.total_payment, 3_634_375., 0.01);
        assert_close(summary.minimum_required_income, 131_944.44, 0.01);

        assert!(summary.first_month_payment > annuity.get_summary().first_month_payment);
        assert!(summary.total_interest < annuity.get_summary().total_interest);
        for pair in schedule.entries().windows(2) {
            assert!(pair[1].total_payment < pair[0].total_payment);
        }
        assert_close(schedule.entries()[119].total_payment, 20_989.58, 0.01);
    }

    #[test]
    fn test_differentiated_principal_sums_to_loan() {
        let entries = differentiated_payments(777_777.77, 0.011, 301);
        let principal: f64 = entries.iter().map(|e| e.principal_portion).sum();

        assert_eq!(entries.len(), 301);
        assert_close(principal, 777_777.77, 1e-6);
        assert!(entries
            .windows(2)
            .all(|pair| pair[1].total_payment <= pair[0].total_payment));
        assert_close(entries[300].remaining_balance, 0., 1e-6);
    }

    #[test]
    fn test_differentiated_zero_rate_is_flat() {
        let entries = differentiated_payments(1200., 0., 12);
        assert!(entries.iter().all(|e| e.total_payment == 100.));
    }

    #[test]
    fn test_income_uses_first_payment() {
        let schedule = scenario(PaymentMethod::Differentiated);
        let first = schedule.entries()[0].total_payment;
        assert_eq!(
            schedule.get_summary().minimum_required_income,
            first / MAX_PAYMENT_TO_INCOME
        );
    }

    #[test]
    fn test_compute_is_idempotent() {
        for method in [PaymentMethod::Annuity, PaymentMethod::Differentiated] {
            let req = request(450_000., 45_000., 25, 6.25, method);
            assert_eq!(compute_schedule(&req), compute_schedule(&req));
        }
    }

    #[test]
    fn test_pmt_lookup() {
        let schedule = compute_schedule(&request(1200., 0., 1, 0., PaymentMethod::Annuity)).unwrap();

        assert!(schedule.get_pmt_detail(0).is_none());
        assert_eq!(schedule.get_pmt_detail(1).unwrap().month_index, 1);
        assert_eq!(schedule.get_pmt_detail(12).unwrap().month_index, 12);
        assert!(schedule.get_pmt_detail(13).is_none());
        assert_eq!(
            schedule.get_pmt_info(1),
            "pmt number 1, payment 100.00, principal paid 100.00, interest paid 0.00, ending balance 1100.00"
        );
        assert_eq!(schedule.get_pmt_info(13), "No payment information.");
    }

    #[test]
    fn test_dated_schedule() {
        let schedule = compute_schedule(&request(1200., 0., 1, 12., PaymentMethod::Differentiated)).unwrap();
        let dated = schedule
            .dated(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap())
            .unwrap();

        assert_eq!(dated.len(), 12);
        assert_eq!(dated[0].pmt_date, NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());
        assert_eq!(dated[1].pmt_date, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert_eq!(dated[2].pmt_date, NaiveDate::from_ymd_opt(2024, 3, 31).unwrap());
        assert_eq!(dated[11].pmt_date, NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());
        assert_eq!(dated[0].entry, schedule.entries()[0]);
        assert_eq!(
            dated[0].to_string(),
            "pmt number 1, date 2024-01-31, payment 112.00, principal paid 100.00, interest paid 12.00, ending balance 1100.00"
        );
    }

    #[test]
    fn test_dated_schedule_out_of_range() {
        let schedule = compute_schedule(&request(1200., 0., 2, 5., PaymentMethod::Annuity)).unwrap();
        let result = schedule.dated(NaiveDate::MAX);
        assert_eq!(result, Err(DomainError::DateOutOfRange { month_index: 2 }));
    }

    #[test]
    fn test_unvalidated_requests_fail() {
        let zero_term = request(100., 10., 0, 5., PaymentMethod::Annuity);
        assert_eq!(compute_schedule(&zero_term), Err(DomainError::ZeroTerm));

        let no_loan = request(100., 100., 10, 5., PaymentMethod::Differentiated);
        assert_eq!(compute_schedule(&no_loan), Err(DomainError::NonPositiveLoan(0.)));

        let negative_rate = request(100., 10., 10, -12., PaymentMethod::Annuity);
        assert_eq!(
            compute_schedule(&negative_rate),
            Err(DomainError::NegativeRate(-0.01))
        );
    }

    #[test]
    fn test_overflowing_rate_fails() {
        let req = request(1e300, 0., 30, 1e300, PaymentMethod::Annuity);
        assert!(matches!(
            compute_schedule(&req),
            Err(DomainError::NonFinite { .. })
        ));
    }

    #[test]
    fn test_payment_method_from_str() {
        assert_eq!("annuity".parse(), Ok(PaymentMethod::Annuity));
        assert_eq!(" Differentiated ".parse(), Ok(PaymentMethod::Differentiated));
        assert_eq!("D".parse(), Ok(PaymentMethod::Differentiated));
        assert_eq!("Аннуитетный".parse(), Ok(PaymentMethod::Annuity));
        assert_eq!("Дифференцированный".parse(), Ok(PaymentMethod::Differentiated));
        assert_eq!(
            "balloon".parse::<PaymentMethod>(),
            Err(ValidationError::new(Field::Method, Reason::UnknownMethod))
        );
        assert_eq!(PaymentMethod::Differentiated.to_string(), "differentiated");
    }
}

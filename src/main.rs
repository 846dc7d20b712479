use chrono::NaiveDate;
use clap::Parser;
use log::{error, info};
use mortgage::loan::*;
use mortgage::{validate, validate_method, DomainError, ValidationError};
use simple_logger::SimpleLogger;
use std::process::ExitCode;
use thiserror::Error;

/// Mortgage repayment calculator
#[derive(Parser, Debug)]
#[command(name = "mortgage", version, about, allow_negative_numbers = true)]
struct Cli {
    /// Property price
    price: String,

    /// Down payment
    down_payment: String,

    /// Loan term in whole years
    term: String,

    /// Annual interest rate in percent
    rate: String,

    /// annuity or differentiated
    #[arg(short, long, default_value = "annuity")]
    method: String,

    /// Print every monthly payment
    #[arg(short, long)]
    schedule: bool,

    /// Date of the first payment, YYYY-MM-DD; dates the schedule
    #[arg(long, requires = "schedule")]
    first_payment: Option<NaiveDate>,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("input error: {0}")]
    Input(#[from] ValidationError),

    #[error("calculation error: {0}")]
    Domain(#[from] DomainError),
}

fn main() -> ExitCode {
    SimpleLogger::new()
        .with_level(log::LevelFilter::Warn)
        .env()
        .init()
        .unwrap();

    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => ExitCode::from(report(&err)),
    }
}

// input errors go to the user, domain errors to the log
fn report(err: &CliError) -> u8 {
    match err {
        CliError::Input(_) => {
            eprintln!("{}", err);
            2
        }
        CliError::Domain(_) => {
            error!("{}", err);
            1
        }
    }
}

fn run(cli: &Cli) -> Result<(), CliError> {
    let method = validate_method(&cli.method)?;
    let request = validate(&cli.price, &cli.down_payment, &cli.term, &cli.rate, method)?;
    info!(
        "loan {:.2} over {} months at {}%",
        request.loan_amount(),
        request.term_months(),
        request.annual_rate_percent()
    );

    let schedule = compute_schedule(&request)?;

    println!("method: {}", schedule.method());
    println!("{}", schedule.get_summary());

    if cli.schedule {
        println!();
        match cli.first_payment {
            Some(first_pmt_date) => {
                for pmt in schedule.dated(first_pmt_date)? {
                    println!("{}", pmt);
                }
            }
            None => schedule.show_amortization(),
        }
    }
    Ok(())
}

// verifies that types can implement the gated traits below
#[cfg(test)]
fn is_normal<T: Sized + Send + Sync + Unpin>() {}

#[test]
fn normal_types() {
    is_normal::<LoanRequest>();
    is_normal::<PaymentEntry>();
    is_normal::<LoanSummary>();
    is_normal::<Schedule>();
    is_normal::<ValidationError>();
    is_normal::<DomainError>();
}

#[test]
fn cli_parses_form_values() {
    let cli = Cli::try_parse_from([
        "mortgage",
        "3000000",
        "500000",
        "10",
        "9",
        "--method",
        "differentiated",
        "--schedule",
        "--first-payment",
        "2024-04-01",
    ])
    .unwrap();

    assert_eq!(cli.price, "3000000");
    assert_eq!(cli.method, "differentiated");
    assert!(cli.schedule);
    assert_eq!(cli.first_payment, NaiveDate::from_ymd_opt(2024, 4, 1));
    assert!(run(&cli).is_ok());
}

#[test]
fn cli_reports_input_errors() {
    let cli = Cli::try_parse_from(["mortgage", "1000000", "1000000", "10", "9"]).unwrap();
    assert!(matches!(run(&cli), Err(CliError::Input(_))));

    let cli = Cli::try_parse_from(["mortgage", "-5", "0", "10", "9"]).unwrap();
    let err = run(&cli).unwrap_err();
    assert!(matches!(err, CliError::Input(_)));
    assert_eq!(report(&err), 2);

    let cli = Cli::try_parse_from(["mortgage", "1e308", "0", "30", "9"]).unwrap();
    assert!(matches!(run(&cli), Err(CliError::Input(_))));
}

#[test]
fn cli_reports_domain_errors() {
    // the second payment date falls past the last representable day
    let cli = Cli {
        price: "1200".to_string(),
        down_payment: "0".to_string(),
        term: "1".to_string(),
        rate: "5".to_string(),
        method: "annuity".to_string(),
        schedule: true,
        first_payment: Some(NaiveDate::MAX),
    };

    let err = run(&cli).unwrap_err();
    assert!(matches!(
        err,
        CliError::Domain(DomainError::DateOutOfRange { month_index: 2 })
    ));
    assert_eq!(report(&err), 1);
}

use std::error::Error;
use std::path::Path;
use std::process::exit;

use clap::Parser;
use rusqlite::Connection;
use time::{Duration, OffsetDateTime};

use pfm_scheduler::{
    CategoryName, Interval, NewRecurringTransaction, Schedule, create_account, create_category,
    create_recurring_transaction, create_user, initialize_db,
};

/// A utility for creating a test database for the pfm_scheduler server.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to save the SQLite database to.
    #[arg(long, short)]
    output_path: String,
}

/// Create and populate a database for manual testing.
///
/// The recurring transactions start in the past so the scheduler has work to
/// catch up on as soon as the server starts.
fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let output_path = Path::new(&args.output_path);

    match output_path.extension() {
        None => {
            eprintln!("Output path must include a file extension (e.g., 'my_database.db').");
            exit(1);
        }
        Some(extension) if extension.is_empty() => {
            eprintln!("Output path must include a file extension (e.g., 'my_database.db').");
            exit(1);
        }
        _ => {}
    }

    if output_path.is_file() {
        eprintln!("File already exists at {output_path:#?}!");
        exit(1);
    }

    println!("Creating database at {output_path:#?}");
    let conn = Connection::open(output_path)?;

    initialize_db(&conn)?;

    println!("Creating test user...");
    let user = create_user("test@example.com", &conn)?;
    let account = create_account(user.id, "Everyday", &conn)?;
    let bills = create_category(user.id, CategoryName::new("Bills")?, &conn)?;
    let income = create_category(user.id, CategoryName::new("Income")?, &conn)?;

    println!("Creating recurring transactions...");
    let now = OffsetDateTime::now_utc();
    let rules = [
        ("Salary", 3200.0, income.id, Interval::Monthly, Some(15), None),
        ("Rent", -1450.0, bills.id, Interval::Monthly, Some(31), None),
        ("Gym", -15.0, bills.id, Interval::Weekly, None, Some(1)),
        ("Coffee", -4.5, bills.id, Interval::Daily, None, None),
        ("Domain renewal", -20.0, bills.id, Interval::Yearly, None, None),
    ];

    for (description, amount, category_id, interval, day_of_month, day_of_week) in rules {
        create_recurring_transaction(
            user.id,
            NewRecurringTransaction {
                account_id: account.id,
                category_id,
                amount,
                description: description.to_owned(),
                schedule: Schedule {
                    interval,
                    day_of_month,
                    day_of_week,
                    start_date: now - Duration::days(45),
                    end_date: None,
                },
            },
            now,
            &conn,
        )?;
    }

    println!("Success!");

    Ok(())
}

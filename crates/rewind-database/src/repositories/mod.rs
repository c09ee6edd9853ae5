//! PostgreSQL implementations of the storage traits.

pub mod credit;
pub mod film;
pub mod rental;

pub use credit::PgCreditLedger;
pub use film::PgCatalog;
pub use rental::PgRentalStore;

use rewind_core::error::{AppError, ErrorKind};

fn db_error(message: &str, e: sqlx::Error) -> AppError {
    AppError::with_source(ErrorKind::Database, message.to_string(), e)
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .is_some_and(|db_err| db_err.is_unique_violation())
}

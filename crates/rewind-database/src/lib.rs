//! # rewind-database
//!
//! PostgreSQL connection management, the storage traits the rental engine
//! is written against, their PostgreSQL repositories, and an in-memory
//! implementation for single-node use and tests.

pub mod connection;
pub mod memory;
pub mod migration;
pub mod repositories;
pub mod store;

pub use connection::DatabasePool;
pub use memory::MemoryStore;
pub use store::{AdmitOutcome, Catalog, ClaimOutcome, CreditLedger, DebitOutcome, RentalFilter, RentalStore};

//! # rewind-core
//!
//! Core crate for Rewind, the rental lifecycle and streaming access engine.
//! Contains configuration schemas, typed identifiers, domain events, the
//! access point provisioner trait, and the unified error system.
//!
//! This crate has **no** internal dependencies on other Rewind crates.

pub mod config;
pub mod error;
pub mod events;
pub mod result;
pub mod traits;
pub mod types;

pub use error::AppError;
pub use result::AppResult;

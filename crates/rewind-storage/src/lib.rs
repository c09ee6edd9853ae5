//! # rewind-storage
//!
//! Access point provisioners for Rewind. An access point is a token-named
//! indirection that exposes one rental's media files to the delivery
//! layer without revealing where they live.

pub mod manager;
pub mod providers;

pub use manager::ProvisionerDispatch;

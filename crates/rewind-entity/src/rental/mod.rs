//! Rental domain entities.

pub mod mode;
pub mod model;
pub mod tier;

pub use mode::{RentalEndReason, ViewingMode};
pub use model::{NewRental, Rental};
pub use tier::RentalTier;

//! # rewind-entity
//!
//! Domain entity models for Rewind. Every struct in this crate represents
//! a database table row or a domain value object. Database entities derive
//! `sqlx::FromRow`.

pub mod credit;
pub mod film;
pub mod rental;

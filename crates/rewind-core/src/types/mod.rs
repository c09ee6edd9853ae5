//! Core type definitions used across the Rewind workspace.

pub mod id;

pub use id::*;

//! Core traits defined in `rewind-core` and implemented by other crates.

pub mod access;

pub use access::{AccessPoint, AccessProvisioner, AssetKind, MediaAssets, StreamingUrl};

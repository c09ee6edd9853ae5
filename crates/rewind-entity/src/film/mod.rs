//! Catalog entities, as this engine sees them.

pub mod model;

pub use model::FilmListing;

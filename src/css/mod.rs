//! CSS tokenization and observation extraction (C3, spec §4.3).

pub mod color;
pub mod extract;
pub mod observations;
pub mod syntax;

pub use observations::Observations;
pub use syntax::{parse_stylesheet, Stylesheet};

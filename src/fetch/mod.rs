//! Fetcher (C1, spec §4.1): retrieves an HTML document and every CSS source
//! it references, honoring robots.txt and the size/timeout/redirect caps.

pub mod bundle;
pub mod client;
pub mod html;
pub mod robots;

pub use bundle::{FetchBundle, FetchedSource};
pub use client::fetch;

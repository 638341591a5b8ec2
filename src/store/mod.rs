//! Relational persistence: the strict foreign-key graph rooted at `Site`
//! (spec §3, §6), plus the content-addressed CSS store (C2, spec §4.2).

mod db;
mod schema;

pub mod css;
pub mod layout;
pub mod scan;
pub mod site;
pub mod stats;
pub mod tokens;
pub mod votes;

pub use css::SweepReport;
pub use db::Db;

//! # Motif - Design Token Extraction and Storage Service
//!
//! Motif crawls a website's stylesheets, clusters the raw declarations it
//! finds into a canonical set of W3C DTCG design tokens, and keeps a
//! versioned history of that set per site.
//!
//! ## Quick Start
//!
//! ```no_run
//! use motif::config::Config;
//! use motif::orchestrator::Orchestrator;
//! use motif::store::Db;
//!
//! # async fn run() -> motif::error::Result<()> {
//! let config = Config::load(None)?;
//! let db = Db::open(&config.database_url)?;
//! let orchestrator = Orchestrator::new(db, config);
//! orchestrator.submit("https://example.com", motif::config::Quality::Standard).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **Fetch**: robots-respecting stylesheet/inline-style discovery
//! - **CSS**: tokenizer, color parsing, observation extraction
//! - **Consensus**: clustering raw observations into canonical tokens
//! - **Layout**: page-shape profiling alongside the same scan
//! - **Version**: diff engine, atomic TokenSet persistence
//! - **Orchestrator**: per-site concurrency, progress, cancellation
//! - **Query / HTTP**: read-side search and the public API surface
//! - **CLI**: operator commands (`scan`, `health`, `optimize`, `sweep`, `serve`)

pub mod cli;
pub mod config;
pub mod consensus;
pub mod css;
pub mod enrich;
pub mod error;
pub mod fetch;
pub mod http;
pub mod layout;
pub mod logging;
pub mod model;
pub mod orchestrator;
pub mod query;
pub mod store;
pub mod version;

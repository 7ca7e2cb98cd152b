//! # Scour Search
//!
//! The query side of the service: resolves an optional search path to one
//! or more workspace roots, drives the engine's `search`/`files` verbs,
//! parses the line-oriented output defensively, and aggregates results
//! across roots under a single ceiling with honest `capped` semantics.

mod error;
mod parse;
mod query;
mod scope;

pub use error::{Result, SearchError};
pub use parse::{parse_match_line, parse_search_summary, strip_fuzzy_score};
pub use query::QueryEngine;

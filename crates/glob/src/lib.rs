//! # Scour Glob
//!
//! Compiles the restricted glob dialect used for search-path scoping into
//! anchored regular expressions, and converts editor-style ignore globs
//! into exclude fragments the indexing engine's own regex dialect accepts.
//!
//! Supported scoping tokens: literals, `?` (one non-separator character),
//! `*` (any run of non-separator characters), `**/` (any run of path
//! segments), bare `**` (anything), `[...]` / `[!...]` / `[^...]` classes,
//! and `{a,b}` alternation. Separator runs collapse to one and a leading
//! `./` is stripped before compilation.

mod error;
mod ignore;
mod pattern;

pub use error::{GlobError, Result};
pub use ignore::ignore_glob_to_engine_regex;
pub use pattern::{has_glob_metachars, normalize_path, CompiledGlob, PatternScope};

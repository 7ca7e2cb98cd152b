//! Argument vectors for the engine's fixed verb grammar. Centralized here
//! so every caller emits flags in the order the engine parses them:
//! `[fi<regex>] [i] [L<limit>] [S]` before the trailing query.

use std::path::Path;

/// Case flag slot: `i` forces insensitive, no flag forces sensitive, `S`
/// asks the engine for smart-case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseFlag {
    Sensitive,
    Insensitive,
    Smart,
}

/// Query-time flags shared by `search` and `files`.
#[derive(Debug, Clone)]
pub struct QueryFlags {
    /// Path-filter regex, passed as `fi<regex>`.
    pub path_filter: Option<String>,
    pub case: CaseFlag,
    /// Engine-side output ceiling, passed as `L<limit>`.
    pub limit: usize,
}

#[must_use]
pub fn init_args(config_path: &Path, root: &Path) -> Vec<String> {
    vec![
        "init".to_string(),
        config_path.display().to_string(),
        root.display().to_string(),
    ]
}

#[must_use]
pub fn update_args(config_path: &Path) -> Vec<String> {
    vec!["update".to_string(), config_path.display().to_string()]
}

#[must_use]
pub fn build_args(config_path: &Path) -> Vec<String> {
    vec!["build".to_string(), config_path.display().to_string()]
}

#[must_use]
pub fn watch_args(config_path: &Path) -> Vec<String> {
    vec!["watch".to_string(), config_path.display().to_string()]
}

#[must_use]
pub fn search_args(config_path: &Path, flags: &QueryFlags, query: &str) -> Vec<String> {
    let mut args = vec!["search".to_string(), config_path.display().to_string()];
    push_query_flags(&mut args, flags);
    args.push(query.to_string());
    args
}

#[must_use]
pub fn files_args(config_path: &Path, flags: &QueryFlags, mode: &str, query: &str) -> Vec<String> {
    let mut args = vec!["files".to_string(), config_path.display().to_string()];
    push_query_flags(&mut args, flags);
    args.push(mode.to_string());
    args.push(query.to_string());
    args
}

fn push_query_flags(args: &mut Vec<String>, flags: &QueryFlags) {
    if let Some(filter) = &flags.path_filter {
        args.push(format!("fi{filter}"));
    }
    match flags.case {
        CaseFlag::Insensitive => args.push("i".to_string()),
        CaseFlag::Sensitive => {}
        CaseFlag::Smart => {}
    }
    args.push(format!("L{}", flags.limit));
    if flags.case == CaseFlag::Smart {
        args.push("S".to_string());
    }
}

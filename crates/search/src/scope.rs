//! Search-path resolution: an optional scope argument narrows a query to
//! one root (absolute path or `WorkspaceName/relative`), to a uniquely
//! resolving bare relative path, or fans out through a glob.

use crate::error::{Result, SearchError};
use scour_glob::{has_glob_metachars, normalize_path, CompiledGlob, PatternScope};
use scour_indexer::RootInfo;

/// Where a query runs and how its results are narrowed.
#[derive(Debug)]
pub(crate) struct ScopePlan {
    pub targets: Vec<RootInfo>,
    /// Engine-side path filter (`fi<regex>`), anchored to the resolved
    /// scope. Only produced for single-root scopes.
    pub filter: Option<String>,
    /// Client-side matcher for glob scopes; applied to returned paths.
    pub matcher: Option<CompiledGlob>,
}

pub(crate) fn resolve_scope(search_path: Option<&str>, roots: &[RootInfo]) -> Result<ScopePlan> {
    if roots.is_empty() {
        return Err(SearchError::NoRoots);
    }

    let Some(raw) = search_path.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(ScopePlan {
            targets: roots.to_vec(),
            filter: None,
            matcher: None,
        });
    };

    let normalized = normalize_path(raw);

    if has_glob_metachars(&normalized) {
        let scope = if is_absolute_like(&normalized) {
            PatternScope::Absolute
        } else {
            PatternScope::WorkspaceRelative
        };
        let matcher = CompiledGlob::compile(&normalized, scope)?;
        return Ok(ScopePlan {
            targets: roots.to_vec(),
            filter: None,
            matcher: Some(matcher),
        });
    }

    if is_absolute_like(&normalized) {
        return resolve_absolute(&normalized, roots);
    }

    if let Some(plan) = resolve_name_prefixed(&normalized, roots)? {
        return Ok(plan);
    }

    resolve_bare_relative(&normalized, roots)
}

fn resolve_absolute(path: &str, roots: &[RootInfo]) -> Result<ScopePlan> {
    for root in roots {
        let root_str = normalize_path(&root.root.display().to_string());
        let Some(rest) = path.strip_prefix(&root_str) else {
            continue;
        };
        let relative = match rest.strip_prefix('/') {
            Some(relative) => relative,
            None if rest.is_empty() => "",
            None => continue, // prefix ended mid-segment
        };
        return Ok(ScopePlan {
            targets: vec![root.clone()],
            filter: anchored_filter(root, relative),
            matcher: None,
        });
    }
    Err(SearchError::PathOutOfScope(path.to_string()))
}

/// `WorkspaceName/relative` (or a bare workspace name) takes precedence
/// over relative-path probing.
fn resolve_name_prefixed(path: &str, roots: &[RootInfo]) -> Result<Option<ScopePlan>> {
    let (first, rest) = match path.split_once('/') {
        Some((first, rest)) => (first, rest),
        None => (path, ""),
    };

    let named: Vec<&RootInfo> = roots.iter().filter(|root| root.name == first).collect();
    match named.len() {
        0 => Ok(None),
        1 => Ok(Some(ScopePlan {
            targets: vec![named[0].clone()],
            filter: anchored_filter(named[0], rest),
            matcher: None,
        })),
        _ => Err(SearchError::AmbiguousPath {
            path: path.to_string(),
            candidates: join_names(&named),
        }),
    }
}

/// A bare relative path must exist under exactly one root.
fn resolve_bare_relative(path: &str, roots: &[RootInfo]) -> Result<ScopePlan> {
    let owners: Vec<&RootInfo> = roots
        .iter()
        .filter(|root| root.root.join(path).exists())
        .collect();
    match owners.len() {
        0 => Err(SearchError::PathOutOfScope(path.to_string())),
        1 => Ok(ScopePlan {
            targets: vec![owners[0].clone()],
            filter: anchored_filter(owners[0], path),
            matcher: None,
        }),
        _ => Err(SearchError::AmbiguousPath {
            path: path.to_string(),
            candidates: join_names(&owners),
        }),
    }
}

/// Builds the anchored engine filter for a workspace-relative scope. A
/// directory scope matches everything under it, a file scope exactly
/// itself; when the path is absent from disk the bare prefix anchor is
/// the best available narrowing.
fn anchored_filter(root: &RootInfo, relative: &str) -> Option<String> {
    let relative = relative.trim_matches('/');
    if relative.is_empty() {
        return None;
    }
    let escaped = escape_regex(relative);
    let on_disk = root.root.join(relative);
    if on_disk.is_file() {
        Some(format!("^{escaped}$"))
    } else if on_disk.is_dir() {
        Some(format!("^{escaped}/"))
    } else {
        Some(format!("^{escaped}"))
    }
}

fn is_absolute_like(path: &str) -> bool {
    if path.starts_with('/') {
        return true;
    }
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

fn join_names(roots: &[&RootInfo]) -> String {
    let mut names: Vec<&str> = roots.iter().map(|root| root.name.as_str()).collect();
    names.sort_unstable();
    names.join(", ")
}

fn escape_regex(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(
            ch,
            '.' | '^' | '$' | '*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '\\'
        ) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

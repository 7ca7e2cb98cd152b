//! Managed regions inside the engine's per-root config descriptor.
//!
//! The descriptor is plain line-oriented text owned by the engine, with
//! user-authored rules allowed anywhere. We own exactly three delimited
//! blocks (shader include rules, script include rules, derived exclude
//! rules) and rewrite their bodies wholesale on every sync, leaving the
//! rest of the file untouched.

use crate::error::Result;
use scour_glob::ignore_glob_to_engine_regex;
use std::collections::BTreeSet;
use std::path::Path;

pub const REGION_SHADER: &str = "shader";
pub const REGION_SCRIPT: &str = "script";
pub const REGION_EXCLUDE: &str = "exclude";

/// Exclude fragments present regardless of editor ignore configuration:
/// version control, common build/cache output, and our own index dir.
const BASELINE_EXCLUDES: &[&str] = &[
    r"\.git/",
    r"\.hg/",
    r"\.svn/",
    r"node_modules/",
    r"target/",
    r"build/",
    r"out/",
    r"\.cache/",
    r"\.scour/",
];

fn begin_marker(kind: &str) -> String {
    format!("# BEGIN scour {kind} rules")
}

fn end_marker(kind: &str) -> String {
    format!("# END scour {kind} rules")
}

/// Recomputed bodies for the three managed blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedRegions {
    pub shader_rules: Vec<String>,
    pub script_rules: Vec<String>,
    pub exclude_rules: Vec<String>,
}

impl ManagedRegions {
    /// Derives the region bodies from the configured source-set extensions
    /// and the host's ignore-pattern table (`true`-valued patterns only).
    /// Rules are deduplicated and sorted so repeated syncs are stable.
    #[must_use]
    pub fn derive(
        shader_extensions: &[String],
        script_extensions: &[String],
        ignore_patterns: &[(String, bool)],
    ) -> Self {
        let shader_rules = include_rules(shader_extensions);
        let script_rules = include_rules(script_extensions);

        let mut excludes: BTreeSet<String> =
            BASELINE_EXCLUDES.iter().map(|s| (*s).to_string()).collect();
        for (pattern, enabled) in ignore_patterns {
            if !enabled {
                continue;
            }
            match ignore_glob_to_engine_regex(pattern) {
                Some(fragment) => {
                    excludes.insert(fragment);
                }
                None => {
                    log::debug!("ignore pattern '{pattern}' is not expressible as an engine exclude; skipping");
                }
            }
        }
        let exclude_rules = excludes
            .into_iter()
            .map(|fragment| format!("exclude {fragment}"))
            .collect();

        Self {
            shader_rules,
            script_rules,
            exclude_rules,
        }
    }

    fn body(&self, kind: &str) -> &[String] {
        match kind {
            REGION_SHADER => &self.shader_rules,
            REGION_SCRIPT => &self.script_rules,
            _ => &self.exclude_rules,
        }
    }
}

fn include_rules(extensions: &[String]) -> Vec<String> {
    let unique: BTreeSet<String> = extensions
        .iter()
        .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect();
    unique
        .into_iter()
        .map(|ext| format!(r"include \.{ext}$"))
        .collect()
}

/// Applies all three regions to the descriptor text. Returns the new text
/// and whether anything changed. Pure so tests can cover marker handling
/// without touching disk.
#[must_use]
pub fn apply_regions(content: &str, regions: &ManagedRegions) -> (String, bool) {
    let crlf = content.contains("\r\n");
    let eol = if crlf { "\r\n" } else { "\n" };
    let had_trailing_newline = content.ends_with('\n');

    let mut lines: Vec<String> = content
        .split('\n')
        .map(|line| line.trim_end_matches('\r').to_string())
        .collect();
    if had_trailing_newline || content.is_empty() {
        // `split` leaves a phantom empty element after the last newline.
        lines.pop();
    }

    for kind in [REGION_SHADER, REGION_SCRIPT, REGION_EXCLUDE] {
        replace_region(&mut lines, kind, regions.body(kind));
    }

    let mut rebuilt = lines.join(eol);
    if !rebuilt.is_empty() {
        rebuilt.push_str(eol);
    }
    let changed = rebuilt != content;
    (rebuilt, changed)
}

/// Rewrites one managed block in place. With duplicated or mismatched
/// markers the malformed occurrences are left alone (logged) and the last
/// well-formed pair — or a freshly appended block — becomes the one we
/// own, so repeated syncs converge instead of corrupting the file.
fn replace_region(lines: &mut Vec<String>, kind: &str, body: &[String]) {
    let begin = begin_marker(kind);
    let end = end_marker(kind);

    let begin_indices: Vec<usize> = indices_of(lines, &begin);
    let end_indices: Vec<usize> = indices_of(lines, &end);

    let span = begin_indices
        .iter()
        .rev()
        .find_map(|&b| end_indices.iter().find(|&&e| e > b).map(|&e| (b, e)));

    match span {
        Some((b, e)) => {
            if begin_indices.len() > 1 || end_indices.len() > 1 {
                log::warn!(
                    "config has stray '{kind}' region markers; rewriting the last well-formed block"
                );
            }
            let mut block = Vec::with_capacity(body.len() + 2);
            block.push(begin.clone());
            block.extend(body.iter().cloned());
            block.push(end.clone());
            lines.splice(b..=e, block);
        }
        None => {
            if !begin_indices.is_empty() || !end_indices.is_empty() {
                log::warn!("config has a malformed '{kind}' region; appending a fresh block");
            }
            if lines.last().is_some_and(|line| !line.is_empty()) {
                lines.push(String::new());
            }
            lines.push(begin);
            lines.extend(body.iter().cloned());
            lines.push(end);
        }
    }
}

fn indices_of(lines: &[String], marker: &str) -> Vec<usize> {
    lines
        .iter()
        .enumerate()
        .filter_map(|(i, line)| (line.trim() == marker).then_some(i))
        .collect()
}

/// Reads, rewrites, and (only when changed) writes back the descriptor.
/// A missing file is treated as empty so a sync can create it.
pub async fn sync_config_file(path: &Path, regions: &ManagedRegions) -> Result<bool> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(err) => return Err(err.into()),
    };

    let (rebuilt, changed) = apply_regions(&content, regions);
    if changed {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, rebuilt).await?;
    }
    Ok(changed)
}

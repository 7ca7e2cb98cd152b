use crate::error::{GlobError, Result};
use regex::RegexBuilder;

/// Whether a pattern is matched against workspace-relative paths or
/// absolute ones. Relative patterns ignore any leading separator on both
/// the pattern and the candidate path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternScope {
    WorkspaceRelative,
    Absolute,
}

/// A glob compiled to an anchored regular expression.
#[derive(Debug, Clone)]
pub struct CompiledGlob {
    pattern: String,
    scope: PatternScope,
    regex: regex::Regex,
}

impl CompiledGlob {
    pub fn compile(pattern: &str, scope: PatternScope) -> Result<Self> {
        let prepared = prepare_pattern(pattern, scope);
        let chars: Vec<char> = prepared.chars().collect();
        let (body, _) = translate(&chars, pattern, true)?;
        let anchored = format!("^(?:{body})$");
        let regex = RegexBuilder::new(&anchored)
            .case_insensitive(cfg!(windows))
            .build()
            .map_err(|e| GlobError::BadExpression(e.to_string()))?;
        Ok(Self {
            pattern: pattern.to_string(),
            scope,
            regex,
        })
    }

    #[must_use]
    pub fn is_match(&self, path: &str) -> bool {
        let mut candidate = normalize_path(path);
        if self.scope == PatternScope::WorkspaceRelative {
            while candidate.starts_with('/') {
                candidate.remove(0);
            }
        }
        self.regex.is_match(&candidate)
    }

    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    #[must_use]
    pub fn scope(&self) -> PatternScope {
        self.scope
    }

    #[must_use]
    pub fn as_regex_str(&self) -> &str {
        self.regex.as_str()
    }
}

/// Folds backslash separators, collapses separator runs, and strips a
/// leading `./`.
#[must_use]
pub fn normalize_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut last_sep = false;
    for ch in path.chars() {
        let ch = if ch == '\\' { '/' } else { ch };
        if ch == '/' {
            if !last_sep {
                out.push('/');
            }
            last_sep = true;
        } else {
            out.push(ch);
            last_sep = false;
        }
    }
    if let Some(stripped) = out.strip_prefix("./") {
        stripped.to_string()
    } else {
        out
    }
}

/// True if the pattern contains an unescaped glob metacharacter. Used to
/// tell a literal search path from a glob one.
#[must_use]
pub fn has_glob_metachars(pattern: &str) -> bool {
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '*' | '?' | '[' | '{' => return true,
            _ => i += 1,
        }
    }
    false
}

fn prepare_pattern(pattern: &str, scope: PatternScope) -> String {
    let trimmed = pattern.strip_prefix("./").unwrap_or(pattern);
    let mut value = trimmed.to_string();
    if scope == PatternScope::WorkspaceRelative {
        while value.starts_with('/') {
            value.remove(0);
        }
    }
    value
}

/// Translates glob characters into a regex body. `seg_start` tracks
/// whether the cursor sits at a path-segment boundary, which decides how
/// `**/` collapses. Returns the body and the final boundary state so brace
/// alternatives can continue from the right context.
fn translate(chars: &[char], original: &str, seg_start: bool) -> Result<(String, bool)> {
    let mut out = String::new();
    let mut at_seg_start = seg_start;
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '\\' => {
                let Some(&escaped) = chars.get(i + 1) else {
                    return Err(GlobError::TrailingEscape(original.to_string()));
                };
                push_escaped(&mut out, escaped);
                at_seg_start = false;
                i += 2;
            }
            '?' => {
                out.push_str("[^/]");
                at_seg_start = false;
                i += 1;
            }
            '*' => {
                if chars.get(i + 1) == Some(&'*') {
                    if at_seg_start && chars.get(i + 2) == Some(&'/') {
                        // `**/` at a boundary: zero or more whole segments.
                        out.push_str("(?:[^/]+/)*");
                        i += 3;
                        while chars.get(i) == Some(&'/') {
                            i += 1;
                        }
                        at_seg_start = true;
                    } else {
                        out.push_str(".*");
                        at_seg_start = false;
                        i += 2;
                    }
                } else {
                    out.push_str("[^/]*");
                    at_seg_start = false;
                    i += 1;
                }
            }
            '[' => {
                let consumed = translate_class(&chars[i..], original, &mut out)?;
                at_seg_start = false;
                i += consumed;
            }
            '{' => {
                let (alternatives, consumed) = split_brace(&chars[i..], original)?;
                let mut bodies = Vec::with_capacity(alternatives.len());
                for alternative in &alternatives {
                    let (body, _) = translate(alternative, original, at_seg_start)?;
                    bodies.push(body);
                }
                out.push_str("(?:");
                out.push_str(&bodies.join("|"));
                out.push(')');
                at_seg_start = false;
                i += consumed;
            }
            '/' => {
                out.push('/');
                while chars.get(i) == Some(&'/') {
                    i += 1;
                }
                at_seg_start = true;
            }
            other => {
                push_escaped(&mut out, other);
                at_seg_start = false;
                i += 1;
            }
        }
    }

    Ok((out, at_seg_start))
}

/// Translates a `[...]` class starting at `chars[0] == '['`. Returns the
/// number of pattern characters consumed.
fn translate_class(chars: &[char], original: &str, out: &mut String) -> Result<usize> {
    debug_assert_eq!(chars.first(), Some(&'['));
    let mut i = 1;
    let negated = matches!(chars.get(i), Some('!' | '^'));
    if negated {
        i += 1;
    }

    let mut members = String::new();
    let mut first = true;
    loop {
        match chars.get(i) {
            None => return Err(GlobError::UnterminatedClass(original.to_string())),
            Some(']') if !first => break,
            Some('\\') => {
                let Some(&escaped) = chars.get(i + 1) else {
                    return Err(GlobError::TrailingEscape(original.to_string()));
                };
                push_class_member(&mut members, escaped);
                i += 2;
            }
            Some(&member) => {
                // A `]` in first position is a literal member.
                if member == '-' {
                    members.push('-');
                } else {
                    push_class_member(&mut members, member);
                }
                i += 1;
            }
        }
        first = false;
    }
    i += 1; // closing bracket

    out.push('[');
    if negated {
        out.push('^');
    }
    out.push_str(&members);
    out.push(']');
    Ok(i)
}

/// Splits a `{a,b,...}` group starting at `chars[0] == '{'` into its
/// top-level alternatives. Returns the alternatives and the characters
/// consumed including both braces.
fn split_brace(chars: &[char], original: &str) -> Result<(Vec<Vec<char>>, usize)> {
    debug_assert_eq!(chars.first(), Some(&'{'));
    let mut alternatives = Vec::new();
    let mut current = Vec::new();
    let mut depth = 1usize;
    let mut i = 1;

    while i < chars.len() {
        match chars[i] {
            '\\' => {
                current.push('\\');
                if let Some(&escaped) = chars.get(i + 1) {
                    current.push(escaped);
                    i += 2;
                } else {
                    return Err(GlobError::TrailingEscape(original.to_string()));
                }
            }
            '{' => {
                depth += 1;
                current.push('{');
                i += 1;
            }
            '}' => {
                depth -= 1;
                if depth == 0 {
                    alternatives.push(current);
                    return Ok((alternatives, i + 1));
                }
                current.push('}');
                i += 1;
            }
            ',' if depth == 1 => {
                alternatives.push(std::mem::take(&mut current));
                i += 1;
            }
            other => {
                current.push(other);
                i += 1;
            }
        }
    }

    Err(GlobError::UnterminatedBrace(original.to_string()))
}

fn push_escaped(out: &mut String, ch: char) {
    if is_regex_special(ch) {
        out.push('\\');
    }
    out.push(ch);
}

fn push_class_member(members: &mut String, ch: char) {
    if matches!(ch, '\\' | ']' | '[' | '^' | '&' | '~') {
        members.push('\\');
    }
    members.push(ch);
}

fn is_regex_special(ch: char) -> bool {
    matches!(
        ch,
        '.' | '^' | '$' | '*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '\\'
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn compile(pattern: &str) -> CompiledGlob {
        CompiledGlob::compile(pattern, PatternScope::WorkspaceRelative).unwrap()
    }

    #[test]
    fn literal_matches_exactly() {
        let glob = compile("src/main.rs");
        assert!(glob.is_match("src/main.rs"));
        assert!(!glob.is_match("src/main_rs"));
        assert!(!glob.is_match("lib/src/main.rs"));
    }

    #[test]
    fn star_stays_within_segment() {
        let glob = compile("src/*.rs");
        assert!(glob.is_match("src/main.rs"));
        assert!(!glob.is_match("src/nested/main.rs"));
    }

    #[test]
    fn question_mark_is_one_character() {
        let glob = compile("file?.txt");
        assert!(glob.is_match("file1.txt"));
        assert!(!glob.is_match("file.txt"));
        assert!(!glob.is_match("file12.txt"));
        assert!(!glob.is_match("file/.txt"));
    }

    #[test]
    fn double_star_spans_segments() {
        let glob = compile("src/**/mod.rs");
        assert!(glob.is_match("src/mod.rs"));
        assert!(glob.is_match("src/a/mod.rs"));
        assert!(glob.is_match("src/a/b/mod.rs"));
        assert!(!glob.is_match("lib/a/mod.rs"));
    }

    #[test]
    fn bare_double_star_matches_anything() {
        let glob = compile("src/**");
        assert!(glob.is_match("src/a"));
        assert!(glob.is_match("src/a/b.rs"));
        assert!(!glob.is_match("lib/a"));
    }

    #[test]
    fn brace_alternation() {
        let glob = compile("src/*.{rs,toml}");
        assert!(glob.is_match("src/main.rs"));
        assert!(glob.is_match("src/Cargo.toml"));
        assert!(!glob.is_match("src/main.md"));
    }

    #[test]
    fn nested_braces() {
        let glob = compile("{src,crates/{a,b}}/lib.rs");
        assert!(glob.is_match("src/lib.rs"));
        assert!(glob.is_match("crates/a/lib.rs"));
        assert!(glob.is_match("crates/b/lib.rs"));
        assert!(!glob.is_match("crates/c/lib.rs"));
    }

    #[test]
    fn character_classes() {
        let glob = compile("file[0-9].rs");
        assert!(glob.is_match("file3.rs"));
        assert!(!glob.is_match("filex.rs"));

        let negated = compile("file[!0-9].rs");
        assert!(negated.is_match("filex.rs"));
        assert!(!negated.is_match("file3.rs"));

        let caret = compile("file[^ab].rs");
        assert!(caret.is_match("filec.rs"));
        assert!(!caret.is_match("filea.rs"));
    }

    #[test]
    fn separator_runs_collapse() {
        let glob = compile("src//main.rs");
        assert!(glob.is_match("src/main.rs"));
        assert!(glob.is_match("src//main.rs"));
    }

    #[test]
    fn leading_dot_slash_is_stripped() {
        let glob = compile("./src/main.rs");
        assert!(glob.is_match("src/main.rs"));
        assert!(glob.is_match("./src/main.rs"));
    }

    #[test]
    fn backslash_separators_in_candidate() {
        let glob = compile("src/*.rs");
        assert!(glob.is_match("src\\main.rs"));
    }

    #[test]
    fn escaped_metachar_is_literal() {
        let glob = compile(r"weird\*name.rs");
        assert!(glob.is_match("weird*name.rs"));
        assert!(!glob.is_match("weirdXname.rs"));
    }

    #[test]
    fn unterminated_class_is_rejected() {
        let err = CompiledGlob::compile("src/[abc", PatternScope::WorkspaceRelative).unwrap_err();
        assert_eq!(err, GlobError::UnterminatedClass("src/[abc".to_string()));
    }

    #[test]
    fn unterminated_brace_is_rejected() {
        let err = CompiledGlob::compile("src/{a,b", PatternScope::WorkspaceRelative).unwrap_err();
        assert_eq!(err, GlobError::UnterminatedBrace("src/{a,b".to_string()));
    }

    #[test]
    fn trailing_backslash_is_rejected() {
        let err = CompiledGlob::compile("src\\", PatternScope::WorkspaceRelative).unwrap_err();
        assert_eq!(err, GlobError::TrailingEscape("src\\".to_string()));
    }

    #[test]
    fn absolute_scope_keeps_leading_separator() {
        let glob = CompiledGlob::compile("/work/**/*.rs", PatternScope::Absolute).unwrap();
        assert!(glob.is_match("/work/app/src/main.rs"));
        assert!(!glob.is_match("work/app/src/main.rs"));
    }

    #[test]
    fn metachar_detection_skips_escapes() {
        assert!(has_glob_metachars("src/*.rs"));
        assert!(has_glob_metachars("src/{a,b}"));
        assert!(!has_glob_metachars("src/main.rs"));
        assert!(!has_glob_metachars(r"literal\*star"));
    }

    #[test]
    fn normalize_collapses_and_strips() {
        assert_eq!(normalize_path("./a//b\\c"), "a/b/c");
    }
}

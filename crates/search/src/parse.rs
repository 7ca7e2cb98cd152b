//! Parsers for the engine's line-oriented query output. Malformed lines
//! are dropped by the callers, never fatal.

/// One parsed `path:line:preview` match line. The line number must be a
/// positive integer; a `C:`-style drive prefix is not mistaken for the
/// separator.
#[must_use]
pub fn parse_match_line(line: &str) -> Option<(&str, u32, &str)> {
    let bytes = line.as_bytes();
    let mut search_from = 0;
    // Skip the colon of a Windows drive prefix.
    if bytes.len() > 2
        && bytes[1] == b':'
        && bytes[0].is_ascii_alphabetic()
        && (bytes[2] == b'\\' || bytes[2] == b'/')
    {
        search_from = 2;
    }

    let mut cursor = search_from;
    while let Some(offset) = line[cursor..].find(':') {
        let colon = cursor + offset;
        let rest = &line[colon + 1..];
        if let Some((digits, preview)) = rest.split_once(':') {
            if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
                if let Ok(number) = digits.parse::<u32>() {
                    if number >= 1 {
                        return Some((&line[..colon], number, preview));
                    }
                }
            }
        }
        cursor = colon + 1;
    }
    None
}

/// The trailing `Search complete, found N[+] matches in ...` summary.
/// Returns the reported count and whether the engine hit its own output
/// cap (the `+` suffix).
#[must_use]
pub fn parse_search_summary(line: &str) -> Option<(u64, bool)> {
    let rest = line.trim().strip_prefix("Search complete, found ")?;
    let digits_end = rest.find(|c: char| !c.is_ascii_digit())?;
    if digits_end == 0 {
        return None;
    }
    let count: u64 = rest[..digits_end].parse().ok()?;
    let mut tail = &rest[digits_end..];
    let capped = tail.starts_with('+');
    if capped {
        tail = &tail[1..];
    }
    tail.trim_start()
        .starts_with("matches")
        .then_some((count, capped))
}

/// Strips the optional leading relevance score from a fuzzy `files` line:
/// one or more digits (optionally `.` and more digits) followed by exactly
/// one tab or one space. Anything else is a bare path.
#[must_use]
pub fn strip_fuzzy_score(line: &str) -> &str {
    let bytes = line.as_bytes();
    if bytes.first().map_or(true, |b| !b.is_ascii_digit()) {
        return line;
    }
    let mut idx = 0;
    let mut seen_dot = false;
    while idx < bytes.len() {
        match bytes[idx] {
            b'0'..=b'9' => idx += 1,
            b'.' if !seen_dot => {
                seen_dot = true;
                idx += 1;
            }
            _ => break,
        }
    }
    match bytes.get(idx) {
        Some(b'\t' | b' ') if idx + 1 < bytes.len() => &line[idx + 1..],
        _ => line,
    }
}

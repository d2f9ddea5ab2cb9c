//! Unified diffs: creation through `similar`, strict application.
//!
//! Application tolerates hunks that moved (line offsets) but never fuzzes
//! context: every context and removed line must match exactly.

use similar::TextDiff;

use crate::error::PatchError;

/// Unified diff of `old → new` with three lines of context.
pub fn create_unified_diff(old: &str, new: &str, old_header: &str, new_header: &str) -> String {
    TextDiff::from_lines(old, new)
        .unified_diff()
        .header(old_header, new_header)
        .context_radius(3)
        .to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Hunk {
    old_start: usize,
    old_len: usize,
    lines: Vec<(char, String)>,
}

fn parse_range(spec: &str) -> Option<(usize, usize)> {
    match spec.split_once(',') {
        Some((start, len)) => Some((start.parse().ok()?, len.parse().ok()?)),
        None => Some((spec.parse().ok()?, 1)),
    }
}

fn parse_header(line: &str) -> Result<(usize, usize), PatchError> {
    let bad = || PatchError::BadHeader {
        line: line.trim_end().to_string(),
    };
    let inner = line
        .strip_prefix("@@ -")
        .and_then(|rest| rest.split_once(" @@"))
        .map(|(ranges, _)| ranges)
        .ok_or_else(bad)?;
    let (old, _new) = inner.split_once(" +").ok_or_else(bad)?;
    parse_range(old).ok_or_else(bad)
}

fn parse(diff: &str) -> Result<Vec<Hunk>, PatchError> {
    let mut hunks: Vec<Hunk> = Vec::new();
    for (number, line) in diff.split_inclusive('\n').enumerate() {
        if line.starts_with("@@") {
            let (old_start, old_len) = parse_header(line)?;
            hunks.push(Hunk {
                old_start,
                old_len,
                lines: Vec::new(),
            });
            continue;
        }
        let Some(hunk) = hunks.last_mut() else {
            // File headers and anything else before the first hunk.
            continue;
        };
        let mut chars = line.chars();
        match chars.next() {
            Some(tag @ (' ' | '-' | '+')) => hunk.lines.push((tag, chars.as_str().to_string())),
            Some('\\') => {
                if let Some((_, text)) = hunk.lines.last_mut() {
                    if text.ends_with('\n') {
                        text.pop();
                    }
                }
            }
            Some('\n') | None => hunk.lines.push((' ', "\n".to_string())),
            Some(_) => {
                return Err(PatchError::UnexpectedLine {
                    line_number: number + 1,
                    line: line.trim_end().to_string(),
                })
            }
        }
    }
    Ok(hunks)
}

/// Apply `diff` to `original`.
pub fn apply_unified_diff(original: &str, diff: &str) -> Result<String, PatchError> {
    let hunks = parse(diff)?;
    let source: Vec<&str> = original.split_inclusive('\n').collect();
    let mut out = String::with_capacity(original.len());
    let mut cursor = 0;

    for (index, hunk) in hunks.iter().enumerate() {
        let expected: Vec<&str> = hunk
            .lines
            .iter()
            .filter(|(tag, _)| *tag != '+')
            .map(|(_, text)| text.as_str())
            .collect();
        let target = if hunk.old_len == 0 {
            hunk.old_start
        } else {
            hunk.old_start.saturating_sub(1)
        };
        let position = find_hunk(&source, &expected, target, cursor).ok_or(PatchError::HunkMismatch {
            hunk: index + 1,
            old_start: hunk.old_start,
        })?;

        for line in &source[cursor..position] {
            out.push_str(line);
        }
        for (tag, text) in &hunk.lines {
            if *tag != '-' {
                out.push_str(text);
            }
        }
        cursor = position + expected.len();
    }
    for line in &source[cursor..] {
        out.push_str(line);
    }
    Ok(out)
}

/// Nearest position at or after `floor` where `expected` matches exactly,
/// searching outward from `target`.
fn find_hunk(source: &[&str], expected: &[&str], target: usize, floor: usize) -> Option<usize> {
    if expected.len() > source.len() {
        return None;
    }
    let last = source.len() - expected.len();
    let matches_at = |pos: usize| {
        pos >= floor && pos <= last && source[pos..pos + expected.len()] == *expected
    };
    let target = target.min(last);
    for offset in 0..=source.len() {
        if matches_at(target + offset) {
            return Some(target + offset);
        }
        if offset <= target && matches_at(target - offset) {
            return Some(target - offset);
        }
        if target + offset > last && offset > target {
            break;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(old: &str, new: &str) {
        let diff = create_unified_diff(old, new, "a/f", "b/f");
        assert_eq!(apply_unified_diff(old, &diff).unwrap(), new, "diff:\n{diff}");
    }

    #[test]
    fn patch_reproduces_the_edited_file() {
        roundtrip("a\nb\nc\nd\ne\nf\ng\nh\n", "a\nB\nc\nd\ne\nf\ng\nh\ni\n");
        roundtrip("one\ntwo\n", "zero\none\ntwo\n");
        roundtrip("keep\ndrop\n", "keep\n");
    }

    #[test]
    fn missing_trailing_newline_is_preserved() {
        roundtrip("a\nb", "a\nb\nc");
        roundtrip("a\nb\n", "a\nB");
    }

    #[test]
    fn hunk_applies_after_lines_shift() {
        let old = "1\n2\n3\n4\n5\n";
        let new = "1\n2\nTHREE\n4\n5\n";
        let diff = create_unified_diff(old, new, "a/f", "b/f");
        let shifted = format!("header\nheader\n{old}");
        assert_eq!(
            apply_unified_diff(&shifted, &diff).unwrap(),
            format!("header\nheader\n{new}")
        );
    }

    #[test]
    fn mismatched_context_is_rejected() {
        let diff = create_unified_diff("a\nb\nc\n", "a\nB\nc\n", "a/f", "b/f");
        let err = apply_unified_diff("x\ny\nz\n", &diff).unwrap_err();
        assert!(matches!(err, PatchError::HunkMismatch { hunk: 1, .. }));
    }

    #[test]
    fn malformed_header_is_rejected() {
        let err = apply_unified_diff("a\n", "@@ nonsense @@\n a\n").unwrap_err();
        assert!(matches!(err, PatchError::BadHeader { .. }));
    }
}

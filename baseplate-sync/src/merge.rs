//! Three-way merge of {previous generated, current generated, working copy}.
//!
//! The cheap equality rules run first; only when both sides changed the file
//! does a strategy do real work. The line strategy is a diff3 over
//! `similar`'s Myers diffs. Each side's hunks are the gaps between the runs
//! of lines it shares with the base, so hunks of one side never touch or
//! run backwards. Hunks of both sides are swept left to right and grouped
//! when their base ranges overlap. A group resolves to one side or to the
//! shared change, else to an inline conflict block with the working side
//! first.

use std::ops::Range;
use std::sync::Arc;

use serde_json::{Map, Value};
use similar::{capture_diff_slices, Algorithm, DiffTag};

pub const MARKER_WORKING: &str = "<<<<<<< working";
pub const MARKER_SEPARATOR: &str = "=======";
pub const MARKER_GENERATED: &str = ">>>>>>> generated";

/// Extensions that are never merged as text.
const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "avif", "pdf", "zip", "gz", "tgz", "tar",
    "xz", "7z", "woff", "woff2", "ttf", "otf", "eot", "mp3", "mp4", "mov", "wav", "wasm", "jar",
    "exe", "dll", "so", "dylib", "bin", "db", "sqlite",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeResult {
    pub merged_text: String,
    pub has_conflict: bool,
}

impl MergeResult {
    fn clean(text: impl Into<String>) -> Self {
        Self {
            merged_text: text.into(),
            has_conflict: false,
        }
    }
}

/// True when `path` has an extension that is never merged as text.
pub fn is_binary_path(path: &str) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => {
            let ext = ext.to_ascii_lowercase();
            BINARY_EXTENSIONS.contains(&ext.as_str())
        }
        _ => false,
    }
}

/// Merge with the default strategies. `None` when a binary `file_path`
/// would need a text merge.
pub fn merge(
    previous_generated: Option<&str>,
    current_generated: &str,
    previous_working: &str,
    file_path: &str,
) -> Option<MergeResult> {
    MergeStrategies::default().merge(previous_generated, current_generated, previous_working, file_path)
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

/// A merge algorithm for files where both sides changed.
pub trait MergeStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn merge(&self, base: &str, generated: &str, working: &str) -> MergeResult;
}

/// Line-based diff3.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineMerge;

impl MergeStrategy for LineMerge {
    fn name(&self) -> &'static str {
        "line"
    }

    fn merge(&self, base: &str, generated: &str, working: &str) -> MergeResult {
        merge_lines(base, generated, working)
    }
}

/// Key-wise merge of JSON objects, keeping the working file's key order.
/// Falls back to [`LineMerge`] when a value changed on both sides or any
/// input does not parse.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonMerge;

impl MergeStrategy for JsonMerge {
    fn name(&self) -> &'static str {
        "json"
    }

    fn merge(&self, base: &str, generated: &str, working: &str) -> MergeResult {
        match merge_json(base, generated, working) {
            Some(result) => result,
            None => {
                tracing::debug!("structured JSON merge not possible, using line merge");
                merge_lines(base, generated, working)
            }
        }
    }
}

/// Strategy selection by file extension.
#[derive(Clone)]
pub struct MergeStrategies {
    by_extension: Vec<(String, Arc<dyn MergeStrategy>)>,
    fallback: Arc<dyn MergeStrategy>,
}

impl Default for MergeStrategies {
    /// `*.json` through [`JsonMerge`], everything else through [`LineMerge`].
    fn default() -> Self {
        Self::line_only().with_extension("json", JsonMerge)
    }
}

impl std::fmt::Debug for MergeStrategies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let map: Vec<_> = self
            .by_extension
            .iter()
            .map(|(ext, s)| (ext.as_str(), s.name()))
            .collect();
        f.debug_struct("MergeStrategies")
            .field("by_extension", &map)
            .field("fallback", &self.fallback.name())
            .finish()
    }
}

impl MergeStrategies {
    pub fn line_only() -> Self {
        Self {
            by_extension: Vec::new(),
            fallback: Arc::new(LineMerge),
        }
    }

    pub fn with_extension(mut self, extension: &str, strategy: impl MergeStrategy + 'static) -> Self {
        let extension = extension.trim_start_matches('.').to_ascii_lowercase();
        self.by_extension.retain(|(ext, _)| *ext != extension);
        self.by_extension.push((extension, Arc::new(strategy)));
        self
    }

    pub fn for_path(&self, path: &str) -> &dyn MergeStrategy {
        let extension = path
            .rsplit('/')
            .next()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase());
        extension
            .and_then(|ext| {
                self.by_extension
                    .iter()
                    .find(|(candidate, _)| *candidate == ext)
            })
            .map(|(_, strategy)| strategy.as_ref())
            .unwrap_or(self.fallback.as_ref())
    }

    /// Apply the decision rules, in order:
    ///
    /// 1. no previous generation: take the generated text;
    /// 2. generator output unchanged: keep the working text;
    /// 3. working copy untouched: take the generated text;
    /// 4. otherwise run the strategy for `file_path`.
    ///
    /// Rule 4 is never applied to binary paths (`None`).
    pub fn merge(
        &self,
        previous_generated: Option<&str>,
        current_generated: &str,
        previous_working: &str,
        file_path: &str,
    ) -> Option<MergeResult> {
        let Some(base) = previous_generated else {
            return Some(MergeResult::clean(current_generated));
        };
        if current_generated == base {
            return Some(MergeResult::clean(previous_working));
        }
        if previous_working == base || previous_working == current_generated {
            return Some(MergeResult::clean(current_generated));
        }
        if is_binary_path(file_path) {
            tracing::debug!(path = file_path, "both sides changed a binary file, not merging");
            return None;
        }
        let strategy = self.for_path(file_path);
        tracing::trace!(path = file_path, strategy = strategy.name(), "three-way merge");
        Some(strategy.merge(base, current_generated, previous_working))
    }

    /// Byte-level entry point; contents that are not UTF-8 are not merged.
    pub fn merge_bytes(
        &self,
        previous_generated: Option<&[u8]>,
        current_generated: &[u8],
        previous_working: &[u8],
        file_path: &str,
    ) -> Option<MergeResult> {
        let base = match previous_generated {
            Some(bytes) => Some(std::str::from_utf8(bytes).ok()?),
            None => None,
        };
        let generated = std::str::from_utf8(current_generated).ok()?;
        let working = std::str::from_utf8(previous_working).ok()?;
        self.merge(base, generated, working, file_path)
    }
}

// ---------------------------------------------------------------------------
// Line merge
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Generated,
    Working,
}

#[derive(Debug, Clone)]
struct Hunk {
    side: Side,
    base: Range<usize>,
    lines: Range<usize>,
}

fn split_lines(text: &str) -> Vec<&str> {
    text.split_inclusive('\n').collect()
}

/// Changed regions of `side` relative to `base`: the gaps between matched
/// runs, in order and separated by at least one matched line.
fn hunks(side: Side, base: &[&str], other: &[&str]) -> Vec<Hunk> {
    let matched = capture_diff_slices(Algorithm::Myers, base, other)
        .into_iter()
        .filter_map(|op| match op.as_tag_tuple() {
            (DiffTag::Equal, old, new)
                if !old.is_empty()
                    && old.len() == new.len()
                    && old.end <= base.len()
                    && new.end <= other.len()
                    && base[old.clone()] == other[new.clone()] =>
            {
                Some((old, new))
            }
            _ => None,
        })
        .chain(std::iter::once((base.len()..base.len(), other.len()..other.len())));

    let mut out = Vec::new();
    let (mut base_end, mut other_end) = (0, 0);
    for (old, new) in matched {
        // A run behind either cursor is folded into the surrounding change.
        if old.start < base_end || new.start < other_end {
            continue;
        }
        if old.start > base_end || new.start > other_end {
            out.push(Hunk {
                side,
                base: base_end..old.start,
                lines: other_end..new.start,
            });
        }
        base_end = old.end;
        other_end = new.end;
    }
    out
}

/// Insertions touching a change, or intersecting base ranges.
fn overlaps(group: &Range<usize>, hunk: &Range<usize>) -> bool {
    let intersect = hunk.start < group.end && group.start < hunk.end;
    let hunk_touches = hunk.is_empty() && group.start <= hunk.start && hunk.start <= group.end;
    let group_touches = group.is_empty() && hunk.start <= group.start && group.start <= hunk.end;
    intersect || hunk_touches || group_touches
}

/// Text of one side over `range` of the base, given that side's hunks
/// inside the range.
fn side_text(base: &[&str], side: &[&str], range: &Range<usize>, hunks: &[&Hunk]) -> String {
    let mut out = String::new();
    let mut cursor = range.start;
    for hunk in hunks {
        for line in &base[cursor..hunk.base.start] {
            out.push_str(line);
        }
        for line in &side[hunk.lines.clone()] {
            out.push_str(line);
        }
        cursor = hunk.base.end;
    }
    for line in &base[cursor..range.end] {
        out.push_str(line);
    }
    out
}

fn push_block(out: &mut String, text: &str) {
    out.push_str(text);
    if !text.is_empty() && !text.ends_with('\n') {
        out.push('\n');
    }
}

/// diff3 over lines. Conflicting groups become marker blocks.
pub fn merge_lines(base: &str, generated: &str, working: &str) -> MergeResult {
    let base_lines = split_lines(base);
    let generated_lines = split_lines(generated);
    let working_lines = split_lines(working);

    let mut all: Vec<Hunk> = hunks(Side::Generated, &base_lines, &generated_lines);
    all.extend(hunks(Side::Working, &base_lines, &working_lines));
    all.sort_by_key(|h| (h.base.start, h.base.end));

    let mut out = String::with_capacity(working.len().max(generated.len()));
    let mut has_conflict = false;
    let mut cursor = 0;
    let mut index = 0;

    while index < all.len() {
        let mut group = all[index].base.clone();
        let mut end = index + 1;
        while end < all.len() && overlaps(&group, &all[end].base) {
            group.start = group.start.min(all[end].base.start);
            group.end = group.end.max(all[end].base.end);
            end += 1;
        }
        let members = &all[index..end];
        index = end;

        for line in &base_lines[cursor..group.start] {
            out.push_str(line);
        }
        cursor = group.end;

        let from_generated: Vec<&Hunk> = members.iter().filter(|h| h.side == Side::Generated).collect();
        let from_working: Vec<&Hunk> = members.iter().filter(|h| h.side == Side::Working).collect();
        let generated_text = side_text(&base_lines, &generated_lines, &group, &from_generated);
        let working_text = side_text(&base_lines, &working_lines, &group, &from_working);

        if from_working.is_empty() {
            out.push_str(&generated_text);
        } else if from_generated.is_empty() || generated_text == working_text {
            out.push_str(&working_text);
        } else {
            has_conflict = true;
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(MARKER_WORKING);
            out.push('\n');
            push_block(&mut out, &working_text);
            out.push_str(MARKER_SEPARATOR);
            out.push('\n');
            push_block(&mut out, &generated_text);
            out.push_str(MARKER_GENERATED);
            out.push('\n');
        }
    }
    for line in &base_lines[cursor..] {
        out.push_str(line);
    }

    MergeResult {
        merged_text: out,
        has_conflict,
    }
}

// ---------------------------------------------------------------------------
// JSON merge
// ---------------------------------------------------------------------------

struct ValueConflict;

fn merge_json(base: &str, generated: &str, working: &str) -> Option<MergeResult> {
    let base_value: Value = serde_json::from_str(base).ok()?;
    let generated_value: Value = serde_json::from_str(generated).ok()?;
    let working_value: Value = serde_json::from_str(working).ok()?;

    let merged = merge_value(Some(&base_value), Some(&generated_value), Some(&working_value))
        .ok()
        .flatten()?;
    if merged == working_value {
        return Some(MergeResult::clean(working));
    }
    let mut text = serde_json::to_string_pretty(&merged).ok()?;
    if working.ends_with('\n') {
        text.push('\n');
    }
    Some(MergeResult::clean(text))
}

/// `Ok(None)` means the key is removed.
fn merge_value(
    base: Option<&Value>,
    generated: Option<&Value>,
    working: Option<&Value>,
) -> Result<Option<Value>, ValueConflict> {
    if generated == working || generated == base {
        return Ok(working.cloned());
    }
    if working == base {
        return Ok(generated.cloned());
    }
    let empty = Map::new();
    match (base, generated, working) {
        (base, Some(Value::Object(generated)), Some(Value::Object(working)))
            if matches!(base, None | Some(Value::Object(_))) =>
        {
            let base = match base {
                Some(Value::Object(map)) => map,
                _ => &empty,
            };
            let mut merged = Map::new();
            let keys = working
                .keys()
                .chain(generated.keys().filter(|k| !working.contains_key(*k)))
                .chain(
                    base.keys()
                        .filter(|k| !working.contains_key(*k) && !generated.contains_key(*k)),
                );
            for key in keys {
                if let Some(value) = merge_value(base.get(key), generated.get(key), working.get(key))? {
                    merged.insert(key.clone(), value);
                }
            }
            Ok(Some(Value::Object(merged)))
        }
        _ => Err(ValueConflict),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(base: &str, generated: &str, working: &str) -> MergeResult {
        merge(Some(base), generated, working, "file.txt").expect("text file")
    }

    #[test]
    fn no_baseline_takes_generated() {
        let result = merge(None, "new", "whatever", "a.txt").unwrap();
        assert_eq!(result, MergeResult::clean("new"));
    }

    #[test]
    fn unchanged_generator_keeps_working_copy() {
        assert_eq!(line("g", "g", "w edited"), MergeResult::clean("w edited"));
    }

    #[test]
    fn untouched_working_copy_adopts_generated() {
        assert_eq!(line("g", "g2", "g"), MergeResult::clean("g2"));
    }

    #[test]
    fn overlapping_edits_conflict_with_working_side_first() {
        let result = line("a\nb\nc", "a\nB\nc", "a\nX\nc");
        assert!(result.has_conflict);
        assert_eq!(
            result.merged_text,
            "a\n<<<<<<< working\nX\n=======\nB\n>>>>>>> generated\nc"
        );
    }

    #[test]
    fn disjoint_edits_merge_cleanly() {
        let result = line("a\nb\nc", "a\nb\nc\nd", "z\na\nb\nc");
        assert!(!result.has_conflict, "{}", result.merged_text);
        assert_eq!(result.merged_text, "z\na\nb\nc\nd");
    }

    #[test]
    fn edits_on_adjacent_lines_do_not_conflict() {
        let result = line("1\n2\n3\n4\n", "1\nTWO\n3\n4\n", "1\n2\nTHREE\n4\n");
        assert!(!result.has_conflict, "{}", result.merged_text);
        assert_eq!(result.merged_text, "1\nTWO\nTHREE\n4\n");
    }

    #[test]
    fn identical_change_on_both_sides_is_taken_once() {
        let result = line("a\nb\nc\n", "a\nB\nc\nextra\n", "a\nB\nc\n");
        assert!(!result.has_conflict);
        assert_eq!(result.merged_text, "a\nB\nc\nextra\n");
    }

    #[test]
    fn insertions_at_the_same_point_conflict() {
        let result = line("a\nb\n", "a\ngen\nb\n", "a\nwork\nb\n");
        assert!(result.has_conflict);
        assert!(result.merged_text.contains("work\n=======\ngen\n"));
    }

    #[test]
    fn merge_is_idempotent_once_conflict_free() {
        let first = line("a\nb\nc\n", "a\nb\nc\nd\n", "z\na\nb\nc\n");
        let again = line("a\nb\nc\nd\n", "a\nb\nc\nd\n", &first.merged_text);
        assert_eq!(again.merged_text, first.merged_text);
    }

    #[test]
    fn hunks_are_ordered_gaps_between_matched_runs() {
        let base = ["b\n", "x\n"];
        let other = ["x\n", "x\n", "c"];
        let found = hunks(Side::Generated, &base, &other);
        for pair in found.windows(2) {
            assert!(pair[0].base.end < pair[1].base.start, "{found:?}");
            assert!(pair[0].lines.end < pair[1].lines.start, "{found:?}");
        }
        let all: Vec<&Hunk> = found.iter().collect();
        assert_eq!(side_text(&base, &other, &(0..base.len()), &all), "x\nx\nc");
        assert_eq!(merge_lines("b\nx\n", "x\nx\nc", "b\nx\n"), MergeResult::clean("x\nx\nc"));
    }

    #[test]
    fn one_sided_change_next_to_a_moved_line_is_kept() {
        let result = merge(
            Some("c\na\nm1\nm2\nm3\nm4\n"),
            "a\na\nx\nm1\nm2\nm3\nm4\n",
            "c\na\nm1\nm2\nm3\nm4\nzz\n",
            "src/a.ts",
        )
        .unwrap();
        assert_eq!(result, MergeResult::clean("a\na\nx\nm1\nm2\nm3\nm4\nzz\n"));
    }

    #[test]
    fn emptied_working_copy_against_reordered_output_conflicts() {
        let result = merge(Some("x\nc\nb\n"), "b\nb\nc", "", "src/app.ts").unwrap();
        assert!(result.has_conflict);
        assert_eq!(
            result.merged_text,
            "<<<<<<< working\n=======\nb\nb\nc\n>>>>>>> generated\n"
        );
    }

    #[test]
    fn binary_paths_still_follow_the_equality_rules() {
        assert_eq!(merge(None, "g", "w", "logo.png"), Some(MergeResult::clean("g")));
        assert_eq!(merge(Some("g"), "g", "w", "logo.png"), Some(MergeResult::clean("w")));
        assert_eq!(merge(Some("g"), "g2", "g", "logo.png"), Some(MergeResult::clean("g2")));
        assert_eq!(merge(Some("g"), "g2", "g2", "font.woff2"), Some(MergeResult::clean("g2")));
    }

    #[test]
    fn binary_paths_are_not_merged() {
        assert!(merge(Some("a"), "b", "c", "assets/logo.PNG").is_none());
        assert!(!is_binary_path(".png"));
        assert!(MergeStrategies::default()
            .merge_bytes(Some(b"a"), &[0xff, 0xfe], b"c", "data.txt")
            .is_none());
    }

    #[test]
    fn json_strategy_merges_disjoint_keys_in_working_order() {
        let base = "{\n  \"name\": \"web\",\n  \"version\": \"1.0.0\"\n}\n";
        let generated = "{\n  \"name\": \"web\",\n  \"version\": \"1.1.0\",\n  \"type\": \"module\"\n}\n";
        let working = "{\n  \"private\": true,\n  \"name\": \"web\",\n  \"version\": \"1.0.0\"\n}\n";
        let result = merge(Some(base), generated, working, "package.json").unwrap();
        assert!(!result.has_conflict);
        let value: Value = serde_json::from_str(&result.merged_text).unwrap();
        let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["private", "name", "version", "type"]);
        assert_eq!(value["version"], "1.1.0");
        assert!(result.merged_text.ends_with("}\n"));
    }

    #[test]
    fn json_strategy_falls_back_to_lines_on_scalar_conflict() {
        let base = "{\"v\": 1}\n";
        let result = merge(Some(base), "{\"v\": 2}\n", "{\"v\": 3}\n", "settings.json").unwrap();
        assert!(result.has_conflict);
        assert!(result.merged_text.contains(MARKER_WORKING));
    }

    #[test]
    fn strategy_lookup_is_case_insensitive() {
        let strategies = MergeStrategies::default();
        assert_eq!(strategies.for_path("a/B.JSON").name(), "json");
        assert_eq!(strategies.for_path("Makefile").name(), "line");
    }
}

#[cfg(test)]
mod properties {
    use proptest::prelude::*;

    use super::*;

    fn lines() -> impl Strategy<Value = String> {
        prop::collection::vec(prop::sample::select(vec!["a\n", "b\n", "c\n", "x\n"]), 0..6)
            .prop_map(|lines| lines.concat())
    }

    const PAD: &str = "pad-1\npad-2\npad-3\n";

    proptest! {
        #[test]
        fn one_sided_changes_reproduce_that_side(base in lines(), changed in lines()) {
            prop_assert_eq!(merge_lines(&base, &changed, &base), MergeResult::clean(changed.clone()));
            prop_assert_eq!(merge_lines(&base, &base, &changed), MergeResult::clean(changed));
        }

        #[test]
        fn edits_separated_by_unchanged_lines_merge_cleanly(
            head in lines(),
            new_head in lines(),
            tail in lines(),
            new_tail in lines(),
        ) {
            let base = format!("{head}{PAD}{tail}");
            let generated = format!("{new_head}{PAD}{tail}");
            let working = format!("{head}{PAD}{new_tail}");
            let result = merge_lines(&base, &generated, &working);
            prop_assert!(!result.has_conflict, "{}", result.merged_text);
            prop_assert_eq!(result.merged_text, format!("{new_head}{PAD}{new_tail}"));
        }

        #[test]
        fn arbitrary_inputs_merge_without_panicking(
            base in "[abx\n]{0,16}",
            generated in "[abx\n]{0,16}",
            working in "[abx\n]{0,16}",
        ) {
            let _ = merge_lines(&base, &generated, &working);
            let _ = merge(Some(&base), &generated, &working, "src/app.ts");
            prop_assert_eq!(merge_lines(&base, &generated, &generated), MergeResult::clean(generated));
        }
    }
}

//! Unified-diff text parser.
//!
//! Accepts empty input, a single-file diff, or a multi-file concatenated
//! diff and returns the ordered hunks. Only hunk bodies (lines after an
//! `@@` header) are interpreted; file headers may be absent and are
//! skipped. Runs of deletes immediately followed by inserts are paired
//! positionally into `Modified` entries.

use crate::error::PatchError;
use crate::types::{Hunk, LineDiff, LineOp};

/// Raw per-line classification before delete/insert pairing.
enum RawLine {
    Context(String),
    Delete(String),
    Insert(String),
}

/// Parse unified-diff text into ordered hunks.
///
/// Empty input yields an empty hunk list. Malformed `@@` headers fail with
/// [`PatchError::InvalidPatch`]; unrecognized body-line prefixes are
/// skipped for forward compatibility.
pub fn parse_unified_diff(text: &str) -> Result<Vec<Hunk>, PatchError> {
    let mut hunks = Vec::new();
    let mut current: Option<(Hunk, Vec<RawLine>)> = None;

    for raw in text.split('\n') {
        let line = raw.strip_suffix('\r').unwrap_or(raw);

        if line.starts_with("@@") {
            if let Some((mut hunk, body)) = current.take() {
                hunk.diff_operations = coalesce(body);
                hunks.push(hunk);
            }
            let (original_start, original_length, updated_start, updated_length) =
                parse_hunk_header(line)?;
            current = Some((
                Hunk {
                    original_start,
                    original_length,
                    updated_start,
                    updated_length,
                    diff_operations: Vec::new(),
                },
                Vec::new(),
            ));
            continue;
        }

        if line.starts_with("diff --git") {
            // Next file's preamble; close out any open hunk.
            if let Some((mut hunk, body)) = current.take() {
                hunk.diff_operations = coalesce(body);
                hunks.push(hunk);
            }
            continue;
        }

        let Some((_, body)) = current.as_mut() else {
            // File headers and anything else before the first hunk.
            continue;
        };

        if line.starts_with("+++") || line.starts_with("---") || line.starts_with('\\') {
            continue;
        }

        if let Some(rest) = line.strip_prefix('+') {
            body.push(RawLine::Insert(rest.to_string()));
        } else if let Some(rest) = line.strip_prefix('-') {
            body.push(RawLine::Delete(rest.to_string()));
        } else if let Some(rest) = line.strip_prefix(' ') {
            body.push(RawLine::Context(rest.to_string()));
        } else if line.is_empty() {
            body.push(RawLine::Context(String::new()));
        }
        // Any other prefix is skipped.
    }

    if let Some((mut hunk, body)) = current.take() {
        // A trailing empty line from the final newline would otherwise count
        // as context beyond the hunk's declared extent.
        let mut body = body;
        if matches!(body.last(), Some(RawLine::Context(text)) if text.is_empty()) {
            let original_side = body
                .iter()
                .filter(|l| !matches!(l, RawLine::Insert(_)))
                .count() as u32;
            let updated_side = body
                .iter()
                .filter(|l| !matches!(l, RawLine::Delete(_)))
                .count() as u32;
            if original_side > hunk.original_length || updated_side > hunk.updated_length {
                body.pop();
            }
        }
        hunk.diff_operations = coalesce(body);
        hunks.push(hunk);
    }

    Ok(hunks)
}

/// Parse `@@ -O[,OL] +U[,UL] @@`; lengths default to 1 when omitted, and a
/// zero length forces the corresponding start to 0.
fn parse_hunk_header(line: &str) -> Result<(u32, u32, u32, u32), PatchError> {
    let invalid = || PatchError::InvalidPatch {
        reason: format!("malformed hunk header: `{line}`"),
    };

    let rest = line.strip_prefix("@@ ").ok_or_else(invalid)?;
    let end = rest.find(" @@").ok_or_else(invalid)?;
    let mut ranges = rest[..end].split(' ');

    let original = ranges.next().ok_or_else(invalid)?;
    let updated = ranges.next().ok_or_else(invalid)?;
    if ranges.next().is_some() {
        return Err(invalid());
    }

    let (original_start, original_length) =
        parse_range(original.strip_prefix('-').ok_or_else(invalid)?).ok_or_else(invalid)?;
    let (updated_start, updated_length) =
        parse_range(updated.strip_prefix('+').ok_or_else(invalid)?).ok_or_else(invalid)?;

    Ok((original_start, original_length, updated_start, updated_length))
}

/// Parse `S` or `S,L` into a (start, length) pair.
fn parse_range(range: &str) -> Option<(u32, u32)> {
    let (start, length) = match range.split_once(',') {
        Some((start, length)) => (start.parse().ok()?, length.parse().ok()?),
        None => (range.parse().ok()?, 1),
    };
    if length == 0 {
        Some((0, 0))
    } else {
        Some((start, length))
    }
}

/// Pair runs of consecutive deletes with the inserts that immediately
/// follow them. A delete-run of length `k` followed by an insert-run of
/// length `j` pairs `min(k, j)` entries positionally into `Modified`;
/// surplus deletes emit first, surplus inserts after the pairs. Pairing
/// never crosses a context line.
fn coalesce(body: Vec<RawLine>) -> Vec<LineDiff> {
    let mut out = Vec::with_capacity(body.len());
    let mut iter = body.into_iter().peekable();

    while let Some(line) = iter.next() {
        match line {
            RawLine::Context(text) => out.push(LineDiff::untouched(text)),
            RawLine::Insert(text) => out.push(LineDiff::insert(text)),
            RawLine::Delete(first) => {
                let mut deletes = vec![first];
                while let Some(RawLine::Delete(_)) = iter.peek() {
                    let Some(RawLine::Delete(text)) = iter.next() else {
                        unreachable!("peeked a delete");
                    };
                    deletes.push(text);
                }
                let mut inserts = Vec::new();
                while let Some(RawLine::Insert(_)) = iter.peek() {
                    let Some(RawLine::Insert(text)) = iter.next() else {
                        unreachable!("peeked an insert");
                    };
                    inserts.push(text);
                }

                let paired = deletes.len().min(inserts.len());
                let surplus_deletes = deletes.split_off(paired);
                let surplus_inserts = inserts.split_off(paired);

                for (old, new) in deletes.into_iter().zip(inserts) {
                    out.push(LineDiff::modified(old, new));
                }
                out.extend(surplus_deletes.into_iter().map(LineDiff::delete));
                out.extend(surplus_inserts.into_iter().map(LineDiff::insert));
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ops(hunk: &Hunk) -> Vec<LineOp> {
        hunk.diff_operations.iter().map(|d| d.op).collect()
    }

    /// Spec §8 property 1: original/updated side counts match the header.
    fn assert_hunk_arithmetic(hunk: &Hunk) {
        let original = hunk
            .diff_operations
            .iter()
            .filter(|d| {
                matches!(
                    d.op,
                    LineOp::Delete | LineOp::Modified | LineOp::Untouched
                )
            })
            .count() as u32;
        let updated = hunk
            .diff_operations
            .iter()
            .filter(|d| {
                matches!(
                    d.op,
                    LineOp::Insert | LineOp::Modified | LineOp::Untouched
                )
            })
            .count() as u32;
        assert_eq!(original, hunk.original_length, "original side arithmetic");
        assert_eq!(updated, hunk.updated_length, "updated side arithmetic");
    }

    #[test]
    fn empty_input_yields_no_hunks() {
        assert!(parse_unified_diff("").unwrap().is_empty());
    }

    #[test]
    fn single_line_change_in_context() {
        // A five-line region where only line 3 changes.
        let diff = "@@ -1,5 +1,5 @@\n {\n   \"app\": \"core\",\n-  \"subapp\": \"v1.1.0\",\n+  \"subapp\": \"v1.2.0\",\n   \"extra\": true,\n }\n";

        let hunks = parse_unified_diff(diff).unwrap();
        assert_eq!(hunks.len(), 1);
        let hunk = &hunks[0];
        assert_eq!(
            (hunk.original_start, hunk.original_length),
            (1, 5),
            "header positions"
        );
        assert_eq!(
            ops(hunk),
            vec![
                LineOp::Untouched,
                LineOp::Untouched,
                LineOp::Modified,
                LineOp::Untouched,
                LineOp::Untouched
            ]
        );
        assert_eq!(hunk.diff_operations[2].text, "  \"subapp\": \"v1.1.0\",");
        assert_eq!(hunk.diff_operations[2].new_text, "  \"subapp\": \"v1.2.0\",");
        assert_hunk_arithmetic(hunk);
    }

    #[test]
    fn pure_insertion_appends_lines() {
        // Two lines appended to a three-line file.
        let diff = "@@ -1,3 +1,5 @@\n # Title\n \n body\n+\n+trailer\n";

        let hunks = parse_unified_diff(diff).unwrap();
        assert_eq!(hunks.len(), 1);
        let hunk = &hunks[0];
        assert_eq!(hunk.original_start, 1);
        assert_eq!(hunk.original_length, 3);
        assert_eq!(hunk.updated_start, 1);
        assert_eq!(hunk.updated_length, 5);
        assert_eq!(
            ops(hunk),
            vec![
                LineOp::Untouched,
                LineOp::Untouched,
                LineOp::Untouched,
                LineOp::Insert,
                LineOp::Insert
            ]
        );
        assert_hunk_arithmetic(hunk);
    }

    #[test]
    fn first_line_change_pairs_before_context() {
        let diff = "@@ -1,3 +1,3 @@\n-coreapp = \"v0.1.0\"\n+coreapp = \"v0.2.0\"\n second = true\n third = false\n";

        let hunks = parse_unified_diff(diff).unwrap();
        let hunk = &hunks[0];
        assert_eq!(
            ops(hunk),
            vec![LineOp::Modified, LineOp::Untouched, LineOp::Untouched]
        );
        assert_hunk_arithmetic(hunk);
    }

    #[test]
    fn unequal_runs_pair_min_and_keep_surplus() {
        let diff = "@@ -1,3 +1,2 @@\n-one\n-two\n-three\n+uno\n+dos\n";

        let hunks = parse_unified_diff(diff).unwrap();
        let hunk = &hunks[0];
        assert_eq!(
            ops(hunk),
            vec![LineOp::Modified, LineOp::Modified, LineOp::Delete]
        );
        assert_eq!(hunk.diff_operations[0].text, "one");
        assert_eq!(hunk.diff_operations[0].new_text, "uno");
        assert_eq!(hunk.diff_operations[2].text, "three");
        assert_hunk_arithmetic(hunk);
    }

    #[test]
    fn surplus_inserts_follow_pairs() {
        let diff = "@@ -1,1 +1,3 @@\n-one\n+uno\n+dos\n+tres\n";

        let hunks = parse_unified_diff(diff).unwrap();
        assert_eq!(
            ops(&hunks[0]),
            vec![LineOp::Modified, LineOp::Insert, LineOp::Insert]
        );
        assert_hunk_arithmetic(&hunks[0]);
    }

    #[test]
    fn pairing_does_not_cross_context() {
        // Delete, context, insert: the context line blocks pairing.
        let diff = "@@ -1,2 +1,2 @@\n-gone\n kept\n+added\n";

        let hunks = parse_unified_diff(diff).unwrap();
        assert_eq!(
            ops(&hunks[0]),
            vec![LineOp::Delete, LineOp::Untouched, LineOp::Insert]
        );
        assert_hunk_arithmetic(&hunks[0]);
    }

    #[test]
    fn modified_pairing_is_maximal() {
        // Spec §8 property 2: no Modified sits next to a Delete/Insert it
        // could have absorbed.
        let diff = "@@ -1,4 +1,4 @@\n-a\n-b\n+A\n+B\n context\n-c\n+C\n";

        let hunks = parse_unified_diff(diff).unwrap();
        let entries = &hunks[0].diff_operations;
        for window in entries.windows(2) {
            let adjacent_pairable = matches!(
                (window[0].op, window[1].op),
                (LineOp::Delete, LineOp::Insert) | (LineOp::Insert, LineOp::Delete)
            );
            assert!(!adjacent_pairable, "unpaired adjacent delete/insert");
        }
        assert_eq!(
            ops(&hunks[0]),
            vec![
                LineOp::Modified,
                LineOp::Modified,
                LineOp::Untouched,
                LineOp::Modified
            ]
        );
    }

    #[test]
    fn lengths_default_to_one() {
        let diff = "@@ -3 +3 @@\n-old\n+new\n";

        let hunks = parse_unified_diff(diff).unwrap();
        let hunk = &hunks[0];
        assert_eq!((hunk.original_start, hunk.original_length), (3, 1));
        assert_eq!((hunk.updated_start, hunk.updated_length), (3, 1));
        assert_eq!(ops(hunk), vec![LineOp::Modified]);
    }

    #[test]
    fn zero_length_reports_zero_start() {
        // New file: no original side at all.
        let diff = "@@ -0,0 +1,2 @@\n+alpha\n+beta\n";

        let hunks = parse_unified_diff(diff).unwrap();
        let hunk = &hunks[0];
        assert_eq!((hunk.original_start, hunk.original_length), (0, 0));
        assert_eq!((hunk.updated_start, hunk.updated_length), (1, 2));
        assert_hunk_arithmetic(hunk);
    }

    #[test]
    fn file_headers_and_no_newline_marker_are_skipped() {
        let diff = "diff --git a/notes.md b/notes.md\nindex 123..456 100644\n--- a/notes.md\n+++ b/notes.md\n@@ -1,2 +1,2 @@\n first\n-second\n+second!\n\\ No newline at end of file\n";

        let hunks = parse_unified_diff(diff).unwrap();
        assert_eq!(hunks.len(), 1);
        assert_eq!(ops(&hunks[0]), vec![LineOp::Untouched, LineOp::Modified]);
        assert_hunk_arithmetic(&hunks[0]);
    }

    #[test]
    fn multiple_hunks_preserve_order() {
        let diff = "@@ -1,2 +1,2 @@\n keep\n-a\n+A\n@@ -10,2 +10,3 @@\n keep\n tail\n+new\n";

        let hunks = parse_unified_diff(diff).unwrap();
        assert_eq!(hunks.len(), 2);
        assert_eq!(hunks[0].original_start, 1);
        assert_eq!(hunks[1].original_start, 10);
        assert_eq!(hunks[1].updated_length, 3);
        assert_hunk_arithmetic(&hunks[0]);
        assert_hunk_arithmetic(&hunks[1]);
    }

    #[test]
    fn malformed_header_is_rejected() {
        let err = parse_unified_diff("@@ -x,2 +1,2 @@\n a\n b\n").unwrap_err();
        assert!(matches!(err, PatchError::InvalidPatch { .. }));
        assert!(err.to_string().contains("@@ -x,2"));

        let err = parse_unified_diff("@@ nonsense @@\n").unwrap_err();
        assert!(matches!(err, PatchError::InvalidPatch { .. }));
    }

    #[test]
    fn empty_body_line_counts_as_context() {
        // An empty line inside the hunk body is an empty context line.
        let diff = "@@ -1,3 +1,3 @@\n top\n\n-bottom\n+base\n";

        let hunks = parse_unified_diff(diff).unwrap();
        let hunk = &hunks[0];
        assert_eq!(
            ops(hunk),
            vec![LineOp::Untouched, LineOp::Untouched, LineOp::Modified]
        );
        assert_eq!(hunk.diff_operations[1].text, "");
        assert_hunk_arithmetic(hunk);
    }

    #[test]
    fn crlf_input_is_normalized() {
        let diff = "@@ -1,1 +1,1 @@\r\n-old\r\n+new\r\n";

        let hunks = parse_unified_diff(diff).unwrap();
        assert_eq!(hunks[0].diff_operations[0].text, "old");
        assert_eq!(hunks[0].diff_operations[0].new_text, "new");
    }
}
